//! Serde helpers for exchange payloads that send prices as decimal strings.

use std::fmt;

use serde::de::{self, Deserializer, Unexpected, Visitor};

/// Accepts `"123.45"` as well as a bare JSON number.
pub(crate) fn de_decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DecimalVisitor)
}

/// Newtype for positional decoding where a `deserialize_with` attribute can't be used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Decimal(pub f64);

impl<'de> de::Deserialize<'de> for Decimal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        de_decimal(deserializer).map(Decimal)
    }
}

struct DecimalVisitor;

impl Visitor<'_> for DecimalVisitor {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string or a number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
        v.trim()
            .parse::<f64>()
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
        Ok(v as f64)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Px {
        #[serde(deserialize_with = "de_decimal")]
        p: f64,
    }

    #[test]
    fn strings_and_numbers() {
        let a: Px = serde_json::from_str(r#"{"p":"42000.10"}"#).unwrap();
        assert_eq!(a.p, 42000.10);
        let b: Px = serde_json::from_str(r#"{"p":7}"#).unwrap();
        assert_eq!(b.p, 7.0);
        let c: Decimal = serde_json::from_str(r#""0.5""#).unwrap();
        assert_eq!(c, Decimal(0.5));
    }

    #[test]
    fn junk_is_an_error() {
        assert!(serde_json::from_str::<Px>(r#"{"p":"abc"}"#).is_err());
        assert!(serde_json::from_str::<Px>(r#"{"p":null}"#).is_err());
    }
}
