//! Instrument identifiers and the built-in instrument catalog.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid symbol {0:?}: expected a non-empty ASCII alphanumeric pair such as BTCUSDT")]
pub struct InvalidSymbol(pub String);

/// Exchange instrument identifier, stored upper case (e.g. `BTCUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self, InvalidSymbol> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InvalidSymbol(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stream names on the exchange use the lower-case form.
    pub fn stream_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = InvalidSymbol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = InvalidSymbol;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

/// A selectable instrument: its symbol plus a human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: Symbol,
    pub name: String,
}

/// Ordered set of instruments offered for selection, keyed by symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentCatalog {
    entries: IndexMap<Symbol, String>,
}

impl InstrumentCatalog {
    /// Builds a catalog from `symbol -> name` pairs, keeping their order.
    pub fn from_pairs<I, S, N>(pairs: I) -> Result<Self, InvalidSymbol>
    where
        I: IntoIterator<Item = (S, N)>,
        S: AsRef<str>,
        N: Into<String>,
    {
        let mut entries = IndexMap::new();
        for (symbol, name) in pairs {
            entries.insert(Symbol::new(symbol.as_ref())?, name.into());
        }
        Ok(Self { entries })
    }

    pub fn get(&self, symbol: &Symbol) -> Option<Instrument> {
        self.entries.get(symbol).map(|name| Instrument {
            symbol: symbol.clone(),
            name: name.clone(),
        })
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = Instrument> + '_ {
        self.entries.iter().map(|(symbol, name)| Instrument {
            symbol: symbol.clone(),
            name: name.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InstrumentCatalog {
    fn default() -> Self {
        let entries = [
            ("BTCUSDT", "Bitcoin"),
            ("ETHUSDT", "Ethereum"),
            ("SOLUSDT", "Solana"),
        ]
        .into_iter()
        .map(|(s, n)| (Symbol(s.to_string()), n.to_string()))
        .collect();
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_normalized() {
        let s = Symbol::new(" btcUsdt ").unwrap();
        assert_eq!(s.as_str(), "BTCUSDT");
        assert_eq!(s.stream_name(), "btcusdt");
    }

    #[test]
    fn rejects_garbage_symbols() {
        assert!(Symbol::new("").is_err());
        assert!(Symbol::new("BTC-USD").is_err());
        assert!(Symbol::new("btc/usdt").is_err());
    }

    #[test]
    fn default_catalog_keeps_order() {
        let cat = InstrumentCatalog::default();
        let names: Vec<String> = cat.iter().map(|i| i.name).collect();
        assert_eq!(names, ["Bitcoin", "Ethereum", "Solana"]);
        assert!(cat.contains(&Symbol::new("solusdt").unwrap()));
    }

    #[test]
    fn custom_catalog_validates_symbols() {
        let cat = InstrumentCatalog::from_pairs([("dogeusdt", "Dogecoin")]).unwrap();
        assert_eq!(cat.len(), 1);
        assert_eq!(
            cat.get(&Symbol::new("DOGEUSDT").unwrap()).unwrap().name,
            "Dogecoin"
        );

        assert!(InstrumentCatalog::from_pairs([("doge usdt", "Dogecoin")]).is_err());
    }
}
