use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    bar::{Bar, SeriesItem},
    instrument::Symbol,
    timeframe::Timeframe,
};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown representation {0:?} (expected candlestick or area)")]
pub struct UnknownRepresentation(pub String);

/// Visual encoding of a series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    /// Full OHLC candles.
    #[default]
    Candlestick,
    /// Close-only line with a filled area.
    Area,
}

impl Representation {
    /// Projects a stored bar into what a series of this representation renders.
    pub fn project(&self, bar: &Bar) -> SeriesItem {
        match self {
            Representation::Candlestick => SeriesItem::Candle(*bar),
            Representation::Area => SeriesItem::Point(bar.to_point()),
        }
    }

    /// The other representation; what a chart-type toggle switches to.
    pub fn toggled(&self) -> Self {
        match self {
            Representation::Candlestick => Representation::Area,
            Representation::Area => Representation::Candlestick,
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Representation::Candlestick => "candlestick",
            Representation::Area => "area",
        })
    }
}

impl FromStr for Representation {
    type Err = UnknownRepresentation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "candlestick" | "candle" => Ok(Representation::Candlestick),
            "area" => Ok(Representation::Area),
            _ => Err(UnknownRepresentation(s.to_string())),
        }
    }
}

/// Everything a live chart session is bound to.
///
/// Never mutated in place: changing any field means building a new value and handing
/// it to the synchronizer, which replaces the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionParameters {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub representation: Representation,
}

impl SessionParameters {
    pub fn new(symbol: Symbol, timeframe: Timeframe, representation: Representation) -> Self {
        Self {
            symbol,
            timeframe,
            representation,
        }
    }

    pub fn with_symbol(&self, symbol: Symbol) -> Self {
        Self {
            symbol,
            ..self.clone()
        }
    }

    pub fn with_timeframe(&self, timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            ..self.clone()
        }
    }

    pub fn with_representation(&self, representation: Representation) -> Self {
        Self {
            representation,
            ..self.clone()
        }
    }

    /// True when `other` only differs in how the data is drawn, so the same bar
    /// history is valid for both.
    pub fn same_source(&self, other: &SessionParameters) -> bool {
        self.symbol == other.symbol && self.timeframe == other.timeframe
    }
}

impl fmt::Display for SessionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.symbol, self.timeframe, self.representation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> SessionParameters {
        SessionParameters::new(
            Symbol::new("BTCUSDT").unwrap(),
            Timeframe::OneDay,
            Representation::Candlestick,
        )
    }

    #[test]
    fn area_projects_close_only() {
        let bar = Bar::new(5, 1.0, 3.0, 0.5, 2.0);
        match Representation::Area.project(&bar) {
            SeriesItem::Point(p) => {
                assert_eq!(p.time, 5);
                assert_eq!(p.value, 2.0);
            }
            other => panic!("expected point, got {other:?}"),
        }
        assert_eq!(
            Representation::Candlestick.project(&bar),
            SeriesItem::Candle(bar)
        );
    }

    #[test]
    fn same_source_ignores_representation() {
        let a = btc();
        let b = a.with_representation(Representation::Area);
        assert!(a.same_source(&b));
        assert_ne!(a, b);

        let c = a.with_symbol(Symbol::new("ETHUSDT").unwrap());
        assert!(!a.same_source(&c));
        assert!(!a.same_source(&a.with_timeframe(Timeframe::OneYear)));
    }

    #[test]
    fn parses_representation() {
        assert_eq!("Area".parse(), Ok(Representation::Area));
        assert_eq!("candlestick".parse(), Ok(Representation::Candlestick));
        assert!("line".parse::<Representation>().is_err());
        assert_eq!(Representation::Area.toggled(), Representation::Candlestick);
    }
}
