// In crates/core-types/src/types.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Error;

/// An instrument identifier, e.g. "HK.00700".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The side of an order or a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// The side that unwinds a position opened on `self`.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> i64 {
        match self {
            Direction::Buy => 1,
            Direction::Sell => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("BUY"),
            Direction::Sell => f.write_str("SELL"),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Direction::Buy),
            "SELL" => Ok(Direction::Sell),
            _ => Err(Error::UnknownDirection(s.to_string())),
        }
    }
}

/// The kind of trading intent a strategy can express for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    /// Open a new long unit.
    OpenLong,
    /// Open a new short unit.
    OpenShort,
    /// Add one more unit to the open position (pyramiding).
    Extend,
    /// Flatten the open position.
    Close,
    /// Partially reduce the open position.
    Lighten,
}

impl SignalType {
    pub fn is_open(self) -> bool {
        matches!(self, SignalType::OpenLong | SignalType::OpenShort)
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalType::OpenLong => "OpenLong",
            SignalType::OpenShort => "OpenShort",
            SignalType::Extend => "Extend",
            SignalType::Close => "Close",
            SignalType::Lighten => "Lighten",
        };
        f.write_str(name)
    }
}

impl FromStr for SignalType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "openlong" => Ok(SignalType::OpenLong),
            "openshort" => Ok(SignalType::OpenShort),
            "extend" => Ok(SignalType::Extend),
            "close" => Ok(SignalType::Close),
            "lighten" => Ok(SignalType::Lighten),
            _ => Err(Error::UnknownSignalType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => f.write_str("MKT"),
            OrderType::Limit => f.write_str("LMT"),
        }
    }
}

/// A field of a published bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
    Atr,
}

/// One OHLCV bar. `atr` is precomputed upstream and carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    #[serde(default)]
    pub atr: Option<Decimal>,
}

impl Bar {
    pub fn value(&self, field: BarField) -> Option<Decimal> {
        match field {
            BarField::Open => Some(self.open),
            BarField::High => Some(self.high),
            BarField::Low => Some(self.low),
            BarField::Close => Some(self.close),
            BarField::Volume => Some(self.volume),
            BarField::Atr => self.atr,
        }
    }
}

/// Auxiliary sizing inputs carried by a signal.
///
/// `atr` is the one input the risk engine requires, so it is typed. Everything
/// else a strategy wants to attach (bar index, rule id, ...) goes into `extra`
/// and is passed through to the resulting orders untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalAttr {
    #[serde(default)]
    pub atr: Option<Decimal>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SignalAttr {
    pub fn with_atr(atr: Decimal) -> Self {
        Self {
            atr: Some(atr),
            extra: BTreeMap::new(),
        }
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }
}

/// One trading intent produced by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: Symbol,
    pub signal_type: SignalType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attr: SignalAttr,
}

impl Signal {
    pub fn new(
        symbol: impl Into<Symbol>,
        signal_type: SignalType,
        timestamp: DateTime<Utc>,
        attr: SignalAttr,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            signal_type,
            timestamp,
            attr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signal_type_parses_loosely() {
        assert_eq!("OpenLong".parse::<SignalType>().unwrap(), SignalType::OpenLong);
        assert_eq!("open_short".parse::<SignalType>().unwrap(), SignalType::OpenShort);
        assert_eq!("CLOSE".parse::<SignalType>().unwrap(), SignalType::Close);
        assert!(matches!(
            "reverse".parse::<SignalType>(),
            Err(Error::UnknownSignalType(_))
        ));
    }

    #[test]
    fn direction_opposite_and_sign() {
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
        assert_eq!(Direction::Sell.opposite(), Direction::Buy);
        assert_eq!(Direction::Buy.sign(), 1);
        assert_eq!(Direction::Sell.sign(), -1);
    }

    #[test]
    fn attr_keeps_extra_keys_alongside_atr() {
        let attr = SignalAttr::with_atr(dec!(1.5))
            .insert("rule_id", "TurtleStrategy")
            .insert("index", 42);

        assert_eq!(attr.atr, Some(dec!(1.5)));
        assert_eq!(attr.get("index"), Some(&serde_json::json!(42)));

        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json["rule_id"], "TurtleStrategy");
        assert_eq!(json["atr"], "1.5");
    }

    #[test]
    fn bar_atr_is_optional() {
        let bar = Bar {
            timestamp: Utc::now(),
            open: dec!(10),
            high: dec!(11),
            low: dec!(9),
            close: dec!(10.5),
            volume: dec!(1000),
            atr: None,
        };
        assert_eq!(bar.value(BarField::Close), Some(dec!(10.5)));
        assert_eq!(bar.value(BarField::Atr), None);
    }
}
