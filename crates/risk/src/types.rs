// In crates/risk/src/types.rs

use std::fmt;

use chrono::{DateTime, Utc};
use core_types::{SignalType, Symbol};
use events::OrderEvent;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::{Error, Result};

/// Settings for the Turtle unit-sizing risk manager.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurtleRiskSettings {
    /// Share of total equity risked per unit (0.01 = 1%).
    #[serde(default = "default_risk_fraction")]
    pub risk_fraction: Decimal,
}

fn default_risk_fraction() -> Decimal {
    dec!(0.01)
}

impl Default for TurtleRiskSettings {
    fn default() -> Self {
        Self {
            risk_fraction: default_risk_fraction(),
        }
    }
}

impl TurtleRiskSettings {
    pub fn validate(&self) -> Result<()> {
        if self.risk_fraction <= Decimal::ZERO || self.risk_fraction > Decimal::ONE {
            return Err(Error::InvalidParameters(format!(
                "risk_fraction must be in (0, 1], got {}",
                self.risk_fraction
            )));
        }
        Ok(())
    }
}

/// Why a valid signal produced no order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoTradeReason {
    /// The risk budget does not cover a single lot.
    ZeroQuantity,
    /// The account cannot pay for the sized quantity.
    Unaffordable,
    /// A close was requested for a symbol with no open position.
    FlatPosition,
}

impl fmt::Display for NoTradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoTradeReason::ZeroQuantity => f.write_str("risk budget below one lot"),
            NoTradeReason::Unaffordable => f.write_str("insufficient cash"),
            NoTradeReason::FlatPosition => f.write_str("no position to close"),
        }
    }
}

/// What the risk manager decided for one signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Order(OrderEvent),
    NoTrade(NoTradeReason),
    /// The signal kind has no sizing rule (Lighten).
    Unsupported(SignalType),
}

/// The outcome of one signal of a batch.
#[derive(Debug)]
pub struct SignalOutcome {
    pub symbol: Symbol,
    pub signal_type: SignalType,
    /// `Err` holds a precondition violation for this signal only.
    pub result: Result<Decision>,
}

/// Everything `on_signal` decided for one `SignalEvent`, in signal order.
#[derive(Debug)]
pub struct SignalReport {
    pub timestamp: DateTime<Utc>,
    pub outcomes: Vec<SignalOutcome>,
}

impl SignalReport {
    /// Orders in the order the signals were evaluated (not push order).
    pub fn orders(&self) -> impl Iterator<Item = &OrderEvent> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(Decision::Order(order)) => Some(order),
            _ => None,
        })
    }

    pub fn orders_emitted(&self) -> usize {
        self.orders().count()
    }

    pub fn no_trades(&self) -> usize {
        self.count(|r| matches!(r, Ok(Decision::NoTrade(_))))
    }

    pub fn unsupported(&self) -> usize {
        self.count(|r| matches!(r, Ok(Decision::Unsupported(_))))
    }

    pub fn rejected(&self) -> usize {
        self.count(|r| r.is_err())
    }

    fn count(&self, pred: impl Fn(&Result<Decision>) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.result)).count()
    }
}
