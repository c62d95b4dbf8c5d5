// In crates/portfolio/src/types.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use core_types::Symbol;
use rust_decimal::Decimal;
use serde::Serialize;

/// The state of the account at the close of one bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub timestamp: DateTime<Utc>,
    pub cash: Decimal,
    pub commission: Decimal,
    pub total: Decimal,
    pub positions: BTreeMap<Symbol, i64>,
    pub market_values: BTreeMap<Symbol, Decimal>,
}

/// One point of the equity curve derived from the holdings history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub total: Decimal,
    /// Change against the previous point; zero for the first one.
    pub returns: Decimal,
    /// Compounded growth of one unit of capital.
    pub equity: Decimal,
}
