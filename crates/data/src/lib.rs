// In crates/data/src/lib.rs

use chrono::{DateTime, NaiveDate, Utc};
use core_types::{Bar, BarField, Symbol};
use events::EventChannel;
use rust_decimal::Decimal;

pub mod error;
pub mod historic;

pub use error::{Error, Result};
pub use historic::HistoricDataHandler;

/// Read access to market data for the other pipeline stages.
///
/// Every query is answered from data that has already been published with
/// `update_bars`, so a consumer never sees a bar from the future.
pub trait DataHandler: Send + Sync {
    /// All instruments this handler serves, in a stable order.
    fn symbols(&self) -> Vec<Symbol>;

    /// The minimum tradable increment for `symbol`. Always positive.
    fn get_lot_size(&self, symbol: &Symbol) -> Result<u64>;

    /// One field of the latest published bar of `symbol`.
    fn get_latest_bar_value(&self, symbol: &Symbol, field: BarField) -> Result<Decimal>;

    /// Up to `n` most recent published bars of `symbol`, oldest first.
    fn get_latest_bars(&self, symbol: &Symbol, n: usize) -> Result<Vec<Bar>>;

    /// Publishes the next bar and pushes a `MarketEvent` onto `events`.
    /// Returns `false` once there is nothing left to publish.
    fn update_bars(&self, events: &EventChannel) -> Result<bool>;

    /// Whether another call to `update_bars` would publish anything.
    fn continue_backtest(&self) -> bool;
}

/// Accepts RFC 3339 timestamps as well as plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::InvalidTimestamp(raw.to_string()))
}
