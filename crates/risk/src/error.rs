// In crates/risk/src/error.rs

use core_types::{SignalType, Symbol};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{signal_type} signal for {symbol} needs a positive atr, got {atr:?}")]
    InvalidAtr {
        symbol: Symbol,
        signal_type: SignalType,
        atr: Option<Decimal>,
    },

    #[error("No usable market data for {symbol} ({signal_type}): {source}")]
    MarketData {
        symbol: Symbol,
        signal_type: SignalType,
        source: data::Error,
    },

    #[error("Latest close of {symbol} is not positive ({price}), cannot size {signal_type}")]
    InvalidPrice {
        symbol: Symbol,
        signal_type: SignalType,
        price: Decimal,
    },

    #[error("{signal_type} signal for {symbol} but no position is open")]
    NoOpenPosition {
        symbol: Symbol,
        signal_type: SignalType,
    },

    #[error("Portfolio query failed: {0}")]
    Portfolio(#[from] portfolio::Error),

    #[error("Portfolio lock is poisoned")]
    PoisonedPortfolio,

    #[error("Failed to emit order: {0}")]
    Event(#[from] events::Error),

    #[error("Invalid risk parameters: {0}")]
    InvalidParameters(String),
}

impl Error {
    /// Errors that only invalidate the signal that caused them.
    /// Everything else aborts the whole batch.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::InvalidAtr { .. }
                | Error::MarketData { .. }
                | Error::InvalidPrice { .. }
                | Error::NoOpenPosition { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
