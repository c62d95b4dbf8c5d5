// In crates/events/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Event channel is closed")]
    Closed,

    #[error("Order quantity must be positive (symbol {symbol})")]
    ZeroQuantity { symbol: String },

    #[error("Quantity {quantity} of {symbol} does not fit a signed position")]
    QuantityOverflow { symbol: String, quantity: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
