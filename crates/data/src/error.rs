// In crates/data/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("No bar has been published yet for {0}")]
    NoData(String),

    #[error("Field {field} is missing on the latest bar of {symbol}")]
    MissingField { symbol: String, field: String },

    #[error("Invalid lot size {lot_size} for {symbol}")]
    InvalidLotSize { symbol: String, lot_size: u64 },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Failed to publish market event: {0}")]
    Channel(#[from] events::Error),

    #[error("Failed to read bar file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
