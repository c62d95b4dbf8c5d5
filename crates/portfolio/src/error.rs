// In crates/portfolio/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Symbol {0} is not tracked by the portfolio")]
    UnknownSymbol(String),

    #[error("Market data lookup failed: {0}")]
    Data(#[from] data::Error),

    #[error("Invalid fill: {0}")]
    Fill(#[from] events::Error),

    #[error("Position in {0} would overflow")]
    PositionOverflow(String),
}

pub type Result<T> = std::result::Result<T, Error>;
