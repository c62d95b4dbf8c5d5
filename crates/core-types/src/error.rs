// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown signal type: {0}")]
    UnknownSignalType(String),

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),
}

pub type Result<T> = std::result::Result<T, Error>;
