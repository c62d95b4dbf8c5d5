// In crates/execution/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to publish fill: {0}")]
    Channel(#[from] events::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
