//! Errors shared by the MaestroWarmup crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable or malformed, or a required setting missing
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown enum name, undecodable payload and similar caller mistakes
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File is too large ({size} bytes, limit {limit} bytes)")]
    TooLarge { size: usize, limit: usize },
}
