//! Common error types for GLOOME

use thiserror::Error;

/// Common result type for GLOOME operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the GLOOME crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload from the remote service does not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
