//! Error types for peerchat core library.

use thiserror::Error;

/// Result type alias using peerchat Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for peerchat operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
