//! Error types for `Syncast` core library.

use thiserror::Error;

/// Result type alias using `Syncast` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `Syncast` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
