//! Error types for margin-core

use thiserror::Error;

/// Result type alias using margin-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in margin-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Highlight not found
    #[error("Highlight not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Structural selector could not be parsed
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error talking to the remote store
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store rejected a request
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
