//! Error types for InsightVault.

use thiserror::Error;

use crate::feeds::types::ApiType;

/// Common error type for InsightVault.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network retrieval of a source failed (connect, timeout, non-2xx, oversize body).
    #[error("transport error: {0}")]
    Transport(String),

    /// The retrieved payload is not a syndication feed.
    #[error("feed parse error: {0}")]
    Parse(String),

    /// No fetcher exists for the source's protocol type.
    #[error("unsupported api_type: {0}")]
    UnsupportedProtocol(ApiType),
}

impl VaultError {
    /// Whether this error aborts a single source's ingestion cycle.
    pub fn is_source_fatal(&self) -> bool {
        matches!(
            self,
            VaultError::Transport(_) | VaultError::Parse(_) | VaultError::UnsupportedProtocol(_)
        )
    }
}

impl From<sqlx::Error> for VaultError {
    fn from(e: sqlx::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(e: reqwest::Error) -> Self {
        VaultError::Transport(e.to_string())
    }
}

/// Result type alias for InsightVault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
