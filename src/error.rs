//! Error types for the Cardbox study system
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation.

use thiserror::Error;

/// Main error type for Cardbox operations
#[derive(Error, Debug)]
pub enum CardboxError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Box not found
    #[error("Box not found: {0}")]
    BoxNotFound(String),

    /// Card not found
    #[error("Card not found: {0}")]
    CardNotFound(String),

    /// Cardset or factsheet not found
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Card key does not follow the `{collection}-{row}` layout
    #[error("Invalid card id: {0}")]
    InvalidCardId(String),

    /// Factsheet content or cardset settings rejected
    #[error("Invalid collection: {0}")]
    InvalidCollection(String),

    /// Page content failed validation for its kind
    #[error("Invalid page: {0}")]
    InvalidPage(String),

    /// Unknown or unusable reschedule policy
    #[error("Invalid schedule policy: {0}")]
    InvalidPolicy(String),

    /// Task payload could not be enqueued or decoded
    #[error("Task error: {0}")]
    Task(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Caller does not own the box
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid operation (e.g., answering a card of another box)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML content error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Cardbox operations
pub type Result<T> = std::result::Result<T, CardboxError>;

impl From<libsql::Error> for CardboxError {
    fn from(err: libsql::Error) -> Self {
        CardboxError::Database(err.to_string())
    }
}

/// Convert anyhow::Error to CardboxError
impl From<anyhow::Error> for CardboxError {
    fn from(err: anyhow::Error) -> Self {
        CardboxError::Other(err.to_string())
    }
}
