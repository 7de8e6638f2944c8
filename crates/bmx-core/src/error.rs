//! Error types for bmx-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Invalid side: {0}")]
    InvalidSide(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
