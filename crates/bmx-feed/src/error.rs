//! Feed error types.

use thiserror::Error;

/// Why a payload could not be turned into a diff.
///
/// A decode failure never touches engine state; the payload is dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Missing field `{field}` in {context}")]
    MissingField {
        field: &'static str,
        context: &'static str,
    },

    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DecodeError {
    /// Short stable label, used as a metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) | Self::Json(_) => "malformed",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::UnknownAction(_) => "unknown_action",
            Self::UnknownTable(_) => "unknown_table",
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;
