//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] bmx_ws::WsError),

    #[error("Decode error: {0}")]
    Decode(#[from] bmx_feed::DecodeError),

    #[error("Core error: {0}")]
    Core(#[from] bmx_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] bmx_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session failed: {0}")]
    SessionFailed(String),
}

pub type AppResult<T> = Result<T, AppError>;
