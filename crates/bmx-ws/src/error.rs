//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Connect timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Session task is no longer running")]
    SessionClosed,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type WsResult<T> = Result<T, WsError>;
