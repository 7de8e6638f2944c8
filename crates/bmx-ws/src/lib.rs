//! WebSocket session for the BitMEX realtime feed.
//!
//! Provides:
//! - A synchronous session state machine with bounded fixed-interval retry
//! - An async driver that runs transports, timers and heartbeats
//! - Single-topic subscription management, restored after every reconnect
//! - Wire control messages (subscribe/unsubscribe, acks, error replies)

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod machine;
pub mod message;
pub mod subscription;

pub use connection::{ConnectionConfig, Session};
pub use error::{WsError, WsResult};
pub use heartbeat::{HeartbeatManager, HeartbeatStats};
pub use machine::{
    RetryPolicy, SessionAction, SessionMachine, SessionState, CLIENT_DISCONNECT_REASON,
    RECONNECT_TIMEOUT_REASON,
};
pub use message::{
    ControlMessage, ErrorReply, InfoReply, SessionEvent, SubscriptionAck, SubscriptionOp,
    SubscriptionRequest, PING_TEXT, PONG_TEXT,
};
pub use subscription::{SubscriptionManager, SubscriptionPhase};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
