//! WebSocket message types.

use bmx_core::Topic;
use serde::{Deserialize, Serialize};

// ============================================================================
// Keepalive
// ============================================================================

/// Text-level keepalive request understood by the venue.
pub const PING_TEXT: &str = "ping";

/// Text-level keepalive reply sent by the venue.
pub const PONG_TEXT: &str = "pong";

// ============================================================================
// Subscription Control (Outgoing)
// ============================================================================

/// Subscription operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionOp {
    Subscribe,
    Unsubscribe,
}

/// Outgoing subscription control message.
///
/// Wire format: `{"op": "subscribe", "args": ["orderBookL2:XBTUSD"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub op: SubscriptionOp,
    pub args: Vec<String>,
}

impl SubscriptionRequest {
    /// Create a subscribe request for one topic.
    pub fn subscribe(topic: &Topic) -> Self {
        Self {
            op: SubscriptionOp::Subscribe,
            args: vec![topic.to_string()],
        }
    }

    /// Create an unsubscribe request for one topic.
    pub fn unsubscribe(topic: &Topic) -> Self {
        Self {
            op: SubscriptionOp::Unsubscribe,
            args: vec![topic.to_string()],
        }
    }

    /// Serialize to the JSON text frame.
    pub fn to_text(&self) -> String {
        // A struct of a unit enum and a Vec<String> cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ============================================================================
// Control Replies (Incoming)
// ============================================================================

/// Subscription acknowledgement.
///
/// `{"success": true, "subscribe": "trade:XBTUSD", "request": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionAck {
    pub success: bool,
    #[serde(default)]
    pub subscribe: Option<String>,
    #[serde(default)]
    pub unsubscribe: Option<String>,
}

/// Error reply.
///
/// `{"status": 400, "error": "Unknown table: foo", "meta": {}, "request": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorReply {
    #[serde(default)]
    pub status: Option<u16>,
    pub error: String,
}

/// Welcome banner sent on connect.
///
/// `{"info": "Welcome to the BitMEX Realtime API.", "version": "...", ...}`
#[derive(Debug, Clone, Deserialize)]
pub struct InfoReply {
    pub info: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Non-data text frame from the venue.
///
/// Variant order matters for the untagged match: acks and errors carry
/// distinctive required fields, the banner only `info`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ControlMessage {
    Ack(SubscriptionAck),
    Error(ErrorReply),
    Info(InfoReply),
}

impl ControlMessage {
    /// Try to interpret a text frame as a control reply.
    ///
    /// Data frames (anything carrying a `table`) are never control replies,
    /// so they are skipped without a full parse.
    pub fn parse(text: &str) -> Option<Self> {
        if text.contains("\"table\"") {
            return None;
        }
        serde_json::from_str(text).ok()
    }

    /// Topic confirmed by a successful subscribe ack.
    pub fn subscribed_topic(&self) -> Option<Topic> {
        match self {
            Self::Ack(ack) if ack.success => ack.subscribe.as_deref()?.parse().ok(),
            _ => None,
        }
    }

    /// Topic released by a successful unsubscribe ack.
    pub fn unsubscribed_topic(&self) -> Option<Topic> {
        match self {
            Self::Ack(ack) if ack.success => ack.unsubscribe.as_deref()?.parse().ok(),
            _ => None,
        }
    }
}

// ============================================================================
// Session Events (to the single consumer)
// ============================================================================

/// Event delivered by the session to its single consumer, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport is up and the active topic (if any) has been re-requested.
    Connected,
    /// Raw data frame received while connected.
    Text(String),
    /// Transport dropped; a retry is scheduled or pending.
    Reconnecting { attempt: u32, reason: String },
    /// Session stopped: explicit disconnect or reconnect attempts exhausted.
    Disconnected { reason: String },
    /// Venue or transport reported an error that did not end the session.
    Error(String),
}
