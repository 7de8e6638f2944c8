//! Heartbeat tracking for one transport.
//!
//! The venue speaks a text-level keepalive: the client sends `"ping"` after a
//! quiet period and expects `"pong"` back. Any inbound frame counts as
//! activity and postpones the next ping.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Heartbeat state for a single transport attempt.
///
/// Owned by the transport task, so plain fields are enough.
#[derive(Debug)]
pub struct HeartbeatManager {
    /// Quiet period before a ping is sent.
    interval_ms: u64,
    /// How long to wait for the pong.
    timeout_ms: u64,
    last_ping: Option<DateTime<Utc>>,
    last_pong: Option<DateTime<Utc>>,
    last_message: DateTime<Utc>,
    waiting_for_pong: bool,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            last_ping: None,
            last_pong: None,
            last_message: Utc::now(),
            waiting_for_pong: false,
        }
    }

    /// Record that a ping was sent.
    pub fn record_ping(&mut self) {
        let now = Utc::now();
        self.last_ping = Some(now);
        self.waiting_for_pong = true;
        debug!(time = %now, "Sent ping");
    }

    /// Record that a pong was received.
    pub fn record_pong(&mut self) {
        let now = Utc::now();
        self.last_pong = Some(now);
        self.last_message = now;
        self.waiting_for_pong = false;

        if let Some(ping_time) = self.last_ping {
            let rtt_ms = (now - ping_time).num_milliseconds();
            debug!(rtt_ms, "Received pong");
        }
    }

    /// Record inbound activity of any kind.
    pub fn record_message(&mut self) {
        self.last_message = Utc::now();
    }

    /// True when a ping is outstanding for longer than the timeout.
    pub fn is_timed_out(&self) -> bool {
        if !self.waiting_for_pong {
            return false;
        }
        self.last_ping
            .map(|ping_time| (Utc::now() - ping_time).num_milliseconds() > self.timeout_ms as i64)
            .unwrap_or(false)
    }

    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - self.last_message).num_milliseconds()
    }

    /// True when the link has been quiet for a full interval and no ping is
    /// outstanding.
    pub fn should_send_ping(&self) -> bool {
        !self.waiting_for_pong && self.time_since_last_message_ms() >= self.interval_ms as i64
    }

    /// Sleep until the next check.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(self.check_period()).await;
    }

    fn check_period(&self) -> Duration {
        Duration::from_millis((self.interval_ms / 2).max(1))
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            last_ping: self.last_ping,
            last_pong: self.last_pong,
            last_message: self.last_message,
            waiting_for_pong: self.waiting_for_pong,
            time_since_last_message_ms: self.time_since_last_message_ms(),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
    pub last_message: DateTime<Utc>,
    pub waiting_for_pong: bool,
    pub time_since_last_message_ms: i64,
}
