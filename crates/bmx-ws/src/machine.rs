//! Session state machine.
//!
//! Pure and synchronous: every input returns the list of actions the driver
//! must perform. The async driver in `connection` owns the only instance and
//! feeds it inputs one at a time, so transitions never interleave.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting -> ...
//!                                                  \-> Failed (retries exhausted)
//! ```

use crate::message::{ControlMessage, SessionEvent};
use crate::subscription::SubscriptionManager;
use bmx_core::Topic;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reason reported when reconnect attempts are exhausted.
pub const RECONNECT_TIMEOUT_REASON: &str = "reconnect timeout";

/// Reason reported for an explicit `disconnect()`.
pub const CLIENT_DISCONNECT_REASON: &str = "client disconnect";

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Disconnects tolerated before giving up (0 = never give up).
    pub max_attempts: u32,
    /// Delay before each reconnect attempt.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_secs(10),
        }
    }
}

/// Side effect requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a new transport tagged with `attempt`.
    OpenTransport { attempt: u64 },
    /// Close the current transport.
    CloseTransport,
    /// Arm the one-shot reconnect timer.
    ArmTimer { id: u64, delay: Duration },
    /// Cancel the pending reconnect timer.
    CancelTimer,
    /// Send a text frame on the current transport.
    Send(String),
    /// Deliver an event to the session's consumer.
    Emit(SessionEvent),
}

/// Session state machine.
#[derive(Debug)]
pub struct SessionMachine {
    policy: RetryPolicy,
    state: SessionState,
    retry_count: u32,
    /// Attempt number of the current transport; events tagged with any
    /// other attempt are stale.
    attempt: u64,
    /// Id of the armed timer, if one is pending.
    pending_timer: Option<u64>,
    timer_seq: u64,
    subscriptions: SubscriptionManager,
}

impl SessionMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: SessionState::Disconnected,
            retry_count: 0,
            attempt: 0,
            pending_timer: None,
            timer_seq: 0,
            subscriptions: SubscriptionManager::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn current_attempt(&self) -> u64 {
        self.attempt
    }

    pub fn has_pending_timer(&self) -> bool {
        self.pending_timer.is_some()
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// External connect request.
    ///
    /// From `Disconnected`/`Failed` the retry counter starts over. From
    /// `Reconnecting` the pending retry is taken early without resetting it.
    pub fn connect(&mut self) -> Vec<SessionAction> {
        match self.state {
            SessionState::Connecting | SessionState::Connected => {
                debug!(state = %self.state, "Connect ignored");
                Vec::new()
            }
            SessionState::Disconnected | SessionState::Failed => {
                self.retry_count = 0;
                self.open_transport()
            }
            SessionState::Reconnecting => self.open_transport(),
        }
    }

    /// Transport for `attempt` finished its handshake.
    pub fn on_transport_connected(&mut self, attempt: u64) -> Vec<SessionAction> {
        if attempt != self.attempt || self.state != SessionState::Connecting {
            debug!(
                attempt,
                current = self.attempt,
                state = %self.state,
                "Ignoring stale transport connect"
            );
            return Vec::new();
        }

        info!(attempt, "Session connected");
        self.state = SessionState::Connected;
        self.retry_count = 0;

        let mut actions = Vec::with_capacity(3);
        if self.pending_timer.take().is_some() {
            actions.push(SessionAction::CancelTimer);
        }
        actions.push(SessionAction::Emit(SessionEvent::Connected));
        if let Some(frame) = self.subscriptions.on_connected() {
            actions.push(SessionAction::Send(frame));
        }
        actions
    }

    /// Transport for `attempt` dropped or failed.
    pub fn on_transport_lost(&mut self, attempt: u64, reason: &str) -> Vec<SessionAction> {
        if attempt != self.attempt {
            debug!(attempt, current = self.attempt, "Ignoring stale transport loss");
            return Vec::new();
        }
        if matches!(
            self.state,
            SessionState::Disconnected | SessionState::Failed
        ) {
            return Vec::new();
        }

        self.subscriptions.on_disconnected();
        self.retry_count += 1;
        self.state = SessionState::Reconnecting;

        if self.policy.max_attempts > 0 && self.retry_count > self.policy.max_attempts {
            warn!(
                retries = self.retry_count,
                reason, "Reconnect attempts exhausted"
            );
            self.state = SessionState::Failed;
            let mut actions = Vec::with_capacity(2);
            if self.pending_timer.take().is_some() {
                actions.push(SessionAction::CancelTimer);
            }
            actions.push(SessionAction::Emit(SessionEvent::Disconnected {
                reason: RECONNECT_TIMEOUT_REASON.to_string(),
            }));
            return actions;
        }

        warn!(retry = self.retry_count, reason, "Session lost, will retry");
        let mut actions = vec![SessionAction::Emit(SessionEvent::Reconnecting {
            attempt: self.retry_count,
            reason: reason.to_string(),
        })];
        actions.extend(self.arm_timer_if_idle());
        actions
    }

    /// Venue hinted that the connection should be re-established.
    pub fn on_reconnect_suggested(&mut self) -> Vec<SessionAction> {
        if matches!(
            self.state,
            SessionState::Disconnected | SessionState::Failed
        ) {
            return Vec::new();
        }
        info!("Reconnect suggested by venue");
        self.arm_timer_if_idle().into_iter().collect()
    }

    /// Reconnect timer `id` elapsed.
    pub fn on_timer_fired(&mut self, id: u64) -> Vec<SessionAction> {
        if self.pending_timer != Some(id) {
            debug!(id, "Ignoring cancelled timer");
            return Vec::new();
        }
        self.pending_timer = None;

        if self.state == SessionState::Reconnecting {
            info!(retry = self.retry_count, "Reconnect timer fired");
            self.open_transport()
        } else {
            debug!(state = %self.state, "Reconnect timer fired, nothing to do");
            Vec::new()
        }
    }

    /// Text frame received on transport `attempt`.
    pub fn on_text(&mut self, attempt: u64, text: String) -> Vec<SessionAction> {
        if attempt != self.attempt || self.state != SessionState::Connected {
            return Vec::new();
        }

        match ControlMessage::parse(&text) {
            Some(control) => self.on_control(control),
            None => vec![SessionAction::Emit(SessionEvent::Text(text))],
        }
    }

    fn on_control(&mut self, control: ControlMessage) -> Vec<SessionAction> {
        if let Some(topic) = control.subscribed_topic() {
            self.subscriptions.on_subscribed(&topic);
            return Vec::new();
        }
        if let Some(topic) = control.unsubscribed_topic() {
            debug!(topic = %topic, "Unsubscribe acknowledged");
            return Vec::new();
        }

        match control {
            ControlMessage::Error(err) => {
                warn!(status = ?err.status, error = %err.error, "Venue error reply");
                vec![SessionAction::Emit(SessionEvent::Error(err.error))]
            }
            ControlMessage::Info(banner) => {
                info!(info = %banner.info, version = ?banner.version, "Venue banner");
                Vec::new()
            }
            ControlMessage::Ack(ack) => {
                warn!(?ack, "Unsuccessful subscription ack");
                Vec::new()
            }
        }
    }

    /// Explicit disconnect. Never goes through `Failed`.
    pub fn disconnect(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::with_capacity(3);
        if self.pending_timer.take().is_some() {
            actions.push(SessionAction::CancelTimer);
        }
        if self.state == SessionState::Disconnected {
            return actions;
        }

        info!(state = %self.state, "Disconnecting");
        self.state = SessionState::Disconnected;
        // Invalidate any in-flight attempt.
        self.attempt += 1;
        self.subscriptions.on_disconnected();

        actions.push(SessionAction::CloseTransport);
        actions.push(SessionAction::Emit(SessionEvent::Disconnected {
            reason: CLIENT_DISCONNECT_REASON.to_string(),
        }));
        actions
    }

    /// Make `topic` the single active topic.
    pub fn subscribe(&mut self, topic: Topic) -> Vec<SessionAction> {
        let connected = self.state == SessionState::Connected;
        self.subscriptions
            .select(topic, connected)
            .into_iter()
            .map(SessionAction::Send)
            .collect()
    }

    /// Drop the active topic.
    pub fn unsubscribe(&mut self) -> Vec<SessionAction> {
        let connected = self.state == SessionState::Connected;
        self.subscriptions
            .clear(connected)
            .map(SessionAction::Send)
            .into_iter()
            .collect()
    }

    fn open_transport(&mut self) -> Vec<SessionAction> {
        self.attempt += 1;
        self.state = SessionState::Connecting;
        info!(attempt = self.attempt, retry = self.retry_count, "Opening transport");
        vec![SessionAction::OpenTransport {
            attempt: self.attempt,
        }]
    }

    /// Arm the retry timer unless one is already pending.
    fn arm_timer_if_idle(&mut self) -> Option<SessionAction> {
        if self.pending_timer.is_some() {
            debug!("Reconnect timer already pending");
            return None;
        }
        self.timer_seq += 1;
        self.pending_timer = Some(self.timer_seq);
        Some(SessionAction::ArmTimer {
            id: self.timer_seq,
            delay: self.policy.interval,
        })
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
