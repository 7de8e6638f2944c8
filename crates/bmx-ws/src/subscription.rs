//! Subscription management for the session.
//!
//! The session runs a single-topic model: at most one topic is "hot" at a
//! time. A new subscribe supersedes the previous topic, and the active topic
//! is re-requested after every reconnect.

use crate::message::SubscriptionRequest;
use bmx_core::Topic;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Confirmation state of the active topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// No topic selected.
    Idle,
    /// Topic selected, subscribe not yet sent (session not connected).
    Pending,
    /// Subscribe sent, waiting for the venue's ack.
    Requested,
    /// Venue acknowledged the subscribe.
    Confirmed,
}

impl std::fmt::Display for SubscriptionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Pending => write!(f, "PENDING"),
            Self::Requested => write!(f, "REQUESTED"),
            Self::Confirmed => write!(f, "CONFIRMED"),
        }
    }
}

/// Subscription manager.
///
/// Owned by the session state machine; all mutation happens on the session
/// loop, so no interior locking is needed.
#[derive(Debug)]
pub struct SubscriptionManager {
    active: Option<Topic>,
    phase: SubscriptionPhase,
    confirmed_at: Option<DateTime<Utc>>,
}

impl SubscriptionManager {
    /// Create a new subscription manager with no active topic.
    pub fn new() -> Self {
        Self {
            active: None,
            phase: SubscriptionPhase::Idle,
            confirmed_at: None,
        }
    }

    /// Currently active topic.
    pub fn active(&self) -> Option<&Topic> {
        self.active.as_ref()
    }

    pub fn phase(&self) -> SubscriptionPhase {
        self.phase
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    /// Select a new active topic.
    ///
    /// Returns the control frames to send when `connected`: an unsubscribe
    /// for the superseded topic (if any) followed by the new subscribe.
    /// Selecting the already-active topic is a no-op.
    pub fn select(&mut self, topic: Topic, connected: bool) -> Vec<String> {
        if self.active.as_ref() == Some(&topic) {
            debug!(topic = %topic, "Topic already active");
            return Vec::new();
        }

        let mut frames = Vec::with_capacity(2);
        let previous = self.active.replace(topic.clone());
        self.confirmed_at = None;

        if connected {
            if let Some(prev) = previous {
                info!(from = %prev, to = %topic, "Switching topic");
                frames.push(SubscriptionRequest::unsubscribe(&prev).to_text());
            }
            frames.push(SubscriptionRequest::subscribe(&topic).to_text());
            self.phase = SubscriptionPhase::Requested;
        } else {
            info!(topic = %topic, "Topic selected, will subscribe on connect");
            self.phase = SubscriptionPhase::Pending;
        }

        frames
    }

    /// Drop the active topic. Returns the unsubscribe frame when `connected`.
    pub fn clear(&mut self, connected: bool) -> Option<String> {
        let previous = self.active.take()?;
        self.phase = SubscriptionPhase::Idle;
        self.confirmed_at = None;

        connected.then(|| SubscriptionRequest::unsubscribe(&previous).to_text())
    }

    /// Transport came up: re-request the active topic.
    pub fn on_connected(&mut self) -> Option<String> {
        let topic = self.active.as_ref()?;
        self.phase = SubscriptionPhase::Requested;
        info!(topic = %topic, "Restoring subscription");
        Some(SubscriptionRequest::subscribe(topic).to_text())
    }

    /// Transport went away: the venue forgets subscriptions with the socket.
    pub fn on_disconnected(&mut self) {
        if self.active.is_some() {
            self.phase = SubscriptionPhase::Pending;
        }
        self.confirmed_at = None;
    }

    /// Handle a subscribe ack. Returns true if it confirmed the active topic.
    pub fn on_subscribed(&mut self, topic: &Topic) -> bool {
        if self.active.as_ref() != Some(topic) {
            warn!(topic = %topic, "Ack for a topic that is no longer active");
            return false;
        }

        if self.phase != SubscriptionPhase::Confirmed {
            info!(topic = %topic, "Subscription confirmed");
        }
        self.phase = SubscriptionPhase::Confirmed;
        self.confirmed_at = Some(Utc::now());
        true
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
