//! Push-on-change notification interface for presentation code.

use crate::view::{BoundedView, ViewKind};
use bmx_core::{OrderBookEntry, TradeEntry};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// A freshly published view, shared with every subscriber.
#[derive(Debug, Clone)]
pub enum PublishedView {
    OrderBook(Arc<BoundedView<OrderBookEntry>>),
    Trades(Arc<BoundedView<TradeEntry>>),
}

impl PublishedView {
    pub fn revision(&self) -> u64 {
        match self {
            Self::OrderBook(view) => view.revision,
            Self::Trades(view) => view.revision,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::OrderBook(view) => view.len(),
            Self::Trades(view) => view.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_order_book(&self) -> Option<&BoundedView<OrderBookEntry>> {
        match self {
            Self::OrderBook(view) => Some(view),
            Self::Trades(_) => None,
        }
    }

    pub fn as_trades(&self) -> Option<&BoundedView<TradeEntry>> {
        match self {
            Self::Trades(view) => Some(view),
            Self::OrderBook(_) => None,
        }
    }
}

/// Observer of engine output and session lifecycle.
///
/// Callbacks run on the delivery path; keep them short.
#[cfg_attr(test, mockall::automock)]
pub trait FeedSubscriber: Send + Sync {
    /// A view was recomputed and swapped in.
    fn on_view_updated(&self, kind: ViewKind, view: PublishedView);

    fn on_session_connected(&self) {}

    fn on_session_disconnected(&self, _reason: &str) {}

    fn on_session_error(&self, _message: &str) {}
}

/// Registered subscribers.
///
/// Notification iterates over a snapshot of the list, so a callback may
/// add or remove subscribers without deadlocking.
#[derive(Default)]
pub struct SubscriberSet {
    subscribers: RwLock<Vec<Arc<dyn FeedSubscriber>>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscriber: Arc<dyn FeedSubscriber>) {
        self.subscribers.write().push(subscriber);
        debug!(count = self.len(), "Subscriber added");
    }

    /// Remove a subscriber by identity. Returns true if it was registered.
    pub fn remove(&self, subscriber: &Arc<dyn FeedSubscriber>) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        // Data pointers only; vtable pointers for one type may differ.
        let target = Arc::as_ptr(subscriber) as *const ();
        subscribers.retain(|s| Arc::as_ptr(s) as *const () != target);
        before != subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_view(&self, kind: ViewKind, view: PublishedView) {
        for subscriber in self.snapshot() {
            subscriber.on_view_updated(kind, view.clone());
        }
    }

    pub fn notify_connected(&self) {
        for subscriber in self.snapshot() {
            subscriber.on_session_connected();
        }
    }

    pub fn notify_disconnected(&self, reason: &str) {
        for subscriber in self.snapshot() {
            subscriber.on_session_disconnected(reason);
        }
    }

    pub fn notify_error(&self, message: &str) {
        for subscriber in self.snapshot() {
            subscriber.on_session_error(message);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn FeedSubscriber>> {
        self.subscribers.read().clone()
    }
}

impl std::fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("len", &self.len())
            .finish()
    }
}
