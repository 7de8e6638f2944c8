//! Feed hub.
//!
//! Owns the router, the decoder and one engine per (topic, entity kind),
//! created on the first accepted payload for that topic. Switching the
//! active topic drops the engines of every other topic. Every raw text
//! payload from the session goes through [`FeedHub::handle_payload`].

use crate::decoder::{DecodedDiff, DiffDecoder};
use crate::engine::{OrderBookEngine, TradeEngine};
use crate::error::DecodeResult;
use crate::router::{IgnoreReason, Route, TopicRouter};
use crate::subscriber::{FeedSubscriber, SubscriberSet};
use bmx_core::{DiffAction, EntityKind, Topic};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadOutcome {
    Applied {
        topic: Topic,
        kind: EntityKind,
        action: DiffAction,
        entries: usize,
        revision: u64,
    },
    Ignored(IgnoreReason),
}

/// Point-in-time hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub accepted: u64,
    pub ignored: u64,
    pub decoded: u64,
    pub decode_failed: u64,
    pub order_books: usize,
    pub trade_tapes: usize,
}

/// Feed hub.
pub struct FeedHub {
    router: TopicRouter,
    decoder: DiffDecoder,
    order_books: DashMap<Topic, Arc<OrderBookEngine>>,
    trade_tapes: DashMap<Topic, Arc<TradeEngine>>,
    subscribers: Arc<SubscriberSet>,
}

impl FeedHub {
    pub fn new() -> Self {
        Self {
            router: TopicRouter::new(),
            decoder: DiffDecoder::new(),
            order_books: DashMap::new(),
            trade_tapes: DashMap::new(),
            subscribers: Arc::new(SubscriberSet::new()),
        }
    }

    /// Select the topic payloads must match. `None` drops everything.
    ///
    /// Engines for any other topic are released; callers still holding an
    /// `Arc` keep a frozen copy.
    pub fn set_topic(&self, topic: Option<Topic>) {
        self.router.set_active(topic.clone());

        let keep = |key: &Topic| topic.as_ref() == Some(key);
        let before = self.order_books.len() + self.trade_tapes.len();
        self.order_books.retain(|key, _| keep(key));
        self.trade_tapes.retain(|key, _| keep(key));
        let dropped = before.saturating_sub(self.order_books.len() + self.trade_tapes.len());
        if dropped > 0 {
            info!(dropped, "Superseded engines released");
        }
    }

    pub fn active_topic(&self) -> Option<Topic> {
        self.router.active()
    }

    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    pub fn add_subscriber(&self, subscriber: Arc<dyn FeedSubscriber>) {
        self.subscribers.add(subscriber);
    }

    /// Route, decode and apply one raw payload.
    ///
    /// Payloads for other topics are ignored without being decoded. A
    /// decode failure is returned and leaves every engine untouched.
    pub fn handle_payload(&self, raw: &str) -> DecodeResult<PayloadOutcome> {
        let topic = match self.router.route(raw) {
            Route::Accepted(topic) => topic,
            Route::Ignored(reason) => return Ok(PayloadOutcome::Ignored(reason)),
        };

        let diff = self.decoder.decode(raw)?;
        let kind = diff.kind();
        let action = diff.action();
        let entries = diff.len();

        let revision = match diff {
            DecodedDiff::OrderBook(diff) => self.order_book(&topic).apply(diff),
            DecodedDiff::Trades(diff) => self.trade_tape(&topic).apply(diff),
        };

        debug!(topic = %topic, %kind, %action, entries, revision, "Payload applied");
        Ok(PayloadOutcome::Applied {
            topic,
            kind,
            action,
            entries,
            revision,
        })
    }

    /// Order book engine for `topic`, created if missing.
    pub fn order_book(&self, topic: &Topic) -> Arc<OrderBookEngine> {
        self.order_books
            .entry(topic.clone())
            .or_insert_with(|| {
                info!(topic = %topic, "Order book engine created");
                Arc::new(OrderBookEngine::new(
                    topic.clone(),
                    self.subscribers.clone(),
                ))
            })
            .clone()
    }

    /// Trade tape engine for `topic`, created if missing.
    pub fn trade_tape(&self, topic: &Topic) -> Arc<TradeEngine> {
        self.trade_tapes
            .entry(topic.clone())
            .or_insert_with(|| {
                info!(topic = %topic, "Trade tape engine created");
                Arc::new(TradeEngine::new(topic.clone(), self.subscribers.clone()))
            })
            .clone()
    }

    pub fn find_order_book(&self, topic: &Topic) -> Option<Arc<OrderBookEngine>> {
        self.order_books.get(topic).map(|e| e.value().clone())
    }

    pub fn find_trade_tape(&self, topic: &Topic) -> Option<Arc<TradeEngine>> {
        self.trade_tapes.get(topic).map(|e| e.value().clone())
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            accepted: self.router.stats().accepted(),
            ignored: self.router.stats().ignored(),
            decoded: self.decoder.stats().decoded(),
            decode_failed: self.decoder.stats().failed(),
            order_books: self.order_books.len(),
            trade_tapes: self.trade_tapes.len(),
        }
    }
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new()
    }
}
