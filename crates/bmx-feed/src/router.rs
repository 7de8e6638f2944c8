//! Topic routing.
//!
//! The router peeks at a payload's coarse key (`table` + primary symbol) and
//! decides whether it belongs to the active topic before anything is
//! decoded. Payloads for any other topic are dropped with a reason.

use bmx_core::Topic;
use parking_lot::RwLock;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Why a payload was not routed to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No topic has been selected yet.
    NoActiveTopic,
    /// Payload has no table (acks, banners, error replies).
    NoTopic,
    /// Payload belongs to another topic.
    Mismatch { expected: Topic, actual: Topic },
    /// Payload is not a JSON object, or carries no symbol to route on.
    Malformed,
}

impl IgnoreReason {
    /// Short stable label, used as a metric dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoActiveTopic => "no_active_topic",
            Self::NoTopic => "no_topic",
            Self::Mismatch { .. } => "mismatch",
            Self::Malformed => "malformed",
        }
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch { expected, actual } => {
                write!(f, "mismatch (expected {expected}, got {actual})")
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// Routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Accepted(Topic),
    Ignored(IgnoreReason),
}

impl Route {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Routing counters.
#[derive(Debug, Default)]
pub struct RouteStats {
    accepted: AtomicU64,
    ignored: AtomicU64,
}

impl RouteStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }
}

/// Only the fields needed to route; everything else is skipped.
#[derive(Debug, Deserialize)]
struct RouteProbe {
    table: Option<String>,
    #[serde(default)]
    data: Vec<SymbolProbe>,
    #[serde(default)]
    filter: Option<SymbolProbe>,
}

#[derive(Debug, Deserialize)]
struct SymbolProbe {
    symbol: Option<String>,
}

/// Topic router.
#[derive(Debug, Default)]
pub struct TopicRouter {
    active: RwLock<Option<Topic>>,
    stats: RouteStats,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(topic: Topic) -> Self {
        Self {
            active: RwLock::new(Some(topic)),
            stats: RouteStats::default(),
        }
    }

    /// Supersede the active topic.
    pub fn set_active(&self, topic: Option<Topic>) {
        let mut active = self.active.write();
        if *active != topic {
            info!(
                from = ?active.as_ref().map(Topic::to_string),
                to = ?topic.as_ref().map(Topic::to_string),
                "Active topic changed"
            );
            *active = topic;
        }
    }

    pub fn active(&self) -> Option<Topic> {
        self.active.read().clone()
    }

    pub fn stats(&self) -> &RouteStats {
        &self.stats
    }

    /// Route one raw payload.
    pub fn route(&self, raw: &str) -> Route {
        let route = self.classify(raw);
        match &route {
            Route::Accepted(_) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Route::Ignored(reason) => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(%reason, "Payload ignored");
            }
        }
        route
    }

    fn classify(&self, raw: &str) -> Route {
        let Some(expected) = self.active() else {
            return Route::Ignored(IgnoreReason::NoActiveTopic);
        };

        let probe: RouteProbe = match serde_json::from_str(raw) {
            Ok(probe) => probe,
            Err(_) => return Route::Ignored(IgnoreReason::Malformed),
        };
        let Some(table) = probe.table else {
            return Route::Ignored(IgnoreReason::NoTopic);
        };

        // First entry's symbol; an empty snapshot routes on its filter.
        let symbol = match probe.data.first() {
            Some(first) => first.symbol.clone(),
            None => probe.filter.and_then(|f| f.symbol),
        };
        let Some(symbol) = symbol else {
            return Route::Ignored(IgnoreReason::Malformed);
        };

        if expected.matches(&table, &symbol) {
            Route::Accepted(expected)
        } else {
            Route::Ignored(IgnoreReason::Mismatch {
                expected,
                actual: Topic::new(table, symbol),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Topic {
        Topic::new("orderBookL2", "XBTUSD")
    }

    #[test]
    fn test_route_matching_topic() {
        let router = TopicRouter::with_topic(book());
        let raw = r#"{"table":"orderBookL2","action":"insert","data":[{"symbol":"XBTUSD","id":1}]}"#;
        assert_eq!(router.route(raw), Route::Accepted(book()));
        assert_eq!(router.stats().accepted(), 1);
    }

    #[test]
    fn test_route_mismatch() {
        let router = TopicRouter::with_topic(book());

        let other_symbol = r#"{"table":"orderBookL2","action":"insert","data":[{"symbol":"ETHUSD"}]}"#;
        assert_eq!(
            router.route(other_symbol),
            Route::Ignored(IgnoreReason::Mismatch {
                expected: book(),
                actual: Topic::new("orderBookL2", "ETHUSD"),
            })
        );

        let other_table = r#"{"table":"trade","action":"insert","data":[{"symbol":"XBTUSD"}]}"#;
        assert!(!router.route(other_table).is_accepted());
        assert_eq!(router.stats().ignored(), 2);
    }

    #[test]
    fn test_empty_data_routes_on_filter() {
        let router = TopicRouter::with_topic(book());
        let raw = r#"{"table":"orderBookL2","action":"partial","filter":{"symbol":"XBTUSD"},"data":[]}"#;
        assert!(router.route(raw).is_accepted());

        let no_filter = r#"{"table":"orderBookL2","action":"partial","data":[]}"#;
        assert_eq!(
            router.route(no_filter),
            Route::Ignored(IgnoreReason::Malformed)
        );
    }

    #[test]
    fn test_control_frames_have_no_topic() {
        let router = TopicRouter::with_topic(book());
        let ack = r#"{"success":true,"subscribe":"orderBookL2:XBTUSD"}"#;
        assert_eq!(router.route(ack), Route::Ignored(IgnoreReason::NoTopic));
        assert_eq!(router.route("[1,2]"), Route::Ignored(IgnoreReason::Malformed));
    }

    #[test]
    fn test_no_active_topic() {
        let router = TopicRouter::new();
        let raw = r#"{"table":"orderBookL2","data":[{"symbol":"XBTUSD"}]}"#;
        assert_eq!(router.route(raw), Route::Ignored(IgnoreReason::NoActiveTopic));
    }

    #[test]
    fn test_set_active_supersedes() {
        let router = TopicRouter::with_topic(book());
        let trades = Topic::new("trade", "XBTUSD");
        router.set_active(Some(trades.clone()));

        let book_raw = r#"{"table":"orderBookL2","data":[{"symbol":"XBTUSD"}]}"#;
        let trade_raw = r#"{"table":"trade","data":[{"symbol":"XBTUSD"}]}"#;
        assert!(!router.route(book_raw).is_accepted());
        assert_eq!(router.route(trade_raw), Route::Accepted(trades));

        router.set_active(None);
        assert_eq!(router.active(), None);
    }
}
