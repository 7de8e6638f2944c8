//! Order book and trade tape reconstruction from feed diffs.
//!
//! Raw payloads are routed by topic, decoded into typed diffs, applied to
//! per-topic keyed stores, and republished as bounded sorted views.

pub mod decoder;
pub mod engine;
pub mod error;
pub mod hub;
pub mod router;
pub mod store;
pub mod subscriber;
pub mod view;

pub use decoder::{DecodeStats, DecodedDiff, DiffDecoder};
pub use engine::{DiffEngine, DiffState, OrderBookEngine, OrderBookState, TradeEngine, TradeTape};
pub use error::{DecodeError, DecodeResult};
pub use hub::{FeedHub, HubStats, PayloadOutcome};
pub use router::{IgnoreReason, Route, RouteStats, TopicRouter};
pub use store::KeyedStore;
pub use subscriber::{FeedSubscriber, PublishedView, SubscriberSet};
pub use view::{BoundedView, ViewKind, ORDER_BOOK_VIEW_CAP, TRADE_VIEW_CAP};
