//! Core domain types for the order book / trade tape viewer.
//!
//! This crate provides the types shared by every other crate:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `Side`: Buy/Sell tag carried by every entry
//! - `OrderBookEntry`, `TradeEntry`: the two entity kinds a diff can carry
//! - `DiffMessage`, `DiffAction`: one incremental update from the feed
//! - `Topic`: the `<table>:<symbol>` subscription key

pub mod decimal;
pub mod diff;
pub mod entry;
pub mod error;
pub mod side;
pub mod timestamp;
pub mod topic;

pub use decimal::{Price, Size};
pub use diff::{DiffAction, DiffMessage, EntityKind};
pub use entry::{OrderBookEntry, TradeEntry};
pub use error::{CoreError, Result};
pub use side::Side;
pub use timestamp::{format_wire_timestamp, parse_wire_timestamp, WIRE_TIMESTAMP_FORMAT};
pub use topic::Topic;
