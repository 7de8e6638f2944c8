//! The two entity kinds a diff message can carry.

use crate::{Price, Side, Size};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One resting price level of an L2 order book.
///
/// Identity key is `id`. `size` is the per-message size as sent by the feed;
/// `quantity` is the cumulative quantity the engine maintains. A freshly
/// decoded entry starts with `quantity == size` (zero when size is absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    pub symbol: String,
    pub id: u64,
    pub side: Side,
    pub price: Price,
    pub size: Option<Size>,
    pub quantity: Size,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookEntry {
    pub fn new(
        symbol: impl Into<String>,
        id: u64,
        side: Side,
        price: Price,
        size: Option<Size>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            id,
            side,
            price,
            size,
            quantity: size.unwrap_or(Size::ZERO),
            timestamp,
        }
    }

    /// Per-message size, zero when the message carried none.
    #[inline]
    pub fn size_or_zero(&self) -> Size {
        self.size.unwrap_or(Size::ZERO)
    }
}

/// One print on the trade tape.
///
/// Identity key is `trd_match_id`. The descriptive fields after `timestamp`
/// are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEntry {
    pub symbol: String,
    pub side: Side,
    pub size: Size,
    pub price: Price,
    pub timestamp: DateTime<Utc>,
    pub trd_match_id: String,
    pub tick_direction: Option<String>,
    pub trd_type: Option<String>,
    pub gross_value: Option<Decimal>,
    pub home_notional: Option<Decimal>,
    pub foreign_notional: Option<Decimal>,
}

impl TradeEntry {
    pub fn new(
        symbol: impl Into<String>,
        trd_match_id: impl Into<String>,
        side: Side,
        size: Size,
        price: Price,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            price,
            timestamp,
            trd_match_id: trd_match_id.into(),
            tick_direction: None,
            trd_type: None,
            gross_value: None,
            home_notional: None,
            foreign_notional: None,
        }
    }
}
