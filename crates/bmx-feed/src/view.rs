//! Bounded, sorted projections of a store.

use bmx_core::{OrderBookEntry, TradeEntry};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Levels published per order book side.
pub const ORDER_BOOK_VIEW_CAP: usize = 20;

/// Prints published for the trade tape.
pub const TRADE_VIEW_CAP: usize = 30;

/// Which published view an update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Bids,
    Asks,
    Trades,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bids => "bids",
            Self::Asks => "asks",
            Self::Trades => "trades",
        }
    }

    pub fn cap(&self) -> usize {
        match self {
            Self::Bids | Self::Asks => ORDER_BOOK_VIEW_CAP,
            Self::Trades => TRADE_VIEW_CAP,
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One published view: at most `cap` entries, best first.
///
/// `revision` is the number of diffs the owning engine had applied when the
/// view was computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedView<V> {
    pub entries: Vec<V>,
    pub revision: u64,
}

impl<V> BoundedView<V> {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            revision: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&V> {
        self.entries.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.entries.iter()
    }
}

impl<V> Default for BoundedView<V> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Top `cap` of `values` under `compare`, sorted.
///
/// Partitions first so only the retained prefix is fully sorted.
pub fn top_n<'a, V, I, F>(values: I, cap: usize, compare: F) -> Vec<V>
where
    V: Clone + 'a,
    I: IntoIterator<Item = &'a V>,
    F: Fn(&V, &V) -> Ordering,
{
    let mut all: Vec<V> = values.into_iter().cloned().collect();
    if cap == 0 {
        return Vec::new();
    }
    if all.len() > cap {
        all.select_nth_unstable_by(cap - 1, &compare);
        all.truncate(cap);
    }
    all.sort_unstable_by(&compare);
    all
}

/// Bids: highest price first, ties by ascending id.
pub fn compare_bids(a: &OrderBookEntry, b: &OrderBookEntry) -> Ordering {
    b.price.cmp(&a.price).then_with(|| a.id.cmp(&b.id))
}

/// Asks: lowest price first, ties by ascending id.
pub fn compare_asks(a: &OrderBookEntry, b: &OrderBookEntry) -> Ordering {
    a.price.cmp(&b.price).then_with(|| a.id.cmp(&b.id))
}

/// Trades: newest first, ties by ascending match id.
pub fn compare_trades(a: &TradeEntry, b: &TradeEntry) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.trd_match_id.cmp(&b.trd_match_id))
}
