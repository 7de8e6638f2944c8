//! Diff application engines.
//!
//! A [`DiffEngine`] owns the keyed stores for one (topic, entity kind) pair
//! and the views derived from them. `apply` mutates the stores under the
//! engine lock, recomputes every view, swaps each one into its watch channel
//! and then notifies subscribers. Notification runs under a separate publish
//! lock, so subscribers see revisions in order even with concurrent writers.
//! Readers go through the watch channels and never take the store lock.

use crate::store::KeyedStore;
use crate::subscriber::{PublishedView, SubscriberSet};
use crate::view::{
    compare_asks, compare_bids, compare_trades, top_n, BoundedView, ViewKind,
    ORDER_BOOK_VIEW_CAP, TRADE_VIEW_CAP,
};
use bmx_core::{DiffAction, DiffMessage, EntityKind, OrderBookEntry, Side, Topic, TradeEntry};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Store layout and merge rules for one entity kind.
pub trait DiffState: Send + 'static {
    type Entry: Clone + Send + Sync + 'static;

    const KIND: EntityKind;

    /// Views this state publishes, in publish order.
    const VIEWS: &'static [ViewKind];

    /// Replace everything with a fresh snapshot.
    fn partial(&mut self, entries: Vec<Self::Entry>);

    /// Add or overwrite by key.
    fn insert(&mut self, entries: Vec<Self::Entry>);

    /// Adjust existing keys; unknown keys and unrepresentable results are
    /// dropped.
    fn update(&mut self, entries: Vec<Self::Entry>);

    /// Remove by key; absent keys are ignored.
    fn delete(&mut self, entries: Vec<Self::Entry>);

    /// Compute one bounded, sorted view.
    fn project(&self, kind: ViewKind) -> Vec<Self::Entry>;

    /// Live entries across all stores.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wrap a view for subscribers.
    fn publish(view: Arc<BoundedView<Self::Entry>>) -> PublishedView;

    fn apply(&mut self, action: DiffAction, entries: Vec<Self::Entry>) {
        match action {
            DiffAction::Partial => self.partial(entries),
            DiffAction::Insert => self.insert(entries),
            DiffAction::Update => self.update(entries),
            DiffAction::Delete => self.delete(entries),
        }
    }
}

// ============================================================================
// Order book
// ============================================================================

/// L2 order book: one store per side, keyed by level id.
#[derive(Debug, Default)]
pub struct OrderBookState {
    bids: KeyedStore<u64, OrderBookEntry>,
    asks: KeyedStore<u64, OrderBookEntry>,
}

impl OrderBookState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bids(&self) -> &KeyedStore<u64, OrderBookEntry> {
        &self.bids
    }

    pub fn asks(&self) -> &KeyedStore<u64, OrderBookEntry> {
        &self.asks
    }

    fn side_mut(&mut self, side: Side) -> &mut KeyedStore<u64, OrderBookEntry> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }
}

impl DiffState for OrderBookState {
    type Entry = OrderBookEntry;

    const KIND: EntityKind = EntityKind::OrderBook;
    const VIEWS: &'static [ViewKind] = &[ViewKind::Bids, ViewKind::Asks];

    fn partial(&mut self, entries: Vec<OrderBookEntry>) {
        self.bids.clear();
        self.asks.clear();
        self.insert(entries);
    }

    fn insert(&mut self, entries: Vec<OrderBookEntry>) {
        for entry in entries {
            self.side_mut(entry.side).upsert(entry.id, entry);
        }
    }

    fn update(&mut self, entries: Vec<OrderBookEntry>) {
        let mut dropped = 0usize;
        for entry in entries {
            let Some(current) = self.side_mut(entry.side).get_mut(&entry.id) else {
                dropped += 1;
                continue;
            };
            match current.quantity.checked_add(entry.size_or_zero()) {
                Some(quantity) => current.quantity = quantity,
                None => warn!(
                    id = entry.id,
                    side = %entry.side,
                    quantity = %current.quantity,
                    size = %entry.size_or_zero(),
                    "Quantity overflow, update dropped"
                ),
            }
        }
        if dropped > 0 {
            debug!(dropped, "Update for unknown levels dropped");
        }
    }

    fn delete(&mut self, entries: Vec<OrderBookEntry>) {
        for entry in entries {
            self.side_mut(entry.side).remove(&entry.id);
        }
    }

    fn project(&self, kind: ViewKind) -> Vec<OrderBookEntry> {
        match kind {
            ViewKind::Bids => top_n(self.bids.values(), ORDER_BOOK_VIEW_CAP, compare_bids),
            ViewKind::Asks => top_n(self.asks.values(), ORDER_BOOK_VIEW_CAP, compare_asks),
            ViewKind::Trades => Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    fn publish(view: Arc<BoundedView<OrderBookEntry>>) -> PublishedView {
        PublishedView::OrderBook(view)
    }
}

// ============================================================================
// Trade tape
// ============================================================================

/// Trade tape: one flat store keyed by match id.
#[derive(Debug, Default)]
pub struct TradeTape {
    trades: KeyedStore<String, TradeEntry>,
}

impl TradeTape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> &KeyedStore<String, TradeEntry> {
        &self.trades
    }
}

impl DiffState for TradeTape {
    type Entry = TradeEntry;

    const KIND: EntityKind = EntityKind::Trade;
    const VIEWS: &'static [ViewKind] = &[ViewKind::Trades];

    fn partial(&mut self, entries: Vec<TradeEntry>) {
        self.trades.replace(
            entries
                .into_iter()
                .map(|entry| (entry.trd_match_id.clone(), entry)),
        );
    }

    fn insert(&mut self, entries: Vec<TradeEntry>) {
        for entry in entries {
            self.trades.upsert(entry.trd_match_id.clone(), entry);
        }
    }

    fn update(&mut self, entries: Vec<TradeEntry>) {
        // Prints are immutable upstream.
        debug!(entries = entries.len(), "Trade update ignored");
    }

    fn delete(&mut self, entries: Vec<TradeEntry>) {
        for entry in entries {
            self.trades.remove(&entry.trd_match_id);
        }
    }

    fn project(&self, kind: ViewKind) -> Vec<TradeEntry> {
        match kind {
            ViewKind::Trades => top_n(self.trades.values(), TRADE_VIEW_CAP, compare_trades),
            ViewKind::Bids | ViewKind::Asks => Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.trades.len()
    }

    fn publish(view: Arc<BoundedView<TradeEntry>>) -> PublishedView {
        PublishedView::Trades(view)
    }
}

// ============================================================================
// Engine
// ============================================================================

struct ViewChannel<E> {
    kind: ViewKind,
    tx: watch::Sender<Arc<BoundedView<E>>>,
}

struct Locked<S> {
    state: S,
    revision: u64,
}

/// Diff engine for one (topic, entity kind) pair.
pub struct DiffEngine<S: DiffState> {
    topic: Topic,
    inner: Mutex<Locked<S>>,
    /// Held from view swap through notification.
    publish: Mutex<()>,
    views: Vec<ViewChannel<S::Entry>>,
    subscribers: Arc<SubscriberSet>,
}

/// Order book engine.
pub type OrderBookEngine = DiffEngine<OrderBookState>;

/// Trade tape engine.
pub type TradeEngine = DiffEngine<TradeTape>;

impl<S: DiffState + Default> DiffEngine<S> {
    pub fn new(topic: Topic, subscribers: Arc<SubscriberSet>) -> Self {
        Self::with_state(topic, S::default(), subscribers)
    }
}

impl<S: DiffState> DiffEngine<S> {
    pub fn with_state(topic: Topic, state: S, subscribers: Arc<SubscriberSet>) -> Self {
        let views = S::VIEWS
            .iter()
            .map(|&kind| ViewChannel {
                kind,
                tx: watch::channel(Arc::new(BoundedView::empty())).0,
            })
            .collect();

        Self {
            topic,
            inner: Mutex::new(Locked { state, revision: 0 }),
            publish: Mutex::new(()),
            views,
            subscribers,
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn kind(&self) -> EntityKind {
        S::KIND
    }

    /// Apply one diff and republish every view. Returns the new revision.
    pub fn apply(&self, diff: DiffMessage<S::Entry>) -> u64 {
        let action = diff.action;
        let entries = diff.data.len();

        let (revision, published, publish) = {
            let mut inner = self.inner.lock();
            inner.state.apply(action, diff.data);
            inner.revision += 1;
            let revision = inner.revision;

            let published: Vec<_> = self
                .views
                .iter()
                .map(|channel| {
                    let view = Arc::new(BoundedView {
                        entries: inner.state.project(channel.kind),
                        revision,
                    });
                    channel.tx.send_replace(view.clone());
                    (channel.kind, view)
                })
                .collect();

            trace!(
                topic = %self.topic,
                %action,
                entries,
                live = inner.state.len(),
                revision,
                "Diff applied"
            );
            // Taken before the state lock drops, so the next writer's
            // notifications queue behind ours.
            let publish = self.publish.lock();
            (revision, published, publish)
        };

        for (kind, view) in published {
            self.subscribers.notify_view(kind, S::publish(view));
        }
        drop(publish);
        revision
    }

    /// Latest published view, if this engine publishes `kind`.
    pub fn view(&self, kind: ViewKind) -> Option<Arc<BoundedView<S::Entry>>> {
        self.channel(kind).map(|channel| channel.tx.borrow().clone())
    }

    /// Receiver that observes every future swap of `kind`.
    pub fn watch(&self, kind: ViewKind) -> Option<watch::Receiver<Arc<BoundedView<S::Entry>>>> {
        self.channel(kind).map(|channel| channel.tx.subscribe())
    }

    /// Number of diffs applied so far.
    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Run `f` against the stores under the engine lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.lock().state)
    }

    fn channel(&self, kind: ViewKind) -> Option<&ViewChannel<S::Entry>> {
        self.views.iter().find(|channel| channel.kind == kind)
    }
}

impl<S: DiffState> std::fmt::Debug for DiffEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffEngine")
            .field("topic", &self.topic)
            .field("kind", &S::KIND)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::{FeedSubscriber, MockFeedSubscriber};
    use bmx_core::{Price, Size};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 4, 5, 12, 0, 0).unwrap()
    }

    fn level(id: u64, side: Side, price: Decimal, size: Option<Decimal>) -> OrderBookEntry {
        OrderBookEntry::new("XBTUSD", id, side, Price::new(price), size.map(Size::new), t0())
    }

    fn trade(id: &str, secs: i64) -> TradeEntry {
        TradeEntry::new(
            "XBTUSD",
            id,
            Side::Buy,
            Size::new(dec!(100)),
            Price::new(dec!(5062)),
            t0() + Duration::seconds(secs),
        )
    }

    fn book_engine() -> OrderBookEngine {
        DiffEngine::new(
            Topic::new("orderBookL2", "XBTUSD"),
            Arc::new(SubscriberSet::new()),
        )
    }

    fn trade_engine() -> TradeEngine {
        DiffEngine::new(Topic::new("trade", "XBTUSD"), Arc::new(SubscriberSet::new()))
    }

    fn book_diff(action: DiffAction, data: Vec<OrderBookEntry>) -> DiffMessage<OrderBookEntry> {
        DiffMessage::new("orderBookL2", action, data)
    }

    fn trade_diff(action: DiffAction, data: Vec<TradeEntry>) -> DiffMessage<TradeEntry> {
        DiffMessage::new("trade", action, data)
    }

    /// 92 sells above 23 buys, like a real XBTUSD snapshot.
    fn snapshot_115() -> Vec<OrderBookEntry> {
        let sells = (0..92u64).map(|i| {
            level(
                1_000 + i,
                Side::Sell,
                dec!(3780) + Decimal::from(i) * dec!(0.5),
                Some(Decimal::from(10 + i)),
            )
        });
        let buys = (0..23u64).map(|i| {
            level(
                2_000 + i,
                Side::Buy,
                dec!(3779.5) - Decimal::from(i) * dec!(0.5),
                Some(Decimal::from(20 + i)),
            )
        });
        sells.chain(buys).collect()
    }

    #[test]
    fn test_partial_115_levels() {
        let engine = book_engine();
        let revision = engine.apply(book_diff(DiffAction::Partial, snapshot_115()));
        assert_eq!(revision, 1);

        let (bids, asks) = engine.inspect(|s| (s.bids().len(), s.asks().len()));
        assert_eq!(bids, 23);
        assert_eq!(asks, 92);

        let bid_view = engine.view(ViewKind::Bids).unwrap();
        let ask_view = engine.view(ViewKind::Asks).unwrap();
        assert_eq!(bid_view.len(), 20);
        assert_eq!(ask_view.len(), 20);
        assert_eq!(bid_view.revision, 1);

        assert_eq!(bid_view.entries[0].price, Price::new(dec!(3779.5)));
        assert_eq!(ask_view.entries[0].price, Price::new(dec!(3780)));
        assert!(bid_view
            .entries
            .windows(2)
            .all(|w| w[0].price >= w[1].price));
        assert!(ask_view
            .entries
            .windows(2)
            .all(|w| w[0].price <= w[1].price));
    }

    #[test]
    fn test_view_is_top_cap_of_store() {
        let engine = book_engine();
        engine.apply(book_diff(DiffAction::Partial, snapshot_115()));

        let mut all_asks: Vec<OrderBookEntry> =
            engine.inspect(|s| s.asks().values().cloned().collect());
        all_asks.sort_by(compare_asks);
        all_asks.truncate(ORDER_BOOK_VIEW_CAP);

        assert_eq!(engine.view(ViewKind::Asks).unwrap().entries, all_asks);
    }

    #[test]
    fn test_partial_replaces_everything() {
        let engine = book_engine();
        engine.apply(book_diff(DiffAction::Partial, snapshot_115()));

        let fresh = vec![level(9, Side::Buy, dec!(1), Some(dec!(1)))];
        engine.apply(book_diff(DiffAction::Partial, fresh));

        assert_eq!(engine.inspect(|s| s.len()), 1);
        assert!(engine.view(ViewKind::Asks).unwrap().is_empty());
        assert_eq!(engine.view(ViewKind::Bids).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let once = book_engine();
        let twice = book_engine();
        let batch = vec![
            level(1, Side::Buy, dec!(100), Some(dec!(5))),
            level(2, Side::Sell, dec!(101), Some(dec!(7))),
        ];

        once.apply(book_diff(DiffAction::Insert, batch.clone()));
        twice.apply(book_diff(DiffAction::Insert, batch.clone()));
        twice.apply(book_diff(DiffAction::Insert, batch));

        for kind in [ViewKind::Bids, ViewKind::Asks] {
            assert_eq!(
                once.view(kind).unwrap().entries,
                twice.view(kind).unwrap().entries
            );
        }
    }

    #[test]
    fn test_update_accumulates_incoming_size() {
        let engine = book_engine();
        engine.apply(book_diff(
            DiffAction::Insert,
            vec![level(8799, Side::Sell, dec!(3779.5), Some(dec!(25)))],
        ));
        engine.apply(book_diff(
            DiffAction::Update,
            vec![level(8799, Side::Sell, dec!(3779.5), Some(dec!(10)))],
        ));

        let asks = engine.view(ViewKind::Asks).unwrap();
        assert_eq!(asks.entries[0].quantity, Size::new(dec!(35)));
        // Only the cumulative quantity moves
        assert_eq!(asks.entries[0].size, Some(Size::new(dec!(25))));

        // Absent size counts as zero
        engine.apply(book_diff(
            DiffAction::Update,
            vec![level(8799, Side::Sell, dec!(3779.5), None)],
        ));
        let asks = engine.view(ViewKind::Asks).unwrap();
        assert_eq!(asks.entries[0].quantity, Size::new(dec!(35)));
    }

    #[test]
    fn test_update_overflow_is_dropped() {
        let engine = book_engine();
        engine.apply(book_diff(
            DiffAction::Insert,
            vec![
                level(1, Side::Sell, dec!(3780), Some(Decimal::MAX)),
                level(2, Side::Sell, dec!(3781), Some(dec!(5))),
            ],
        ));
        let revision = engine.apply(book_diff(
            DiffAction::Update,
            vec![
                level(1, Side::Sell, dec!(3780), Some(Decimal::MAX)),
                level(2, Side::Sell, dec!(3781), Some(dec!(5))),
            ],
        ));
        assert_eq!(revision, 2);

        // The overflowing level keeps its quantity, the rest of the batch lands
        let asks = engine.view(ViewKind::Asks).unwrap();
        assert_eq!(asks.entries[0].quantity, Size::new(Decimal::MAX));
        assert_eq!(asks.entries[1].quantity, Size::new(dec!(10)));
        assert_eq!(asks.revision, 2);
    }

    #[test]
    fn test_update_unknown_key_is_dropped() {
        let engine = book_engine();
        engine.apply(book_diff(
            DiffAction::Insert,
            vec![level(1, Side::Buy, dec!(100), Some(dec!(5)))],
        ));
        engine.apply(book_diff(
            DiffAction::Update,
            vec![
                level(2, Side::Buy, dec!(99), Some(dec!(5))),
                // Known id, other side: not a match either
                level(1, Side::Sell, dec!(100), Some(dec!(5))),
            ],
        ));

        assert_eq!(engine.inspect(|s| s.len()), 1);
        let bids = engine.view(ViewKind::Bids).unwrap();
        assert_eq!(bids.entries[0].quantity, Size::new(dec!(5)));
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let engine = book_engine();
        engine.apply(book_diff(DiffAction::Partial, snapshot_115()));
        let before = engine.view(ViewKind::Bids).unwrap();

        engine.apply(book_diff(
            DiffAction::Delete,
            vec![level(424242, Side::Buy, dec!(1), None)],
        ));

        let after = engine.view(ViewKind::Bids).unwrap();
        assert_eq!(before.entries, after.entries);
        assert_eq!(after.revision, before.revision + 1);
        assert_eq!(engine.inspect(|s| s.len()), 115);
    }

    #[test]
    fn test_set_reconstruction() {
        let engine = book_engine();
        engine.apply(book_diff(
            DiffAction::Partial,
            vec![
                level(1, Side::Buy, dec!(100), Some(dec!(1))),
                level(2, Side::Buy, dec!(99), Some(dec!(1))),
                level(3, Side::Sell, dec!(101), Some(dec!(1))),
            ],
        ));
        engine.apply(book_diff(
            DiffAction::Insert,
            vec![level(4, Side::Sell, dec!(102), Some(dec!(1)))],
        ));
        engine.apply(book_diff(
            DiffAction::Delete,
            vec![level(2, Side::Buy, dec!(99), None)],
        ));
        engine.apply(book_diff(
            DiffAction::Update,
            vec![level(3, Side::Sell, dec!(101), Some(dec!(2)))],
        ));

        let (bids, asks): (BTreeSet<u64>, BTreeSet<u64>) = engine.inspect(|s| {
            (
                s.bids().keys().copied().collect(),
                s.asks().keys().copied().collect(),
            )
        });
        assert_eq!(bids, BTreeSet::from([1]));
        assert_eq!(asks, BTreeSet::from([3, 4]));
        assert_eq!(engine.revision(), 4);
    }

    #[test]
    fn test_trade_partial_then_insert() {
        let engine = trade_engine();
        engine.apply(trade_diff(DiffAction::Partial, vec![trade("m-00", 0)]));
        assert_eq!(engine.view(ViewKind::Trades).unwrap().len(), 1);

        let batch = (1..=17).map(|i| trade(&format!("m-{i:02}"), i)).collect();
        engine.apply(trade_diff(DiffAction::Insert, batch));

        let view = engine.view(ViewKind::Trades).unwrap();
        assert_eq!(view.len(), 18);
        assert_eq!(view.entries[0].trd_match_id, "m-17");
        assert!(view
            .entries
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn test_trade_view_capped_at_30() {
        let engine = trade_engine();
        let batch = (0..45).map(|i| trade(&format!("m-{i:02}"), i)).collect();
        engine.apply(trade_diff(DiffAction::Partial, batch));

        let view = engine.view(ViewKind::Trades).unwrap();
        assert_eq!(view.len(), TRADE_VIEW_CAP);
        assert_eq!(view.entries[0].trd_match_id, "m-44");
        assert_eq!(view.entries[29].trd_match_id, "m-15");
        assert_eq!(engine.inspect(|s| s.len()), 45);
    }

    #[test]
    fn test_trade_update_is_noop_and_delete_removes() {
        let engine = trade_engine();
        engine.apply(trade_diff(
            DiffAction::Partial,
            vec![trade("a", 0), trade("b", 1)],
        ));

        let mut changed = trade("a", 0);
        changed.size = Size::new(dec!(1));
        engine.apply(trade_diff(DiffAction::Update, vec![changed]));
        let kept = engine.inspect(|s| s.trades().get(&"a".to_string()).cloned());
        assert_eq!(kept.unwrap().size, Size::new(dec!(100)));

        engine.apply(trade_diff(DiffAction::Delete, vec![trade("b", 1)]));
        let ids: Vec<_> = engine
            .view(ViewKind::Trades)
            .unwrap()
            .iter()
            .map(|t| t.trd_match_id.clone())
            .collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_engine_only_publishes_its_views() {
        let engine = trade_engine();
        assert!(engine.view(ViewKind::Bids).is_none());
        assert!(engine.watch(ViewKind::Asks).is_none());
        assert_eq!(engine.kind(), EntityKind::Trade);
    }

    #[tokio::test]
    async fn test_watch_receives_swapped_view() {
        let engine = book_engine();
        let mut rx = engine.watch(ViewKind::Bids).unwrap();
        assert!(rx.borrow().is_empty());

        engine.apply(book_diff(DiffAction::Partial, snapshot_115()));
        rx.changed().await.unwrap();

        let view = rx.borrow_and_update().clone();
        assert_eq!(view.len(), 20);
        assert_eq!(view.revision, 1);
    }

    #[test]
    fn test_subscribers_notified_per_view() {
        let subscribers = Arc::new(SubscriberSet::new());
        let mut mock = MockFeedSubscriber::new();
        mock.expect_on_view_updated()
            .withf(|kind, view| {
                matches!(kind, ViewKind::Bids | ViewKind::Asks) && view.revision() == 1
            })
            .times(2)
            .return_const(());
        subscribers.add(Arc::new(mock));

        let engine: OrderBookEngine =
            DiffEngine::new(Topic::new("orderBookL2", "XBTUSD"), subscribers);
        engine.apply(book_diff(DiffAction::Partial, snapshot_115()));
    }

    /// Records every notified (kind, revision) pair in arrival order.
    #[derive(Default)]
    struct RevisionLog {
        seen: parking_lot::Mutex<Vec<(ViewKind, u64)>>,
    }

    impl FeedSubscriber for RevisionLog {
        fn on_view_updated(&self, kind: ViewKind, view: PublishedView) {
            self.seen.lock().push((kind, view.revision()));
        }
    }

    #[test]
    fn test_concurrent_writers_notify_in_revision_order() {
        let log = Arc::new(RevisionLog::default());
        let subscribers = Arc::new(SubscriberSet::new());
        subscribers.add(log.clone());
        let engine: Arc<OrderBookEngine> = Arc::new(DiffEngine::new(
            Topic::new("orderBookL2", "XBTUSD"),
            subscribers,
        ));

        let writers: Vec<_> = [Side::Buy, Side::Sell]
            .into_iter()
            .enumerate()
            .map(|(n, side)| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        let id = n as u64 * 10_000 + i;
                        engine.apply(book_diff(
                            DiffAction::Insert,
                            vec![level(id, side, Decimal::from(1_000 + i), Some(dec!(1)))],
                        ));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let seen = log.seen.lock();
        assert_eq!(seen.len(), 2 * 1_000);
        for kind in [ViewKind::Bids, ViewKind::Asks] {
            let revisions: Vec<u64> = seen
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, revision)| *revision)
                .collect();
            assert_eq!(revisions.len(), 1_000);
            assert!(revisions.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(revisions.last(), Some(&1_000));
        }
        assert_eq!(engine.view(ViewKind::Bids).unwrap().revision, 1_000);
    }

    #[test]
    fn test_concurrent_readers_see_whole_views() {
        let engine = Arc::new(book_engine());
        let reader = {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for _ in 0..1_000 {
                    let view = engine.view(ViewKind::Asks).unwrap();
                    assert!(view.len() <= ORDER_BOOK_VIEW_CAP);
                    assert!(view.entries.windows(2).all(|w| w[0].price <= w[1].price));
                }
            })
        };

        for round in 0..200u64 {
            let batch = (0..30u64)
                .map(|i| {
                    level(
                        round * 100 + i,
                        Side::Sell,
                        Decimal::from(1_000 + (i * 7 + round) % 97),
                        Some(dec!(1)),
                    )
                })
                .collect();
            engine.apply(book_diff(DiffAction::Partial, batch));
        }

        reader.join().unwrap();
        assert_eq!(engine.revision(), 200);
    }
}
