//! Headless presentation: logs view updates and renders text summaries.

use bmx_core::{format_wire_timestamp, OrderBookEntry, TradeEntry};
use bmx_feed::{BoundedView, FeedSubscriber, PublishedView, ViewKind};
use bmx_telemetry::Metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Subscriber that records view sizes and logs session lifecycle.
#[derive(Debug, Default)]
pub struct ViewPrinter {
    updates: AtomicU64,
}

impl ViewPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// View updates received so far.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl FeedSubscriber for ViewPrinter {
    fn on_view_updated(&self, kind: ViewKind, view: PublishedView) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        Metrics::view_length(kind.as_str(), view.len());
        debug!(view = %kind, len = view.len(), revision = view.revision(), "View updated");
    }

    fn on_session_connected(&self) {
        info!("Feed connected");
    }

    fn on_session_disconnected(&self, reason: &str) {
        warn!(reason, "Feed disconnected");
    }

    fn on_session_error(&self, message: &str) {
        warn!(message, "Feed error");
    }
}

/// Render the top `levels` of each side, asks above bids, best prices
/// adjacent to the spread line.
pub fn render_book(
    bids: &BoundedView<OrderBookEntry>,
    asks: &BoundedView<OrderBookEntry>,
    levels: usize,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(levels * 2 + 1);
    for ask in asks.iter().take(levels).rev() {
        lines.push(format_level("ask", ask));
    }
    lines.push(match (bids.first(), asks.first()) {
        (Some(bid), Some(ask)) => format!(
            "----- spread {} -----",
            ask.price.inner() - bid.price.inner()
        ),
        _ => "----- no spread -----".to_string(),
    });
    for bid in bids.iter().take(levels) {
        lines.push(format_level("bid", bid));
    }
    lines
}

/// Render the `count` most recent trades, newest first.
pub fn render_trades(trades: &BoundedView<TradeEntry>, count: usize) -> Vec<String> {
    trades
        .iter()
        .take(count)
        .map(|t| {
            format!(
                "{}  {:<4}  {:>10} @ {}",
                format_wire_timestamp(&t.timestamp),
                t.side.as_str(),
                t.size.to_string(),
                t.price
            )
        })
        .collect()
}

fn format_level(label: &str, entry: &OrderBookEntry) -> String {
    format!(
        "{}  {:>12}  x {:>10}",
        label,
        entry.price.to_string(),
        entry.quantity.to_string()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmx_core::{parse_wire_timestamp, Price, Side, Size};
    use rust_decimal_macros::dec;

    fn level(id: u64, side: Side, price: rust_decimal::Decimal) -> OrderBookEntry {
        OrderBookEntry::new(
            "XBTUSD",
            id,
            side,
            Price::new(price),
            Some(Size::new(dec!(100))),
            parse_wire_timestamp("2019-04-05T12:01:02.345Z").unwrap(),
        )
    }

    fn view<V>(entries: Vec<V>) -> BoundedView<V> {
        BoundedView {
            entries,
            revision: 1,
        }
    }

    #[test]
    fn test_render_book_layout() {
        let bids = view(vec![
            level(1, Side::Buy, dec!(3779.5)),
            level(2, Side::Buy, dec!(3779.0)),
        ]);
        let asks = view(vec![
            level(3, Side::Sell, dec!(3780.0)),
            level(4, Side::Sell, dec!(3780.5)),
            level(5, Side::Sell, dec!(3781.0)),
        ]);

        let lines = render_book(&bids, &asks, 2);

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("ask") && lines[0].contains("3780.5"));
        assert!(lines[1].contains("3780.0"));
        assert!(lines[2].contains("spread 0.5"));
        assert!(lines[3].starts_with("bid") && lines[3].contains("3779.5"));
        assert!(lines[4].starts_with("bid"));
    }

    #[test]
    fn test_render_book_empty_side() {
        let lines = render_book(&view(Vec::new()), &view(Vec::new()), 5);
        assert_eq!(lines, vec!["----- no spread -----".to_string()]);
    }

    #[test]
    fn test_render_trades_newest_first() {
        let trade = TradeEntry::new(
            "XBTUSD",
            "abc",
            Side::Sell,
            Size::new(dec!(5)),
            Price::new(dec!(3779)),
            parse_wire_timestamp("2019-04-05T12:01:03.000Z").unwrap(),
        );
        let lines = render_trades(&view(vec![trade.clone(), trade]), 1);

        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("2019-04-05T12:01:03.000Z"));
        assert!(lines[0].contains("Sell"));
        assert!(lines[0].contains("@ 3779"));
    }

    #[test]
    fn test_printer_counts_updates() {
        let printer = ViewPrinter::new();
        printer.on_view_updated(
            ViewKind::Bids,
            PublishedView::OrderBook(std::sync::Arc::new(view(Vec::new()))),
        );
        assert_eq!(printer.updates(), 1);
    }
}
