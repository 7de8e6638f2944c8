//! Diff decoding.
//!
//! Turns one raw text payload into a typed [`DiffMessage`] for the entity
//! kind named by its table. Decoding is all-or-nothing: one bad entry
//! rejects the whole message.
//!
//! Wire format:
//! ```text
//! {"table":"orderBookL2","action":"update","data":[{"symbol":"XBTUSD","id":8799,
//!   "side":"Sell","size":25,"price":3779.5,"timestamp":"2019-04-05T12:01:02.345Z"}]}
//! ```

use crate::error::{DecodeError, DecodeResult};
use bmx_core::{
    parse_wire_timestamp, DiffAction, DiffMessage, EntityKind, OrderBookEntry, Price, Side, Size,
    TradeEntry,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Decode counters.
#[derive(Debug, Default)]
pub struct DecodeStats {
    decoded: AtomicU64,
    failed: AtomicU64,
}

impl DecodeStats {
    pub fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// A decoded diff, tagged by entity kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedDiff {
    OrderBook(DiffMessage<OrderBookEntry>),
    Trades(DiffMessage<TradeEntry>),
}

impl DecodedDiff {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::OrderBook(_) => EntityKind::OrderBook,
            Self::Trades(_) => EntityKind::Trade,
        }
    }

    pub fn action(&self) -> DiffAction {
        match self {
            Self::OrderBook(diff) => diff.action,
            Self::Trades(diff) => diff.action,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Self::OrderBook(diff) => &diff.table,
            Self::Trades(diff) => &diff.table,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::OrderBook(diff) => diff.len(),
            Self::Trades(diff) => diff.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Raw wire structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    table: Option<String>,
    action: Option<String>,
    data: Option<Vec<Value>>,
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    types: BTreeMap<String, Value>,
    #[serde(default)]
    filter: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawBookEntry {
    symbol: Option<String>,
    id: Option<u64>,
    side: Option<String>,
    size: Option<Value>,
    price: Option<Value>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTradeEntry {
    symbol: Option<String>,
    side: Option<String>,
    size: Option<Value>,
    price: Option<Value>,
    timestamp: Option<String>,
    #[serde(rename = "trdMatchID")]
    trd_match_id: Option<String>,
    tick_direction: Option<String>,
    trd_type: Option<String>,
    gross_value: Option<Value>,
    home_notional: Option<Value>,
    foreign_notional: Option<Value>,
}

// ============================================================================
// Decoder
// ============================================================================

/// Diff decoder.
#[derive(Debug, Default)]
pub struct DiffDecoder {
    stats: DecodeStats,
}

impl DiffDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Decode one raw payload.
    pub fn decode(&self, raw: &str) -> DecodeResult<DecodedDiff> {
        let result = decode_payload(raw);
        match &result {
            Ok(diff) => {
                self.stats.record_decoded();
                debug!(
                    table = diff.table(),
                    action = %diff.action(),
                    entries = diff.len(),
                    "Decoded diff"
                );
            }
            Err(e) => {
                self.stats.record_failed();
                debug!(error = %e, "Decode failed");
            }
        }
        result
    }
}

fn decode_payload(raw: &str) -> DecodeResult<DecodedDiff> {
    let envelope: RawEnvelope = serde_json::from_str(raw)?;

    let table = envelope.table.ok_or(DecodeError::MissingField {
        field: "table",
        context: "envelope",
    })?;
    let action_text = envelope.action.ok_or(DecodeError::MissingField {
        field: "action",
        context: "envelope",
    })?;
    let action =
        DiffAction::from_str(&action_text).map_err(|_| DecodeError::UnknownAction(action_text))?;
    let data = envelope.data.ok_or(DecodeError::MissingField {
        field: "data",
        context: "envelope",
    })?;
    let kind =
        EntityKind::from_table(&table).ok_or_else(|| DecodeError::UnknownTable(table.clone()))?;

    let decoded = match kind {
        EntityKind::OrderBook => {
            let entries = data
                .into_iter()
                .map(decode_book_entry)
                .collect::<DecodeResult<Vec<_>>>()?;
            let mut diff = DiffMessage::new(table, action, entries);
            diff.keys = envelope.keys;
            diff.types = envelope.types;
            diff.filter = envelope.filter;
            DecodedDiff::OrderBook(diff)
        }
        EntityKind::Trade => {
            let entries = data
                .into_iter()
                .map(decode_trade_entry)
                .collect::<DecodeResult<Vec<_>>>()?;
            let mut diff = DiffMessage::new(table, action, entries);
            diff.keys = envelope.keys;
            diff.types = envelope.types;
            diff.filter = envelope.filter;
            DecodedDiff::Trades(diff)
        }
    };
    Ok(decoded)
}

fn decode_book_entry(value: Value) -> DecodeResult<OrderBookEntry> {
    const CONTEXT: &str = "order book entry";
    let raw: RawBookEntry = serde_json::from_value(value)
        .map_err(|e| DecodeError::Malformed(format!("{CONTEXT}: {e}")))?;

    let symbol = required(raw.symbol, "symbol", CONTEXT)?;
    let id = required(raw.id, "id", CONTEXT)?;
    let side = parse_side(&required(raw.side, "side", CONTEXT)?)?;
    let price = Price::new(parse_decimal(&required(raw.price, "price", CONTEXT)?, "price")?);
    let size = raw
        .size
        .as_ref()
        .map(|v| parse_decimal(v, "size").map(Size::new))
        .transpose()?;
    let timestamp = parse_timestamp(&required(raw.timestamp, "timestamp", CONTEXT)?)?;

    Ok(OrderBookEntry::new(symbol, id, side, price, size, timestamp))
}

fn decode_trade_entry(value: Value) -> DecodeResult<TradeEntry> {
    const CONTEXT: &str = "trade entry";
    let raw: RawTradeEntry = serde_json::from_value(value)
        .map_err(|e| DecodeError::Malformed(format!("{CONTEXT}: {e}")))?;

    let symbol = required(raw.symbol, "symbol", CONTEXT)?;
    let trd_match_id = required(raw.trd_match_id, "trdMatchID", CONTEXT)?;
    let side = parse_side(&required(raw.side, "side", CONTEXT)?)?;
    let size = Size::new(parse_decimal(&required(raw.size, "size", CONTEXT)?, "size")?);
    let price = Price::new(parse_decimal(&required(raw.price, "price", CONTEXT)?, "price")?);
    let timestamp = parse_timestamp(&required(raw.timestamp, "timestamp", CONTEXT)?)?;

    let mut entry = TradeEntry::new(symbol, trd_match_id, side, size, price, timestamp);
    entry.tick_direction = raw.tick_direction;
    entry.trd_type = raw.trd_type;
    entry.gross_value = optional_decimal(raw.gross_value.as_ref(), "grossValue")?;
    entry.home_notional = optional_decimal(raw.home_notional.as_ref(), "homeNotional")?;
    entry.foreign_notional = optional_decimal(raw.foreign_notional.as_ref(), "foreignNotional")?;
    Ok(entry)
}

fn required<T>(value: Option<T>, field: &'static str, context: &'static str) -> DecodeResult<T> {
    value.ok_or(DecodeError::MissingField { field, context })
}

fn parse_side(text: &str) -> DecodeResult<Side> {
    text.parse().map_err(|_| DecodeError::InvalidField {
        field: "side",
        reason: format!("expected Buy or Sell, got {text:?}"),
    })
}

fn parse_timestamp(text: &str) -> DecodeResult<DateTime<Utc>> {
    parse_wire_timestamp(text).map_err(|_| DecodeError::InvalidTimestamp(text.to_string()))
}

/// Parse a JSON number or numeric string into an exact decimal.
///
/// Numbers go through their shortest textual form so `3779.5` stays
/// `3779.5` rather than picking up binary float noise.
fn parse_decimal(value: &Value, field: &'static str) -> DecodeResult<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(DecodeError::InvalidField {
                field,
                reason: format!("expected a number, got {other}"),
            })
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| DecodeError::InvalidField {
            field,
            reason: format!("{text:?}: {e}"),
        })
}

fn optional_decimal(value: Option<&Value>, field: &'static str) -> DecodeResult<Option<Decimal>> {
    value.map(|v| parse_decimal(v, field)).transpose()
}
