//! Diff message model.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// What a diff message does to the tracked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    /// Full snapshot: replaces everything tracked for the entity kind.
    Partial,
    /// Add or overwrite by key.
    Insert,
    /// Adjust cumulative quantity of existing keys.
    Update,
    /// Remove by key.
    Delete,
}

impl DiffAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for DiffAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiffAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partial" => Ok(Self::Partial),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(CoreError::InvalidAction(other.to_string())),
        }
    }
}

/// Entity kind carried by a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    OrderBook,
    Trade,
}

impl EntityKind {
    /// Resolve the entity kind from a feed table name.
    ///
    /// `orderBookL2`, `orderBookL2_25` etc. are order books; `trade` is the
    /// trade tape. Anything else is not tracked.
    pub fn from_table(table: &str) -> Option<Self> {
        if table.starts_with("orderBook") {
            Some(Self::OrderBook)
        } else if table == "trade" {
            Some(Self::Trade)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderBook => "order_book",
            Self::Trade => "trade",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded diff message for entity type `E`.
///
/// `keys`, `types` and `filter` are passthrough metadata; the engine never
/// interprets them.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffMessage<E> {
    pub table: String,
    pub action: DiffAction,
    pub data: Vec<E>,
    pub keys: Vec<String>,
    pub types: BTreeMap<String, serde_json::Value>,
    pub filter: BTreeMap<String, serde_json::Value>,
}

impl<E> DiffMessage<E> {
    /// Create a diff with empty passthrough metadata.
    pub fn new(table: impl Into<String>, action: DiffAction, data: Vec<E>) -> Self {
        Self {
            table: table.into(),
            action,
            data,
            keys: Vec::new(),
            types: BTreeMap::new(),
            filter: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
