//! Subscription topic identification.
//!
//! A topic couples a feed table with the symbol it is filtered on and is
//! written `<table>:<symbol>` on the wire (e.g. `orderBookL2:XBTUSD`).

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse subscription key: table + primary symbol.
///
/// This is the key the router compares inbound payloads against and the
/// key engines are registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    pub table: String,
    pub symbol: String,
}

impl Topic {
    pub fn new(table: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            symbol: symbol.into(),
        }
    }

    /// Check whether a `(table, symbol)` pair names this topic.
    pub fn matches(&self, table: &str, symbol: &str) -> bool {
        self.table == table && self.symbol == symbol
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.symbol)
    }
}

impl FromStr for Topic {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (table, symbol) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidTopic(format!("missing ':' in {s:?}")))?;

        if table.is_empty() || symbol.is_empty() || symbol.contains(':') {
            return Err(CoreError::InvalidTopic(s.to_string()));
        }

        Ok(Self::new(table, symbol))
    }
}
