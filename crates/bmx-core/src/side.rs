//! Book side tag.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side of an order book entry or trade print.
///
/// Serialized exactly as the feed spells it: `"Buy"` / `"Sell"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buy" => Ok(Self::Buy),
            "Sell" => Ok(Self::Sell),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_wire_spelling() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"Buy\"");
        let side: Side = serde_json::from_str("\"Sell\"").unwrap();
        assert_eq!(side, Side::Sell);
    }

    #[test]
    fn test_side_from_str_rejects_lowercase() {
        assert_eq!("Buy".parse::<Side>().unwrap(), Side::Buy);
        assert!("buy".parse::<Side>().is_err());
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }
}
