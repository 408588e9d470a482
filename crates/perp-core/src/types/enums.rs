//! Enumerations used throughout the execution system.
//!
//! Every enum that travels over the wire serializes to the exchange's
//! SCREAMING_SNAKE_CASE spelling and implements `as_str()` for building
//! signed query strings.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order side / position direction
// ---------------------------------------------------------------------------

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Net position direction (one-way mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionDirection {
    Long,
    Short,
}

impl PositionDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }

    /// Side of the order that opens or adds to this direction.
    pub fn entry_side(self) -> Side {
        match self {
            Self::Long => Side::Buy,
            Self::Short => Side::Sell,
        }
    }

    /// Side of the order that reduces or closes this direction.
    pub fn exit_side(self) -> Side {
        self.entry_side().opposite()
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for PositionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Order enums
// ---------------------------------------------------------------------------

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    TakeProfitMarket,
    /// Any other exchange type (STOP, TAKE_PROFIT, TRAILING_STOP_MARKET, ...).
    #[serde(other)]
    Other,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopMarket => "STOP_MARKET",
            Self::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            Self::Other => "OTHER",
        }
    }

    /// Whether this is one of the protective trigger types.
    pub fn is_protective(self) -> bool {
        matches!(self, Self::StopMarket | Self::TakeProfitMarket)
    }
}

/// Order status: NEW → PARTIALLY_FILLED → FILLED, or CANCELED / EXPIRED / REJECTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn is_open(self) -> bool {
        matches!(self, Self::New | Self::PartiallyFilled)
    }
}

/// Time in force (LIMIT orders only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
        }
    }
}

/// Price source used to trigger conditional orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkingType {
    #[default]
    MarkPrice,
    ContractPrice,
}

impl WorkingType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MarkPrice => "MARK_PRICE",
            Self::ContractPrice => "CONTRACT_PRICE",
        }
    }
}

/// Margin mode for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarginType {
    Isolated,
    Crossed,
}

impl MarginType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Isolated => "ISOLATED",
            Self::Crossed => "CROSSED",
        }
    }

    /// Parse the exchange's spelling; position listings use lowercase
    /// `"cross"` / `"isolated"`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "isolated" => Some(Self::Isolated),
            "cross" | "crossed" => Some(Self::Crossed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision input
// ---------------------------------------------------------------------------

/// Action planned by the upstream decision layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlannedAction {
    Long,
    Short,
    Hold,
    Exit,
    Reduce,
}

impl PlannedAction {
    /// Direction this action opens, if any.
    pub fn direction(self) -> Option<PositionDirection> {
        match self {
            Self::Long => Some(PositionDirection::Long),
            Self::Short => Some(PositionDirection::Short),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_order_type_maps_to_other() {
        let t: OrderType = serde_json::from_str("\"TRAILING_STOP_MARKET\"").unwrap();
        assert_eq!(t, OrderType::Other);
        let t: OrderType = serde_json::from_str("\"TAKE_PROFIT_MARKET\"").unwrap();
        assert!(t.is_protective());
    }

    #[test]
    fn margin_type_accepts_position_listing_spelling() {
        assert_eq!(MarginType::parse("cross"), Some(MarginType::Crossed));
        assert_eq!(MarginType::parse("ISOLATED"), Some(MarginType::Isolated));
        assert_eq!(MarginType::parse("portfolio"), None);
    }

    #[test]
    fn exit_side_is_opposite_of_entry() {
        assert_eq!(PositionDirection::Long.exit_side(), Side::Sell);
        assert_eq!(PositionDirection::Short.exit_side(), Side::Buy);
    }
}
