//! Unified types shared by the session, tracker and strategy

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type accepted by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// How long a limit order rests on the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good till cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
}

/// A single price level
///
/// A zero price is the sentinel for "no such level".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    /// The empty level
    pub const NONE: PriceLevel = PriceLevel {
        price: Decimal::ZERO,
        quantity: Decimal::ZERO,
    };

    /// Create a new price level
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }

    pub fn is_empty(&self) -> bool {
        self.price.is_zero()
    }

    pub fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl std::fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.price, self.quantity)
    }
}

/// Total and available holdings of one currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    pub total: Decimal,
    pub available: Decimal,
}

impl Balance {
    pub fn new(total: Decimal, available: Decimal) -> Self {
        Self { total, available }
    }
}

/// Lifecycle of the streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet opened
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Socket is up and the pairs have been (re)subscribed
    Connected,
    /// Lost the socket unexpectedly, connecting again
    Reconnecting,
    /// Closed on request; no reconnect will happen
    Closed,
}
