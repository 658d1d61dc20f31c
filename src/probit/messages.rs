//! ProBit-specific message types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::{OrderType, Side, TimeInForce};

/// Most REST responses wrap their payload in `{"data": ...}`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

// ============================================================================
// WebSocket Messages
// ============================================================================

/// Authorization frame sent right after connecting
#[derive(Debug, Clone, Serialize)]
pub struct WsAuthorization<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub token: &'a str,
}

impl<'a> WsAuthorization<'a> {
    pub fn new(token: &'a str) -> Self {
        Self {
            kind: "authorization",
            token,
        }
    }
}

/// Subscribe/unsubscribe control frame for the marketdata channel
#[derive(Debug, Clone, Serialize)]
pub struct WsSubscription<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub channel: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    pub market_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<&'static str>>,
}

/// Update interval requested for the marketdata channel, in milliseconds
pub const MARKETDATA_INTERVAL_MS: u32 = 100;

impl<'a> WsSubscription<'a> {
    pub fn subscribe(market_id: &'a str) -> Self {
        Self {
            kind: "subscribe",
            channel: "marketdata",
            interval: Some(MARKETDATA_INTERVAL_MS),
            market_id,
            filter: Some(vec!["order_books"]),
        }
    }

    pub fn unsubscribe(market_id: &'a str) -> Self {
        Self {
            kind: "unsubscribe",
            channel: "marketdata",
            interval: None,
            market_id,
            filter: None,
        }
    }
}

/// Classification of an inbound text frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    MarketData,
    AuthorizationOk,
    Unauthorized,
    PingTimeout,
    Unrecognized,
}

impl InboundKind {
    /// Classify a frame by its content.
    ///
    /// Frames arrive as compact JSON, so plain substring matching is enough.
    pub fn classify(text: &str) -> Self {
        if text.contains(r#""channel":"marketdata""#) {
            InboundKind::MarketData
        } else if text.contains(r#""type":"authorization","result":"ok""#) {
            InboundKind::AuthorizationOk
        } else if text.contains(r#""errorCode":"UNAUTHORIZED""#) {
            InboundKind::Unauthorized
        } else if text.contains(r#""ping timeout""#) {
            InboundKind::PingTimeout
        } else {
            InboundKind::Unrecognized
        }
    }
}

/// One entry of a marketdata `order_books` list or the public order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

impl BookLevel {
    pub fn new(side: Side, price: Decimal, quantity: Decimal) -> Self {
        Self {
            side,
            price,
            quantity,
        }
    }
}

/// Ticker block carried by marketdata frames
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last: Option<Decimal>,
    #[serde(default)]
    pub low: Option<Decimal>,
    #[serde(default)]
    pub high: Option<Decimal>,
    #[serde(default)]
    pub change: Option<Decimal>,
    #[serde(default)]
    pub base_volume: Option<Decimal>,
    #[serde(default)]
    pub quote_volume: Option<Decimal>,
}

/// A marketdata frame for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub channel: String,
    pub market_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub lag: i64,
    #[serde(default)]
    pub ticker: Option<Ticker>,
    #[serde(default)]
    pub order_books: Vec<BookLevel>,
    #[serde(default)]
    pub reset: bool,
}

// ============================================================================
// REST API Types
// ============================================================================

/// Response from POST /token
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Static metadata for one pair, from GET /market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSpec {
    pub id: String,
    pub base_currency_id: String,
    pub quote_currency_id: String,
    #[serde(default)]
    pub min_price: Decimal,
    #[serde(default)]
    pub max_price: Decimal,
    pub price_increment: Decimal,
    #[serde(default)]
    pub min_quantity: Decimal,
    #[serde(default)]
    pub max_quantity: Decimal,
    #[serde(default)]
    pub quantity_precision: u32,
    #[serde(default)]
    pub min_cost: Decimal,
    #[serde(default)]
    pub max_cost: Decimal,
    #[serde(default)]
    pub cost_precision: u32,
    #[serde(default)]
    pub taker_fee_rate: Decimal,
    #[serde(default)]
    pub maker_fee_rate: Decimal,
    #[serde(default)]
    pub show_in_ui: bool,
    #[serde(default)]
    pub closed: bool,
}

/// Body of POST /new_order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    pub market_id: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: Side,
    pub time_in_force: TimeInForce,
    pub limit_price: Decimal,
    pub quantity: Decimal,
    /// Always sent, empty when unused
    pub client_order_id: String,
}

impl NewOrder {
    /// A good-till-cancelled limit order
    pub fn limit(market_id: impl Into<String>, side: Side, price: Decimal, quantity: Decimal) -> Self {
        Self {
            market_id: market_id.into(),
            order_type: OrderType::Limit,
            side,
            time_in_force: TimeInForce::Gtc,
            limit_price: price,
            quantity,
            client_order_id: String::new(),
        }
    }
}

/// Body of POST /cancel_order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOrder {
    pub market_id: String,
    pub order_id: String,
}

/// One of our own orders, as returned by GET /open_order or POST /new_order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnOrder {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub market_id: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: Decimal,
    #[serde(default)]
    pub limit_price: Decimal,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
    #[serde(default)]
    pub filled_cost: Decimal,
    #[serde(default)]
    pub filled_quantity: Decimal,
    #[serde(default)]
    pub open_quantity: Decimal,
    #[serde(default)]
    pub cancelled_quantity: Decimal,
    pub status: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub client_order_id: String,
}

impl OwnOrder {
    /// Quantity that has not been cancelled
    pub fn remaining(&self) -> Decimal {
        self.quantity - self.cancelled_quantity
    }
}

/// Outcome of a placement that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    /// The exchange accepted the order
    Accepted(OwnOrder),
    /// The account could not cover the order; nothing was placed
    InsufficientBalance,
}

/// Entry from GET /balance
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalanceEntry {
    pub currency_id: String,
    pub total: Decimal,
    pub available: Decimal,
}

/// One of our own fills, from GET /trade_history
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OwnTrade {
    pub id: String,
    pub order_id: String,
    pub side: Side,
    #[serde(default)]
    pub fee_amount: Decimal,
    #[serde(default)]
    pub fee_currency_id: String,
    #[serde(default)]
    pub status: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub cost: Decimal,
    pub time: DateTime<Utc>,
    pub market_id: String,
}

/// A public trade, from GET /trade
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketTrade {
    pub id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub time: DateTime<Utc>,
    pub side: Side,
    #[serde(default)]
    pub tick_direction: String,
}
