//! ProBit competitive market maker
//!
//! Keeps one resting buy and one resting sell per pair just inside the best
//! rival quotes on the ProBit exchange, throttled by a per-side safety cage.

pub mod common;
pub mod config;
pub mod market;
pub mod probit;
pub mod strategy;

// Re-export commonly used types
pub use common::errors::{ClientError, Result};
pub use common::traits::{ExchangeGateway, MarketListener};
pub use common::types::{Balance, ConnectionState, PriceLevel, Side};
pub use config::types::AppConfig;
pub use market::{pair_feed, run_pair, BookSummary, FeedEvent, OrderBookTracker, OwnSummary, PairFeed};
pub use probit::rest::ProbitRestClient;
pub use probit::session::ExchangeSession;

// Strategy types
pub use strategy::{CompeteEngine, Decline, EngineAction, SafetyCage, TradingIntent};
