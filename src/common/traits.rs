//! Trait definitions at the seams between session, tracker and strategy

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::errors::Result;
use super::types::Balance;
use crate::probit::messages::{
    BookLevel, CancelOrder, MarketData, NewOrder, OwnOrder, OwnTrade, PlacementOutcome,
};

/// Receiver of market data for one registered pair
///
/// Both methods are called from the stream's delivery task, so they must not
/// block; anything slow has to be handed off.
pub trait MarketListener: Send + Sync {
    /// Told the pair's price increment when the pair is registered
    fn set_increment(&self, increment: Decimal);

    /// Called for every marketdata frame carrying this pair
    fn on_market_data(&self, data: MarketData);
}

/// Order and account operations a tracker needs from the exchange session
///
/// Implemented by [`crate::probit::session::ExchangeSession`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Submit a limit order
    async fn place_order(&self, order: NewOrder) -> Result<PlacementOutcome>;

    /// Cancel one order
    async fn cancel_order(&self, cancel: CancelOrder) -> Result<()>;

    /// Our open orders on a pair
    async fn open_orders(&self, pair: &str) -> Result<Vec<OwnOrder>>;

    /// Total and available balance of a currency
    async fn balance(&self, currency: &str) -> Result<Balance>;

    /// Our fills on a pair between `start` and `end`
    async fn trade_history(
        &self,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OwnTrade>>;

    /// The public order book of a pair
    async fn public_order_book(&self, pair: &str) -> Result<Vec<BookLevel>>;
}
