//! Per-pair order book tracker
//!
//! Owns the market summary and our own resting orders for one pair and
//! forwards order actions to the exchange gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::summary::{BookSummary, OwnSummary};
use crate::common::errors::{ClientError, Result};
use crate::common::traits::ExchangeGateway;
use crate::common::types::{Balance, Side};
use crate::probit::messages::{BookLevel, CancelOrder, NewOrder, OwnOrder, PairSpec, PlacementOutcome};

/// Book state and order actions for one pair
pub struct OrderBookTracker {
    spec: Arc<PairSpec>,
    gateway: Arc<dyn ExchangeGateway>,
    increment: Decimal,
    book: BookSummary,
    own: OwnSummary,
    own_orders: Vec<OwnOrder>,
    started_at: DateTime<Utc>,
}

impl OrderBookTracker {
    /// Create a tracker for the pair described by `spec`
    pub fn new(spec: Arc<PairSpec>, gateway: Arc<dyn ExchangeGateway>) -> Self {
        Self {
            increment: spec.price_increment,
            spec,
            gateway,
            book: BookSummary::default(),
            own: OwnSummary::default(),
            own_orders: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn pair(&self) -> &str {
        &self.spec.id
    }

    pub fn spec(&self) -> &PairSpec {
        &self.spec
    }

    pub fn base_currency(&self) -> &str {
        &self.spec.base_currency_id
    }

    pub fn increment(&self) -> Decimal {
        self.increment
    }

    pub fn set_increment(&mut self, increment: Decimal) {
        if increment != self.increment {
            debug!(pair = %self.spec.id, %increment, "Price increment updated");
        }
        self.increment = increment;
    }

    pub fn book(&self) -> &BookSummary {
        &self.book
    }

    pub fn own(&self) -> &OwnSummary {
        &self.own
    }

    /// Our open orders on one side
    pub fn own_orders(&self, side: Side) -> impl Iterator<Item = &OwnOrder> {
        self.own_orders.iter().filter(move |o| o.side == side)
    }

    /// Replace the market summary with one computed from a complete snapshot
    pub fn ingest_snapshot(&mut self, levels: &[BookLevel]) {
        self.book = BookSummary::from_levels(levels);
        debug!(
            pair = %self.spec.id,
            best_buy = %self.book.best_buy,
            best_sell = %self.book.best_sell,
            gaps = %self.book.display_gaps(self.increment),
            "Book updated"
        );
    }

    /// Re-fetch our open orders and recompute the own summary
    #[instrument(skip(self), fields(pair = %self.spec.id))]
    pub async fn refresh_own_orders(&mut self) -> Result<()> {
        let orders = self.gateway.open_orders(&self.spec.id).await?;
        self.set_own_orders(orders);
        Ok(())
    }

    /// Prime the market summary from the public order book
    #[instrument(skip(self), fields(pair = %self.spec.id))]
    pub async fn refresh_market_from_rest(&mut self) -> Result<()> {
        let levels = self.gateway.public_order_book(&self.spec.id).await?;
        self.ingest_snapshot(&levels);
        Ok(())
    }

    fn set_own_orders(&mut self, orders: Vec<OwnOrder>) {
        let pair = &self.spec.id;
        self.own_orders = orders
            .into_iter()
            .filter(|o| &o.market_id == pair && o.remaining() > Decimal::ZERO)
            .collect();

        let own = OwnSummary::from_orders(&self.own_orders);
        if own != self.own {
            info!(pair = %self.spec.id, own = %own, "Own orders changed");
            self.own = own;
        }
    }

    /// Submit a good-till-cancelled limit order on this pair
    pub async fn place_limit_order(&self, side: Side, price: Decimal, quantity: Decimal) -> Result<PlacementOutcome> {
        info!(pair = %self.spec.id, %side, %price, %quantity, "Placing limit order");
        let outcome = self
            .gateway
            .place_order(NewOrder::limit(self.spec.id.clone(), side, price, quantity))
            .await?;
        if outcome == PlacementOutcome::InsufficientBalance {
            warn!(pair = %self.spec.id, %side, "Insufficient balance, order skipped");
        }
        Ok(outcome)
    }

    /// Cancel every own order on one side
    ///
    /// Every order is attempted; failures are collected into one error.
    /// Cancelled orders are dropped from the own summary straight away.
    #[instrument(skip(self), fields(pair = %self.spec.id))]
    pub async fn cancel_side(&mut self, side: Side) -> Result<()> {
        let targets: Vec<String> = self.own_orders(side).map(|o| o.id.clone()).collect();
        let mut cancelled = Vec::with_capacity(targets.len());
        let mut errors = Vec::new();

        for order_id in targets {
            let cancel = CancelOrder {
                market_id: self.spec.id.clone(),
                order_id: order_id.clone(),
            };
            match self.gateway.cancel_order(cancel).await {
                Ok(()) => cancelled.push(order_id),
                Err(e) => {
                    warn!(order = %order_id, "Cancel failed: {}", e);
                    errors.push(e);
                }
            }
        }

        info!(%side, cancelled = cancelled.len(), failed = errors.len(), "Cancelled own orders");
        let remaining: Vec<OwnOrder> = self
            .own_orders
            .drain(..)
            .filter(|o| !cancelled.contains(&o.id))
            .collect();
        self.set_own_orders(remaining);

        match ClientError::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Base currency balance; zero when it cannot be fetched
    pub async fn available_balance(&self) -> Balance {
        match self.gateway.balance(&self.spec.base_currency_id).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(pair = %self.spec.id, "Balance unavailable, assuming zero: {}", e);
                Balance::default()
            }
        }
    }

    /// Net base and quote change from our fills since the tracker started
    ///
    /// Buys add base and spend quote; sells do the reverse. Fees are ignored.
    #[instrument(skip(self), fields(pair = %self.spec.id))]
    pub async fn report_history(&self) -> Result<(Decimal, Decimal)> {
        let trades = self
            .gateway
            .trade_history(&self.spec.id, self.started_at, Utc::now())
            .await?;

        let (base, quote) = trades.iter().fold((Decimal::ZERO, Decimal::ZERO), |(base, quote), t| match t.side {
            Side::Buy => (base + t.quantity, quote - t.cost),
            Side::Sell => (base - t.quantity, quote + t.cost),
        });
        info!(trades = trades.len(), %base, %quote, "Trade history since start");
        Ok((base, quote))
    }
}

impl fmt::Display for OrderBookTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.spec.id, self.book.display_gaps(self.increment))
    }
}
