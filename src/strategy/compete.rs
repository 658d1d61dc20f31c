//! Competitive single-pair quoting
//!
//! On every book update the engine walks a fixed chain of checks and stops
//! at the first one that acts:
//!
//! 1. sell placement, 2. sell outbid, 3. sell gap,
//! 4. buy placement, 5. buy outbid, 6. buy gap.
//!
//! A check that cannot find a valid price or quantity declines and the
//! chain moves on. Exchange failures are logged; the next update starts over.

use rust_decimal::{Decimal, RoundingStrategy};
use std::time::Instant;
use tracing::{debug, error, instrument};

use super::cage::SafetyCage;
use super::intent::TradingIntent;
use super::types::{CancelReason, Decline, EngineAction, PlaceStatus};
use crate::common::types::{Balance, Side};
use crate::market::tracker::OrderBookTracker;
use crate::probit::messages::{PairSpec, PlacementOutcome};

type Step = std::result::Result<EngineAction, Decline>;

/// Decision engine for one pair
#[derive(Debug, Clone)]
pub struct CompeteEngine {
    intent: TradingIntent,
    cage: SafetyCage,
}

impl CompeteEngine {
    pub fn new(intent: TradingIntent, cage: SafetyCage) -> Self {
        Self { intent, cage }
    }

    pub fn intent(&self) -> &TradingIntent {
        &self.intent
    }

    /// Decide and carry out at most one action for the current book
    pub async fn on_book_update(&mut self, tracker: &mut OrderBookTracker) -> Option<EngineAction> {
        self.on_book_update_at(tracker, Instant::now()).await
    }

    #[instrument(skip_all, fields(pair = %tracker.pair()))]
    pub async fn on_book_update_at(&mut self, tracker: &mut OrderBookTracker, now: Instant) -> Option<EngineAction> {
        if let Some(action) = settle("sell placement", self.sell_placement(tracker, now).await) {
            return Some(action);
        }
        if let Some(action) = settle("sell outbid", self.outbid(tracker, Side::Sell).await) {
            return Some(action);
        }
        if let Some(action) = settle("sell gap", self.gap(tracker, Side::Sell).await) {
            return Some(action);
        }
        if let Some(action) = settle("buy placement", self.buy_placement(tracker, now).await) {
            return Some(action);
        }
        if let Some(action) = settle("buy outbid", self.outbid(tracker, Side::Buy).await) {
            return Some(action);
        }
        settle("buy gap", self.gap(tracker, Side::Buy).await)
    }

    async fn sell_placement(&mut self, tracker: &OrderBookTracker, now: Instant) -> Step {
        if !self.intent.wants_sell() {
            return Err(Decline::NoIntent);
        }
        if tracker.own().best_sell.is_present() {
            return Err(Decline::AlreadyResting);
        }
        let increment = positive_increment(tracker)?;
        let book = tracker.book();
        if book.best_sell.is_empty() {
            return Err(Decline::NoReference);
        }

        let price = book.best_sell.price - increment;
        if price <= self.intent.sell {
            return Err(Decline::BeyondLimit);
        }
        if price <= book.best_buy.price {
            return Err(Decline::Crossed);
        }

        let balance = tracker.available_balance().await;
        let quantity = sell_quantity(&self.intent, balance, price, tracker.spec());
        let quantity = validated_quantity(quantity, price, tracker.spec())?;

        self.place(tracker, Side::Sell, price, quantity, now).await
    }

    async fn buy_placement(&mut self, tracker: &OrderBookTracker, now: Instant) -> Step {
        if !self.intent.wants_buy() {
            return Err(Decline::NoIntent);
        }
        if tracker.own().best_buy.is_present() {
            return Err(Decline::AlreadyResting);
        }
        let increment = positive_increment(tracker)?;
        let book = tracker.book();
        if book.best_sell.is_empty() {
            return Err(Decline::NoReference);
        }

        // An empty buy side has the zero sentinel, so this opens at one increment.
        let price = book.best_buy.price + increment;
        if price >= self.intent.buy {
            return Err(Decline::BeyondLimit);
        }
        if price >= book.best_sell.price {
            return Err(Decline::Crossed);
        }

        let balance = tracker.available_balance().await;
        let quantity = buy_quantity(&self.intent, balance, price, tracker.spec());
        let quantity = validated_quantity(quantity, price, tracker.spec())?;

        self.place(tracker, Side::Buy, price, quantity, now).await
    }

    /// Cage check, then submit
    async fn place(
        &mut self,
        tracker: &OrderBookTracker,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        now: Instant,
    ) -> Step {
        if !self.cage.allow_at(side, price, now) {
            return Err(Decline::Caged);
        }

        let status = match tracker.place_limit_order(side, price, quantity).await {
            Ok(PlacementOutcome::Accepted(_)) => PlaceStatus::Accepted,
            Ok(PlacementOutcome::InsufficientBalance) => PlaceStatus::InsufficientBalance,
            Err(e) => {
                error!(%side, %price, %quantity, "Placement failed: {}", e);
                PlaceStatus::Failed
            }
        };
        Ok(EngineAction::Placed {
            side,
            price,
            quantity,
            status,
        })
    }

    /// Cancel our side when a rival quotes a better price
    async fn outbid(&self, tracker: &mut OrderBookTracker, side: Side) -> Step {
        if !self.wants(side) {
            return Err(Decline::NoIntent);
        }
        let own = tracker.own().side(side);
        if own.is_empty() {
            return Err(Decline::NothingResting);
        }
        let book = tracker.book();
        let outbid = match side {
            Side::Sell => book.best_sell.is_present() && own.price > book.best_sell.price,
            Side::Buy => book.best_buy.is_present() && own.price < book.best_buy.price,
        };
        if !outbid {
            return Err(Decline::NotOutbid);
        }
        Ok(cancel(tracker, side, CancelReason::Outbid).await)
    }

    /// Cancel our side when it is not one increment from a rival level
    async fn gap(&self, tracker: &mut OrderBookTracker, side: Side) -> Step {
        if !self.wants(side) {
            return Err(Decline::NoIntent);
        }
        let own = tracker.own().side(side);
        if own.is_empty() {
            return Err(Decline::NothingResting);
        }
        let increment = positive_increment(tracker)?;
        let book = tracker.book();
        let (neighbour, best, second) = match side {
            Side::Sell => (own.price + increment, book.best_sell.price, book.second_sell.price),
            Side::Buy => (own.price - increment, book.best_buy.price, book.second_buy.price),
        };
        if neighbour == best || neighbour == second {
            return Err(Decline::NoGap);
        }
        Ok(cancel(tracker, side, CancelReason::Gap).await)
    }

    fn wants(&self, side: Side) -> bool {
        match side {
            Side::Buy => self.intent.wants_buy(),
            Side::Sell => self.intent.wants_sell(),
        }
    }
}

/// Log a check's outcome, returning the action if it acted
fn settle(check: &str, step: Step) -> Option<EngineAction> {
    match step {
        Ok(action) => Some(action),
        Err(decline) => {
            debug!(check, %decline, "Declined");
            None
        }
    }
}

async fn cancel(tracker: &mut OrderBookTracker, side: Side, reason: CancelReason) -> EngineAction {
    if let Err(e) = tracker.cancel_side(side).await {
        error!(%side, ?reason, "Cancel failed: {}", e);
    }
    EngineAction::Cancelled { side, reason }
}

fn positive_increment(tracker: &OrderBookTracker) -> std::result::Result<Decimal, Decline> {
    let increment = tracker.increment();
    if increment <= Decimal::ZERO {
        return Err(Decline::NoIncrement);
    }
    Ok(increment)
}

/// Wanted size capped by what is available and by the balance floor
fn sell_quantity(intent: &TradingIntent, balance: Balance, price: Decimal, spec: &PairSpec) -> Decimal {
    intent
        .order_quantity(price, spec.quantity_precision)
        .min(balance.available)
        .min(balance.total - intent.min_balance)
}

/// Wanted size capped by the room left below the balance ceiling
fn buy_quantity(intent: &TradingIntent, balance: Balance, price: Decimal, spec: &PairSpec) -> Decimal {
    intent
        .order_quantity(price, spec.quantity_precision)
        .min(intent.max_balance - balance.total)
}

/// Truncate to the pair's precision and enforce its minimums
fn validated_quantity(quantity: Decimal, price: Decimal, spec: &PairSpec) -> std::result::Result<Decimal, Decline> {
    let quantity = truncate_quantity(quantity, spec.quantity_precision);
    if quantity <= Decimal::ZERO || quantity < spec.min_quantity {
        return Err(Decline::QuantityTooSmall);
    }
    if quantity * price < spec.min_cost {
        return Err(Decline::CostTooSmall);
    }
    Ok(quantity)
}

/// Drop digits beyond `precision`, never rounding up
pub fn truncate_quantity(quantity: Decimal, precision: u32) -> Decimal {
    quantity.round_dp_with_strategy(precision, RoundingStrategy::ToZero)
}
