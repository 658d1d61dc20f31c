//! Per-side repricing throttle
//!
//! After a placement on a side, further placements on that side within the
//! window are only let through at a price no more aggressive than the last
//! accepted price moved by the band: no higher for buys, no lower for sells.

use rust_decimal::Decimal;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::common::types::Side;
use crate::config::types::CageConfig;

#[derive(Debug, Clone, Copy, Default)]
struct CageSide {
    until: Option<Instant>,
    reference: Decimal,
}

/// Cooldown window and reference price for each side
#[derive(Debug, Clone)]
pub struct SafetyCage {
    window: Duration,
    /// Band as a fraction, e.g. 0.02
    band: Decimal,
    buy: CageSide,
    sell: CageSide,
}

impl Default for SafetyCage {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Decimal::new(2, 2))
    }
}

impl SafetyCage {
    pub fn new(window: Duration, band: Decimal) -> Self {
        Self {
            window,
            band,
            buy: CageSide::default(),
            sell: CageSide::default(),
        }
    }

    pub fn from_config(config: &CageConfig) -> Self {
        Self::new(
            Duration::from_secs(config.window_seconds),
            config.band_percent / Decimal::ONE_HUNDRED,
        )
    }

    /// Pass a buy at `price` through the cage, arming it on success
    pub fn allow_buy_at(&mut self, price: Decimal, now: Instant) -> bool {
        let side = &mut self.buy;
        if side.until.map_or(false, |until| now < until) && price > side.reference {
            debug!(%price, reference = %side.reference, "Buy held by cage");
            return false;
        }
        side.until = Some(now + self.window);
        side.reference = price * (Decimal::ONE + self.band);
        true
    }

    /// Pass a sell at `price` through the cage, arming it on success
    pub fn allow_sell_at(&mut self, price: Decimal, now: Instant) -> bool {
        let side = &mut self.sell;
        if side.until.map_or(false, |until| now < until) && price < side.reference {
            debug!(%price, reference = %side.reference, "Sell held by cage");
            return false;
        }
        side.until = Some(now + self.window);
        side.reference = price * (Decimal::ONE - self.band);
        true
    }

    pub fn allow_at(&mut self, side: Side, price: Decimal, now: Instant) -> bool {
        match side {
            Side::Buy => self.allow_buy_at(price, now),
            Side::Sell => self.allow_sell_at(price, now),
        }
    }
}
