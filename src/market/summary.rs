//! Top-of-book and own-order summaries

use rust_decimal::Decimal;
use std::fmt;

use crate::common::types::{PriceLevel, Side};
use crate::probit::messages::{BookLevel, OwnOrder};

/// Best and second-best market levels on each side
///
/// Rebuilt from scratch for every snapshot. Absent levels hold the zero-price
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BookSummary {
    pub best_buy: PriceLevel,
    pub second_buy: PriceLevel,
    pub best_sell: PriceLevel,
    pub second_sell: PriceLevel,
}

impl BookSummary {
    /// Rank a complete set of levels
    ///
    /// Levels without positive quantity are ignored. Levels repeating a
    /// price are merged into one rank with their quantities summed.
    pub fn from_levels(levels: &[BookLevel]) -> Self {
        let mut summary = BookSummary::default();
        for level in levels.iter().filter(|l| l.quantity > Decimal::ZERO && l.price > Decimal::ZERO) {
            let candidate = PriceLevel::new(level.price, level.quantity);
            match level.side {
                Side::Buy => rank(&mut summary.best_buy, &mut summary.second_buy, candidate, |a, b| a > b),
                Side::Sell => rank(&mut summary.best_sell, &mut summary.second_sell, candidate, |a, b| a < b),
            }
        }
        summary
    }

    /// Gaps in price increments: second sell to best sell, best sell to best
    /// buy, best buy to second buy
    ///
    /// A gap touching an absent level, or any gap with an unknown increment,
    /// is zero.
    pub fn gaps(&self, increment: Decimal) -> [Decimal; 3] {
        let steps = |high: PriceLevel, low: PriceLevel| {
            if increment <= Decimal::ZERO || high.is_empty() || low.is_empty() {
                Decimal::ZERO
            } else {
                ((high.price - low.price) / increment).normalize()
            }
        };
        [
            steps(self.second_sell, self.best_sell),
            steps(self.best_sell, self.best_buy),
            steps(self.best_buy, self.second_buy),
        ]
    }

    /// Display adapter for the gaps at a given increment
    pub fn display_gaps(&self, increment: Decimal) -> GapDisplay {
        GapDisplay(self.gaps(increment))
    }
}

/// Insert `candidate` into a best/second pair ordered by `better`
fn rank(
    best: &mut PriceLevel,
    second: &mut PriceLevel,
    candidate: PriceLevel,
    better: impl Fn(Decimal, Decimal) -> bool,
) {
    if best.is_empty() {
        *best = candidate;
    } else if candidate.price == best.price {
        best.quantity += candidate.quantity;
    } else if better(candidate.price, best.price) {
        *second = *best;
        *best = candidate;
    } else if second.is_empty() || better(candidate.price, second.price) {
        *second = candidate;
    } else if candidate.price == second.price {
        second.quantity += candidate.quantity;
    }
}

/// The three book gaps rendered as `a|b|c`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapDisplay(pub [Decimal; 3]);

impl fmt::Display for GapDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.0[0], self.0[1], self.0[2])
    }
}

/// Our own best resting order on each side
///
/// Quantities are what remains of each order after cancellations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OwnSummary {
    pub best_buy: PriceLevel,
    pub best_sell: PriceLevel,
}

impl OwnSummary {
    /// Summarize the open orders of one pair
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a OwnOrder>) -> Self {
        let mut summary = OwnSummary::default();
        for order in orders {
            let remaining = order.remaining();
            if remaining <= Decimal::ZERO {
                continue;
            }
            let level = PriceLevel::new(order.limit_price, remaining);
            match order.side {
                Side::Buy => {
                    if level.price > summary.best_buy.price {
                        summary.best_buy = level;
                    }
                }
                Side::Sell => {
                    if summary.best_sell.is_empty() || level.price < summary.best_sell.price {
                        summary.best_sell = level;
                    }
                }
            }
        }
        summary
    }

    pub fn side(&self, side: Side) -> PriceLevel {
        match side {
            Side::Buy => self.best_buy,
            Side::Sell => self.best_sell,
        }
    }
}

impl fmt::Display for OwnSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buy {} / sell {}", self.best_buy, self.best_sell)
    }
}
