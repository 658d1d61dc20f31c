use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::common::errors::{ClientError, Result};
use crate::config::types::PairTradeConfig;

/// What the engine is trying to do on one pair
///
/// Built once from configuration; never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingIntent {
    pub pair: String,
    /// Highest price to buy at; zero disables buying
    pub buy: Decimal,
    /// Lowest price to sell at; zero disables selling
    pub sell: Decimal,
    pub quantity: Decimal,
    pub quote_quantity: Decimal,
    pub max_balance: Decimal,
    pub min_balance: Decimal,
}

impl TradingIntent {
    /// Build the intent for one pair
    ///
    /// `rough_price` turns quote-valued balance bounds into base quantities
    /// when the base bounds are unset. Exactly one of `quantity` and
    /// `quote_quantity` must be non-zero.
    pub fn from_config(config: &PairTradeConfig, rough_price: Decimal) -> Result<Self> {
        if config.quantity.is_zero() == config.quote_quantity.is_zero() {
            return Err(ClientError::Configuration(format!(
                "{}: set exactly one of quantity and quote_quantity",
                config.pair
            )));
        }
        if config.quantity.is_sign_negative() || config.quote_quantity.is_sign_negative() {
            return Err(ClientError::Configuration(format!("{}: negative order size", config.pair)));
        }

        let mut max_balance = config.max_balance;
        if max_balance.is_zero() {
            max_balance = if !config.max_quote_balance.is_zero() && !rough_price.is_zero() {
                config.max_quote_balance / rough_price
            } else if !config.quantity.is_zero() {
                config.quantity
            } else if !rough_price.is_zero() {
                config.quote_quantity / rough_price
            } else {
                Decimal::ZERO
            };
        }
        if max_balance.is_zero() && !config.buy.is_zero() {
            warn!(pair = %config.pair, "Maximum balance is zero, buying is effectively disabled");
        }

        let mut min_balance = config.min_balance;
        if min_balance.is_zero() && !config.min_quote_balance.is_zero() && !rough_price.is_zero() {
            min_balance = config.min_quote_balance / rough_price;
        }

        Ok(Self {
            pair: config.pair.clone(),
            buy: config.buy,
            sell: config.sell,
            quantity: config.quantity,
            quote_quantity: config.quote_quantity,
            max_balance,
            min_balance,
        })
    }

    pub fn wants_buy(&self) -> bool {
        self.buy > Decimal::ZERO
    }

    pub fn wants_sell(&self) -> bool {
        self.sell > Decimal::ZERO
    }

    /// Base quantity wanted for an order at `price`
    pub fn order_quantity(&self, price: Decimal, precision: u32) -> Decimal {
        if !self.quantity.is_zero() {
            return self.quantity;
        }
        if price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.quote_quantity / price).round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
    }
}
