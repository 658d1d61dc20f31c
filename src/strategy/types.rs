use rust_decimal::Decimal;
use std::fmt;

use crate::common::types::Side;

/// Why an own side was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A rival now quotes a better price than our resting order
    Outbid,
    /// Our order is not one increment away from the next rival level
    Gap,
}

/// What became of a placement the engine attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceStatus {
    Accepted,
    /// The exchange reported insufficient balance; nothing rests
    InsufficientBalance,
    /// The request failed; logged and retried on a later update
    Failed,
}

/// The single action taken for one book update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    Placed {
        side: Side,
        price: Decimal,
        quantity: Decimal,
        status: PlaceStatus,
    },
    Cancelled {
        side: Side,
        reason: CancelReason,
    },
}

impl fmt::Display for EngineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineAction::Placed {
                side,
                price,
                quantity,
                status,
            } => write!(f, "place {} {} @ {} ({:?})", side, quantity, price, status),
            EngineAction::Cancelled { side, reason } => write!(f, "cancel {}s ({:?})", side, reason),
        }
    }
}

/// Why a check chose not to act
///
/// These are normal outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decline {
    /// No intent to trade this side
    NoIntent,
    /// An own order already rests on this side
    AlreadyResting,
    /// No own order rests on this side
    NothingResting,
    /// The market level the price is derived from is absent
    NoReference,
    /// The pair's price increment is unknown
    NoIncrement,
    /// The candidate price is outside the configured floor or ceiling
    BeyondLimit,
    /// The candidate price would cross the opposite side
    Crossed,
    /// The computed quantity is zero or below the pair minimum
    QuantityTooSmall,
    /// The order value is below the pair's minimum cost
    CostTooSmall,
    /// The safety cage refused the price
    Caged,
    /// The own order still holds the best price
    NotOutbid,
    /// The own order sits one increment from a rival level
    NoGap,
}

impl fmt::Display for Decline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Decline::NoIntent => "no intent",
            Decline::AlreadyResting => "order already resting",
            Decline::NothingResting => "nothing resting",
            Decline::NoReference => "no reference level",
            Decline::NoIncrement => "unknown increment",
            Decline::BeyondLimit => "beyond configured limit",
            Decline::Crossed => "would cross the book",
            Decline::QuantityTooSmall => "quantity too small",
            Decline::CostTooSmall => "cost too small",
            Decline::Caged => "held by safety cage",
            Decline::NotOutbid => "not outbid",
            Decline::NoGap => "no gap",
        };
        f.write_str(text)
    }
}
