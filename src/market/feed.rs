//! Non-blocking hand-off from the stream to a pair's runner

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::common::channels::create_feed_channel_with_size;
use crate::common::traits::MarketListener;
use crate::probit::messages::MarketData;

/// Event delivered to a pair's runner
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The pair's price increment
    Increment(Decimal),
    /// A marketdata frame for the pair
    Snapshot(MarketData),
}

/// Listener that forwards everything over a bounded channel
///
/// Called from the stream's delivery task, so it never waits: when the
/// runner falls behind, new snapshots are dropped.
pub struct PairFeed {
    pair: String,
    sender: mpsc::Sender<FeedEvent>,
}

impl PairFeed {
    pub fn new(pair: impl Into<String>, sender: mpsc::Sender<FeedEvent>) -> Self {
        Self {
            pair: pair.into(),
            sender,
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    fn forward(&self, event: FeedEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(FeedEvent::Snapshot(_))) => {
                warn!(pair = %self.pair, "Runner busy, dropping snapshot");
            }
            Err(TrySendError::Full(event)) => {
                warn!(pair = %self.pair, "Runner busy, dropping {:?}", event);
            }
            Err(TrySendError::Closed(_)) => {
                warn!(pair = %self.pair, "Runner gone, dropping event");
            }
        }
    }
}

impl MarketListener for PairFeed {
    fn set_increment(&self, increment: Decimal) {
        self.forward(FeedEvent::Increment(increment));
    }

    fn on_market_data(&self, data: MarketData) {
        self.forward(FeedEvent::Snapshot(data));
    }
}

/// Create a feed for `pair` and the receiver its runner reads from
pub fn pair_feed(pair: &str, buffer: usize) -> (Arc<PairFeed>, mpsc::Receiver<FeedEvent>) {
    let (sender, receiver) = create_feed_channel_with_size(buffer);
    (Arc::new(PairFeed::new(pair, sender)), receiver)
}
