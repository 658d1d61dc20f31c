//! Per-pair task driving the tracker and engine from the feed

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::feed::FeedEvent;
use super::tracker::OrderBookTracker;
use crate::strategy::compete::CompeteEngine;

/// Run book-update cycles for one pair until its feed closes
///
/// Cycles never overlap: each snapshot is ingested, own orders are
/// refreshed and the engine decides before the next event is read.
#[instrument(skip_all, fields(pair = %tracker.pair()))]
pub async fn run_pair(
    mut tracker: OrderBookTracker,
    mut engine: CompeteEngine,
    mut events: mpsc::Receiver<FeedEvent>,
) -> OrderBookTracker {
    info!("Pair runner started");

    while let Some(event) = events.recv().await {
        match event {
            FeedEvent::Increment(increment) => tracker.set_increment(increment),
            FeedEvent::Snapshot(data) => {
                if data.order_books.is_empty() {
                    debug!("Frame without order book levels, skipping");
                    continue;
                }
                tracker.ingest_snapshot(&data.order_books);

                if let Err(e) = tracker.refresh_own_orders().await {
                    warn!("Could not refresh own orders, skipping cycle: {}", e);
                    continue;
                }

                if let Some(action) = engine.on_book_update(&mut tracker).await {
                    info!(%action, book = %tracker, "Engine acted");
                }
            }
        }
    }

    info!("Feed closed, pair runner stopping");
    tracker
}
