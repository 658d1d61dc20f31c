//! Market module - per-pair book tracking and the stream hand-off

pub mod feed;
pub mod runner;
pub mod summary;
pub mod tracker;

pub use feed::{pair_feed, FeedEvent, PairFeed};
pub use runner::run_pair;
pub use summary::{BookSummary, OwnSummary};
pub use tracker::OrderBookTracker;
