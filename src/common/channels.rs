//! Channel type definitions for inter-task communication

use tokio::sync::mpsc;

use crate::market::feed::FeedEvent;

/// Feed buffer size when `feed_buffer` is not configured
pub const DEFAULT_FEED_SIZE: usize = 64;

/// Create a new pair feed channel with a custom buffer size
pub fn create_feed_channel_with_size(
    size: usize,
) -> (mpsc::Sender<FeedEvent>, mpsc::Receiver<FeedEvent>) {
    mpsc::channel(size.max(1))
}
