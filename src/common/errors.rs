//! Error types for the application

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using our ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport or connect failure on a REST call
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Malformed response body
    #[error("Decode error: {0}")]
    Decode(String),

    /// The exchange signalled an excessive request rate; calls are refused until `until`
    #[error("Rate limited until {until}")]
    RateLimited { until: DateTime<Utc> },

    /// Missing or rejected access token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown pair or spec
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success HTTP status not covered by a more specific variant
    #[error("Exchange returned status {status}: {body}")]
    Exchange { status: u16, body: String },

    /// WebSocket connection errors
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    /// WebSocket send/receive errors
    #[error("WebSocket communication error: {0}")]
    WebSocketCommunication(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credential files missing or unreadable
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Several independent failures, e.g. one per cancelled order
    #[error("{} errors: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<ClientError>),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl ClientError {
    /// Collapse a list of failures into a single error, if there are any.
    pub fn aggregate(mut errors: Vec<ClientError>) -> Option<ClientError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ClientError::Aggregate(errors)),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimited { .. })
    }
}

fn join_errors(errors: &[ClientError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocketCommunication(err.to_string())
    }
}
