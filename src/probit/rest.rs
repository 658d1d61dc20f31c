//! REST API client for the ProBit exchange
//!
//! Every call goes through the same [`SessionState`]: while a cooldown set by
//! a 429 response is active, calls fail with [`ClientError::RateLimited`]
//! without touching the network.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use super::auth::{AuthToken, Credentials, SessionState, SharedState};
use super::messages::*;
use crate::common::errors::{ClientError, Result};

/// Body marker of a placement the account cannot cover
const NOT_ENOUGH_BALANCE: &str = r#""NOT_ENOUGH_BALANCE""#;

/// Page size for history queries
const HISTORY_LIMIT: &str = "1000";

/// Cooldown applied after a 429 on order placement/cancellation
pub const ORDER_PENALTY: Duration = Duration::from_secs(120);

/// Cooldown applied after a 429 on lower-priority queries
pub const QUERY_PENALTY: Duration = Duration::from_secs(650);

/// REST API client for ProBit
#[derive(Debug, Clone)]
pub struct ProbitRestClient {
    /// HTTP client
    client: Client,
    /// Base URL of the exchange API
    base_url: String,
    /// Base URL of the accounts (token) API
    accounts_url: String,
    /// Token and cooldown shared with the rest of the session
    state: SharedState,
    order_penalty: Duration,
    query_penalty: Duration,
}

impl ProbitRestClient {
    /// Create a new REST client
    pub fn new(base_url: &str, accounts_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, accounts_url, Duration::from_secs(30))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, accounts_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            accounts_url: accounts_url.trim_end_matches('/').to_string(),
            state: Arc::new(RwLock::new(SessionState::default())),
            order_penalty: ORDER_PENALTY,
            query_penalty: QUERY_PENALTY,
        })
    }

    /// Override the cooldowns applied after a 429
    pub fn with_penalties(mut self, order: Duration, query: Duration) -> Self {
        self.order_penalty = order;
        self.query_penalty = query;
        self
    }

    /// Shared token/cooldown state
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub async fn current_token(&self) -> Option<AuthToken> {
        self.state.read().await.token.clone()
    }

    pub async fn needs_auth(&self) -> bool {
        self.state.read().await.needs_auth_at(Utc::now())
    }

    /// Active cooldown instant, if any
    pub async fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.cooldown_at(Utc::now())
    }

    // ========================================================================
    // Public Endpoints (No Authentication Required)
    // ========================================================================

    /// Get the specs of every pair
    #[instrument(skip(self))]
    pub async fn market_specs(&self) -> Result<Vec<PairSpec>> {
        let url = format!("{}/market", self.base_url);
        let body = self
            .execute("market", self.client.get(&url), self.query_penalty)
            .await?;
        decode::<Vec<PairSpec>>("market", &body)
    }

    /// Get the public order book of a pair
    #[instrument(skip(self))]
    pub async fn order_book(&self, market_id: &str) -> Result<Vec<BookLevel>> {
        let url = format!("{}/order_book", self.base_url);
        let request = self.client.get(&url).query(&[("market_id", market_id)]);
        let body = self
            .execute("order_book", request, self.query_penalty)
            .await?;
        decode::<Vec<BookLevel>>("order_book", &body)
    }

    /// Get public trades of a pair between `start` and `end`
    #[instrument(skip(self))]
    pub async fn market_trades(
        &self,
        market_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketTrade>> {
        let url = format!("{}/trade", self.base_url);
        let request = self.client.get(&url).query(&history_query(market_id, start, end));
        let body = self.execute("trade", request, self.query_penalty).await?;
        decode::<Vec<MarketTrade>>("trade", &body)
    }

    // ========================================================================
    // Token Endpoint
    // ========================================================================

    /// Request a new access token and store it in the shared state
    #[instrument(skip(self, credentials))]
    pub async fn request_token(&self, credentials: &Credentials) -> Result<AuthToken> {
        info!("Requesting a new access token");
        let url = format!("{}/token", self.accounts_url);
        let request = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .header("Authorization", credentials.basic_header())
            .json(&serde_json::json!({ "grant_type": "client_credentials" }));

        let body = self.execute("token", request, self.query_penalty).await?;
        let response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::Decode(format!("token: {}", e)))?;

        let token = AuthToken::from_response(response, Utc::now());
        info!(expires_at = %token.expires_at.format("%H:%M:%S%.3f"), "New access token");
        self.state.write().await.token = Some(token.clone());
        Ok(token)
    }

    // ========================================================================
    // Authenticated Endpoints
    // ========================================================================

    /// Submit an order
    ///
    /// A response reporting insufficient balance is not an error: it yields
    /// [`PlacementOutcome::InsufficientBalance`].
    #[instrument(skip(self, order), fields(market = %order.market_id, side = %order.side))]
    pub async fn new_order(&self, order: &NewOrder) -> Result<PlacementOutcome> {
        let url = format!("{}/new_order", self.base_url);
        let request = self.authorized(self.client.post(&url)).await?.json(order);
        let (status, body) = self.send(request, self.order_penalty).await?;

        if body.contains(NOT_ENOUGH_BALANCE) {
            debug!("Not enough balance for {} {} @ {}", order.quantity, order.side, order.limit_price);
            return Ok(PlacementOutcome::InsufficientBalance);
        }
        check_status("new_order", status, &body)?;

        let placed = decode::<OwnOrder>("new_order", &body)?;
        info!(id = %placed.id, price = %placed.limit_price, quantity = %placed.quantity, "Order accepted");
        Ok(PlacementOutcome::Accepted(placed))
    }

    /// Cancel one order
    #[instrument(skip(self, cancel), fields(market = %cancel.market_id, order = %cancel.order_id))]
    pub async fn cancel_order(&self, cancel: &CancelOrder) -> Result<()> {
        let url = format!("{}/cancel_order", self.base_url);
        let request = self.authorized(self.client.post(&url)).await?.json(cancel);
        self.execute("cancel_order", request, self.order_penalty)
            .await?;
        Ok(())
    }

    /// Get our open orders on a pair
    #[instrument(skip(self))]
    pub async fn open_orders(&self, market_id: &str) -> Result<Vec<OwnOrder>> {
        let url = format!("{}/open_order", self.base_url);
        let request = self
            .authorized(self.client.get(&url))
            .await?
            .query(&[("market_id", market_id)]);
        let body = self
            .execute("open_order", request, self.query_penalty)
            .await?;
        decode::<Vec<OwnOrder>>("open_order", &body)
    }

    /// Get balances of every currency held
    #[instrument(skip(self))]
    pub async fn balances(&self) -> Result<Vec<BalanceEntry>> {
        let url = format!("{}/balance", self.base_url);
        let request = self.authorized(self.client.get(&url)).await?;
        let body = self.execute("balance", request, self.query_penalty).await?;
        decode::<Vec<BalanceEntry>>("balance", &body)
    }

    /// Get our fills on a pair between `start` and `end`
    #[instrument(skip(self))]
    pub async fn trade_history(
        &self,
        market_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OwnTrade>> {
        let url = format!("{}/trade_history", self.base_url);
        let request = self
            .authorized(self.client.get(&url))
            .await?
            .query(&history_query(market_id, start, end));
        let body = self
            .execute("trade_history", request, self.query_penalty)
            .await?;
        decode::<Vec<OwnTrade>>("trade_history", &body)
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    /// Attach the bearer token, failing if none has been obtained yet
    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let state = self.state.read().await;
        let token = state
            .token
            .as_ref()
            .ok_or_else(|| ClientError::Unauthorized("no access token yet".to_string()))?;
        Ok(request
            .header("Accept", "application/json")
            .header("Authorization", token.bearer()))
    }

    /// Send a request and require a success status
    async fn execute(
        &self,
        endpoint: &str,
        request: RequestBuilder,
        penalty: Duration,
    ) -> Result<String> {
        let (status, body) = self.send(request, penalty).await?;
        check_status(endpoint, status, &body)?;
        Ok(body)
    }

    /// Send a request through the cooldown gate
    ///
    /// A 429 response starts a cooldown of `penalty` for the whole session.
    async fn send(&self, request: RequestBuilder, penalty: Duration) -> Result<(StatusCode, String)> {
        if let Some(until) = self.cooldown_until().await {
            debug!(%until, "Skipping request during rate-limit cooldown");
            return Err(ClientError::RateLimited { until });
        }

        let response = request.send().await.map_err(|e| {
            error!("Request failed: {}", e);
            ClientError::Network(e)
        })?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let penalty = ChronoDuration::from_std(penalty).unwrap_or_else(|_| ChronoDuration::zero());
            let until = self.state.write().await.extend_cooldown(Utc::now() + penalty);
            warn!(%until, "Rate limited by the exchange");
            return Err(ClientError::RateLimited { until });
        }

        Ok((status, body))
    }
}

/// Map a non-success status to an error
fn check_status(endpoint: &str, status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    error!(endpoint, status = status.as_u16(), "Unexpected response: {}", body);
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized(body.to_string()));
    }
    Err(ClientError::Exchange {
        status: status.as_u16(),
        body: body.to_string(),
    })
}

/// Decode a `{"data": ...}` envelope
fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|e| {
            error!(endpoint, "Malformed response: {}", e);
            ClientError::Decode(format!("{}: {}", endpoint, e))
        })
}

/// ISO-8601 UTC with millisecond precision, as the history endpoints expect
pub fn format_query_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn history_query(market_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, String)> {
    vec![
        ("market_id", market_id.to_string()),
        ("limit", HISTORY_LIMIT.to_string()),
        ("start_time", format_query_time(start)),
        ("end_time", format_query_time(end)),
    ]
}
