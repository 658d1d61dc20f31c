//! Exchange session combining authentication, REST calls and the stream

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

use super::auth::Credentials;
use super::messages::*;
use super::rest::ProbitRestClient;
use super::websocket::{PairRegistry, SharedRegistry, StreamConfig, StreamHandle};
use crate::common::errors::{ClientError, Result};
use crate::common::traits::{ExchangeGateway, MarketListener};
use crate::common::types::{Balance, ConnectionState};
use crate::config::credentials::load_credentials;
use crate::config::types::{AppConfig, AppSettings, ExchangeConfig};

/// Poll interval of the startup bootstrap waiting for the first token
const BOOTSTRAP_POLL: Duration = Duration::from_millis(500);

/// One authenticated session against ProBit
///
/// Holds the pair specs, the listener registry and the stream handle. The
/// token and rate-limit cooldown live in the REST client's shared state, so
/// every call made through the session sees the same cooldown.
pub struct ExchangeSession {
    rest: ProbitRestClient,
    credentials: Credentials,
    specs: RwLock<HashMap<String, Arc<PairSpec>>>,
    registry: SharedRegistry,
    stream: Mutex<Option<StreamHandle>>,
    stream_config: StreamConfig,
    settings: AppSettings,
}

impl ExchangeSession {
    /// Create a session from endpoint configuration and loaded credentials
    pub fn new(exchange: &ExchangeConfig, settings: &AppSettings, credentials: Credentials) -> Result<Self> {
        let rest = ProbitRestClient::with_timeout(
            &exchange.rest_url,
            &exchange.accounts_url,
            settings.request_timeout(),
        )?
        .with_penalties(settings.order_penalty(), settings.query_penalty());

        let stream_config = StreamConfig {
            url: exchange.websocket_url.clone(),
            subscribe_delay: settings.subscribe_delay(),
            reconnect_delay: settings.reconnect_delay(),
        };

        Ok(Self {
            rest,
            credentials,
            specs: RwLock::new(HashMap::new()),
            registry: Arc::new(RwLock::new(PairRegistry::new())),
            stream: Mutex::new(None),
            stream_config,
            settings: settings.clone(),
        })
    }

    /// Create a session, reading the credential files named in the configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let credentials = load_credentials(&config.exchange.id_file, &config.exchange.secret_file)?;
        Self::new(&config.exchange, &config.settings, credentials)
    }

    /// Get a reference to the REST client
    pub fn rest(&self) -> &ProbitRestClient {
        &self.rest
    }

    // ========================================================================
    // Pair Specs
    // ========================================================================

    /// Fetch the spec of every pair and replace the spec table
    #[instrument(skip(self))]
    pub async fn fetch_all_specs(&self) -> Result<Vec<PairSpec>> {
        let specs = self.rest.market_specs().await?;
        let mut table = self.specs.write().await;
        table.clear();
        for spec in &specs {
            table.insert(spec.id.clone(), Arc::new(spec.clone()));
        }
        info!("Loaded specs for {} pairs", table.len());
        Ok(specs)
    }

    pub async fn get_spec(&self, pair: &str) -> Result<Arc<PairSpec>> {
        self.specs
            .read()
            .await
            .get(pair)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("no spec for pair {}", pair)))
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Make sure a token with more than a minute of validity is held
    ///
    /// Waits out an active rate-limit cooldown before asking for a new token.
    #[instrument(skip(self))]
    pub async fn ensure_authenticated(&self) -> Result<()> {
        if !self.rest.needs_auth().await {
            return Ok(());
        }
        self.wait_for_cooldown().await;
        self.rest.request_token(&self.credentials).await?;
        Ok(())
    }

    /// Block until no rate-limit cooldown is active
    pub async fn wait_for_cooldown(&self) {
        if let Some(until) = self.rest.cooldown_until().await {
            info!(%until, "Waiting for rate-limit cooldown to lapse");
        }
        while self.rest.cooldown_until().await.is_some() {
            sleep(self.settings.rate_limit_poll()).await;
        }
    }

    /// Spawn the token refresh loop and wait for the first token
    ///
    /// The loop re-checks the token every `auth_check_interval` for the life
    /// of the process; failures are logged and retried on the next tick.
    pub async fn start_auth(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let interval = self.settings.auth_check_interval();
        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = session.ensure_authenticated().await {
                    error!("Authentication failed: {}", e);
                }
                sleep(interval).await;
            }
        });

        while self.rest.current_token().await.is_none() {
            sleep(BOOTSTRAP_POLL).await;
        }
        info!("Authenticated");
        handle
    }

    // ========================================================================
    // Stream
    // ========================================================================

    /// Start the stream supervisor; a no-op if it is already running
    #[instrument(skip(self), fields(url = %self.stream_config.url))]
    pub async fn open_stream(&self) -> Result<()> {
        let mut stream = self.stream.lock().await;
        if stream.is_some() {
            debug!("Stream already open");
            return Ok(());
        }
        *stream = Some(StreamHandle::spawn(
            self.stream_config.clone(),
            self.rest.state(),
            self.registry.clone(),
        ));
        Ok(())
    }

    /// Close the stream without reconnecting
    #[instrument(skip(self))]
    pub async fn close_stream(&self) -> Result<()> {
        let handle = self.stream.lock().await.take();
        match handle {
            Some(handle) => handle.close().await,
            None => Ok(()),
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        match self.stream.lock().await.as_ref() {
            Some(handle) => handle.state(),
            None => ConnectionState::Disconnected,
        }
    }

    /// Watch the stream's connection state, if the stream is open
    pub async fn watch_connection(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.stream.lock().await.as_ref().map(|h| h.watch_state())
    }

    /// Send the subscription frame for a pair
    #[instrument(skip(self))]
    pub async fn subscribe(&self, pair: &str) -> Result<()> {
        let frame = serde_json::to_string(&WsSubscription::subscribe(pair))?;
        self.send_frame(frame).await
    }

    /// Send the unsubscription frame for a pair
    #[instrument(skip(self))]
    pub async fn unsubscribe(&self, pair: &str) -> Result<()> {
        let frame = serde_json::to_string(&WsSubscription::unsubscribe(pair))?;
        self.send_frame(frame).await
    }

    async fn send_frame(&self, frame: String) -> Result<()> {
        match self.stream.lock().await.as_ref() {
            Some(handle) => handle.send_text(frame),
            None => Err(ClientError::WebSocketConnection("stream is not open".to_string())),
        }
    }

    /// Bind a pair to its listener
    ///
    /// The listener is told the pair's price increment. If the stream is
    /// already open the pair is subscribed right away; otherwise it is
    /// subscribed when the stream connects.
    #[instrument(skip(self, listener))]
    pub async fn register_pair(&self, pair: &str, listener: Arc<dyn MarketListener>) -> Result<()> {
        let spec = self.get_spec(pair).await?;
        listener.set_increment(spec.price_increment);
        self.registry.write().await.insert(pair, listener);
        info!(pair, increment = %spec.price_increment, "Pair registered");

        if self.stream.lock().await.is_some() {
            self.subscribe(pair).await?;
        }
        Ok(())
    }

    /// Unsubscribe a pair and drop its listener
    #[instrument(skip(self))]
    pub async fn unregister_pair(&self, pair: &str) -> Result<()> {
        if self.registry.write().await.remove(pair).is_none() {
            return Err(ClientError::NotFound(format!("pair {} is not registered", pair)));
        }
        if self.stream.lock().await.is_some() {
            self.unsubscribe(pair).await?;
        }
        info!(pair, "Pair unregistered");
        Ok(())
    }

    /// Registered pairs in registration order
    pub async fn registered_pairs(&self) -> Vec<String> {
        self.registry.read().await.pairs()
    }

    // ========================================================================
    // Orders and Account
    // ========================================================================

    pub async fn place_order(&self, order: &NewOrder) -> Result<PlacementOutcome> {
        self.rest.new_order(order).await
    }

    pub async fn cancel_order(&self, cancel: &CancelOrder) -> Result<()> {
        self.rest.cancel_order(cancel).await
    }

    pub async fn get_open_orders(&self, pair: &str) -> Result<Vec<OwnOrder>> {
        self.rest.open_orders(pair).await
    }

    /// Total and available balance of one currency; zero if none is held
    pub async fn get_balance(&self, currency: &str) -> Result<Balance> {
        let balances = self.rest.balances().await?;
        let balance = balances
            .into_iter()
            .find(|b| b.currency_id == currency)
            .map(|b| Balance::new(b.total, b.available))
            .unwrap_or_default();
        Ok(balance)
    }

    pub async fn get_trade_history(
        &self,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OwnTrade>> {
        self.rest.trade_history(pair, start, end).await
    }

    pub async fn get_market_trades(
        &self,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketTrade>> {
        self.rest.market_trades(pair, start, end).await
    }

    pub async fn get_public_order_book(&self, pair: &str) -> Result<Vec<BookLevel>> {
        self.rest.order_book(pair).await
    }
}

#[async_trait]
impl ExchangeGateway for ExchangeSession {
    async fn place_order(&self, order: NewOrder) -> Result<PlacementOutcome> {
        ExchangeSession::place_order(self, &order).await
    }

    async fn cancel_order(&self, cancel: CancelOrder) -> Result<()> {
        ExchangeSession::cancel_order(self, &cancel).await
    }

    async fn open_orders(&self, pair: &str) -> Result<Vec<OwnOrder>> {
        self.get_open_orders(pair).await
    }

    async fn balance(&self, currency: &str) -> Result<Balance> {
        self.get_balance(currency).await
    }

    async fn trade_history(
        &self,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OwnTrade>> {
        self.get_trade_history(pair, start, end).await
    }

    async fn public_order_book(&self, pair: &str) -> Result<Vec<BookLevel>> {
        self.get_public_order_book(pair).await
    }
}
