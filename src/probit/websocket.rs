//! Streaming connection to the ProBit websocket
//!
//! A supervisor task owns the socket for its whole life. On every
//! (re)connect it sends the authorization frame and subscribes each
//! registered pair in registration order. An unexpected disconnect moves the
//! state to `Reconnecting` and starts over; only [`StreamHandle::close`]
//! ends the task.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, instrument, warn};

use super::auth::SharedState;
use super::messages::*;
use crate::common::errors::{ClientError, Result};
use crate::common::traits::MarketListener;
use crate::common::types::ConnectionState;

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Unrecognised frames are logged up to this many characters
const LOG_TRUNCATE: usize = 200;

/// Pairs bound to their listeners, remembering registration order
#[derive(Default)]
pub struct PairRegistry {
    order: Vec<String>,
    listeners: HashMap<String, Arc<dyn MarketListener>>,
}

impl PairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a pair; re-registering keeps its original position
    pub fn insert(&mut self, pair: &str, listener: Arc<dyn MarketListener>) {
        if self.listeners.insert(pair.to_string(), listener).is_none() {
            self.order.push(pair.to_string());
        }
    }

    pub fn remove(&mut self, pair: &str) -> Option<Arc<dyn MarketListener>> {
        self.order.retain(|p| p != pair);
        self.listeners.remove(pair)
    }

    pub fn get(&self, pair: &str) -> Option<Arc<dyn MarketListener>> {
        self.listeners.get(pair).cloned()
    }

    /// Registered pairs in registration order
    pub fn pairs(&self) -> Vec<String> {
        self.order.clone()
    }
}

/// Registry shared between the session and the supervisor
pub type SharedRegistry = Arc<RwLock<PairRegistry>>;

/// Connection parameters for the supervisor
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket URL
    pub url: String,
    /// Pause before each subscription frame
    pub subscribe_delay: Duration,
    /// Pause after a failed connection attempt
    pub reconnect_delay: Duration,
}

impl StreamConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            subscribe_delay: Duration::from_millis(10),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
enum StreamCommand {
    Send(String),
    Close,
}

/// Why a connected socket stopped
enum Exit {
    Requested,
    Dropped,
}

/// Handle to a running stream supervisor
pub struct StreamHandle {
    commands: mpsc::UnboundedSender<StreamCommand>,
    state: watch::Receiver<ConnectionState>,
    closing: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Spawn the supervisor task
    pub fn spawn(config: StreamConfig, session: SharedState, registry: SharedRegistry) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let closing = Arc::new(AtomicBool::new(false));

        let supervisor = Supervisor {
            config,
            session,
            registry,
            closing: closing.clone(),
            state: state_tx,
        };
        let task = tokio::spawn(supervisor.run(command_rx));

        Self {
            commands,
            state,
            closing,
            task,
        }
    }

    /// Queue a text frame for the current connection
    pub fn send_text(&self, text: String) -> Result<()> {
        self.commands
            .send(StreamCommand::Send(text))
            .map_err(|e| ClientError::ChannelSend(e.to_string()))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Close the socket without reconnecting and wait for the supervisor to end
    pub async fn close(self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);
        // The supervisor may already be gone; joining below covers both cases.
        let _ = self.commands.send(StreamCommand::Close);
        self.task
            .await
            .map_err(|e| ClientError::WebSocketConnection(e.to_string()))
    }
}

struct Supervisor {
    config: StreamConfig,
    session: SharedState,
    registry: SharedRegistry,
    closing: Arc<AtomicBool>,
    state: watch::Sender<ConnectionState>,
}

impl Supervisor {
    #[instrument(skip_all, fields(url = %self.config.url))]
    async fn run(self, mut commands: mpsc::UnboundedReceiver<StreamCommand>) {
        let mut connected_before = false;

        loop {
            if self.closing.load(Ordering::SeqCst) {
                break;
            }
            self.state.send_replace(if connected_before {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            });

            info!("Connecting to ProBit WebSocket");
            let ws_stream = match connect_async(&self.config.url).await {
                Ok((ws_stream, _response)) => ws_stream,
                Err(e) => {
                    error!("WebSocket connect failed: {}", e);
                    if self.wait_before_retry(&mut commands).await {
                        break;
                    }
                    continue;
                }
            };
            connected_before = true;
            info!("WebSocket connection established");

            let (mut write, mut read) = ws_stream.split();
            if let Err(e) = self.authorize_and_subscribe(&mut write).await {
                warn!("Lost connection while subscribing: {}", e);
                if self.wait_before_retry(&mut commands).await {
                    break;
                }
                continue;
            }
            self.state.send_replace(ConnectionState::Connected);

            let exit = loop {
                tokio::select! {
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text).await,
                        Some(Ok(Message::Binary(data))) => {
                            debug!("Received {} bytes of binary data", data.len());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("WebSocket closed by server: {:?}", frame);
                            break Exit::Dropped;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            break Exit::Dropped;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            break Exit::Dropped;
                        }
                    },
                    command = commands.recv() => match command {
                        Some(StreamCommand::Send(text)) => {
                            debug!("Sending: {}", text);
                            if let Err(e) = write.send(Message::Text(text)).await {
                                error!("WebSocket send failed: {}", e);
                                break Exit::Dropped;
                            }
                        }
                        Some(StreamCommand::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break Exit::Requested;
                        }
                    },
                }
            };

            match exit {
                Exit::Requested => break,
                Exit::Dropped if self.closing.load(Ordering::SeqCst) => {
                    warn!("Disconnected while closing, not reconnecting");
                    break;
                }
                Exit::Dropped => {
                    warn!("Disconnected from server, reconnecting");
                    if self.wait_before_retry(&mut commands).await {
                        break;
                    }
                }
            }
        }

        self.state.send_replace(ConnectionState::Closed);
        info!("WebSocket closed on request");
    }

    /// Sleep before another connection attempt; true if a close was requested meanwhile
    async fn wait_before_retry(&self, commands: &mut mpsc::UnboundedReceiver<StreamCommand>) -> bool {
        let delay = sleep(self.config.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => return self.closing.load(Ordering::SeqCst),
                command = commands.recv() => match command {
                    Some(StreamCommand::Send(text)) => {
                        warn!("Dropping frame while disconnected: {}", truncate(&text));
                    }
                    Some(StreamCommand::Close) | None => return true,
                },
            }
        }
    }

    /// Authorize the fresh socket and subscribe every registered pair
    async fn authorize_and_subscribe(&self, write: &mut WsWriter) -> Result<()> {
        let token = self.session.read().await.token.clone();
        match token {
            Some(token) => {
                let frame = serde_json::to_string(&WsAuthorization::new(&token.access_token))?;
                write.send(Message::Text(frame)).await?;
            }
            None => warn!("No access token yet, connecting unauthorized"),
        }

        let pairs = self.registry.read().await.pairs();
        info!("Subscribing {} pairs", pairs.len());
        for pair in &pairs {
            sleep(self.config.subscribe_delay).await;
            let frame = serde_json::to_string(&WsSubscription::subscribe(pair))?;
            write.send(Message::Text(frame)).await?;
        }
        Ok(())
    }

    /// Route one inbound text frame
    async fn dispatch(&self, text: &str) {
        match InboundKind::classify(text) {
            InboundKind::MarketData => {
                let data: MarketData = match serde_json::from_str(text) {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to parse market data: {} - {}", e, truncate(text));
                        return;
                    }
                };
                let listener = self.registry.read().await.get(&data.market_id);
                match listener {
                    Some(listener) => listener.on_market_data(data),
                    None => warn!(pair = %data.market_id, "Market data for an unregistered pair"),
                }
            }
            InboundKind::AuthorizationOk => info!("Stream authorized"),
            InboundKind::Unauthorized => error!("Stream unauthorized: {}", truncate(text)),
            InboundKind::PingTimeout => error!("Stream ping timeout: {}", truncate(text)),
            InboundKind::Unrecognized => error!("Unhandled frame: {}", truncate(text)),
        }
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(LOG_TRUNCATE) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probit::messages::MarketData;
    use rust_decimal::Decimal;

    struct NullListener;

    impl MarketListener for NullListener {
        fn set_increment(&self, _increment: Decimal) {}
        fn on_market_data(&self, _data: MarketData) {}
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let mut registry = PairRegistry::new();
        registry.insert("ETH-USDT", Arc::new(NullListener));
        registry.insert("BTC-USDT", Arc::new(NullListener));
        registry.insert("XRP-USDT", Arc::new(NullListener));
        registry.insert("ETH-USDT", Arc::new(NullListener));

        assert_eq!(registry.pairs(), vec!["ETH-USDT", "BTC-USDT", "XRP-USDT"]);

        assert!(registry.remove("BTC-USDT").is_some());
        assert_eq!(registry.pairs(), vec!["ETH-USDT", "XRP-USDT"]);
        assert!(registry.get("BTC-USDT").is_none());
    }

    #[test]
    fn test_truncate() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long).len(), LOG_TRUNCATE);
        assert_eq!(truncate("short"), "short");
    }
}
