//! Common test utilities and fixtures

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use probit_compete::config::types::{AppSettings, ExchangeConfig};
use probit_compete::probit::auth::Credentials;
use probit_compete::ExchangeSession;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_TOKEN: &str = "test-access-token";

/// Frames received on one connection, with their arrival instants
pub type Received = Vec<(Instant, String)>;

/// A recording mock WebSocket server
///
/// Every accepted connection records the text frames it receives. Frames
/// pushed with [`RecordingWsServer::push`] go to every open connection.
/// With `drop_first_after(n)`, the first connection is closed by the server
/// once it has received `n` frames; `drop_every_after(n)` does the same to
/// every connection.
pub struct RecordingWsServer {
    pub addr: SocketAddr,
    connections: Arc<Mutex<Vec<Received>>>,
    outbound: broadcast::Sender<String>,
    shutdown: Arc<Notify>,
}

impl RecordingWsServer {
    pub async fn start() -> Self {
        Self::start_with(None, false).await
    }

    pub async fn drop_first_after(frames: usize) -> Self {
        Self::start_with(Some(frames), false).await
    }

    pub async fn drop_every_after(frames: usize) -> Self {
        Self::start_with(Some(frames), true).await
    }

    async fn start_with(drop_after: Option<usize>, every: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections: Arc<Mutex<Vec<Received>>> = Arc::new(Mutex::new(Vec::new()));
        let (outbound, _) = broadcast::channel(64);
        let shutdown = Arc::new(Notify::new());

        let accepted = connections.clone();
        let pushes = outbound.clone();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let index = {
                            let mut all = accepted.lock().await;
                            all.push(Vec::new());
                            all.len() - 1
                        };
                        let limit = if every || index == 0 { drop_after } else { None };
                        tokio::spawn(handle_connection(
                            stream,
                            index,
                            limit,
                            accepted.clone(),
                            pushes.subscribe(),
                            stop.clone(),
                        ));
                    }
                    _ = stop.notified() => break,
                }
            }
        });

        Self {
            addr,
            connections,
            outbound,
            shutdown,
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Frames received so far on connection `index`
    pub async fn frames(&self, index: usize) -> Received {
        self.connections
            .lock()
            .await
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Wait until connection `index` has received at least `count` frames
    pub async fn wait_for_frames(&self, index: usize, count: usize) -> Received {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let frames = self.frames(index).await;
            if frames.len() >= count {
                return frames;
            }
            assert!(
                Instant::now() < deadline,
                "connection {} received only {} of {} frames",
                index,
                frames.len(),
                count
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Send a text frame to every open connection
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.outbound.send(frame.into());
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for RecordingWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_connection(
    stream: TcpStream,
    index: usize,
    drop_after: Option<usize>,
    connections: Arc<Mutex<Vec<Received>>>,
    mut pushes: broadcast::Receiver<String>,
    shutdown: Arc<Notify>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let received = {
                        let mut all = connections.lock().await;
                        all[index].push((Instant::now(), text));
                        all[index].len()
                    };
                    if drop_after.map_or(false, |limit| received >= limit) {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            push = pushes.recv() => match push {
                Ok(frame) => {
                    if write.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            _ = shutdown.notified() => break,
        }
    }
}

/// Settings with short delays for tests
pub fn fast_settings() -> AppSettings {
    AppSettings {
        subscribe_delay_ms: 30,
        reconnect_delay_ms: 100,
        rate_limit_poll_ms: 10,
        request_timeout_seconds: 5,
        ..AppSettings::default()
    }
}

/// Endpoint configuration pointing at mock servers
pub fn exchange_config(http: &MockServer, ws_url: &str) -> ExchangeConfig {
    ExchangeConfig {
        rest_url: http.uri(),
        accounts_url: http.uri(),
        websocket_url: ws_url.to_string(),
        ..ExchangeConfig::default()
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("client-id", "client-secret")
}

/// A session against the given mock servers
pub fn session(http: &MockServer, ws_url: &str) -> ExchangeSession {
    ExchangeSession::new(&exchange_config(http, ws_url), &fast_settings(), credentials())
        .expect("Failed to create session")
}

/// Mount token and market spec responses for the given pairs
pub async fn mount_token_and_specs(http: &MockServer, pairs: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response(900)))
        .mount(http)
        .await;
    Mock::given(method("GET"))
        .and(path("/market"))
        .respond_with(ResponseTemplate::new(200).set_body_json(markets(pairs)))
        .mount(http)
        .await;
}

// ============================================================================
// JSON samples
// ============================================================================

pub fn token_response(expires_in: i64) -> Value {
    json!({
        "access_token": TEST_TOKEN,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
}

pub fn market_spec(pair: &str) -> Value {
    let (base, quote) = pair.split_once('-').unwrap_or((pair, "USDT"));
    json!({
        "id": pair,
        "base_currency_id": base,
        "quote_currency_id": quote,
        "min_price": "0.01",
        "max_price": "9999999999999999",
        "price_increment": "0.01",
        "min_quantity": "0.0001",
        "max_quantity": "9999999999999999",
        "quantity_precision": 4,
        "min_cost": "1",
        "max_cost": "9999999999999999",
        "cost_precision": 8,
        "taker_fee_rate": "0.2",
        "maker_fee_rate": "0.2",
        "show_in_ui": true,
        "closed": false
    })
}

pub fn markets(pairs: &[&str]) -> Value {
    json!({ "data": pairs.iter().map(|p| market_spec(p)).collect::<Vec<_>>() })
}

pub fn open_order(id: &str, pair: &str, side: &str, price: &str, quantity: &str) -> Value {
    json!({
        "id": id,
        "user_id": "user-1",
        "market_id": pair,
        "type": "limit",
        "side": side,
        "quantity": quantity,
        "limit_price": price,
        "time_in_force": "gtc",
        "filled_cost": "0",
        "filled_quantity": "0",
        "open_quantity": quantity,
        "cancelled_quantity": "0",
        "status": "open",
        "time": "2024-01-01T00:00:00.000Z",
        "client_order_id": ""
    })
}

pub fn marketdata_frame(pair: &str, sell: &str, buy: &str) -> String {
    json!({
        "channel": "marketdata",
        "market_id": pair,
        "status": "ok",
        "lag": 0,
        "order_books": [
            {"side": "sell", "price": sell, "quantity": "1.5"},
            {"side": "buy", "price": buy, "quantity": "2"}
        ],
        "reset": true
    })
    .to_string()
}
