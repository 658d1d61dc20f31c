//! Integration tests for the ProBit stream
//!
//! A local WebSocket server records every frame the session sends; a local
//! wiremock server answers the token, spec and order endpoints.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use probit_compete::common::types::ConnectionState;
use probit_compete::config::types::PairTradeConfig;
use probit_compete::{
    pair_feed, run_pair, ClientError, CompeteEngine, ExchangeGateway, ExchangeSession, FeedEvent,
    OrderBookTracker, SafetyCage, TradingIntent,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Session with a token and specs for `pairs`, every pair registered with a feed
async fn registered_session(
    http: &MockServer,
    ws: &RecordingWsServer,
    pairs: &[&str],
) -> (ExchangeSession, Vec<mpsc::Receiver<FeedEvent>>) {
    mount_token_and_specs(http, pairs).await;
    let session = session(http, &ws.ws_url());
    session.ensure_authenticated().await.unwrap();
    session.fetch_all_specs().await.unwrap();

    let mut receivers = Vec::new();
    for pair in pairs {
        let (feed, rx) = pair_feed(pair, 16);
        session.register_pair(pair, feed).await.unwrap();
        receivers.push(rx);
    }
    (session, receivers)
}

fn parse(frame: &str) -> Value {
    serde_json::from_str(frame).expect("frame is JSON")
}

fn subscribed_pairs(frames: &Received) -> Vec<String> {
    frames
        .iter()
        .map(|(_, text)| parse(text))
        .filter(|v| v["type"] == "subscribe")
        .map(|v| v["market_id"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_connect_authorizes_then_subscribes_in_registration_order() {
    let http = MockServer::start().await;
    let ws = RecordingWsServer::start().await;
    let pairs = ["ETH-USDT", "BTC-USDT", "XRP-USDT"];
    let (session, _feeds) = registered_session(&http, &ws, &pairs).await;

    session.open_stream().await.unwrap();
    let frames = ws.wait_for_frames(0, 4).await;

    assert_eq!(
        parse(&frames[0].1),
        json!({ "type": "authorization", "token": TEST_TOKEN })
    );
    assert_eq!(
        parse(&frames[1].1),
        json!({
            "type": "subscribe",
            "channel": "marketdata",
            "interval": 100,
            "market_id": "ETH-USDT",
            "filter": ["order_books"]
        })
    );
    assert_eq!(subscribed_pairs(&frames), pairs);

    session.close_stream().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_reconnect_resubscribes_every_pair_in_order() {
    let http = MockServer::start().await;
    let ws = RecordingWsServer::drop_first_after(4).await;
    let pairs = ["ETH-USDT", "BTC-USDT", "XRP-USDT"];
    let (session, _feeds) = registered_session(&http, &ws, &pairs).await;

    session.open_stream().await.unwrap();
    let mut state = session.watch_connection().await.expect("stream open");

    let resubscribed = ws.wait_for_frames(1, 4).await;
    assert_eq!(parse(&resubscribed[0].1)["type"], "authorization");
    assert_eq!(subscribed_pairs(&resubscribed), pairs);
    assert_eq!(resubscribed.len(), 4);

    // Each subscription waits 30ms first.
    let spread = resubscribed[3].0 - resubscribed[0].0;
    assert!(spread >= Duration::from_millis(80), "subscriptions sent {:?} apart", spread);

    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("reconnected in time")
    .unwrap();
    assert_eq!(ws.connection_count().await, 2);

    session.close_stream().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_reconnects_are_spaced_when_the_server_keeps_dropping() {
    let http = MockServer::start().await;
    let ws = RecordingWsServer::drop_every_after(1).await;
    let (session, _feeds) = registered_session(&http, &ws, &["BTC-USDT"]).await;

    session.open_stream().await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;

    // Each attempt waits the 100ms reconnect delay first.
    let attempts = ws.connection_count().await;
    assert!(attempts >= 2, "never reconnected");
    assert!(attempts <= 8, "{} connections in 700ms", attempts);

    session.close_stream().await.unwrap();
    let settled = ws.connection_count().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(ws.connection_count().await, settled);
}

#[tokio::test]
async fn test_explicit_close_suppresses_reconnect() {
    let http = MockServer::start().await;
    let ws = RecordingWsServer::start().await;
    let (session, _feeds) = registered_session(&http, &ws, &["BTC-USDT"]).await;

    session.open_stream().await.unwrap();
    let state = session.watch_connection().await.expect("stream open");
    ws.wait_for_frames(0, 2).await;

    session.close_stream().await.unwrap();
    assert_eq!(*state.borrow(), ConnectionState::Closed);
    assert_eq!(session.connection_state().await, ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(ws.connection_count().await, 1);
}

#[tokio::test]
async fn test_market_data_reaches_only_registered_pairs() {
    let http = MockServer::start().await;
    let ws = RecordingWsServer::start().await;
    let (session, mut feeds) = registered_session(&http, &ws, &["BTC-USDT"]).await;
    let rx = &mut feeds[0];

    assert_eq!(rx.recv().await, Some(FeedEvent::Increment(dec!(0.01))));

    session.open_stream().await.unwrap();
    ws.wait_for_frames(0, 2).await;

    ws.push(r#"{"type":"authorization","result":"ok"}"#);
    ws.push(marketdata_frame("DOGE-USDT", "0.1", "0.09"));
    ws.push("something the exchange never sends");
    ws.push(marketdata_frame("BTC-USDT", "100.00", "95.00"));

    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("snapshot delivered");
    match event {
        Some(FeedEvent::Snapshot(data)) => {
            assert_eq!(data.market_id, "BTC-USDT");
            assert_eq!(data.order_books.len(), 2);
            assert_eq!(data.order_books[0].price, dec!(100.00));
        }
        other => panic!("expected a snapshot, got {:?}", other),
    }
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());

    session.close_stream().await.unwrap();
}

#[tokio::test]
async fn test_register_requires_spec() {
    let http = MockServer::start().await;
    let ws = RecordingWsServer::start().await;
    let (session, _feeds) = registered_session(&http, &ws, &["BTC-USDT"]).await;

    let (feed, _rx) = pair_feed("XRP-USDT", 4);
    assert!(matches!(
        session.register_pair("XRP-USDT", feed).await,
        Err(ClientError::NotFound(_))
    ));
    assert_eq!(session.registered_pairs().await, vec!["BTC-USDT"]);
}

#[tokio::test]
async fn test_late_registration_subscribes_and_unregister_unsubscribes() {
    let http = MockServer::start().await;
    let ws = RecordingWsServer::start().await;
    mount_token_and_specs(&http, &["BTC-USDT", "ETH-USDT"]).await;
    let session = session(&http, &ws.ws_url());
    session.ensure_authenticated().await.unwrap();
    session.fetch_all_specs().await.unwrap();

    let (btc, _btc_rx) = pair_feed("BTC-USDT", 4);
    session.register_pair("BTC-USDT", btc).await.unwrap();
    session.open_stream().await.unwrap();
    ws.wait_for_frames(0, 2).await;

    let (eth, _eth_rx) = pair_feed("ETH-USDT", 4);
    session.register_pair("ETH-USDT", eth).await.unwrap();
    session.unregister_pair("BTC-USDT").await.unwrap();

    let frames = ws.wait_for_frames(0, 4).await;
    assert_eq!(parse(&frames[2].1)["market_id"], "ETH-USDT");
    assert_eq!(
        parse(&frames[3].1),
        json!({ "type": "unsubscribe", "channel": "marketdata", "market_id": "BTC-USDT" })
    );
    assert_eq!(session.registered_pairs().await, vec!["ETH-USDT"]);

    session.close_stream().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_snapshot_drives_a_sell_placement() {
    let http = MockServer::start().await;
    let ws = RecordingWsServer::start().await;
    mount_token_and_specs(&http, &["BTC-USDT"]).await;
    Mock::given(method("GET"))
        .and(path("/open_order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&http)
        .await;
    Mock::given(method("GET"))
        .and(path("/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "currency_id": "BTC", "total": "5", "available": "5" }]
        })))
        .mount(&http)
        .await;
    Mock::given(method("POST"))
        .and(path("/new_order"))
        .and(body_json(json!({
            "market_id": "BTC-USDT",
            "type": "limit",
            "side": "sell",
            "time_in_force": "gtc",
            "limit_price": "99.99",
            "quantity": "0.5",
            "client_order_id": ""
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": open_order("1", "BTC-USDT", "sell", "99.99", "0.5")
        })))
        .expect(1)
        .mount(&http)
        .await;

    let session = Arc::new(session(&http, &ws.ws_url()));
    session.ensure_authenticated().await.unwrap();
    session.fetch_all_specs().await.unwrap();

    let spec = session.get_spec("BTC-USDT").await.unwrap();
    let gateway: Arc<dyn ExchangeGateway> = session.clone();
    let tracker = OrderBookTracker::new(spec, gateway);
    let intent = TradingIntent::from_config(
        &PairTradeConfig {
            pair: "BTC-USDT".to_string(),
            sell: dec!(90),
            quantity: dec!(0.5),
            ..PairTradeConfig::default()
        },
        dec!(100),
    )
    .unwrap();
    let engine = CompeteEngine::new(intent, SafetyCage::default());

    let (feed, events) = pair_feed("BTC-USDT", 16);
    session.register_pair("BTC-USDT", feed).await.unwrap();
    let runner = tokio::spawn(run_pair(tracker, engine, events));

    session.open_stream().await.unwrap();
    ws.wait_for_frames(0, 2).await;
    ws.push(marketdata_frame("BTC-USDT", "100.00", "95.00"));

    let placed = timeout(Duration::from_secs(5), async {
        loop {
            let requests = http.received_requests().await.unwrap_or_default();
            if requests.iter().any(|r| r.url.path() == "/new_order") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(placed.is_ok(), "no order placed");

    session.close_stream().await.unwrap();
    session.unregister_pair("BTC-USDT").await.unwrap();
    let tracker = timeout(Duration::from_secs(5), runner)
        .await
        .expect("runner stopped")
        .unwrap();
    assert_eq!(tracker.book().best_sell.price, dec!(100.00));
}
