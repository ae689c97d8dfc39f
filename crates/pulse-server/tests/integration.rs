//! End-to-end tests against a real listener and a tokio-tungstenite peer.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pulse_core::wire::ClientMessage;
use pulse_core::{Message, MessageKind, Topic};
use pulse_server::{PulseServer, ServerConfig};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(config: ServerConfig) -> (PulseServer, SocketAddr) {
    let server = PulseServer::new(config);
    let (addr, _handle) = server.listen().await.unwrap();
    (server, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read failed");
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send(ws: &mut Client, text: String) {
    ws.send(WsMessage::Text(text.into())).await.unwrap();
}

async fn subscribe(ws: &mut Client, topics: &[Topic]) -> Value {
    send(ws, ClientMessage::subscribe_frame(topics)).await;
    next_json(ws).await
}

/// Round-trips a ping so the server has registered the connection.
async fn settle(ws: &mut Client) {
    send(ws, ClientMessage::ping_frame()).await;
    assert_eq!(next_json(ws).await["type"], "heartbeat");
}

fn bundle() -> Message {
    Message::bundle(BTreeMap::from([
        (Topic::Metrics, json!({"rps": 42})),
        (Topic::Containers, json!({"containers": []})),
        (Topic::Sessions, json!({"active_sessions": 3})),
    ]))
}

#[tokio::test]
async fn subscribe_is_acknowledged() {
    let (_server, addr) = start(ServerConfig::default()).await;
    let mut ws = connect(addr).await;

    send(
        &mut ws,
        json!({"type": "subscribe", "subscriptions": ["metrics", "bogus_topic", 7]}).to_string(),
    )
    .await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "subscribed");
    assert_eq!(ack["subscriptions"], json!(["metrics"]));
    assert_eq!(ack["selective"], true);
    assert!(ack["timestamp"].is_string());
}

#[tokio::test]
async fn raw_ping_gets_heartbeat() {
    let (_server, addr) = start(ServerConfig::default()).await;
    let mut ws = connect(addr).await;
    send(&mut ws, "ping".to_string()).await;
    assert_eq!(next_json(&mut ws).await["type"], "heartbeat");
}

#[tokio::test]
async fn broadcast_respects_subscriptions() {
    let (server, addr) = start(ServerConfig::default()).await;

    let mut sessions_only = connect(addr).await;
    let _ = subscribe(&mut sessions_only, &[Topic::Sessions]).await;
    let mut alerts_only = connect(addr).await;
    let _ = subscribe(&mut alerts_only, &[Topic::SystemAlerts]).await;
    let mut everything = connect(addr).await;
    settle(&mut everything).await;

    let report = server.dispatcher().broadcast(&bundle()).await;
    assert_eq!(report.recipients, 2);
    assert_eq!(report.delivered, 2);

    let filtered = next_json(&mut sessions_only).await;
    assert_eq!(filtered["type"], "realtime_update");
    assert_eq!(filtered["data"]["sessions"]["active_sessions"], 3);
    assert!(filtered["data"].get("metrics").is_none());

    let whole = next_json(&mut everything).await;
    assert_eq!(whole["data"]["metrics"]["rps"], 42);
    assert_eq!(whole["data"].as_object().unwrap().len(), 3);

    let alert = Message::event(
        MessageKind::SystemAlert,
        Topic::SystemAlerts,
        json!({"alerts": [], "cleared": ["high_cpu"], "active": []}),
    );
    let _ = server.dispatcher().broadcast(&alert).await;
    assert_eq!(next_json(&mut alerts_only).await["type"], "system_alert");
}

#[tokio::test]
async fn resubscribing_replaces_the_set() {
    let (server, addr) = start(ServerConfig::default()).await;
    let mut ws = connect(addr).await;
    let _ = subscribe(&mut ws, &[Topic::Metrics, Topic::Containers]).await;
    let ack = subscribe(&mut ws, &[Topic::Sessions]).await;
    assert_eq!(ack["subscriptions"], json!(["sessions"]));

    let _ = server.dispatcher().broadcast(&bundle()).await;
    let frame = next_json(&mut ws).await;
    let keys: Vec<&String> = frame["data"].as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["sessions"]);
}

#[tokio::test]
async fn selective_disabled_delivers_everything() {
    let (server, addr) = start(ServerConfig {
        selective_subscriptions: false,
        ..ServerConfig::default()
    })
    .await;
    let mut ws = connect(addr).await;
    let ack = subscribe(&mut ws, &[]).await;
    assert_eq!(ack["selective"], false);

    let report = server.dispatcher().broadcast(&bundle()).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(next_json(&mut ws).await["data"].as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (_server, addr) = start(ServerConfig::default()).await;
    let mut ws = connect(addr).await;
    send(&mut ws, "{not json".to_string()).await;
    send(&mut ws, r#"{"type":"subscribe","subscriptions":"metrics"}"#.to_string()).await;
    settle(&mut ws).await;
}

#[tokio::test]
async fn disabled_hub_refuses_upgrade() {
    let (_server, addr) = start(ServerConfig {
        enabled: false,
        ..ServerConfig::default()
    })
    .await;
    let err = connect_async(format!("ws://{addr}/ws")).await.unwrap_err();
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status().as_u16(), 503),
        other => panic!("expected an HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn connection_cap_refuses_upgrade() {
    let (_server, addr) = start(ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    })
    .await;
    let mut first = connect(addr).await;
    settle(&mut first).await;
    let err = connect_async(format!("ws://{addr}/ws")).await.unwrap_err();
    assert!(matches!(err, tungstenite::Error::Http(_)));
}

#[tokio::test]
async fn disconnect_removes_connection() {
    let (server, addr) = start(ServerConfig::default()).await;
    let mut ws = connect(addr).await;
    settle(&mut ws).await;
    assert_eq!(server.registry().connection_count(), 1);

    ws.close(None).await.unwrap();
    timeout(Duration::from_secs(5), async {
        while server.registry().connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn shutdown_closes_clients() {
    let (server, addr) = start(ServerConfig::default()).await;
    let mut ws = connect(addr).await;
    settle(&mut ws).await;

    server.shutdown().shutdown();
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert_eq!(server.registry().connection_count(), 0);
}
