//! WebSocket transport tests
//!
//! Real round trips against a local server on an ephemeral port. These run on
//! the real clock, so delays are kept short.

use crate::common::test_helpers::wait_for_event;
use crate::common::ws_server::WsTestServer;
use callcenter::network::{
    Backoff, ConnectionState, Delivery, LinkConfig, LinkEvent, LinkHandle, ReconnectConfig,
    WebSocketConnector,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn fast_retry_config(max_attempts: u32) -> LinkConfig {
    LinkConfig {
        reconnect: ReconnectConfig {
            max_attempts,
            backoff: Backoff::Fixed(Duration::from_millis(50)),
        },
        ..LinkConfig::default()
    }
}

#[tokio::test]
async fn test_connect_sends_bearer_token() {
    let mut server = WsTestServer::start().await;
    let connector = WebSocketConnector::new(server.url.clone()).with_bearer_token("agent-secret");
    let link = LinkHandle::spawn(connector, LinkConfig::default()).unwrap();

    link.connect().unwrap();
    let peer = server.accept(WAIT).await;
    timeout(WAIT, link.wait_for(ConnectionState::Connected))
        .await
        .expect("link never connected")
        .unwrap();

    assert_eq!(peer.authorization.as_deref(), Some("Bearer agent-secret"));
}

#[tokio::test]
async fn test_connect_without_token_sends_no_authorization() {
    let mut server = WsTestServer::start().await;
    let link = LinkHandle::spawn(WebSocketConnector::new(server.url.clone()), LinkConfig::default()).unwrap();

    link.connect().unwrap();
    let peer = server.accept(WAIT).await;
    assert_eq!(peer.authorization, None);
}

#[tokio::test]
async fn test_inbound_event_and_outbound_send() {
    let mut server = WsTestServer::start().await;
    let link = LinkHandle::spawn(WebSocketConnector::new(server.url.clone()), LinkConfig::default()).unwrap();
    let mut status_rx = link.dispatcher().subscribe_call_status();

    link.connect().unwrap();
    let mut peer = server.accept(WAIT).await;
    timeout(WAIT, link.wait_for(ConnectionState::Connected))
        .await
        .expect("link never connected")
        .unwrap();

    peer.send_text(r#"{"type":"call.status","payload":{"callId":"c1","status":"answered"}}"#)
        .await;
    let status = timeout(WAIT, status_rx.recv()).await.unwrap().unwrap();
    assert_eq!(status.call_id().as_deref(), Some("c1"));
    assert_eq!(status.status(), Some("answered"));

    let command = json!({ "action": "transfer", "callId": "c1", "to": "2002" });
    assert_eq!(link.send(&command).await.unwrap(), Delivery::Sent);
    let frame = peer.next_text(WAIT).await.expect("no frame from client");
    let received: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(received, command);
}

#[tokio::test]
async fn test_heartbeat_reaches_server() {
    let mut server = WsTestServer::start().await;
    let mut config = LinkConfig::default();
    config.heartbeat.interval = Duration::from_millis(100);
    let link = LinkHandle::spawn(WebSocketConnector::new(server.url.clone()), config).unwrap();

    link.connect().unwrap();
    let mut peer = server.accept(WAIT).await;

    let frame = peer.next_text(WAIT).await.expect("no heartbeat from client");
    let value: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["type"], "heartbeat");
    assert!(value["timestamp"].is_u64());
}

#[tokio::test]
async fn test_server_close_triggers_reconnect() {
    let mut server = WsTestServer::start().await;
    let link = LinkHandle::spawn(
        WebSocketConnector::new(server.url.clone()),
        fast_retry_config(5),
    )
    .unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    let peer = server.accept(WAIT).await;
    timeout(WAIT, link.wait_for(ConnectionState::Connected))
        .await
        .expect("link never connected")
        .unwrap();

    peer.close().await;
    let scheduled = wait_for_event(&mut events, WAIT, |e| {
        matches!(e, LinkEvent::ReconnectScheduled { .. })
    })
    .await;
    assert!(matches!(scheduled, LinkEvent::ReconnectScheduled { attempt: 1, .. }));

    let _again = server.accept(WAIT).await;
    timeout(WAIT, link.wait_for(ConnectionState::Connected))
        .await
        .expect("link never reconnected")
        .unwrap();
    assert_eq!(link.stats().connections_opened, 2);
    assert_eq!(link.stats().reconnect_attempts, 0);
}

#[tokio::test]
async fn test_disconnect_closes_server_side() {
    let mut server = WsTestServer::start().await;
    let link = LinkHandle::spawn(WebSocketConnector::new(server.url.clone()), LinkConfig::default()).unwrap();

    link.connect().unwrap();
    let mut peer = server.accept(WAIT).await;
    timeout(WAIT, link.wait_for(ConnectionState::Connected))
        .await
        .expect("link never connected")
        .unwrap();

    link.disconnect().await.unwrap();
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert_eq!(peer.next_text(WAIT).await, None);
}

#[tokio::test]
async fn test_unreachable_server_exhausts_retries() {
    // Grab a free port, then release it so nothing is listening there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("ws://{}/ws/call-center", addr);
    let link = LinkHandle::spawn(WebSocketConnector::new(url), fast_retry_config(2)).unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    let lost = wait_for_event(&mut events, WAIT, |e| {
        matches!(e, LinkEvent::ConnectionLost { .. })
    })
    .await;

    assert_eq!(lost, LinkEvent::ConnectionLost { attempts: 2 });
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_invalid_url_is_treated_as_failed_open() {
    let link = LinkHandle::spawn(WebSocketConnector::new("not a url"), fast_retry_config(1)).unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    let lost = wait_for_event(&mut events, WAIT, |e| {
        matches!(e, LinkEvent::ConnectionLost { .. })
    })
    .await;
    assert_eq!(lost, LinkEvent::ConnectionLost { attempts: 1 });
}
