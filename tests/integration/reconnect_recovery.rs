//! Reconnect Recovery Tests
//!
//! Unexpected closes, refused opens and exhaustion of the retry budget.

use crate::common::mock_connector::{MockConnector, OpenPlan};
use crate::common::test_helpers::{drain_events, settle, wait_for_event, PAUSED_WAIT};
use callcenter::network::{Backoff, ConnectionState, LinkConfig, LinkEvent, LinkHandle};
use std::time::Duration;
use tokio::time::Instant;

fn close_enough(actual: Duration, expected: Duration) -> bool {
    actual >= expected && actual < expected + Duration::from_millis(100)
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_close_retries_after_fixed_delay() {
    let (connector, mut server) = MockConnector::accepting();
    let link = LinkHandle::spawn(connector, LinkConfig::default()).unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    let mut peer = server.next_server().await;
    link.wait_for(ConnectionState::Connected).await.unwrap();
    assert_eq!(link.stats().reconnect_attempts, 0);

    let closed_at = Instant::now();
    peer.close();

    let scheduled = wait_for_event(&mut events, PAUSED_WAIT, |e| {
        matches!(e, LinkEvent::ReconnectScheduled { .. })
    })
    .await;
    assert_eq!(
        scheduled,
        LinkEvent::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_millis(3_000),
        }
    );
    assert_eq!(link.state(), ConnectionState::Reconnecting);
    assert_eq!(link.stats().reconnect_attempts, 1);

    let _peer = server.next_server().await;
    assert!(close_enough(closed_at.elapsed(), Duration::from_millis(3_000)));

    link.wait_for(ConnectionState::Connected).await.unwrap();
    assert_eq!(link.stats().reconnect_attempts, 0);
    assert_eq!(server.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_five_failed_retries_end_in_connection_lost() {
    let (connector, mut server) = MockConnector::scripted(&[OpenPlan::Accept], OpenPlan::Refuse);
    let link = LinkHandle::spawn(connector, LinkConfig::default()).unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    let mut peer = server.next_server().await;
    link.wait_for(ConnectionState::Connected).await.unwrap();

    peer.close();
    let mut scheduled = Vec::new();
    let lost = wait_for_event(&mut events, PAUSED_WAIT, |e| {
        if let LinkEvent::ReconnectScheduled { attempt, delay } = e {
            scheduled.push((*attempt, *delay));
        }
        matches!(e, LinkEvent::ConnectionLost { .. })
    })
    .await;

    assert_eq!(lost, LinkEvent::ConnectionLost { attempts: 5 });
    assert_eq!(link.state(), ConnectionState::Disconnected);
    let expected: Vec<_> = (1..=5).map(|n| (n, Duration::from_millis(3_000))).collect();
    assert_eq!(scheduled, expected);

    // One initial open plus five retries, and no sixth retry later
    assert_eq!(server.opens(), 6);
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(server.opens(), 6);
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_refused_initial_open_enters_reconnecting() {
    let (connector, server) = MockConnector::scripted(&[], OpenPlan::Refuse);
    let link = LinkHandle::spawn(connector, LinkConfig::default()).unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    let scheduled = wait_for_event(&mut events, PAUSED_WAIT, |e| {
        matches!(e, LinkEvent::ReconnectScheduled { .. })
    })
    .await;

    assert!(matches!(scheduled, LinkEvent::ReconnectScheduled { attempt: 1, .. }));
    assert_eq!(link.state(), ConnectionState::Reconnecting);
    assert_eq!(server.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_successful_retry_resets_attempt_counter() {
    let plans = [
        OpenPlan::Accept,
        OpenPlan::Refuse,
        OpenPlan::Refuse,
        OpenPlan::Accept,
    ];
    let (connector, mut server) = MockConnector::scripted(&plans, OpenPlan::Accept);
    let link = LinkHandle::spawn(connector, LinkConfig::default()).unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    let mut first = server.next_server().await;
    link.wait_for(ConnectionState::Connected).await.unwrap();

    first.close();
    let mut second = server.next_server().await;
    link.wait_for(ConnectionState::Connected).await.unwrap();
    assert_eq!(server.opens(), 4);
    assert_eq!(link.stats().reconnect_attempts, 0);

    drain_events(&mut events);
    second.close();
    let scheduled = wait_for_event(&mut events, PAUSED_WAIT, |e| {
        matches!(e, LinkEvent::ReconnectScheduled { .. })
    })
    .await;
    assert!(matches!(scheduled, LinkEvent::ReconnectScheduled { attempt: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_reconnecting_retries_immediately() {
    let (connector, mut server) = MockConnector::accepting();
    let link = LinkHandle::spawn(connector, LinkConfig::default()).unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    let mut peer = server.next_server().await;
    link.wait_for(ConnectionState::Connected).await.unwrap();

    peer.close();
    wait_for_event(&mut events, PAUSED_WAIT, |e| {
        matches!(e, LinkEvent::ReconnectScheduled { .. })
    })
    .await;

    let requested_at = Instant::now();
    link.connect().unwrap();
    let _peer = server.next_server().await;
    assert!(requested_at.elapsed() < Duration::from_millis(3_000));

    link.wait_for(ConnectionState::Connected).await.unwrap();

    // The cancelled timer must not open a third channel
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(server.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_grows_to_cap() {
    let mut config = LinkConfig::default();
    config.reconnect.backoff = Backoff::Exponential {
        initial: Duration::from_secs(1),
        max: Duration::from_secs(4),
        multiplier: 2.0,
        jitter: false,
    };
    let (connector, _server) = MockConnector::scripted(&[], OpenPlan::Refuse);
    let link = LinkHandle::spawn(connector, config).unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    let mut delays = Vec::new();
    wait_for_event(&mut events, PAUSED_WAIT, |e| {
        if let LinkEvent::ReconnectScheduled { delay, .. } = e {
            delays.push(*delay);
        }
        matches!(e, LinkEvent::ConnectionLost { .. })
    })
    .await;

    let secs: Vec<u64> = delays.iter().map(Duration::as_secs).collect();
    assert_eq!(secs, vec![1, 2, 4, 4, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_connect_after_loss_gets_full_budget() {
    let (connector, server) = MockConnector::scripted(&[], OpenPlan::Refuse);
    let link = LinkHandle::spawn(connector, LinkConfig::default()).unwrap();
    let mut events = link.subscribe_events();

    link.connect().unwrap();
    wait_for_event(&mut events, PAUSED_WAIT, |e| {
        matches!(e, LinkEvent::ConnectionLost { .. })
    })
    .await;
    assert_eq!(server.opens(), 6);

    link.connect().unwrap();
    let scheduled = wait_for_event(&mut events, PAUSED_WAIT, |e| {
        matches!(e, LinkEvent::ReconnectScheduled { .. })
    })
    .await;
    assert!(matches!(scheduled, LinkEvent::ReconnectScheduled { attempt: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_alone_does_not_reconnect() {
    let (connector, mut server) = MockConnector::accepting();
    let link = LinkHandle::spawn(connector, LinkConfig::default()).unwrap();
    let mut status_rx = link.dispatcher().subscribe_call_status();

    link.connect().unwrap();
    let peer = server.next_server().await;
    link.wait_for(ConnectionState::Connected).await.unwrap();

    peer.push_error("connection reset by peer");
    settle().await;
    assert_eq!(link.state(), ConnectionState::Connected);
    assert_eq!(link.stats().reconnects_scheduled, 0);

    // The channel is still usable afterwards
    peer.push(r#"{"type":"call.status","payload":{"callId":"c1","status":"ringing"}}"#);
    let status = tokio::time::timeout(PAUSED_WAIT, status_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.call_id().as_deref(), Some("c1"));
    assert_eq!(server.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hung_open_times_out_into_retry() {
    let (connector, mut server) = MockConnector::scripted(&[OpenPlan::Hang], OpenPlan::Accept);
    let config = LinkConfig::default();
    let open_timeout = config.open_timeout;
    let link = LinkHandle::spawn(connector, config).unwrap();
    let mut events = link.subscribe_events();

    let started = Instant::now();
    link.connect().unwrap();

    let scheduled = wait_for_event(&mut events, PAUSED_WAIT, |e| {
        matches!(e, LinkEvent::ReconnectScheduled { .. })
    })
    .await;
    assert!(close_enough(started.elapsed(), open_timeout));
    assert!(matches!(scheduled, LinkEvent::ReconnectScheduled { attempt: 1, .. }));
    assert_eq!(link.state(), ConnectionState::Reconnecting);

    let _peer = server.next_server().await;
    link.wait_for(ConnectionState::Connected).await.unwrap();
    assert_eq!(server.opens(), 2);
    assert_eq!(link.stats().reconnect_attempts, 0);
}
