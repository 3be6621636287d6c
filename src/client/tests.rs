use super::*;
use crate::infrastructure::RecordingClock;
use crate::messaging::{ClientEvent, DisconnectReason, EventFilter, InboundEvent, MessageKind};
use crate::types::RealtimeMessage;
use crate::websocket::mock::{MockConnector, MockServerConn};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

const ENDPOINT: &str = "ws://realtime.test/ws";

fn options(max_reconnect_attempts: u32) -> RealtimeClientOptions {
    RealtimeClientOptions {
        heartbeat_interval: Duration::from_secs(3600),
        max_reconnect_attempts,
        ..Default::default()
    }
}

fn build(
    connector: MockConnector,
    clock: RecordingClock,
    opts: RealtimeClientOptions,
) -> RealtimeClient {
    RealtimeClient::builder(ENDPOINT, opts)
        .unwrap()
        .connector(connector)
        .clock(clock)
        .build()
}

async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

async fn wait_for_state(client: &RealtimeClient, target: ConnectionState) {
    let mut rx = client.watch_state();
    within(rx.wait_for(|s| *s == target)).await.unwrap();
}

async fn next_conn(accepted: &mut mpsc::UnboundedReceiver<MockServerConn>) -> MockServerConn {
    within(accepted.recv()).await.expect("connector dropped")
}

async fn recv(server: &mut MockServerConn) -> RealtimeMessage {
    within(server.recv_non_heartbeat()).await.expect("client closed")
}

async fn next_event(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    within(rx.recv()).await.expect("listener closed")
}

#[tokio::test]
async fn test_connect_attaches_token_and_emits_connected() {
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector, RecordingClock::new(), options(3));
    let mut lifecycle = client.on(EventFilter::Lifecycle).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    client.connect("session-abc").await.unwrap();

    let server = next_conn(&mut accepted).await;
    let token = server
        .url
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned());
    assert_eq!(token.as_deref(), Some("session-abc"));

    assert_eq!(next_event(&mut lifecycle).await, ClientEvent::Connected);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_messages_sent_while_disconnected_flush_in_order() {
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector, RecordingClock::new(), options(3));

    for n in 1..=3 {
        let delivery = client.send("content_update", json!({ "n": n })).await.unwrap();
        assert_eq!(delivery, Delivery::Queued);
    }
    assert_eq!(client.queued_messages().await, 3);

    client.connect("t").await.unwrap();
    let mut server = next_conn(&mut accepted).await;

    assert_eq!(
        client.send("content_update", json!({ "n": 4 })).await.unwrap(),
        Delivery::Sent
    );

    for n in 1..=4 {
        let msg = recv(&mut server).await;
        assert_eq!(msg.kind, "content_update");
        assert_eq!(msg.payload["n"], n);
        assert!(msg.timestamp.is_some());
    }
    assert_eq!(client.queued_messages().await, 0);
}

#[tokio::test]
async fn test_queue_flushes_before_post_reconnect_sends() {
    let gate = Arc::new(Semaphore::new(1));
    let (connector, mut accepted) = MockConnector::new();
    let connector = connector.gated(Arc::clone(&gate));
    let client = build(connector, RecordingClock::new(), options(3));

    client.connect("t").await.unwrap();
    let mut first = next_conn(&mut accepted).await;
    first.drop_connection();

    // Reconnect attempt is parked on the gate
    wait_for_state(&client, ConnectionState::Connecting).await;
    for n in ["a", "b"] {
        assert_eq!(
            client.send("collaboration_update", json!({ "n": n })).await.unwrap(),
            Delivery::Queued
        );
    }

    gate.add_permits(1);
    let mut second = next_conn(&mut accepted).await;
    wait_for_state(&client, ConnectionState::Connected).await;
    client
        .send("collaboration_update", json!({ "n": "c" }))
        .await
        .unwrap();

    let order: Vec<String> = vec![
        recv(&mut second).await,
        recv(&mut second).await,
        recv(&mut second).await,
    ]
    .into_iter()
    .map(|m| m.payload["n"].as_str().unwrap().to_string())
    .collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert_eq!(client.queued_messages().await, 0);
}

#[tokio::test]
async fn test_reconnect_replays_subscription_registry() {
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector, RecordingClock::new(), options(3));

    // Registered before connecting: nothing queued, sent on open
    client.subscribe("content:1").await.unwrap();
    assert_eq!(client.queued_messages().await, 0);

    client.connect("t").await.unwrap();
    let mut first = next_conn(&mut accepted).await;
    let msg = recv(&mut first).await;
    assert_eq!(msg.kind, "subscribe");
    assert_eq!(msg.payload["channel"], "content:1");

    client.subscribe("analytics").await.unwrap();
    let msg = recv(&mut first).await;
    assert_eq!(msg.payload["channel"], "analytics");

    first.drop_connection();
    let mut second = next_conn(&mut accepted).await;
    let replayed: Vec<_> = vec![recv(&mut second).await, recv(&mut second).await]
        .into_iter()
        .map(|m| (m.kind, m.payload["channel"].as_str().unwrap().to_string()))
        .collect();
    assert_eq!(
        replayed,
        vec![
            ("subscribe".to_string(), "content:1".to_string()),
            ("subscribe".to_string(), "analytics".to_string()),
        ]
    );
    assert_eq!(client.subscriptions().await, vec!["content:1", "analytics"]);
}

#[tokio::test]
async fn test_unsubscribe_removes_channel_from_replay() {
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector, RecordingClock::new(), options(3));

    client.connect("t").await.unwrap();
    let mut first = next_conn(&mut accepted).await;
    client.subscribe("content:1").await.unwrap();
    client.subscribe("content:2").await.unwrap();
    client.unsubscribe("content:1").await.unwrap();

    assert_eq!(recv(&mut first).await.payload["channel"], "content:1");
    assert_eq!(recv(&mut first).await.payload["channel"], "content:2");
    let msg = recv(&mut first).await;
    assert_eq!(msg.kind, "unsubscribe");
    assert_eq!(msg.payload["channel"], "content:1");

    first.drop_connection();
    let mut second = next_conn(&mut accepted).await;
    let msg = recv(&mut second).await;
    assert_eq!(msg.payload["channel"], "content:2");

    client.send("marker", json!({})).await.unwrap();
    assert_eq!(recv(&mut second).await.kind, "marker");
}

#[tokio::test]
async fn test_reconnect_delays_follow_backoff_and_give_up() {
    let clock = RecordingClock::new();
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector.clone(), clock.clone(), options(4));
    let mut lifecycle = client.on(EventFilter::Lifecycle).await;

    client.connect("t").await.unwrap();
    let mut server = next_conn(&mut accepted).await;
    assert_eq!(next_event(&mut lifecycle).await, ClientEvent::Connected);

    connector.fail_next(10);
    server.drop_connection();

    assert!(matches!(
        next_event(&mut lifecycle).await,
        ClientEvent::Disconnected(DisconnectReason::ConnectionLost(_))
    ));

    let mut announced = Vec::new();
    loop {
        match next_event(&mut lifecycle).await {
            ClientEvent::ReconnectFailed { attempts } => {
                assert_eq!(attempts, 4);
                break;
            }
            ClientEvent::Reconnecting { attempt, delay_ms } => announced.push((attempt, delay_ms)),
            ClientEvent::ConnectError(_) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(
        announced,
        vec![(1, 1000), (2, 2000), (3, 4000), (4, 8000)]
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let delays: Vec<u64> = clock.sleeps().iter().map(|d| d.as_millis() as u64).collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 8000]);
    assert_eq!(connector.connect_calls(), 1 + 4);
}

#[tokio::test]
async fn test_successful_reconnect_resets_attempt_counter() {
    let clock = RecordingClock::new();
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector.clone(), clock.clone(), options(5));

    client.connect("t").await.unwrap();
    let mut first = next_conn(&mut accepted).await;

    connector.fail_next(2);
    first.drop_connection();
    let mut second = next_conn(&mut accepted).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    second.drop_connection();
    let _third = next_conn(&mut accepted).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    let delays: Vec<u64> = clock.sleeps().iter().map(|d| d.as_millis() as u64).collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 1000]);
}

#[tokio::test]
async fn test_initial_connect_failure_is_reported_and_retried() {
    let clock = RecordingClock::new();
    let (connector, mut accepted) = MockConnector::new();
    connector.fail_next(1);
    let client = build(connector, clock.clone(), options(3));
    let mut lifecycle = client.on(EventFilter::Lifecycle).await;

    client.connect("t").await.unwrap();

    assert!(matches!(
        next_event(&mut lifecycle).await,
        ClientEvent::ConnectError(_)
    ));
    assert_eq!(
        next_event(&mut lifecycle).await,
        ClientEvent::Reconnecting {
            attempt: 1,
            delay_ms: 1000
        }
    );
    let _server = next_conn(&mut accepted).await;
    assert_eq!(next_event(&mut lifecycle).await, ClientEvent::Connected);
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(1000)]);
}

#[tokio::test]
async fn test_clean_server_close_does_not_reconnect() {
    let clock = RecordingClock::new();
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector.clone(), clock.clone(), options(3));
    let mut lifecycle = client.on(EventFilter::Lifecycle).await;

    client.connect("t").await.unwrap();
    let mut server = next_conn(&mut accepted).await;
    assert_eq!(next_event(&mut lifecycle).await, ClientEvent::Connected);

    server.close(1000);
    assert_eq!(
        next_event(&mut lifecycle).await,
        ClientEvent::Disconnected(DisconnectReason::ServerClosed)
    );
    wait_for_state(&client, ConnectionState::Disconnected).await;

    tokio::task::yield_now().await;
    assert!(clock.sleeps().is_empty());
    assert_eq!(connector.connect_calls(), 1);
}

#[tokio::test]
async fn test_abnormal_close_code_reconnects() {
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector, RecordingClock::new(), options(3));

    client.connect("t").await.unwrap();
    let mut first = next_conn(&mut accepted).await;
    first.close(1011);

    let _second = next_conn(&mut accepted).await;
    wait_for_state(&client, ConnectionState::Connected).await;
}

#[tokio::test]
async fn test_explicit_disconnect_is_terminal() {
    let clock = RecordingClock::new();
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector.clone(), clock.clone(), options(3));
    let mut lifecycle = client.on(EventFilter::Lifecycle).await;

    client.connect("t").await.unwrap();
    let _server = next_conn(&mut accepted).await;
    assert_eq!(next_event(&mut lifecycle).await, ClientEvent::Connected);

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(
        next_event(&mut lifecycle).await,
        ClientEvent::Disconnected(DisconnectReason::ClientDisconnect)
    );

    tokio::task::yield_now().await;
    assert!(clock.sleeps().is_empty());
    assert_eq!(connector.connect_calls(), 1);

    // Still accepted, kept for the next connect
    assert_eq!(
        client.send("content_update", json!({})).await.unwrap(),
        Delivery::Queued
    );
}

#[tokio::test]
async fn test_inbound_dispatch_by_type_with_fallback() {
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector, RecordingClock::new(), options(3));
    let mut content = client.on(MessageKind::ContentUpdate).await;
    let mut fallback = client.on(MessageKind::Unrecognized).await;
    let mut all = client.on(EventFilter::AllMessages).await;

    client.connect("t").await.unwrap();
    let server = next_conn(&mut accepted).await;

    server.push(&RealtimeMessage::new(
        "content_update",
        json!({"contentId": "c1", "action": "updated"}),
    ));
    server.push(&RealtimeMessage::new("team_update", json!({"member": "m1"})));

    match next_event(&mut content).await {
        ClientEvent::Message(InboundEvent::ContentUpdate(update)) => {
            assert_eq!(update.content_id, "c1");
            assert_eq!(update.action, "updated");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match next_event(&mut fallback).await {
        ClientEvent::Message(InboundEvent::Unrecognized { kind, payload }) => {
            assert_eq!(kind, "team_update");
            assert_eq!(payload["member"], "m1");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let kinds = vec![next_event(&mut all).await, next_event(&mut all).await];
    assert!(matches!(
        kinds[0],
        ClientEvent::Message(InboundEvent::ContentUpdate(_))
    ));
    assert!(matches!(
        kinds[1],
        ClientEvent::Message(InboundEvent::Unrecognized { .. })
    ));
}

#[tokio::test]
async fn test_malformed_frame_does_not_break_read_loop() {
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector, RecordingClock::new(), options(3));
    let mut all = client.on(EventFilter::AllMessages).await;

    client.connect("t").await.unwrap();
    let server = next_conn(&mut accepted).await;
    server.push_raw("not json");
    server.push(&RealtimeMessage::new(
        "notification",
        json!({"id": "n1", "message": "Published"}),
    ));

    match next_event(&mut all).await {
        ClientEvent::Message(InboundEvent::Notification(n)) => {
            assert_eq!(n.message, "Published");
            assert_eq!(n.severity, "info");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_server_heartbeat_is_acked() {
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector, RecordingClock::new(), options(3));

    client.connect("t").await.unwrap();
    let mut server = next_conn(&mut accepted).await;
    server.push(&RealtimeMessage::new("heartbeat", json!({})));

    let ack = recv(&mut server).await;
    assert_eq!(ack.kind, "heartbeat_ack");
}

#[tokio::test(start_paused = true)]
async fn test_client_sends_periodic_heartbeat() {
    let (connector, mut accepted) = MockConnector::new();
    let opts = RealtimeClientOptions {
        heartbeat_interval: Duration::from_secs(30),
        ..options(3)
    };
    let client = build(connector, RecordingClock::new(), opts);

    client.connect("t").await.unwrap();
    let mut server = next_conn(&mut accepted).await;

    let started = tokio::time::Instant::now();
    let wait = Duration::from_secs(120);

    let first = tokio::time::timeout(wait, server.recv()).await.unwrap().unwrap();
    assert_eq!(first.kind, "heartbeat");
    assert!(started.elapsed() >= Duration::from_secs(30));

    let second = tokio::time::timeout(wait, server.recv()).await.unwrap().unwrap();
    assert_eq!(second.kind, "heartbeat");
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test]
async fn test_outbound_frames_carry_identity() {
    let (connector, mut accepted) = MockConnector::new();
    let opts = RealtimeClientOptions {
        user_id: Some("u1".to_string()),
        workspace_id: Some("w1".to_string()),
        ..options(3)
    };
    let client = build(connector, RecordingClock::new(), opts);

    client.connect("t").await.unwrap();
    let mut server = next_conn(&mut accepted).await;
    client
        .send("presence_update", json!({"userId": "u1", "status": "online"}))
        .await
        .unwrap();

    let msg = recv(&mut server).await;
    assert_eq!(msg.user_id.as_deref(), Some("u1"));
    assert_eq!(msg.workspace_id.as_deref(), Some("w1"));
}

#[tokio::test]
async fn test_queue_overflow_drops_oldest() {
    let (connector, mut accepted) = MockConnector::new();
    let opts = RealtimeClientOptions {
        max_queue_size: 2,
        ..options(3)
    };
    let client = build(connector, RecordingClock::new(), opts);

    for n in 1..=3 {
        client.send("content_update", json!({ "n": n })).await.unwrap();
    }
    assert_eq!(client.queued_messages().await, 2);
    assert_eq!(client.dropped_messages().await, 1);

    client.connect("t").await.unwrap();
    let mut server = next_conn(&mut accepted).await;
    assert_eq!(recv(&mut server).await.payload["n"], 2);
    assert_eq!(recv(&mut server).await.payload["n"], 3);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_backoff() {
    let (connector, mut accepted) = MockConnector::new();
    // Real (paused) sleeps so the backoff is still pending when disconnect lands
    let client = RealtimeClient::builder(ENDPOINT, options(5))
        .unwrap()
        .connector(connector.clone())
        .build();
    let mut lifecycle = client.on(EventFilter::Lifecycle).await;

    client.connect("t").await.unwrap();
    let mut server = next_conn(&mut accepted).await;
    assert_eq!(next_event(&mut lifecycle).await, ClientEvent::Connected);

    server.drop_connection();
    loop {
        if let ClientEvent::Reconnecting { delay_ms, .. } = next_event(&mut lifecycle).await {
            assert_eq!(delay_ms, 1000);
            break;
        }
    }
    assert_eq!(client.state(), ConnectionState::Reconnecting);

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.connect_calls(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(accepted.try_recv().is_err());
}

#[tokio::test]
async fn test_connect_after_disconnect_opens_one_connection() {
    let (connector, mut accepted) = MockConnector::new();
    let client = build(connector.clone(), RecordingClock::new(), options(3));

    client.connect("t").await.unwrap();
    let _first = next_conn(&mut accepted).await;
    client.disconnect().await.unwrap();

    client.connect("t2").await.unwrap();
    let second = next_conn(&mut accepted).await;
    assert!(second.url.as_str().contains("token=t2"));
    wait_for_state(&client, ConnectionState::Connected).await;

    tokio::task::yield_now().await;
    assert_eq!(connector.connect_calls(), 2);
    assert!(accepted.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_racing_connect_reaches_server() {
    for round in 0..50 {
        let (connector, mut accepted) = MockConnector::new();
        let client = build(connector, RecordingClock::new(), options(3));
        client.subscribe("base").await.unwrap();

        let channel = format!("live:{round}");
        let subscriber = client.clone();
        let racing = channel.clone();
        let subscribe = tokio::spawn(async move { subscriber.subscribe(&racing).await });

        client.connect("t").await.unwrap();
        subscribe.await.unwrap().unwrap();

        let mut server = next_conn(&mut accepted).await;
        let mut seen = Vec::new();
        while seen.len() < 2 {
            let message = recv(&mut server).await;
            assert_eq!(message.kind, "subscribe");
            seen.push(message.payload["channel"].as_str().unwrap().to_string());
        }
        seen.sort();
        assert_eq!(seen, vec!["base".to_string(), channel]);
    }
}
