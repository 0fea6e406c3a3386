//! Session lifecycle tests
//!
//! Drive the client end to end against the mock transport: connect,
//! registration, subscriptions, heartbeats, publishing, inbound routing and
//! shutdown. Timers run on paused tokio time.


use display_client::protocol::TopicSet;
use display_client::session::ConnectionState;
use display_client::testing::mocks::{CallbackEvent, MockCall, MockTransport};
use display_client::transport::{BrokerEndpoint, ConnectResult, QoS};
use serde_json::json;
use std::time::Duration;
use test_helpers::{TEST_DEVICE_ID, harness, settle};

fn topics() -> TopicSet {
    TopicSet::derive("mediaplatform", &format!("android_screen_{TEST_DEVICE_ID}"))
}

#[tokio::test(start_paused = true)]
async fn test_connect_subscribes_and_registers() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;

    let topics = topics();
    assert_eq!(h.client.client_id(), format!("android_screen_{TEST_DEVICE_ID}"));
    assert_eq!(
        h.transport.get_subscriptions().await,
        vec![
            topics.content.clone(),
            topics.command.clone(),
            topics.broadcast.clone()
        ]
    );

    let registrations = h.transport.get_published_json(&topics.registration).await;
    assert_eq!(registrations.len(), 1);
    let registration = &registrations[0];
    assert_eq!(registration["deviceId"], TEST_DEVICE_ID);
    assert_eq!(registration["deviceType"], "android_screen");
    assert_eq!(registration["deviceName"], "Display Terminal-test-dev");
    assert!(registration["timestamp"].as_i64().unwrap() > 0);

    let status = h.client.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.attempt_count, 0);
    assert!(status.heartbeat_active);
    assert!(h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_options_carry_last_will() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;

    let options = h.transport.get_last_options().await.unwrap();
    assert_eq!(options.keep_alive, Duration::from_secs(60));
    assert_eq!(options.connect_timeout, Duration::from_secs(30));
    assert!(options.clean_session);
    assert!(!options.automatic_reconnect);

    let will = options.last_will.unwrap();
    assert_eq!(will.topic, topics().status);
    assert_eq!(will.qos, QoS::AtLeastOnce);
    assert!(!will.retained);
    let payload: serde_json::Value = serde_json::from_slice(&will.payload).unwrap();
    assert_eq!(payload["deviceId"], TEST_DEVICE_ID);
    assert_eq!(payload["status"], "offline");
}

#[tokio::test(start_paused = true)]
async fn test_default_endpoint_is_persisted_on_first_connect() {
    let mut h = harness(MockTransport::succeeding());
    assert_eq!(h.client.broker_info(), "broker.emqx.io:1883");
    h.connect().await;

    let stored = h.store.snapshot();
    assert_eq!(stored.broker_host.as_deref(), Some("broker.emqx.io"));
    assert_eq!(stored.broker_port, Some(1883));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_every_interval_while_connected() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;
    let heartbeat_topic = topics().heartbeat;

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(h.transport.get_published_json(&heartbeat_topic).await.is_empty());

    tokio::time::sleep(Duration::from_secs(32)).await;
    let heartbeats = h.transport.get_published_json(&heartbeat_topic).await;
    assert_eq!(heartbeats.len(), 2);
    assert_eq!(heartbeats[0]["deviceId"], TEST_DEVICE_ID);
    assert_eq!(heartbeats[0]["status"], "online");
    assert_eq!(heartbeats[0]["batteryLevel"], 100);
    assert_eq!(heartbeats[0]["memoryInfo"], "1024/2048 MB");
}

#[tokio::test(start_paused = true)]
async fn test_publish_while_disconnected_is_dropped() {
    let h = harness(MockTransport::new());
    h.client.publish("mediaplatform/device/data", "payload", false);
    h.client.send_status("playing", Some("content-1"));
    settle().await;

    assert!(h.transport.get_calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_and_status_while_connected() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;
    let topics = topics();

    h.client.publish(&topics.data, r#"{"played":3}"#, true);
    h.client.send_status("playing", Some("content-1"));
    settle().await;

    let calls = h.transport.get_calls().await;
    assert!(calls.contains(&MockCall::Publish {
        topic: topics.data.clone(),
        payload: br#"{"played":3}"#.to_vec(),
        retained: true,
    }));

    let statuses = h.transport.get_published_json(&topics.status).await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0]["status"], "playing");
    assert_eq!(statuses[0]["details"], "content-1");
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_does_not_disconnect() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;
    h.transport.set_publish_failure(true).await;

    h.client.publish(&topics().data, "x", false);
    settle().await;

    assert!(h.client.is_connected());
    assert!(h.events.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_publishes_offline_and_cancels_timers() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;
    let topics = topics();

    h.client.stop().await;

    let statuses = h.transport.get_published_json(&topics.status).await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0]["status"], "offline");
    assert_eq!(statuses[0]["details"], "Service stopped");

    let calls = h.transport.get_calls().await;
    let tail: Vec<_> = calls.iter().rev().take(2).rev().cloned().collect();
    assert_eq!(tail, vec![MockCall::Disconnect, MockCall::Close]);

    let status = h.client.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(!status.heartbeat_active);
    assert_eq!(status.reconnect_pending, None);

    h.transport.clear_history().await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(h.transport.get_calls().await.is_empty());
    assert!(h.events.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_idle_is_harmless() {
    let mut h = harness(MockTransport::new());
    h.client.stop().await;
    h.client.stop().await;

    assert_eq!(h.client.status().state, ConnectionState::Disconnected);
    assert!(h.events.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_is_ignored_while_connecting_or_connected() {
    let mut h = harness(MockTransport::new());
    h.client.start();
    h.client.start();
    settle().await;
    assert_eq!(h.client.status().state, ConnectionState::Connecting);
    assert_eq!(h.transport.connect_count().await, 1);

    h.transport.complete_connect(ConnectResult::Success).await;
    h.expect_event(CallbackEvent::Connected).await;
    h.client.start();
    h.client.reconnect();
    settle().await;
    assert_eq!(h.transport.connect_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_messages_reach_callbacks() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;
    let topics = topics();

    let content = json!({
        "messageType": "content_push",
        "content": {"contentId": "c-42", "title": "Menu", "type": "image", "url": "https://cdn/menu.png"},
        "schedule": {"startTime": "08:00", "endTime": "11:00", "priority": 2}
    });
    h.transport.deliver(&topics.content, content.to_string()).await;
    match h.events.next().await {
        Some(CallbackEvent::Content(push)) => {
            assert_eq!(push.content.id, "c-42");
            assert_eq!(push.content.content_type, "image");
            assert_eq!(push.schedule.unwrap().priority, 2);
        }
        other => panic!("expected content, got {other:?}"),
    }

    h.transport
        .deliver(&topics.command, r#"{"command":"screenshot","timestamp":1700000000000}"#)
        .await;
    match h.events.next().await {
        Some(CallbackEvent::Command(command)) => {
            assert_eq!(command.command, "screenshot");
            assert_eq!(command.timestamp, Some(1_700_000_000_000));
        }
        other => panic!("expected command, got {other:?}"),
    }

    h.transport.deliver(&topics.broadcast, "maintenance at 02:00").await;
    h.expect_event(CallbackEvent::Broadcast("maintenance at 02:00".to_string()))
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_and_unmatched_messages_are_dropped() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;
    let topics = topics();

    h.transport.deliver(&topics.content, "{\"content\":").await;
    h.transport.deliver(&topics.command, "[]").await;
    h.transport.deliver("mediaplatform/device/other/content", "{}").await;
    h.transport.deliver(&topics.broadcast, "still here").await;

    h.expect_event(CallbackEvent::Broadcast("still here".to_string()))
        .await;
    assert!(h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_update_broker_config_restarts_against_new_endpoint() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;

    h.client.update_broker_config(" 10.0.0.7 ", 1884).await;
    h.expect_event(CallbackEvent::Connected).await;

    assert_eq!(h.client.broker_info(), "10.0.0.7:1884");
    let stored = h.store.snapshot();
    assert_eq!(stored.broker_host.as_deref(), Some("10.0.0.7"));
    assert_eq!(stored.broker_port, Some(1884));

    let connects: Vec<BrokerEndpoint> = h
        .transport
        .get_calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            MockCall::Connect { endpoint, .. } => Some(endpoint),
            _ => None,
        })
        .collect();
    assert_eq!(
        connects,
        vec![
            BrokerEndpoint::new("broker.emqx.io", 1883),
            BrokerEndpoint::new("10.0.0.7", 1884)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_results_from_abandoned_connect_are_ignored() {
    let mut h = harness(MockTransport::new());
    h.client.start();
    settle().await;
    let stale_sink = h.transport.sink.lock().await.clone().unwrap();

    h.client.stop().await;
    h.client.start();
    settle().await;
    assert_eq!(h.client.status().state, ConnectionState::Connecting);

    stale_sink.connect_succeeded();
    stale_sink.connection_lost("late");
    settle().await;
    assert_eq!(h.client.status().state, ConnectionState::Connecting);
    assert!(h.events.drain().is_empty());

    h.transport.complete_connect(ConnectResult::Success).await;
    h.expect_event(CallbackEvent::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_stops_session() {
    let mut h = harness(MockTransport::succeeding());
    h.connect().await;
    let transport = h.transport.clone();

    drop(h.client);
    settle().await;

    let calls = transport.get_calls().await;
    assert_eq!(calls.last(), Some(&MockCall::Close));
    assert_eq!(h.events.next().await, None);
}
