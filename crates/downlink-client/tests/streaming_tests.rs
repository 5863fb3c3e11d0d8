//! Streaming client behaviour over a scripted transport
//!
//! Time is paused, so reconnect delays elapse instantly and exactly.

use downlink_client::{
    ClientConfig, ConnectionPhase, InboundFrame, StreamingClient, DEFAULT_ENDPOINT,
};
use downlink_core::{codec, RegressionPolicy};
use downlink_test_utils::{envelope, ScriptedTransport, BASE_TIME_MS};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::Instant;

const RECONNECT: Duration = Duration::from_millis(3000);

#[tokio::test(start_paused = true)]
async fn test_connect_close_reconnect_cycle() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    assert_eq!(client.view().phase, ConnectionPhase::Disconnected);
    assert!(!client.view().is_connected);

    assert_eq!(controller.next_attempt().await.unwrap(), DEFAULT_ENDPOINT);
    assert_eq!(client.view().phase, ConnectionPhase::Connecting);
    let session = controller.accept();

    let view = client.wait_for(|v| v.is_connected).await.unwrap();
    assert_eq!(view.phase, ConnectionPhase::Connected);

    let closed_at = Instant::now();
    session.close("server restart");
    let view = client
        .wait_for(|v| v.phase == ConnectionPhase::ReconnectScheduled)
        .await
        .unwrap();
    assert!(!view.is_connected);

    controller.next_attempt().await.unwrap();
    let waited = closed_at.elapsed();
    assert!(waited >= RECONNECT, "reconnected after {waited:?}");
    assert!(waited < RECONNECT + Duration::from_millis(100));
    assert_eq!(client.view().phase, ConnectionPhase::Connecting);

    let _session = controller.accept();
    let view = client.wait_for(|v| v.is_connected).await.unwrap();
    assert_eq!(view.reconnects, 1);

    // The original timer must not fire a second time
    tokio::time::sleep(RECONNECT * 4).await;
    assert_eq!(controller.stats().connect_attempts, 2);
    assert!(client.view().is_connected);

    client.shutdown().await.unwrap();
    assert_eq!(controller.stats().closed_by_client, 1);
}

#[tokio::test(start_paused = true)]
async fn test_twelve_envelopes_in_order() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    controller.next_attempt().await.unwrap();
    let session = controller.accept();
    client.wait_for(|v| v.is_connected).await.unwrap();

    for seq in 1..=12 {
        session.send_envelope(&envelope(seq, 300.0 + seq as f64), 25);
    }

    let view = client
        .wait_for(|v| v.last_sequence == Some(12))
        .await
        .unwrap();
    let altitudes: Vec<f64> = view.history.iter().map(|s| s.altitude_km()).collect();
    let expected: Vec<f64> = (1..=12).map(|seq| 300.0 + f64::from(seq)).collect();

    assert_eq!(view.history_len(), 12);
    assert_eq!(altitudes, expected);
    assert_eq!(view.latest.as_ref().unwrap().altitude_km(), 312.0);
    assert_eq!(view.latency_ms, Some(25));
    assert_eq!(view.packets_lost, 0);

    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_history_keeps_last_hundred() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    controller.next_attempt().await.unwrap();
    let session = controller.accept();

    for seq in 1..=150 {
        session.send_envelope(&envelope(seq, f64::from(seq as i32)), 10);
    }

    let view = client
        .wait_for(|v| v.last_sequence == Some(150))
        .await
        .unwrap();
    assert_eq!(view.history_len(), 100);
    assert_eq!(view.history.first().unwrap().altitude_km(), 51.0);
    assert_eq!(view.history.last().unwrap().altitude_km(), 150.0);

    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_do_not_end_session() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    controller.next_attempt().await.unwrap();
    let session = controller.accept();

    session.send_raw("{ not json");
    session.send_raw(r#"{"send_timestamp_ms": 1, "source": "simulator", "telemetry": {}}"#);
    session.send_raw("");
    session.send_envelope(&envelope(1, 350.0), 5);

    let view = client.wait_for(|v| v.last_sequence == Some(1)).await.unwrap();
    assert!(view.is_connected);
    assert_eq!(view.history_len(), 1);
    assert_eq!(view.packets_lost, 0);
    assert_eq!(controller.stats().connect_attempts, 1);

    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transport_warning_keeps_connection() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    controller.next_attempt().await.unwrap();
    let session = controller.accept();

    session.warn("invalid utf-8 in frame");
    session.send_envelope(&envelope(7, 350.0), 5);

    let view = client.wait_for(|v| v.last_sequence == Some(7)).await.unwrap();
    assert!(view.is_connected);
    assert_eq!(view.phase, ConnectionPhase::Connected);
    assert_eq!(controller.stats().connect_attempts, 1);

    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_extreme_send_timestamp_keeps_client_running() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    controller.next_attempt().await.unwrap();
    let session = controller.accept();

    let mut skewed = envelope(1, 350.0);
    skewed.send_timestamp_ms = i64::MIN;
    session.send_frame(InboundFrame {
        payload: codec::encode(&skewed).unwrap().into_bytes(),
        received_at_ms: BASE_TIME_MS,
    });

    let view = client.wait_for(|v| v.last_sequence == Some(1)).await.unwrap();
    assert_eq!(view.latency_ms, Some(i64::MAX));

    session.send_envelope(&envelope(2, 351.0), 5);
    let view = client.wait_for(|v| v.last_sequence == Some(2)).await.unwrap();
    assert!(view.is_connected);
    assert_eq!(view.latency_ms, Some(5));
    assert_eq!(view.history_len(), 2);
    assert!(client.is_running());

    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_gap_and_loss_survive_reconnect() {
    let (transport, mut controller) = ScriptedTransport::new();
    let config = ClientConfig::new().with_reconnect_delay(Duration::from_millis(200));
    let mut client = StreamingClient::spawn(config, transport).unwrap();

    controller.next_attempt().await.unwrap();
    let session = controller.accept();
    session.send_envelope(&envelope(1, 350.0), 5);
    session.send_envelope(&envelope(4, 350.0), 5);
    client.wait_for(|v| v.last_sequence == Some(4)).await.unwrap();
    assert_eq!(client.view().packets_lost, 2);
    drop(session);

    controller.next_attempt().await.unwrap();
    let session = controller.accept();
    session.send_envelope(&envelope(10, 351.0), 5);

    let view = client.wait_for(|v| v.last_sequence == Some(10)).await.unwrap();
    assert_eq!(view.packets_lost, 7);
    assert_eq!(view.history_len(), 3);

    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_regression_policies() {
    for (policy, expected) in [(RegressionPolicy::Accumulate, 1), (RegressionPolicy::Clamp, 3)] {
        let (transport, mut controller) = ScriptedTransport::new();
        let config = ClientConfig::new().with_regression_policy(policy);
        let mut client = StreamingClient::spawn(config, transport).unwrap();

        controller.next_attempt().await.unwrap();
        let session = controller.accept();
        for seq in [1, 5, 4] {
            session.send_envelope(&envelope(seq, 350.0), 5);
        }

        let view = client
            .wait_for(|v| v.last_sequence == Some(4) && v.history_len() == 3)
            .await
            .unwrap();
        assert_eq!(view.packets_lost, expected, "{policy:?}");

        client.shutdown().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_refused_connects_retry_at_fixed_interval() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    controller.next_attempt().await.unwrap();
    let mut last = Instant::now();
    controller.refuse("connection refused");

    for _ in 0..4 {
        controller.next_attempt().await.unwrap();
        let now = Instant::now();
        let waited = now - last;
        assert!(waited >= RECONNECT && waited < RECONNECT + Duration::from_millis(100));
        last = now;
        controller.refuse("connection refused");
    }

    let view = client
        .wait_for(|v| v.phase == ConnectionPhase::ReconnectScheduled)
        .await
        .unwrap();
    assert!(!view.is_connected);
    assert_eq!(controller.stats().connect_attempts, 5);

    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_schedules_reconnect() {
    let (transport, mut controller) = ScriptedTransport::new();
    let config = ClientConfig::new().with_connect_timeout(Duration::from_millis(500));
    let mut client = StreamingClient::spawn(config, transport).unwrap();

    controller.next_attempt().await.unwrap();
    let started = Instant::now();

    client
        .wait_for(|v| v.phase == ConnectionPhase::ReconnectScheduled)
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(500));

    controller.next_attempt().await.unwrap();
    let _session = controller.accept();
    client.wait_for(|v| v.is_connected).await.unwrap();

    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_reconnect() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    controller.next_attempt().await.unwrap();
    controller.refuse("connection refused");
    client
        .wait_for(|v| v.phase == ConnectionPhase::ReconnectScheduled)
        .await
        .unwrap();

    client.shutdown().await.unwrap();
    assert!(!client.is_running());
    assert_eq!(client.view().phase, ConnectionPhase::Stopped);

    tokio::time::sleep(RECONNECT * 3).await;
    assert_eq!(controller.stats().connect_attempts, 1);

    // Second call is a no-op
    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_live_connection() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    controller.next_attempt().await.unwrap();
    let session = controller.accept();
    client.wait_for(|v| v.is_connected).await.unwrap();

    client.shutdown().await.unwrap();

    let view = client.view();
    assert!(!view.is_connected);
    assert_eq!(view.phase, ConnectionPhase::Stopped);
    assert_eq!(controller.stats().closed_by_client, 1);
    assert!(session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_connect_attempt() {
    let (transport, mut controller) = ScriptedTransport::new();
    let mut client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();

    controller.next_attempt().await.unwrap();
    client.shutdown().await.unwrap();

    assert_eq!(client.view().phase, ConnectionPhase::Stopped);
    assert_eq!(controller.stats().connect_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_aborts_client() {
    let (transport, mut controller) = ScriptedTransport::new();
    let client = StreamingClient::spawn(ClientConfig::new(), transport).unwrap();
    let mut views = client.subscribe();

    controller.next_attempt().await.unwrap();
    let session = controller.accept();
    views.wait_for(|v| v.is_connected).await.unwrap();

    drop(client);
    for _ in 0..10 {
        if session.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_independent_clients() {
    let (transport_a, mut controller_a) = ScriptedTransport::new();
    let (transport_b, mut controller_b) = ScriptedTransport::new();
    let mut a = StreamingClient::spawn(ClientConfig::new(), transport_a).unwrap();
    let mut b = StreamingClient::spawn(ClientConfig::new(), transport_b).unwrap();
    assert_ne!(a.id(), b.id());

    controller_a.next_attempt().await.unwrap();
    controller_b.next_attempt().await.unwrap();
    let session_a = controller_a.accept();
    controller_b.refuse("down");

    session_a.send_envelope(&envelope(1, 350.0), 5);
    a.wait_for(|v| v.last_sequence == Some(1)).await.unwrap();
    b.wait_for(|v| v.phase == ConnectionPhase::ReconnectScheduled)
        .await
        .unwrap();

    assert!(a.view().is_connected);
    assert!(!b.view().is_connected);
    assert!(b.view().latest.is_none());

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}
