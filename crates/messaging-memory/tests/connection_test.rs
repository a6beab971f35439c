//! Connection lifecycle tests against the in-memory broker.
//!
//! Tests include:
//! - Connect failures (timeout, auth, missing stream support)
//! - Defaults applied to zero-valued configuration
//! - Disconnects and reconnects
//! - Close semantics

mod common;
use common::{collector, connect, connect_with, next, test_config};

use std::time::Duration;

use courier_messaging::connection::ConnectionState;
use courier_messaging::{
    Client, ConnectionConfig, Error, SubscriptionKey, SubscriptionState, handler_fn,
};
use courier_messaging_memory::{MemoryBroker, MemoryConnection, MemoryConnectionOptions};

async fn try_connect(
    broker: &MemoryBroker,
    config: ConnectionConfig,
) -> Result<Client<MemoryConnection>, Error> {
    Client::<MemoryConnection>::connect(
        config,
        MemoryConnectionOptions {
            broker: broker.clone(),
        },
    )
    .await
}

// ============= Connect Tests =============

#[tokio::test]
async fn test_connect_applies_defaults() {
    let broker = MemoryBroker::new();
    let config = ConnectionConfig {
        name: String::new(),
        ack_wait: Duration::ZERO,
        handler_concurrency: 0,
        ..ConnectionConfig::default()
    };

    let client = connect_with(&broker, config).await;

    assert!(client.config().name.starts_with("courier-"));
    assert_eq!(client.config().ack_wait, Duration::from_secs(5));
    assert_eq!(client.config().handler_concurrency, 64);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_connect_timeout() {
    let broker = MemoryBroker::new();
    broker.set_unreachable(true);

    let error = try_connect(&broker, test_config())
        .await
        .expect_err("Connect should time out");

    assert!(matches!(error, Error::ConnectTimeout { .. }));
    assert!(error.is_timeout());
}

#[tokio::test]
async fn test_connect_auth_rejected() {
    let broker = MemoryBroker::with_credentials("orders", "secret");

    let error = try_connect(&broker, test_config())
        .await
        .expect_err("Connect without credentials should be rejected");
    assert!(matches!(error, Error::AuthRejected { .. }));

    let error = try_connect(&broker, test_config().with_credentials("orders", "wrong"))
        .await
        .expect_err("Connect with wrong password should be rejected");
    assert!(matches!(error, Error::AuthRejected { .. }));

    let client = try_connect(&broker, test_config().with_credentials("orders", "secret"))
        .await
        .expect("Connect with matching credentials should succeed");
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_connect_half_credentials_are_not_sent() {
    let broker = MemoryBroker::new();

    let client = try_connect(&broker, test_config().with_credentials("orders", ""))
        .await
        .expect("Username without password should connect without auth");

    assert!(client.config().credentials().is_none());
}

#[tokio::test]
async fn test_connect_fails_without_stream_context() {
    let broker = MemoryBroker::new();
    broker.set_streams_disabled(true);

    let error = try_connect(&broker, test_config())
        .await
        .expect_err("Connect should fail when streams are unavailable");

    assert!(matches!(error, Error::ContextUnavailable(_)));
}

// ============= Disconnect Tests =============

#[tracing_test::traced_test]
#[tokio::test]
async fn test_operations_fail_while_disconnected() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;
    let observer = connect(&broker).await;

    client
        .ensure_stream("EVENTS", &["events.>"])
        .await
        .expect("Failed to ensure stream");
    let (handler, mut receiver) = collector();
    observer
        .subscribe_to_subject("events.>", handler)
        .await
        .expect("Failed to subscribe");

    client.connection().simulate_disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let error = client.publish("events.one", "lost").await.unwrap_err();
    assert!(error.is_not_connected());

    let error = client.publish_async("events.one", "lost").await.unwrap_err();
    assert!(error.is_not_connected());

    let error = client
        .request("events.one", "lost", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(error.is_not_connected());

    let (handler, _) = collector();
    let error = client
        .subscribe_to_subject("events.>", handler)
        .await
        .unwrap_err();
    assert!(error.is_not_connected());

    common::assert_silent(&mut receiver).await;
    let stream = observer.get_stream("EVENTS").await.expect("Stream missing");
    let info = courier_messaging::stream::Stream::info(&stream)
        .await
        .expect("Failed to read stream info");
    assert_eq!(info.messages, 0);

    client.connection().simulate_reconnect();
    assert!(client.is_connected());
    assert!(logs_contain("reconnected to broker"));

    client
        .publish("events.one", "delivered")
        .await
        .expect("Publish after reconnect should succeed");
    assert_eq!(next(&mut receiver).await.payload, "delivered");
}

// ============= Close Tests =============

#[tokio::test]
async fn test_close_stops_subscriptions_and_drains() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let (handler, _receiver) = collector();
    let plain = client
        .subscribe_to_subject("alerts", handler)
        .await
        .expect("Failed to subscribe");
    let durable = client
        .subscribe_to_jetstream(
            "ALERTS",
            "alerts.critical",
            handler_fn(|_| async { Ok::<(), std::io::Error>(()) }),
        )
        .await
        .expect("Failed to start durable consumer");
    assert_eq!(client.registry().len().await, 2);

    client.close().await.expect("Failed to close");

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client.registry().is_empty().await);
    assert_eq!(plain.state(), SubscriptionState::Stopped);
    assert_eq!(durable.handle().state(), SubscriptionState::Stopped);
    assert_eq!(broker.subscription_count().await, 0);

    let error = client.publish("alerts", "late").await.unwrap_err();
    assert!(error.is_not_connected());

    client.close().await.expect("Second close should be a no-op");
}

#[tokio::test]
async fn test_close_while_disconnected_skips_drain() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    client.connection().simulate_disconnect();
    client.close().await.expect("Close while disconnected should succeed");

    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_clones_share_state() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;
    let clone = client.clone();

    let (handler, _receiver) = collector();
    clone
        .subscribe_to_subject("shared", handler)
        .await
        .expect("Failed to subscribe");
    assert!(client.registry().contains(&SubscriptionKey::subject("shared")).await);

    clone.close().await.expect("Failed to close");
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(!client.is_connected());
}
