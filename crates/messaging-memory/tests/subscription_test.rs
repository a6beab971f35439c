//! Subscription manager tests against the in-memory broker.
//!
//! Tests include:
//! - Handler error isolation
//! - Queue group load distribution
//! - Registry key uniqueness and unsubscribe
//! - Durable consumers: ack gating, redelivery limits, replay and naming
//! - Provisioning deadline and consumer rejection

mod common;
use common::{collector, connect, connect_with, failing, next, test_config, wait_until};

use std::collections::HashSet;
use std::io;
use std::time::Duration;

use courier_messaging::consumer::{Consumer, RedeliveryPolicy};
use courier_messaging::stream::Stream;
use courier_messaging::{
    ConnectionConfig, Error, Message, SubscriptionKey, SubscriptionKind, SubscriptionState,
    handler_fn,
};
use courier_messaging_memory::MemoryBroker;
use tokio::time::timeout;

fn redelivery_config() -> ConnectionConfig {
    ConnectionConfig {
        redelivery: RedeliveryPolicy {
            max_deliver: Some(3),
            ack_wait: Some(Duration::from_millis(100)),
            backoff: Vec::new(),
        },
        ..test_config()
    }
}

// ============= Error Isolation Tests =============

#[tracing_test::traced_test]
#[tokio::test]
async fn test_handler_errors_do_not_end_subscription() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let handle = client
        .subscribe_to_subject("jobs.failing", failing())
        .await
        .expect("Failed to subscribe");

    for n in 0..5 {
        client
            .publish("jobs.failing", format!("job-{n}"))
            .await
            .expect("Failed to publish");
    }

    wait_until(|| handle.stats().failed == 5).await;

    assert_eq!(handle.state(), SubscriptionState::Active);
    assert_eq!(handle.stats().delivered, 5);
    assert!(logs_contain("error handling message"));
    assert!(logs_contain("data=job-4"));
}

#[tokio::test]
async fn test_subscribe_rejects_malformed_patterns() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let error = client
        .subscribe_to_subject("orders.>.created", failing())
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidSubject { .. }));

    let error = client
        .subscribe_to_queue_group("orders", "", failing())
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidSubject { .. }));

    assert!(client.registry().is_empty().await);
}

#[tokio::test]
async fn test_subscribe_to_all_receives_every_subject() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let (handler, mut receiver) = collector();
    let handle = client
        .subscribe_to_all(handler)
        .await
        .expect("Failed to subscribe");
    assert_eq!(handle.key(), &SubscriptionKey::all());
    assert_eq!(handle.kind(), &SubscriptionKind::All);

    client.publish("a", "1").await.expect("Failed to publish");
    client.publish("b.c.d", "2").await.expect("Failed to publish");

    assert_eq!(next(&mut receiver).await.subject, "a");
    assert_eq!(next(&mut receiver).await.subject, "b.c.d");
}

// ============= Queue Group Tests =============

#[tokio::test]
async fn test_queue_group_delivers_each_message_once() {
    let broker = MemoryBroker::new();
    let first = connect(&broker).await;
    let second = connect(&broker).await;
    let publisher = connect(&broker).await;

    let (handler, mut first_receiver) = collector();
    let first_handle = first
        .subscribe_to_queue_group("work.items", "workers", handler)
        .await
        .expect("Failed to join queue group");
    let (handler, mut second_receiver) = collector();
    second
        .subscribe_to_queue_group("work.items", "workers", handler)
        .await
        .expect("Failed to join queue group");

    assert_eq!(
        first_handle.key(),
        &SubscriptionKey::queue_group("work.items", "workers")
    );

    for n in 0..10 {
        publisher
            .publish("work.items", n.to_string())
            .await
            .expect("Failed to publish");
    }

    let mut first_seen = HashSet::new();
    let mut second_seen = HashSet::new();
    timeout(Duration::from_secs(5), async {
        while first_seen.len() + second_seen.len() < 10 {
            tokio::select! {
                Some(message) = first_receiver.recv() => {
                    assert!(first_seen.insert(message.payload));
                }
                Some(message) = second_receiver.recv() => {
                    assert!(second_seen.insert(message.payload));
                }
            }
        }
    })
    .await
    .expect("Timeout waiting for queue group deliveries");

    assert!(first_seen.is_disjoint(&second_seen));
    assert!(!first_seen.is_empty());
    assert!(!second_seen.is_empty());
    assert_eq!(first_seen.union(&second_seen).count(), 10);

    common::assert_silent(&mut first_receiver).await;
    common::assert_silent(&mut second_receiver).await;
}

// ============= Registry Tests =============

#[tokio::test]
async fn test_resubscribe_replaces_registry_entry() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let (handler, mut first_receiver) = collector();
    let first = client
        .subscribe_to_subject("alerts", handler)
        .await
        .expect("Failed to subscribe");
    let (handler, mut second_receiver) = collector();
    let second = client
        .subscribe_to_subject("alerts", handler)
        .await
        .expect("Failed to resubscribe");

    assert_eq!(client.registry().len().await, 1);
    assert_eq!(client.registry().keys().await, vec![SubscriptionKey::subject("alerts")]);
    assert_eq!(first.state(), SubscriptionState::Stopped);
    assert_eq!(second.state(), SubscriptionState::Active);

    client.publish("alerts", "fire").await.expect("Failed to publish");

    assert_eq!(next(&mut second_receiver).await.payload, "fire");
    assert!(first_receiver.recv().await.is_none());
    assert_eq!(broker.subscription_count().await, 1);
}

#[tokio::test]
async fn test_unsubscribe_removes_and_stops() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let (handler, _receiver) = collector();
    let handle = client
        .subscribe_to_subject("alerts", handler)
        .await
        .expect("Failed to subscribe");
    let key = handle.key().clone();

    assert!(client.unsubscribe(&key).await);
    assert!(!client.unsubscribe(&key).await);
    assert_eq!(handle.state(), SubscriptionState::Stopped);
    assert!(client.registry().get(&key).await.is_none());
}

// ============= Durable Consumer Tests =============

#[tracing_test::traced_test]
#[tokio::test]
async fn test_durable_consumer_acks_only_successful_messages() {
    let broker = MemoryBroker::new();
    let client = connect_with(&broker, redelivery_config()).await;

    let durable = client
        .subscribe_to_jetstream(
            "ORDERS",
            "orders.created",
            handler_fn(|message: Message| async move {
                if message.payload == "bad" {
                    Err(io::Error::other("rejected"))
                } else {
                    Ok(())
                }
            }),
        )
        .await
        .expect("Failed to start durable consumer");

    let good = client
        .publish_async("orders.created", "good")
        .await
        .expect("Failed to publish")
        .await
        .expect("Message should be stored");
    client
        .publish_async("orders.created", "bad")
        .await
        .expect("Failed to publish")
        .await
        .expect("Message should be stored");

    wait_until(|| durable.handle().stats().failed == 3).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stats = durable.handle().stats();
    assert_eq!(stats.failed, 3, "delivery stops at max_deliver");
    assert_eq!(stats.acknowledged, 1);
    assert_eq!(stats.delivered, 4);
    assert_eq!(durable.consumer().acknowledged().await, vec![good.sequence]);

    let info = durable.info().await.expect("Failed to read consumer info");
    assert_eq!(info.name, "consumer_orders_created");
    assert_eq!(info.stream_name, "ORDERS");
    assert_eq!(info.filter_subject, "orders.created");
    assert_eq!(info.num_pending, 0);
    assert_eq!(info.num_redelivered, 1);
    assert!(logs_contain("error handling message"));
}

#[tokio::test]
async fn test_durable_stream_covers_subject_and_children() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let durable = client
        .subscribe_to_jetstream("ORDERS", "orders.created", failing())
        .await
        .expect("Failed to start durable consumer");

    let stream = client.get_stream("ORDERS").await.expect("Stream missing");
    let info = stream.info().await.expect("Failed to read stream info");
    assert_eq!(info.subjects, vec!["orders.created", "orders.created.*"]);

    assert_eq!(
        durable.handle().key(),
        &SubscriptionKey::consumer("orders.created")
    );
    assert_eq!(
        durable.handle().kind(),
        &SubscriptionKind::Durable {
            stream: "ORDERS".to_string(),
            consumer: "consumer_orders_created".to_string(),
        }
    );
    assert_eq!(durable.consumer().stream_name(), "ORDERS");
}

#[tokio::test]
async fn test_all_jetstream_consumer() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let (handler, mut receiver) = collector();
    let durable = client
        .subscribe_to_all_jetstream("ALL_MESSAGES", handler)
        .await
        .expect("Failed to start durable consumer");

    assert_eq!(durable.consumer().name(), "consumer_all");
    assert!(client.registry().contains(&SubscriptionKey::consumer(">")).await);

    let stream = client.get_stream("ALL_MESSAGES").await.expect("Stream missing");
    let info = stream.info().await.expect("Failed to read stream info");
    assert_eq!(info.subjects, vec![">"]);

    client
        .publish("anything.at.all", "core")
        .await
        .expect("Failed to publish");

    let message = next(&mut receiver).await;
    assert_eq!(message.subject, "anything.at.all");
    let delivery = message.delivery.expect("Durable message without delivery info");
    assert_eq!(delivery.stream, "ALL_MESSAGES");
    assert_eq!(delivery.consumer, "consumer_all");
    assert_eq!(delivery.delivered, 1);

    wait_until(|| durable.handle().stats().acknowledged == 1).await;
}

#[tokio::test]
async fn test_durable_consumer_replays_after_restart() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let (handler, mut receiver) = collector();
    let durable = client
        .subscribe_to_jetstream("EVENTS", "events.user", handler)
        .await
        .expect("Failed to start durable consumer");
    client
        .publish("events.user", "first")
        .await
        .expect("Failed to publish");
    assert_eq!(next(&mut receiver).await.payload, "first");
    wait_until(|| durable.handle().stats().acknowledged == 1).await;

    durable.stop().await;
    client
        .publish("events.user", "while-stopped")
        .await
        .expect("Failed to publish");

    let (handler, mut receiver) = collector();
    let resumed = client
        .subscribe_to_jetstream("EVENTS", "events.user", handler)
        .await
        .expect("Failed to resume durable consumer");

    let message = next(&mut receiver).await;
    assert_eq!(message.payload, "while-stopped");
    assert_eq!(
        message.delivery.map(|delivery| delivery.stream_sequence),
        Some(2)
    );
    assert_eq!(client.registry().len().await, 1);
    assert_eq!(resumed.handle().state(), SubscriptionState::Active);
}

#[tokio::test]
async fn test_ensure_stream_keeps_existing_configuration() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let first = client
        .ensure_stream("ORDERS", &["orders.created"])
        .await
        .expect("Failed to create stream");
    let second = client
        .ensure_stream("ORDERS", &["payments.*"])
        .await
        .expect("Failed to ensure stream");

    assert_eq!(first.name(), second.name());
    let info = second.info().await.expect("Failed to read stream info");
    assert_eq!(info.subjects, vec!["orders.created"]);
    assert_eq!(broker.stream_names().await, vec!["ORDERS"]);
}

#[tokio::test]
async fn test_create_stream_updates_existing_configuration() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    client
        .ensure_stream("ORDERS", &["orders.created"])
        .await
        .expect("Failed to create stream");
    let updated = client
        .create_stream(
            courier_messaging::stream::StreamConfig::new(
                "ORDERS",
                vec!["orders.>".to_string()],
            )
            .with_max_age(Duration::from_secs(86_400)),
        )
        .await
        .expect("Failed to update stream");

    let info = updated.info().await.expect("Failed to read stream info");
    assert_eq!(info.subjects, vec!["orders.>"]);
    assert_eq!(info.max_age, Some(Duration::from_secs(86_400)));
}

#[tokio::test]
async fn test_ensure_stream_only_creates_when_absent() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;
    broker.set_streams_disabled(true);

    let error = client
        .ensure_stream("ORDERS", &["orders.created"])
        .await
        .unwrap_err();

    assert!(
        matches!(error, Error::GetStream { ref stream, .. } if stream == "ORDERS"),
        "{error:?}"
    );
    broker.set_streams_disabled(false);
    assert!(broker.stream_names().await.is_empty());
}

#[tokio::test]
async fn test_stream_errors_carry_context() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    let error = client.get_stream("MISSING").await.unwrap_err();
    assert!(matches!(error, Error::GetStream { ref stream, .. } if stream == "MISSING"));

    let error = client
        .ensure_stream::<&str>("ORDERS", &[])
        .await
        .unwrap_err();
    assert!(matches!(error, Error::CreateStream { ref stream, .. } if stream == "ORDERS"));
}

// ============= Provisioning Failure Tests =============

#[tokio::test]
async fn test_provisioning_deadline_is_a_timeout() {
    let broker = MemoryBroker::new();
    let client = connect_with(
        &broker,
        ConnectionConfig {
            provision_timeout: Duration::from_millis(100),
            ..test_config()
        },
    )
    .await;
    broker.set_hold_provisioning(true);

    let (handler, _receiver) = collector();
    let error = client
        .subscribe_to_jetstream("ORDERS", "orders.created", handler)
        .await
        .unwrap_err();

    assert!(
        matches!(error, Error::ProvisionTimeout { timeout, .. } if timeout == Duration::from_millis(100)),
        "{error:?}"
    );
    assert!(error.is_timeout());
    assert!(
        !client
            .registry()
            .contains(&SubscriptionKey::consumer("orders.created"))
            .await
    );
    assert!(broker.stream_names().await.is_empty());

    broker.set_hold_provisioning(false);
    let (handler, _receiver) = collector();
    client
        .subscribe_to_jetstream("ORDERS", "orders.created", handler)
        .await
        .expect("Provisioning should succeed once released");
    assert_eq!(broker.stream_names().await, vec!["ORDERS"]);
}

#[tokio::test]
async fn test_rejected_consumer_carries_context() {
    let broker = MemoryBroker::new();
    let client = connect(&broker).await;

    client
        .ensure_stream("ORDERS", &["orders.>"])
        .await
        .expect("Failed to create stream");

    let (handler, _receiver) = collector();
    let error = client
        .subscribe_to_jetstream("ORDERS", "users.created", handler)
        .await
        .unwrap_err();

    assert!(
        matches!(
            error,
            Error::CreateConsumer { ref consumer, ref stream, .. }
                if consumer == "consumer_users_created" && stream == "ORDERS"
        ),
        "{error:?}"
    );
    assert!(!error.is_timeout());
    assert!(
        !client
            .registry()
            .contains(&SubscriptionKey::consumer("users.created"))
            .await
    );
}
