//! Shared helpers for the in-memory client tests.
#![allow(dead_code)]

use std::io;
use std::time::Duration;

use courier_messaging::{Client, ConnectionConfig, Message, SubscriptionHandler, handler_fn};
use courier_messaging_memory::{MemoryBroker, MemoryConnection, MemoryConnectionOptions};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Configuration with short client-side bounds so timeout paths finish quickly.
pub fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        connect_timeout: Duration::from_millis(50),
        ack_wait: Duration::from_millis(200),
        provision_timeout: Duration::from_secs(2),
        ..ConnectionConfig::default()
    }
}

pub async fn connect(broker: &MemoryBroker) -> Client<MemoryConnection> {
    connect_with(broker, test_config()).await
}

pub async fn connect_with(
    broker: &MemoryBroker,
    config: ConnectionConfig,
) -> Client<MemoryConnection> {
    Client::<MemoryConnection>::connect(
        config,
        MemoryConnectionOptions {
            broker: broker.clone(),
        },
    )
    .await
    .expect("Failed to connect to in-memory broker")
}

/// Handler forwarding every message to the returned receiver.
pub fn collector() -> (impl SubscriptionHandler, mpsc::UnboundedReceiver<Message>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let handler = handler_fn(move |message: Message| {
        let sender = sender.clone();
        async move {
            sender
                .send(message)
                .map_err(|_| io::Error::other("receiver dropped"))
        }
    });

    (handler, receiver)
}

/// Handler that rejects every message.
pub fn failing() -> impl SubscriptionHandler {
    handler_fn(|_: Message| async { Err::<(), _>(io::Error::other("handler rejected message")) })
}

pub async fn next(receiver: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("Timeout waiting for message")
        .expect("Handler dropped")
}

pub async fn assert_silent(receiver: &mut mpsc::UnboundedReceiver<Message>) {
    assert!(
        timeout(Duration::from_millis(100), receiver.recv())
            .await
            .is_err(),
        "Unexpected message"
    );
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Condition not met in time");
}
