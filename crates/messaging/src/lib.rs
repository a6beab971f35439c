//! Backend-neutral messaging client: connection management, publishing, stream
//! provisioning and subscriptions over a subject-routed broker with persistent streams.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

/// Acknowledgement futures for durably published messages.
pub mod ack;

/// The client facade.
pub mod client;

/// Connection configuration.
pub mod config;

/// Connections are live transport sessions with a broker.
pub mod connection;

/// Consumers are durable, acknowledged cursors over streams.
pub mod consumer;

/// The persistent-messaging context of a connection.
pub mod context;

/// Messages delivered by the broker.
pub mod message;

/// Registry of active subscriptions.
pub mod registry;

/// Streams are persistent, replayable logs of messages.
pub mod stream;

/// Subjects are hierarchical routing keys.
pub mod subject;

/// Running subscriptions and their dispatch.
pub mod subscription;

/// Subscription handlers process delivered messages.
pub mod subscription_handler;

pub use ack::{AckFuture, AckOutcome};
pub use client::{Client, ConsumerOf, DurableSubscription, StreamOf};
pub use config::ConnectionConfig;
pub use error::{BoxError, BrokerError, Error, ErrorKind};
pub use message::Message;
pub use registry::{SubscriptionKey, SubscriptionRegistry};
pub use subscription::{SubscriptionHandle, SubscriptionKind, SubscriptionState, SubscriptionStats};
pub use subscription_handler::{SubscriptionHandler, handler_fn};
