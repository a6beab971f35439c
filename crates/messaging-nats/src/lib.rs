//! NATS implementation of the messaging crate.
//!
//! Core publish, request and subscriptions go through an `async-nats` client;
//! streams, durable publishes and pull consumers go through its `JetStream` context.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

/// Connections to a NATS server.
pub mod connection;

/// Durable pull consumers.
pub mod consumer;

/// The `JetStream` context.
pub mod context;

/// `JetStream` streams.
pub mod stream;

pub use connection::{NatsConnection, NatsConnectionOptions};
pub use consumer::NatsConsumer;
pub use context::NatsContext;
pub use error::Error;
pub use stream::NatsStream;
