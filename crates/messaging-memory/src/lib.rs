//! In-memory implementation of the messaging crate.
//!
//! A [`MemoryBroker`] routes subjects, balances queue groups and keeps memory
//! streams with durable, explicitly acknowledged consumers, so the client can be
//! exercised without a broker process.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

/// The shared in-process broker.
pub mod broker;

/// Connections to the in-memory broker.
pub mod connection;

/// Durable consumers on memory streams.
pub mod consumer;

/// The persistent-messaging context.
pub mod context;

/// Memory streams.
pub mod stream;

pub use broker::MemoryBroker;
pub use connection::{MemoryConnection, MemoryConnectionOptions};
pub use consumer::MemoryConsumer;
pub use context::MemoryContext;
pub use error::Error;
pub use stream::MemoryStream;
