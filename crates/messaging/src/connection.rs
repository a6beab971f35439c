use crate::config::ConnectionConfig;
use crate::context::StreamContext;
use crate::error::BrokerError;
use crate::message::Message;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Marker trait for connection options.
pub trait ConnectionOptions: Clone + Debug + Send + Sync + 'static {}

/// Observable state of a transport connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    /// Connecting for the first time.
    Pending,

    /// Connected and able to send.
    Connected,

    /// Lost the connection; the backend may be reconnecting.
    Disconnected,

    /// Closed by the client. Terminal.
    Closed,
}

/// A live transport connection to a broker.
#[async_trait]
pub trait Connection
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the connection.
    type Error: BrokerError;

    /// Backend-specific options that are not part of [`ConnectionConfig`].
    type Options: ConnectionOptions;

    /// The persistent-messaging context derived from the connection.
    type Streams: StreamContext;

    /// Establishes the transport using the reconnect policy, auth and event logging in `config`.
    async fn connect(config: &ConnectionConfig, options: Self::Options) -> Result<Self, Self::Error>;

    /// Current transport state.
    fn state(&self) -> ConnectionState;

    /// Derives the persistent-messaging context.
    fn streams(&self) -> Result<Self::Streams, Self::Error>;

    /// Sends a message without waiting for any acknowledgement.
    async fn publish(&self, subject: String, payload: Bytes) -> Result<(), Self::Error>;

    /// Sends a request and waits up to `timeout` for the first reply.
    async fn request(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, Self::Error>;

    /// Registers a broker-level subscription. Dropping the stream unsubscribes.
    async fn subscribe(
        &self,
        pattern: String,
        queue: Option<String>,
    ) -> Result<BoxStream<'static, Message>, Self::Error>;

    /// Stops accepting new messages, flushes pending work and releases the transport.
    async fn drain(&self) -> Result<(), Self::Error>;
}
