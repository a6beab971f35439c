use crate::error::BrokerError;
use crate::stream::{Stream, StreamConfig};

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

/// Acknowledgement returned by the broker for a durably stored message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishAck {
    /// Stream that stored the message.
    pub stream: String,

    /// Sequence assigned within the stream.
    pub sequence: u64,

    /// Whether the broker detected a duplicate.
    pub duplicate: bool,
}

/// Broker acknowledgement that has not resolved yet.
pub type PendingAck<E> = BoxFuture<'static, Result<PublishAck, E>>;

/// The persistent-messaging context of a connection.
#[async_trait]
pub trait StreamContext
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the context.
    type Error: BrokerError;

    /// The stream handle type.
    type Stream: Stream<Error = Self::Error>;

    /// Requests durable storage of a message, returning the pending acknowledgement.
    async fn publish(
        &self,
        subject: String,
        payload: Bytes,
    ) -> Result<PendingAck<Self::Error>, Self::Error>;

    /// Looks a stream up by name.
    async fn get_stream(&self, name: &str) -> Result<Self::Stream, Self::Error>;

    /// Creates the stream, or updates it if one with that name exists.
    async fn create_stream(&self, config: StreamConfig) -> Result<Self::Stream, Self::Error>;
}
