use async_nats::ConnectErrorKind;
use async_nats::client::RequestErrorKind;
use courier_messaging::{BrokerError, ErrorKind};
use thiserror::Error;

/// Errors raised by the NATS backend.
#[derive(Debug, Error)]
pub enum Error {
    /// Connect error.
    #[error("Failed to connect: {0}")]
    Connect(ConnectErrorKind),

    /// Consumer create error.
    #[error("Failed to create consumer: {0}")]
    ConsumerCreate(async_nats::jetstream::stream::ConsumerErrorKind),

    /// Consumer info error.
    #[error("Failed to get consumer info: {0}")]
    ConsumerInfo(async_nats::jetstream::context::ConsumerInfoErrorKind),

    /// Consumer messages error.
    #[error("Failed to get consumer messages: {0}")]
    ConsumerMessages(async_nats::jetstream::consumer::pull::MessagesErrorKind),

    /// Consumer stream error.
    #[error("Consumer stream error: {0}")]
    ConsumerStream(async_nats::jetstream::consumer::StreamErrorKind),

    /// Drain error.
    #[error("Failed to drain connection: {0}")]
    Drain(String),

    /// Durable publish error.
    #[error("Failed to publish to stream: {0}")]
    JetStreamPublish(async_nats::jetstream::context::PublishErrorKind),

    /// A consumer message without delivery metadata.
    #[error("No message info available: {0}")]
    NoInfo(String),

    /// The connection was closed by the client.
    #[error("Connection is closed")]
    NotConnected,

    /// Publish error.
    #[error("Failed to publish: {0}")]
    Publish(async_nats::client::PublishErrorKind),

    /// Request error.
    #[error("Request failed: {0}")]
    Request(RequestErrorKind),

    /// Stream create error.
    #[error("Failed to create stream: {0}")]
    StreamCreate(async_nats::jetstream::context::CreateStreamErrorKind),

    /// Stream lookup error.
    #[error("Failed to get stream: {0}")]
    StreamGet(async_nats::jetstream::context::GetStreamErrorKind),

    /// Stream info error.
    #[error("Failed to get stream info: {0}")]
    StreamInfo(async_nats::jetstream::context::RequestErrorKind),

    /// No stream with that name exists.
    #[error("Stream {0} not found")]
    StreamNotFound(String),

    /// Stream update error.
    #[error("Failed to update stream: {0}")]
    StreamUpdate(String),

    /// Subscribe error.
    #[error("Failed to subscribe: {0}")]
    Subscribe(String),
}

impl BrokerError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(ConnectErrorKind::TimedOut) | Self::Request(RequestErrorKind::TimedOut) => {
                ErrorKind::TimedOut
            }
            Self::Connect(
                ConnectErrorKind::Authentication | ConnectErrorKind::AuthorizationViolation,
            ) => ErrorKind::AuthRejected,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::StreamNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Other,
        }
    }
}
