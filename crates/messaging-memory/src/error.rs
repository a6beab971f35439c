use courier_messaging::{BrokerError, ErrorKind};
use thiserror::Error;

/// Errors raised by the in-memory broker.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Credentials did not match the broker's.
    #[error("authorization violation")]
    AuthorizationViolation,

    /// The broker could not be reached within the connect timeout.
    #[error("timed out connecting to in-memory broker")]
    ConnectTimedOut,

    /// Consumer configuration was rejected.
    #[error("invalid consumer configuration: {0}")]
    InvalidConsumer(&'static str),

    /// Stream configuration was rejected.
    #[error("invalid stream configuration: {0}")]
    InvalidStream(&'static str),

    /// No stream captures the subject of a durable publish.
    #[error("no stream captures subject {0}")]
    NoStream(String),

    /// Nobody is subscribed to the request subject.
    #[error("no responders available for request")]
    NoResponders,

    /// The connection is disconnected or closed.
    #[error("connection is not connected")]
    NotConnected,

    /// The message is not awaiting acknowledgement.
    #[error("message {0} is not awaiting acknowledgement")]
    NotPending(u64),

    /// No stream with that name exists.
    #[error("stream {0} not found")]
    StreamNotFound(String),

    /// Persistent streams are disabled on the broker.
    #[error("persistent streams are disabled")]
    StreamsDisabled,

    /// No reply arrived in time.
    #[error("request timed out")]
    TimedOut,
}

impl BrokerError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthorizationViolation => ErrorKind::AuthRejected,
            Self::ConnectTimedOut | Self::TimedOut => ErrorKind::TimedOut,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::StreamNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Other,
        }
    }
}
