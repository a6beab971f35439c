use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

/// Boxed error used to carry backend failures across the capability traits.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Coarse classification of a backend failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The transport is not connected.
    NotConnected,

    /// The broker did not answer in time.
    TimedOut,

    /// The broker rejected the supplied credentials.
    AuthRejected,

    /// The requested stream or consumer does not exist.
    NotFound,

    /// Any other failure.
    Other,
}

/// Marker trait for errors raised by a broker backend.
pub trait BrokerError: StdError + Send + Sync + 'static {
    /// Classifies the failure.
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Errors surfaced by the messaging client.
#[derive(Debug, Error)]
pub enum Error {
    /// The broker did not resolve an acknowledgement within the client-side bound.
    #[error("timed out waiting for acknowledgement on {subject}")]
    AckTimeout {
        /// Subject the message was published to.
        subject: String,
    },

    /// The broker reported an error for a durably published message.
    #[error("broker rejected message on {subject}: {reason}")]
    AckRejected {
        /// Subject the message was published to.
        subject: String,
        /// Reason reported by the broker.
        reason: String,
    },

    /// Credentials were rejected while connecting.
    #[error("broker at {url} rejected credentials: {source}")]
    AuthRejected {
        /// Endpoint that was dialled.
        url: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// Transport-level connect failure.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Endpoint that was dialled.
        url: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// The transport did not connect within the configured timeout.
    #[error("timed out connecting to {url}: {source}")]
    ConnectTimeout {
        /// Endpoint that was dialled.
        url: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// Consuming from a durable consumer could not start.
    #[error("failed to consume from consumer {consumer}: {source}")]
    Consume {
        /// Consumer name.
        consumer: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// The persistent-messaging context could not be derived.
    #[error("persistent messaging context unavailable: {0}")]
    ContextUnavailable(BoxError),

    /// The broker rejected a consumer configuration.
    #[error("failed to create consumer {consumer} on stream {stream}: {source}")]
    CreateConsumer {
        /// Consumer name.
        consumer: String,
        /// Stream the consumer belongs to.
        stream: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// The broker rejected a stream configuration.
    #[error("failed to create stream {stream}: {source}")]
    CreateStream {
        /// Stream name.
        stream: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// Draining the transport failed.
    #[error("failed to drain connection: {0}")]
    Drain(BoxError),

    /// Stream lookup failed.
    #[error("failed to get stream {stream}: {source}")]
    GetStream {
        /// Stream name.
        stream: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// Reading consumer or stream info failed.
    #[error("failed to get info for {target}: {source}")]
    Info {
        /// Stream or consumer name.
        target: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// A subject or pattern failed validation.
    #[error("invalid subject `{subject}`: {reason}")]
    InvalidSubject {
        /// Offending subject.
        subject: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The client is closed or the transport is not connected.
    #[error("not connected to broker")]
    NotConnected,

    /// Stream or consumer provisioning exceeded its deadline.
    #[error("provisioning {target} timed out after {timeout:?}")]
    ProvisionTimeout {
        /// What was being provisioned.
        target: String,
        /// The deadline that expired.
        timeout: Duration,
    },

    /// Fire-and-forget or durable publish was rejected.
    #[error("failed to publish message to {subject}: {source}")]
    Publish {
        /// Target subject.
        subject: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// The acknowledgement monitor ended without reporting an outcome.
    #[error("acknowledgement for {subject} was lost")]
    AckLost {
        /// Target subject.
        subject: String,
    },

    /// Request/reply failed.
    #[error("request to {subject} failed: {source}")]
    Request {
        /// Target subject.
        subject: String,
        /// Underlying failure.
        source: BoxError,
    },

    /// No reply arrived within the request timeout.
    #[error("request to {subject} timed out after {timeout:?}")]
    RequestTimeout {
        /// Target subject.
        subject: String,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// Registering a broker-level subscription failed.
    #[error("failed to subscribe to {subject}: {source}")]
    Subscribe {
        /// Subscribed pattern.
        subject: String,
        /// Underlying failure.
        source: BoxError,
    },
}

impl Error {
    /// Returns true for the not-connected class of failures.
    #[must_use]
    pub const fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }

    /// Returns true when the failure is a local or broker timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::AckTimeout { .. }
                | Self::ConnectTimeout { .. }
                | Self::ProvisionTimeout { .. }
                | Self::RequestTimeout { .. }
        )
    }
}
