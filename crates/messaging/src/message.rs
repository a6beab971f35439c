use std::collections::HashMap;

use bytes::Bytes;

/// Delivery metadata attached to messages read from a durable consumer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeliveryInfo {
    /// Stream the message was stored in.
    pub stream: String,

    /// Consumer that delivered the message.
    pub consumer: String,

    /// Sequence of the message within the stream.
    pub stream_sequence: u64,

    /// Sequence of this delivery within the consumer.
    pub consumer_sequence: u64,

    /// How many times the message has been delivered, including this one.
    pub delivered: u64,
}

/// A message received from the broker.
#[derive(Clone, Debug)]
pub struct Message {
    /// Subject the message was published to.
    pub subject: String,

    /// Raw payload.
    pub payload: Bytes,

    /// Optional headers.
    pub headers: Option<HashMap<String, String>>,

    /// Reply subject for request/reply.
    pub reply: Option<String>,

    /// Present when the message came from a durable consumer.
    pub delivery: Option<DeliveryInfo>,
}

impl Message {
    /// Creates a plain message with no headers or reply subject.
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            headers: None,
            reply: None,
            delivery: None,
        }
    }

    /// Payload rendered as text for logging.
    #[must_use]
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
