use crate::error::{BoxError, BrokerError};
use crate::message::Message;

use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Redelivery policy for durable consumers. Unset fields inherit the broker default.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RedeliveryPolicy {
    /// Maximum deliveries of a single message.
    pub max_deliver: Option<i64>,

    /// How long the broker waits for an ack before redelivering.
    pub ack_wait: Option<Duration>,

    /// Redelivery delays, indexed by delivery attempt.
    pub backoff: Vec<Duration>,
}

/// Configuration for a durable, explicitly acknowledged consumer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsumerConfig {
    /// Durable consumer name.
    pub name: String,

    /// Only messages on this subject are delivered.
    pub filter_subject: String,

    /// Redelivery of unacknowledged messages.
    pub redelivery: RedeliveryPolicy,
}

/// Snapshot of a consumer's state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsumerInfo {
    /// Consumer name.
    pub name: String,

    /// Stream the consumer reads from.
    pub stream_name: String,

    /// Filter subject.
    pub filter_subject: String,

    /// Messages not yet delivered.
    pub num_pending: u64,

    /// Messages delivered but not yet acknowledged.
    pub num_ack_pending: u64,

    /// Messages delivered more than once.
    pub num_redelivered: u64,

    /// Highest stream sequence below which every message is acknowledged.
    pub ack_floor: u64,
}

/// Acknowledges one delivered message.
#[async_trait]
pub trait Acknowledge: Send + Sync + 'static {
    /// Signals successful processing to the broker.
    async fn ack(&self) -> Result<(), BoxError>;
}

/// A message read from a durable consumer together with its acknowledgement.
pub struct Delivery {
    /// The delivered message.
    pub message: Message,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    /// Couples a message with the means to acknowledge it.
    pub fn new(message: Message, acker: impl Acknowledge) -> Self {
        Self {
            message,
            acker: Box::new(acker),
        }
    }

    pub(crate) fn into_parts(self) -> (Message, Box<dyn Acknowledge>) {
        (self.message, self.acker)
    }
}

impl Debug for Delivery {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// A durable cursor over a stream.
#[async_trait]
pub trait Consumer
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the consumer.
    type Error: BrokerError;

    /// Consumer name.
    fn name(&self) -> String;

    /// Name of the stream the consumer reads from.
    fn stream_name(&self) -> String;

    /// Fetches current state from the broker.
    async fn info(&self) -> Result<ConsumerInfo, Self::Error>;

    /// Starts continuous consumption. Dropping the stream stops it.
    async fn messages(
        &self,
    ) -> Result<BoxStream<'static, Result<Delivery, Self::Error>>, Self::Error>;
}
