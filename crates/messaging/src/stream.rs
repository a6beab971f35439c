use crate::consumer::{Consumer, ConsumerConfig};
use crate::error::BrokerError;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

/// Where a stream keeps its messages.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StorageTier {
    /// Broker memory.
    #[default]
    Memory,

    /// Broker disk.
    File,
}

/// Configuration for a persistent stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamConfig {
    /// Stream name.
    pub name: String,

    /// Subject patterns captured by the stream.
    pub subjects: Vec<String>,

    /// Storage tier.
    pub storage: StorageTier,

    /// Retention window. `None` keeps messages until other limits apply.
    pub max_age: Option<Duration>,
}

impl StreamConfig {
    /// Memory-backed stream with no max age.
    pub fn new(name: impl Into<String>, subjects: Vec<String>) -> Self {
        Self {
            name: name.into(),
            subjects,
            storage: StorageTier::Memory,
            max_age: None,
        }
    }

    /// Sets the retention window.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

/// Snapshot of a stream's configuration and state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamInfo {
    /// Stream name.
    pub name: String,

    /// Subject patterns captured by the stream.
    pub subjects: Vec<String>,

    /// Storage tier.
    pub storage: StorageTier,

    /// Retention window.
    pub max_age: Option<Duration>,

    /// Messages currently stored.
    pub messages: u64,

    /// Sequence of the last stored message.
    pub last_sequence: u64,
}

/// A handle to a persistent stream on the broker.
#[async_trait]
pub trait Stream
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the stream.
    type Error: BrokerError;

    /// The consumer handle type.
    type Consumer: Consumer<Error = Self::Error>;

    /// Returns the name of the stream.
    fn name(&self) -> String;

    /// Fetches current configuration and state.
    async fn info(&self) -> Result<StreamInfo, Self::Error>;

    /// Creates the durable consumer, or updates it if one with that name exists.
    async fn create_consumer(&self, config: ConsumerConfig) -> Result<Self::Consumer, Self::Error>;
}
