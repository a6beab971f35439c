use crate::consumer::{NatsConsumer, pull_config};
use crate::error::Error;

use async_nats::jetstream::stream::{
    Config as NatsStreamConfig, Info as NatsStreamInfo, StorageType, Stream as NatsStreamType,
};
use async_trait::async_trait;
use courier_messaging::consumer::ConsumerConfig;
use courier_messaging::stream::{StorageTier, Stream, StreamConfig, StreamInfo};
use tracing::debug;

/// A `JetStream` stream.
#[derive(Clone, Debug)]
pub struct NatsStream {
    name: String,
    nats_stream: NatsStreamType,
}

impl NatsStream {
    pub(crate) const fn new(name: String, nats_stream: NatsStreamType) -> Self {
        Self { name, nats_stream }
    }
}

pub(crate) fn nats_stream_config(config: &StreamConfig) -> NatsStreamConfig {
    NatsStreamConfig {
        name: config.name.clone(),
        subjects: config.subjects.clone(),
        storage: match config.storage {
            StorageTier::Memory => StorageType::Memory,
            StorageTier::File => StorageType::File,
        },
        max_age: config.max_age.unwrap_or_default(),
        ..Default::default()
    }
}

fn stream_info(info: &NatsStreamInfo) -> StreamInfo {
    StreamInfo {
        name: info.config.name.clone(),
        subjects: info.config.subjects.clone(),
        storage: match info.config.storage {
            StorageType::Memory => StorageTier::Memory,
            StorageType::File => StorageTier::File,
        },
        max_age: (!info.config.max_age.is_zero()).then_some(info.config.max_age),
        messages: info.state.messages,
        last_sequence: info.state.last_sequence,
    }
}

#[async_trait]
impl Stream for NatsStream {
    type Error = Error;

    type Consumer = NatsConsumer;

    fn name(&self) -> String {
        self.name.clone()
    }

    async fn info(&self) -> Result<StreamInfo, Self::Error> {
        let mut nats_stream = self.nats_stream.clone();
        let info = nats_stream
            .info()
            .await
            .map_err(|e| Error::StreamInfo(e.kind()))?;

        Ok(stream_info(info))
    }

    async fn create_consumer(&self, config: ConsumerConfig) -> Result<Self::Consumer, Self::Error> {
        let nats_consumer = self
            .nats_stream
            .create_consumer(pull_config(&config))
            .await
            .map_err(|e| Error::ConsumerCreate(e.kind()))?;

        debug!(stream = %self.name, consumer = %config.name, "consumer created");

        Ok(NatsConsumer::new(
            config.name,
            self.name.clone(),
            nats_consumer,
        ))
    }
}
