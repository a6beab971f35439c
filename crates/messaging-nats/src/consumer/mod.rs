use crate::connection::convert;
use crate::error::Error;

use async_nats::jetstream::Message as JetStreamMessage;
use async_nats::jetstream::consumer::pull::Config as NatsConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, Consumer as NatsConsumerType, DeliverPolicy};
use async_trait::async_trait;
use courier_messaging::BoxError;
use courier_messaging::consumer::{Acknowledge, Consumer, ConsumerConfig, ConsumerInfo, Delivery};
use courier_messaging::message::DeliveryInfo;
use futures::StreamExt;
use futures::stream::BoxStream;

/// A durable pull consumer on a `JetStream` stream.
#[derive(Clone, Debug)]
pub struct NatsConsumer {
    name: String,
    stream_name: String,
    nats_consumer: NatsConsumerType<NatsConsumerConfig>,
}

impl NatsConsumer {
    pub(crate) const fn new(
        name: String,
        stream_name: String,
        nats_consumer: NatsConsumerType<NatsConsumerConfig>,
    ) -> Self {
        Self {
            name,
            stream_name,
            nats_consumer,
        }
    }
}

/// Durable, explicitly acknowledged pull configuration. Unset redelivery fields
/// are left to the server defaults.
pub(crate) fn pull_config(config: &ConsumerConfig) -> NatsConsumerConfig {
    let redelivery = &config.redelivery;

    NatsConsumerConfig {
        name: Some(config.name.clone()),
        durable_name: Some(config.name.clone()),
        filter_subject: config.filter_subject.clone(),
        ack_policy: AckPolicy::Explicit,
        deliver_policy: DeliverPolicy::All,
        max_deliver: redelivery.max_deliver.unwrap_or_default(),
        ack_wait: redelivery.ack_wait.unwrap_or_default(),
        backoff: redelivery.backoff.clone(),
        ..Default::default()
    }
}

fn delivery(message: JetStreamMessage) -> Result<Delivery, Error> {
    let info = {
        let info = message.info().map_err(|e| Error::NoInfo(e.to_string()))?;

        DeliveryInfo {
            stream: info.stream.to_string(),
            consumer: info.consumer.to_string(),
            stream_sequence: info.stream_sequence,
            consumer_sequence: info.consumer_sequence,
            delivered: u64::try_from(info.delivered).unwrap_or_default(),
        }
    };

    let mut converted = convert(&message.message);
    converted.delivery = Some(info);

    Ok(Delivery::new(converted, NatsAcker { message }))
}

#[async_trait]
impl Consumer for NatsConsumer {
    type Error = Error;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn stream_name(&self) -> String {
        self.stream_name.clone()
    }

    async fn info(&self) -> Result<ConsumerInfo, Self::Error> {
        let mut nats_consumer = self.nats_consumer.clone();
        let info = nats_consumer
            .info()
            .await
            .map_err(|e| Error::ConsumerInfo(e.kind()))?;

        Ok(ConsumerInfo {
            name: info.name.clone(),
            stream_name: info.stream_name.clone(),
            filter_subject: info.config.filter_subject.clone(),
            num_pending: info.num_pending,
            num_ack_pending: info.num_ack_pending as u64,
            num_redelivered: info.num_redelivered as u64,
            ack_floor: info.ack_floor.stream_sequence,
        })
    }

    async fn messages(
        &self,
    ) -> Result<BoxStream<'static, Result<Delivery, Self::Error>>, Self::Error> {
        let messages = self
            .nats_consumer
            .messages()
            .await
            .map_err(|e| Error::ConsumerStream(e.kind()))?;

        Ok(messages
            .map(|message| {
                message
                    .map_err(|e| Error::ConsumerMessages(e.kind()))
                    .and_then(delivery)
            })
            .boxed())
    }
}

/// Acknowledges one `JetStream` delivery.
struct NatsAcker {
    message: JetStreamMessage,
}

#[async_trait]
impl Acknowledge for NatsAcker {
    async fn ack(&self) -> Result<(), BoxError> {
        self.message.ack().await
    }
}
