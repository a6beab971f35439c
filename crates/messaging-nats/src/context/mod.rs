use crate::error::Error;
use crate::stream::{NatsStream, nats_stream_config};

use async_nats::jetstream::context::GetStreamErrorKind;
use async_nats::jetstream::{Context as JetStreamContext, ErrorCode};
use async_trait::async_trait;
use bytes::Bytes;
use courier_messaging::context::{PendingAck, PublishAck, StreamContext};
use courier_messaging::stream::StreamConfig;
use futures::FutureExt;
use tracing::debug;

/// `JetStream` context of a [`crate::NatsConnection`].
#[derive(Clone, Debug)]
pub struct NatsContext {
    jetstream_context: JetStreamContext,
}

impl NatsContext {
    pub(crate) const fn new(jetstream_context: JetStreamContext) -> Self {
        Self { jetstream_context }
    }

    /// The underlying `JetStream` context.
    #[must_use]
    pub const fn jetstream_context(&self) -> &JetStreamContext {
        &self.jetstream_context
    }
}

fn is_stream_not_found(kind: &GetStreamErrorKind) -> bool {
    matches!(kind, GetStreamErrorKind::JetStream(e) if e.error_code() == ErrorCode::STREAM_NOT_FOUND)
}

#[async_trait]
impl StreamContext for NatsContext {
    type Error = Error;

    type Stream = NatsStream;

    async fn publish(
        &self,
        subject: String,
        payload: Bytes,
    ) -> Result<PendingAck<Self::Error>, Self::Error> {
        let pending = self
            .jetstream_context
            .publish(subject, payload)
            .await
            .map_err(|e| Error::JetStreamPublish(e.kind()))?;

        Ok(async move {
            let ack = pending
                .await
                .map_err(|e| Error::JetStreamPublish(e.kind()))?;

            Ok::<_, Error>(PublishAck {
                stream: ack.stream,
                sequence: ack.sequence,
                duplicate: ack.duplicate,
            })
        }
        .boxed())
    }

    async fn get_stream(&self, name: &str) -> Result<Self::Stream, Self::Error> {
        let nats_stream = self
            .jetstream_context
            .get_stream(name)
            .await
            .map_err(|e| {
                let kind = e.kind();
                if is_stream_not_found(&kind) {
                    Error::StreamNotFound(name.to_string())
                } else {
                    Error::StreamGet(kind)
                }
            })?;

        Ok(NatsStream::new(name.to_string(), nats_stream))
    }

    async fn create_stream(&self, config: StreamConfig) -> Result<Self::Stream, Self::Error> {
        let nats_config = nats_stream_config(&config);

        match self.get_stream(&config.name).await {
            Ok(_) => {
                self.jetstream_context
                    .update_stream(&nats_config)
                    .await
                    .map_err(|e| Error::StreamUpdate(e.to_string()))?;

                debug!(stream = %config.name, "stream configuration updated");

                self.get_stream(&config.name).await
            }
            Err(Error::StreamNotFound(_)) => {
                let nats_stream = self
                    .jetstream_context
                    .create_stream(nats_config)
                    .await
                    .map_err(|e| Error::StreamCreate(e.kind()))?;

                Ok(NatsStream::new(config.name, nats_stream))
            }
            Err(e) => Err(e),
        }
    }
}
