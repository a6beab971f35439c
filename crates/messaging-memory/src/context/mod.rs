use crate::broker::MemoryBroker;
use crate::error::Error;
use crate::stream::MemoryStream;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use courier_messaging::Message;
use courier_messaging::context::{PendingAck, StreamContext};
use courier_messaging::stream::StreamConfig;
use futures::FutureExt;

/// Persistent-messaging context of a [`crate::MemoryConnection`].
#[derive(Clone, Debug)]
pub struct MemoryContext {
    broker: MemoryBroker,
    online: Arc<AtomicBool>,
}

impl MemoryContext {
    pub(crate) const fn new(broker: MemoryBroker, online: Arc<AtomicBool>) -> Self {
        Self { broker, online }
    }

    fn ensure_online(&self) -> Result<(), Error> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn ensure_streams_enabled(&self) -> Result<(), Error> {
        if self.broker.streams_disabled() {
            Err(Error::StreamsDisabled)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StreamContext for MemoryContext {
    type Error = Error;

    type Stream = MemoryStream;

    async fn publish(
        &self,
        subject: String,
        payload: Bytes,
    ) -> Result<PendingAck<Self::Error>, Self::Error> {
        self.ensure_online()?;

        let ack = self.broker.ingest(&subject, &payload).await;
        self.broker.route(&Message::new(subject.clone(), payload)).await;

        if self.broker.holds_acks() {
            return Ok(futures::future::pending().boxed());
        }

        let result = ack.ok_or(Error::NoStream(subject));
        Ok(futures::future::ready(result).boxed())
    }

    async fn get_stream(&self, name: &str) -> Result<Self::Stream, Self::Error> {
        self.ensure_online()?;
        self.ensure_streams_enabled()?;
        self.broker.provisioning_gate().await;

        let shared = self.broker.get_stream(name).await?;

        Ok(MemoryStream::new(shared, Arc::clone(&self.online)))
    }

    async fn create_stream(&self, config: StreamConfig) -> Result<Self::Stream, Self::Error> {
        self.ensure_online()?;
        self.ensure_streams_enabled()?;
        self.broker.provisioning_gate().await;

        let shared = self.broker.create_stream(config).await?;

        Ok(MemoryStream::new(shared, Arc::clone(&self.online)))
    }
}
