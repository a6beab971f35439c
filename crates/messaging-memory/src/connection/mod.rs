use crate::broker::{MemoryBroker, Route};
use crate::context::MemoryContext;
use crate::error::Error;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_messaging::config::ConnectionConfig;
use courier_messaging::connection::{Connection, ConnectionOptions, ConnectionState};
use courier_messaging::Message;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options for in-memory connections.
#[derive(Clone, Debug, Default)]
pub struct MemoryConnectionOptions {
    /// The broker to connect to.
    pub broker: MemoryBroker,
}
impl ConnectionOptions for MemoryConnectionOptions {}

/// A connection to a [`MemoryBroker`].
#[derive(Clone, Debug)]
pub struct MemoryConnection {
    broker: MemoryBroker,
    id: u64,
    name: String,
    online: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemoryConnection {
    /// The broker this connection belongs to.
    #[must_use]
    pub const fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    /// Drops the transport as a network failure would. Subscriptions stop receiving.
    pub fn simulate_disconnect(&self) {
        if self.online.swap(false, Ordering::AcqRel) {
            warn!(connection = %self.name, "disconnected from broker");
        }
    }

    /// Restores a dropped transport. Has no effect once closed.
    pub fn simulate_reconnect(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if !self.online.swap(true, Ordering::AcqRel) {
            info!(connection = %self.name, "reconnected to broker");
        }
    }

    fn ensure_online(&self) -> Result<(), Error> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type Error = Error;

    type Options = MemoryConnectionOptions;

    type Streams = MemoryContext;

    async fn connect(
        config: &ConnectionConfig,
        options: Self::Options,
    ) -> Result<Self, Self::Error> {
        let broker = options.broker;

        if broker.is_unreachable() {
            tokio::time::sleep(config.connect_timeout).await;
            return Err(Error::ConnectTimedOut);
        }

        if !broker.accepts(config.credentials()) {
            return Err(Error::AuthorizationViolation);
        }

        let connection = Self {
            id: broker.next_connection_id(),
            broker,
            name: config.name.clone(),
            online: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(AtomicBool::new(false)),
        };

        debug!(connection = %connection.name, id = connection.id, "connected to in-memory broker");

        Ok(connection)
    }

    fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else if self.online.load(Ordering::Acquire) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn streams(&self) -> Result<Self::Streams, Self::Error> {
        if self.broker.streams_disabled() {
            return Err(Error::StreamsDisabled);
        }

        Ok(MemoryContext::new(
            self.broker.clone(),
            Arc::clone(&self.online),
        ))
    }

    async fn publish(&self, subject: String, payload: Bytes) -> Result<(), Self::Error> {
        self.ensure_online()?;

        self.broker.ingest(&subject, &payload).await;
        self.broker.route(&Message::new(subject, payload)).await;

        Ok(())
    }

    async fn request(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, Self::Error> {
        self.ensure_online()?;

        let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.broker
            .add_route(Route {
                pattern: inbox.clone(),
                queue: None,
                connection: self.id,
                online: Arc::clone(&self.online),
                sender,
            })
            .await;

        let mut message = Message::new(subject, payload);
        message.reply = Some(inbox);

        if self.broker.route(&message).await == 0 {
            return Err(Error::NoResponders);
        }

        tokio::time::timeout(timeout, receiver.recv())
            .await
            .map_err(|_| Error::TimedOut)?
            .ok_or(Error::NotConnected)
    }

    async fn subscribe(
        &self,
        pattern: String,
        queue: Option<String>,
    ) -> Result<BoxStream<'static, Message>, Self::Error> {
        self.ensure_online()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        self.broker
            .add_route(Route {
                pattern,
                queue,
                connection: self.id,
                online: Arc::clone(&self.online),
                sender,
            })
            .await;

        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn drain(&self) -> Result<(), Self::Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.online.store(false, Ordering::Release);
        self.broker.remove_routes(self.id).await;

        info!(connection = %self.name, "connection drained");

        Ok(())
    }
}
