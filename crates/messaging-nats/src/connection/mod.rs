use crate::context::NatsContext;
use crate::error::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::client::Request;
use async_nats::connection::State;
use async_nats::{Client as NatsClient, ConnectOptions, Event, HeaderMap};
use async_trait::async_trait;
use bytes::Bytes;
use courier_messaging::config::ConnectionConfig;
use courier_messaging::connection::{Connection, ConnectionOptions, ConnectionState};
use courier_messaging::Message;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, error, info, warn};

/// Options for NATS connections.
#[derive(Clone, Debug, Default)]
pub struct NatsConnectionOptions {
    /// Only use the configured URL, ignoring servers advertised by the cluster.
    pub ignore_discovered_servers: bool,
}
impl ConnectionOptions for NatsConnectionOptions {}

/// A connection to a NATS server.
#[derive(Clone, Debug)]
pub struct NatsConnection {
    client: NatsClient,
    name: String,
    closed: Arc<AtomicBool>,
}

impl NatsConnection {
    /// The underlying `async-nats` client.
    #[must_use]
    pub const fn client(&self) -> &NatsClient {
        &self.client
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::NotConnected)
        } else {
            Ok(())
        }
    }
}

/// Logs a connection lifecycle event at a level matching its severity.
fn log_event(connection: &str, event: &Event) {
    match event {
        Event::Connected => info!(connection, "connection established"),
        Event::Disconnected => warn!(connection, "disconnected from broker"),
        Event::LameDuckMode => warn!(connection, "broker entered lame duck mode"),
        Event::Closed => info!(connection, "connection closed"),
        Event::SlowConsumer(sid) => error!(connection, sid, "slow consumer"),
        Event::ServerError(e) => error!(connection, error = %e, "broker reported an error"),
        Event::ClientError(e) => error!(connection, error = %e, "client error"),
        other => info!(connection, event = %other, "connection event"),
    }
}

/// Converts a NATS message into the client's representation.
pub(crate) fn convert(message: &async_nats::Message) -> Message {
    Message {
        subject: message.subject.to_string(),
        payload: message.payload.clone(),
        headers: message.headers.as_ref().and_then(extract_headers),
        reply: message.reply.as_ref().map(ToString::to_string),
        delivery: None,
    }
}

/// Keeps the first value of every header.
fn extract_headers(headers: &HeaderMap) -> Option<HashMap<String, String>> {
    let result: HashMap<String, String> = headers
        .iter()
        .filter_map(|(key, values)| {
            values
                .first()
                .map(|value| (key.to_string(), value.to_string()))
        })
        .collect();

    if result.is_empty() { None } else { Some(result) }
}

#[async_trait]
impl Connection for NatsConnection {
    type Error = Error;

    type Options = NatsConnectionOptions;

    type Streams = NatsContext;

    async fn connect(
        config: &ConnectionConfig,
        options: Self::Options,
    ) -> Result<Self, Self::Error> {
        let reconnect_wait = config.reconnect_wait;
        let event_name = config.name.clone();

        let mut connect_options = ConnectOptions::new()
            .name(config.name.as_str())
            .connection_timeout(config.connect_timeout)
            .max_reconnects(config.max_reconnects)
            .reconnect_delay_callback(move |_| reconnect_wait)
            .client_capacity(config.reconnect_buffer_capacity)
            .event_callback(move |event| {
                let connection = event_name.clone();
                async move { log_event(&connection, &event) }
            });

        if let Some((username, password)) = config.credentials() {
            connect_options =
                connect_options.user_and_password(username.to_string(), password.to_string());
        }

        if options.ignore_discovered_servers {
            connect_options = connect_options.ignore_discovered_servers();
        }

        let client = connect_options
            .connect(config.url.as_str())
            .await
            .map_err(|e| Error::Connect(e.kind()))?;

        debug!(connection = %config.name, url = %config.url, "nats client connected");

        Ok(Self {
            client,
            name: config.name.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            return ConnectionState::Closed;
        }

        match self.client.connection_state() {
            State::Pending => ConnectionState::Pending,
            State::Connected => ConnectionState::Connected,
            State::Disconnected => ConnectionState::Disconnected,
        }
    }

    fn streams(&self) -> Result<Self::Streams, Self::Error> {
        self.ensure_open()?;

        Ok(NatsContext::new(async_nats::jetstream::new(
            self.client.clone(),
        )))
    }

    async fn publish(&self, subject: String, payload: Bytes) -> Result<(), Self::Error> {
        self.ensure_open()?;

        self.client
            .publish(subject, payload)
            .await
            .map_err(|e| Error::Publish(e.kind()))
    }

    async fn request(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, Self::Error> {
        self.ensure_open()?;

        let request = Request::new().payload(payload).timeout(Some(timeout));
        let reply = self
            .client
            .send_request(subject, request)
            .await
            .map_err(|e| Error::Request(e.kind()))?;

        Ok(convert(&reply))
    }

    async fn subscribe(
        &self,
        pattern: String,
        queue: Option<String>,
    ) -> Result<BoxStream<'static, Message>, Self::Error> {
        self.ensure_open()?;

        let subscriber = match queue {
            Some(queue) => self.client.queue_subscribe(pattern, queue).await,
            None => self.client.subscribe(pattern).await,
        }
        .map_err(|e| Error::Subscribe(e.to_string()))?;

        Ok(subscriber.map(|message| convert(&message)).boxed())
    }

    async fn drain(&self) -> Result<(), Self::Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.client
            .drain()
            .await
            .map_err(|e| Error::Drain(e.to_string()))?;

        info!(connection = %self.name, "connection drained");

        Ok(())
    }
}
