mod provisioner;
mod publisher;
mod subscriber;

pub use subscriber::DurableSubscription;

use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionState};
use crate::context::StreamContext;
use crate::error::{BoxError, BrokerError, Error, ErrorKind};
use crate::registry::{SubscriptionKey, SubscriptionRegistry};
use crate::stream::Stream;
use crate::subscription::SubscriptionHandle;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

/// Stream handle type of a connection backend.
pub type StreamOf<C> = <<C as Connection>::Streams as StreamContext>::Stream;

/// Consumer handle type of a connection backend.
pub type ConsumerOf<C> = <StreamOf<C> as Stream>::Consumer;

/// Messaging client bound to one broker connection.
///
/// Clones share the connection, the subscription registry and the closed flag.
#[derive(Clone, Debug)]
pub struct Client<C>
where
    C: Connection,
{
    config: Arc<ConnectionConfig>,
    connection: C,
    streams: C::Streams,
    registry: SubscriptionRegistry,
    closed: Arc<AtomicBool>,
}

impl<C> Client<C>
where
    C: Connection,
{
    /// Connects to the broker and derives the persistent-messaging context.
    ///
    /// Zero-valued fields of `config` take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConnectTimeout`, `AuthRejected` or `Connect` when the transport fails,
    /// and `ContextUnavailable` when the persistent-messaging context cannot be derived.
    pub async fn connect(config: ConnectionConfig, options: C::Options) -> Result<Self, Error> {
        let config = config.with_defaults();

        debug!(url = %config.url, name = %config.name, "connecting to broker");

        let connection = C::connect(&config, options).await.map_err(|e| {
            let url = config.url.clone();
            match e.kind() {
                ErrorKind::TimedOut => Error::ConnectTimeout {
                    url,
                    source: Box::new(e),
                },
                ErrorKind::AuthRejected => Error::AuthRejected {
                    url,
                    source: Box::new(e),
                },
                _ => Error::Connect {
                    url,
                    source: Box::new(e),
                },
            }
        })?;

        let streams = match connection.streams() {
            Ok(streams) => streams,
            Err(e) => {
                if let Err(drain_error) = connection.drain().await {
                    warn!(error = %drain_error, "failed to release connection");
                }
                return Err(Error::ContextUnavailable(Box::new(e)));
            }
        };

        info!(url = %config.url, name = %config.name, "connected to broker");

        Ok(Self {
            config: Arc::new(config),
            connection,
            streams,
            registry: SubscriptionRegistry::default(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Effective configuration, with defaults applied.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The underlying transport.
    #[must_use]
    pub const fn connection(&self) -> &C {
        &self.connection
    }

    /// Active subscriptions.
    #[must_use]
    pub const fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Current connection state. `Closed` once [`Client::close`] has run.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else {
            self.connection.state()
        }
    }

    /// Whether the client can currently send.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Stops every subscription, waiting for in-flight handlers, then drains the transport.
    ///
    /// Closing twice is a no-op. The transport is only drained while connected.
    ///
    /// # Errors
    ///
    /// Returns `Error::Drain` if the broker fails to drain.
    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let handles = self.registry.drain().await;
        debug!(subscriptions = handles.len(), "stopping subscriptions");
        for handle in handles {
            handle.stop().await;
        }

        if self.connection.state() == ConnectionState::Connected {
            self.connection
                .drain()
                .await
                .map_err(|e| Error::Drain(Box::new(e)))?;
        }

        info!(url = %self.config.url, "connection closed");

        Ok(())
    }

    /// Stops and removes the subscription registered under `key`.
    ///
    /// Returns false if nothing was registered under it.
    pub async fn unsubscribe(&self, key: &SubscriptionKey) -> bool {
        match self.registry.remove(key).await {
            Some(handle) => {
                handle.stop().await;
                debug!(key = %key, "unsubscribed");
                true
            }
            None => false,
        }
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    async fn register(&self, handle: SubscriptionHandle) {
        if let Some(displaced) = self.registry.insert(handle).await {
            debug!(key = %displaced.key(), "replacing existing subscription");
            displaced.stop().await;
        }
    }
}

/// Wraps a backend failure, keeping the not-connected class recognisable.
fn wrap<E>(e: E, context: impl FnOnce(BoxError) -> Error) -> Error
where
    E: BrokerError,
{
    if e.kind() == ErrorKind::NotConnected {
        Error::NotConnected
    } else {
        context(Box::new(e))
    }
}
