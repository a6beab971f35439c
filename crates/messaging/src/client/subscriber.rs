use super::{Client, ConsumerOf, wrap};
use crate::connection::Connection;
use crate::consumer::{Consumer, ConsumerConfig, ConsumerInfo};
use crate::error::Error;
use crate::registry::SubscriptionKey;
use crate::stream::Stream;
use crate::subject::{self, FULL_WILDCARD, validate_pattern};
use crate::subscription::{SubscriptionHandle, SubscriptionKind, spawn_consumer, spawn_subscription};
use crate::subscription_handler::SubscriptionHandler;

use tracing::info;

/// A durable consumer together with the subscription dispatching its messages.
#[derive(Clone, Debug)]
pub struct DurableSubscription<Co>
where
    Co: Consumer,
{
    consumer: Co,
    handle: SubscriptionHandle,
}

impl<Co> DurableSubscription<Co>
where
    Co: Consumer,
{
    /// The broker-side consumer.
    #[must_use]
    pub const fn consumer(&self) -> &Co {
        &self.consumer
    }

    /// The dispatching subscription.
    #[must_use]
    pub const fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Fetches the consumer's current state from the broker.
    ///
    /// # Errors
    ///
    /// Returns `Info` if the broker cannot be queried.
    pub async fn info(&self) -> Result<ConsumerInfo, Error> {
        self.consumer.info().await.map_err(|e| {
            wrap(e, |source| Error::Info {
                target: self.consumer.name(),
                source,
            })
        })
    }

    /// Stops consumption. Unacknowledged messages stay eligible for redelivery.
    pub async fn stop(&self) {
        self.handle.stop().await;
    }
}

impl<C> Client<C>
where
    C: Connection,
{
    /// Subscribes `handler` to every subject. Registered under `>`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the client is closed or disconnected and `Subscribe`
    /// when the broker refuses the subscription.
    pub async fn subscribe_to_all<X>(&self, handler: X) -> Result<SubscriptionHandle, Error>
    where
        X: SubscriptionHandler,
    {
        self.subscribe_core(
            SubscriptionKey::all(),
            FULL_WILDCARD,
            SubscriptionKind::All,
            handler,
        )
        .await
    }

    /// Subscribes `handler` to one subject or pattern. Registered under the subject.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the client is closed or disconnected, `InvalidSubject`
    /// for malformed patterns and `Subscribe` when the broker refuses the subscription.
    pub async fn subscribe_to_subject<X>(
        &self,
        subject: &str,
        handler: X,
    ) -> Result<SubscriptionHandle, Error>
    where
        X: SubscriptionHandler,
    {
        self.subscribe_core(
            SubscriptionKey::subject(subject),
            subject,
            SubscriptionKind::Subject,
            handler,
        )
        .await
    }

    /// Subscribes `handler` as a member of queue group `queue`. Registered under `subject:queue`.
    ///
    /// Each message is delivered to one member of the group.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the client is closed or disconnected, `InvalidSubject`
    /// for malformed patterns or an empty queue name and `Subscribe` when the broker refuses
    /// the subscription.
    pub async fn subscribe_to_queue_group<X>(
        &self,
        subject: &str,
        queue: &str,
        handler: X,
    ) -> Result<SubscriptionHandle, Error>
    where
        X: SubscriptionHandler,
    {
        if queue.is_empty() {
            return Err(Error::InvalidSubject {
                subject: subject.to_string(),
                reason: "queue group name must not be empty",
            });
        }

        self.subscribe_core(
            SubscriptionKey::queue_group(subject, queue),
            subject,
            SubscriptionKind::QueueGroup {
                queue: queue.to_string(),
            },
            handler,
        )
        .await
    }

    /// Consumes `subject` through a durable, explicitly acknowledged consumer on `stream_name`.
    ///
    /// The stream is ensured for the subject and its direct children, then a durable consumer
    /// filtered to the subject is created or updated. Provisioning is bounded by
    /// `provision_timeout`. A message is acknowledged only when `handler` returns `Ok`.
    /// Registered under `consumer_` followed by the subject.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the client is closed or disconnected, `ProvisionTimeout`
    /// when provisioning exceeds its bound, `GetStream`, `CreateStream` or `CreateConsumer`
    /// when the broker rejects provisioning and `Consume` when consumption cannot start.
    pub async fn subscribe_to_jetstream<X>(
        &self,
        stream_name: &str,
        subject: &str,
        handler: X,
    ) -> Result<DurableSubscription<ConsumerOf<C>>, Error>
    where
        X: SubscriptionHandler,
    {
        self.ensure_connected()?;
        validate_pattern(subject)?;

        let consumer_name = subject::consumer_name(subject);
        let timeout = self.config.provision_timeout;

        let consumer = tokio::time::timeout(
            timeout,
            self.provision_consumer(stream_name, subject, &consumer_name),
        )
        .await
        .map_err(|_| Error::ProvisionTimeout {
            target: format!("consumer {consumer_name} on stream {stream_name}"),
            timeout,
        })??;

        let deliveries = consumer.messages().await.map_err(|e| {
            wrap(e, |source| Error::Consume {
                consumer: consumer_name.clone(),
                source,
            })
        })?;

        let handle = spawn_consumer(
            SubscriptionKey::consumer(subject),
            subject.to_string(),
            SubscriptionKind::Durable {
                stream: stream_name.to_string(),
                consumer: consumer_name.clone(),
            },
            deliveries,
            handler,
            self.config.handler_concurrency,
        );
        self.register(handle.clone()).await;

        info!(
            stream = %stream_name,
            subject = %subject,
            consumer = %consumer_name,
            "durable consumer started"
        );

        Ok(DurableSubscription { consumer, handle })
    }

    /// Durable consumption of every subject on `stream_name`.
    ///
    /// # Errors
    ///
    /// See [`Client::subscribe_to_jetstream`].
    pub async fn subscribe_to_all_jetstream<X>(
        &self,
        stream_name: &str,
        handler: X,
    ) -> Result<DurableSubscription<ConsumerOf<C>>, Error>
    where
        X: SubscriptionHandler,
    {
        self.subscribe_to_jetstream(stream_name, FULL_WILDCARD, handler)
            .await
    }

    async fn provision_consumer(
        &self,
        stream_name: &str,
        subject: &str,
        consumer_name: &str,
    ) -> Result<ConsumerOf<C>, Error> {
        let stream = self
            .ensure_stream(stream_name, &subject::durable_stream_subjects(subject))
            .await?;

        stream
            .create_consumer(ConsumerConfig {
                name: consumer_name.to_string(),
                filter_subject: subject.to_string(),
                redelivery: self.config.redelivery.clone(),
            })
            .await
            .map_err(|e| {
                wrap(e, |source| Error::CreateConsumer {
                    consumer: consumer_name.to_string(),
                    stream: stream_name.to_string(),
                    source,
                })
            })
    }

    async fn subscribe_core<X>(
        &self,
        key: SubscriptionKey,
        subject: &str,
        kind: SubscriptionKind,
        handler: X,
    ) -> Result<SubscriptionHandle, Error>
    where
        X: SubscriptionHandler,
    {
        self.ensure_connected()?;
        validate_pattern(subject)?;

        let queue = match &kind {
            SubscriptionKind::QueueGroup { queue } => Some(queue.clone()),
            _ => None,
        };

        let messages = self
            .connection
            .subscribe(subject.to_string(), queue)
            .await
            .map_err(|e| {
                wrap(e, |source| Error::Subscribe {
                    subject: subject.to_string(),
                    source,
                })
            })?;

        let handle = spawn_subscription(
            key,
            subject.to_string(),
            kind,
            messages,
            handler,
            self.config.handler_concurrency,
        );
        self.register(handle.clone()).await;

        info!(key = %handle.key(), subject = %subject, "subscribed");

        Ok(handle)
    }
}
