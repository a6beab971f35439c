use crate::consumer::Delivery;
use crate::error::BrokerError;
use crate::message::Message;
use crate::registry::SubscriptionKey;
use crate::subscription_handler::SubscriptionHandler;

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span};

/// How a subscription receives messages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubscriptionKind {
    /// Every subject on the connection.
    All,

    /// A single subject or pattern.
    Subject,

    /// A subject shared with other members of a queue group.
    QueueGroup {
        /// Queue group name.
        queue: String,
    },

    /// A durable consumer on a stream.
    Durable {
        /// Stream name.
        stream: String,

        /// Broker-side consumer name.
        consumer: String,
    },
}

/// Lifecycle state of a subscription.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubscriptionState {
    /// Dispatching messages.
    Active,

    /// Stopped explicitly, by close, or because the broker ended the subscription. Terminal.
    Stopped,
}

/// Delivery counters of a subscription.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubscriptionStats {
    /// Messages handed to the handler.
    pub delivered: u64,

    /// Handler invocations that returned an error or panicked.
    pub failed: u64,

    /// Durable deliveries acknowledged after the handler succeeded.
    pub acknowledged: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    acknowledged: AtomicU64,
}

impl Counters {
    fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SubscriptionStats {
        SubscriptionStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    key: SubscriptionKey,
    subject: String,
    kind: SubscriptionKind,
    counters: Arc<Counters>,
    finished: Arc<AtomicBool>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// A registered subscription with its dispatch task.
///
/// Clones refer to the same subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<Inner>,
}

impl SubscriptionHandle {
    /// Registry key.
    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.inner.key
    }

    /// Subscribed subject or pattern.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.inner.subject
    }

    /// Subscription mode.
    #[must_use]
    pub fn kind(&self) -> &SubscriptionKind {
        &self.inner.kind
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        if self.inner.shutdown.is_cancelled() || self.inner.finished.load(Ordering::Acquire) {
            SubscriptionState::Stopped
        } else {
            SubscriptionState::Active
        }
    }

    /// Delivery counters.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.inner.counters.snapshot()
    }

    /// Stops dispatching, releases the broker subscription and waits for in-flight handlers.
    ///
    /// Stopping an already stopped subscription is a no-op.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();

        let task = self.inner.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(key = %self.inner.key, error = %e, "subscription task failed");
            }
        }
    }
}

impl Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("key", &self.inner.key)
            .field("subject", &self.inner.subject)
            .field("kind", &self.inner.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Dispatches plain messages to `handler` until stopped.
pub(crate) fn spawn_subscription<X>(
    key: SubscriptionKey,
    subject: String,
    kind: SubscriptionKind,
    messages: BoxStream<'static, Message>,
    handler: X,
    concurrency: usize,
) -> SubscriptionHandle
where
    X: SubscriptionHandler,
{
    let queue = match &kind {
        SubscriptionKind::QueueGroup { queue } => Some(Arc::<str>::from(queue.as_str())),
        _ => None,
    };

    spawn_dispatch(key, subject, kind, messages, concurrency, move |message, counters| {
        let handler = handler.clone();
        let queue = queue.clone();

        Some(async move {
            counters.delivered();
            if handle_isolated(&handler, message, queue.as_deref()).await.is_err() {
                counters.failed();
            }
        })
    })
}

/// Dispatches durable deliveries to `handler`, acknowledging each one the handler accepts.
pub(crate) fn spawn_consumer<X, E>(
    key: SubscriptionKey,
    subject: String,
    kind: SubscriptionKind,
    deliveries: BoxStream<'static, Result<Delivery, E>>,
    handler: X,
    concurrency: usize,
) -> SubscriptionHandle
where
    X: SubscriptionHandler,
    E: BrokerError,
{
    spawn_dispatch(key, subject, kind, deliveries, concurrency, move |delivery, counters| {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, "error receiving message");
                return None;
            }
        };
        let handler = handler.clone();

        Some(async move {
            counters.delivered();

            let (message, acker) = delivery.into_parts();
            let subject = message.subject.clone();
            if handle_isolated(&handler, message, None).await.is_err() {
                counters.failed();
                return;
            }

            match acker.ack().await {
                Ok(()) => counters.acknowledged(),
                Err(e) => error!(subject = %subject, error = %e, "failed to acknowledge message"),
            }
        })
    })
}

/// Runs the handler, logging any error with the message context.
async fn handle_isolated<X>(handler: &X, message: Message, queue: Option<&str>) -> Result<(), ()>
where
    X: SubscriptionHandler,
{
    let subject = message.subject.clone();
    let payload: Bytes = message.payload.clone();

    handler.handle(message).await.map_err(|e| {
        error!(
            subject = %subject,
            queue = queue.unwrap_or_default(),
            data = %String::from_utf8_lossy(&payload),
            error = %e,
            "error handling message"
        );
    })
}

fn spawn_dispatch<T, F, Fut>(
    key: SubscriptionKey,
    subject: String,
    kind: SubscriptionKind,
    mut items: BoxStream<'static, T>,
    concurrency: usize,
    invoke: F,
) -> SubscriptionHandle
where
    T: Send + 'static,
    F: Fn(T, Arc<Counters>) -> Option<Fut> + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let counters = Arc::new(Counters::default());
    let finished = Arc::new(AtomicBool::new(false));
    let shutdown = CancellationToken::new();
    let span = info_span!("subscription", key = %key);

    let task = {
        let counters = Arc::clone(&counters);
        let finished = Arc::clone(&finished);
        let shutdown = shutdown.clone();

        tokio::spawn(
            async move {
                let permits = Arc::new(Semaphore::new(concurrency.max(1)));
                let mut in_flight = JoinSet::new();

                loop {
                    let item = tokio::select! {
                        () = shutdown.cancelled() => break,
                        item = items.next() => item,
                    };

                    let Some(item) = item else {
                        debug!("broker ended subscription");
                        break;
                    };

                    let Some(invocation) = invoke(item, Arc::clone(&counters)) else {
                        continue;
                    };

                    let permit = tokio::select! {
                        () = shutdown.cancelled() => break,
                        permit = Arc::clone(&permits).acquire_owned() => permit,
                    };
                    let Ok(permit) = permit else {
                        break;
                    };

                    in_flight.spawn(
                        async move {
                            invocation.await;
                            drop(permit);
                        }
                        .in_current_span(),
                    );

                    while let Some(result) = in_flight.try_join_next() {
                        reap(result, &counters);
                    }
                }

                drop(items);

                while let Some(result) = in_flight.join_next().await {
                    reap(result, &counters);
                }

                finished.store(true, Ordering::Release);
                debug!("subscription stopped");
            }
            .instrument(span),
        )
    };

    SubscriptionHandle {
        inner: Arc::new(Inner {
            key,
            subject,
            kind,
            counters,
            finished,
            shutdown,
            task: Mutex::new(Some(task)),
        }),
    }
}

fn reap(result: Result<(), JoinError>, counters: &Counters) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("message handler panicked");
            counters.failed();
        }
    }
}
