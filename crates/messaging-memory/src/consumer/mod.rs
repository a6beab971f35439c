use crate::broker::{StreamData, StreamShared};
use crate::error::Error;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_messaging::consumer::{Acknowledge, Consumer, ConsumerConfig, ConsumerInfo, Delivery};
use courier_messaging::message::DeliveryInfo;
use courier_messaging::subject::matches;
use courier_messaging::{BoxError, Message};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Redelivery delay when the policy leaves it unset.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);

const IDLE_POLL: Duration = Duration::from_millis(50);
const DELIVERY_BUFFER: usize = 64;

#[derive(Debug)]
pub(crate) struct ConsumerShared {
    pub name: String,
    pub state: Mutex<ConsumerState>,
}

#[derive(Debug)]
pub(crate) struct ConsumerState {
    pub config: ConsumerConfig,
    cursor: u64,
    consumer_sequence: u64,
    pending: BTreeMap<u64, Pending>,
    redelivered: HashSet<u64>,
    acknowledged: Vec<u64>,
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    delivered: u64,
    deadline: Instant,
}

impl ConsumerShared {
    pub(crate) fn new(config: ConsumerConfig) -> Self {
        Self {
            name: config.name.clone(),
            state: Mutex::new(ConsumerState {
                config,
                cursor: 1,
                consumer_sequence: 0,
                pending: BTreeMap::new(),
                redelivered: HashSet::new(),
                acknowledged: Vec::new(),
            }),
        }
    }
}

impl ConsumerState {
    fn ack_wait(&self, delivered: u64) -> Duration {
        let redelivery = &self.config.redelivery;
        if redelivery.backoff.is_empty() {
            return redelivery.ack_wait.unwrap_or(DEFAULT_ACK_WAIT);
        }

        let index = usize::try_from(delivered.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .min(redelivery.backoff.len() - 1);
        redelivery.backoff[index]
    }

    fn exhausted(&self, delivered: u64) -> bool {
        self.config
            .redelivery
            .max_deliver
            .and_then(|max| u64::try_from(max).ok())
            .is_some_and(|max| max > 0 && delivered >= max)
    }

    fn ack_floor(&self) -> u64 {
        self.pending
            .keys()
            .next()
            .map_or(self.cursor.saturating_sub(1), |first| first - 1)
    }
}

/// A durable consumer on an in-memory stream.
#[derive(Clone, Debug)]
pub struct MemoryConsumer {
    stream: Arc<StreamShared>,
    shared: Arc<ConsumerShared>,
    online: Arc<AtomicBool>,
}

impl MemoryConsumer {
    pub(crate) const fn new(
        stream: Arc<StreamShared>,
        shared: Arc<ConsumerShared>,
        online: Arc<AtomicBool>,
    ) -> Self {
        Self {
            stream,
            shared,
            online,
        }
    }

    /// Stream sequences acknowledged so far, in acknowledgement order.
    pub async fn acknowledged(&self) -> Vec<u64> {
        self.shared.state.lock().await.acknowledged.clone()
    }

    /// Claims every delivery that is due: expired pending messages first, then new ones.
    ///
    /// Returns the deliveries and the next redelivery deadline.
    async fn claim(&self) -> (Vec<Delivery>, Option<Instant>) {
        let mut stream = self.stream.data.lock().await;
        stream.expire();
        let mut state = self.shared.state.lock().await;
        let now = Instant::now();
        let mut deliveries = Vec::new();

        let expired: Vec<_> = state
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(sequence, pending)| (*sequence, pending.delivered))
            .collect();

        for (sequence, delivered) in expired {
            if state.exhausted(delivered) {
                state.pending.remove(&sequence);
                warn!(
                    consumer = %self.shared.name,
                    seq = sequence,
                    delivered,
                    "maximum deliveries reached"
                );
                continue;
            }

            if stream.get(sequence).is_none() {
                state.pending.remove(&sequence);
                continue;
            }

            state.redelivered.insert(sequence);
            deliveries.push(self.deliver(&stream, &mut state, sequence, delivered + 1, now));
        }

        let fresh: Vec<_> = stream
            .messages
            .iter()
            .filter(|message| message.sequence >= state.cursor)
            .map(|message| (message.sequence, message.subject.clone()))
            .collect();

        for (sequence, subject) in fresh {
            state.cursor = sequence + 1;
            if matches(&state.config.filter_subject, &subject) {
                deliveries.push(self.deliver(&stream, &mut state, sequence, 1, now));
            }
        }

        let next_deadline = state.pending.values().map(|pending| pending.deadline).min();

        (deliveries.into_iter().flatten().collect(), next_deadline)
    }

    fn deliver(
        &self,
        stream: &StreamData,
        state: &mut ConsumerState,
        sequence: u64,
        delivered: u64,
        now: Instant,
    ) -> Option<Delivery> {
        let stored = stream.get(sequence)?;

        state.consumer_sequence += 1;
        let deadline = now + state.ack_wait(delivered);
        state.pending.insert(sequence, Pending { delivered, deadline });

        let mut message = Message::new(stored.subject.clone(), stored.payload.clone());
        message.delivery = Some(DeliveryInfo {
            stream: self.stream.name.clone(),
            consumer: self.shared.name.clone(),
            stream_sequence: sequence,
            consumer_sequence: state.consumer_sequence,
            delivered,
        });

        Some(Delivery::new(
            message,
            MemoryAcker {
                consumer: Arc::clone(&self.shared),
                online: Arc::clone(&self.online),
                sequence,
            },
        ))
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    type Error = Error;

    fn name(&self) -> String {
        self.shared.name.clone()
    }

    fn stream_name(&self) -> String {
        self.stream.name.clone()
    }

    async fn info(&self) -> Result<ConsumerInfo, Self::Error> {
        let stream = self.stream.data.lock().await;
        let state = self.shared.state.lock().await;

        let num_pending = stream
            .messages
            .iter()
            .filter(|message| {
                message.sequence >= state.cursor
                    && matches(&state.config.filter_subject, &message.subject)
            })
            .count() as u64;

        Ok(ConsumerInfo {
            name: self.shared.name.clone(),
            stream_name: self.stream.name.clone(),
            filter_subject: state.config.filter_subject.clone(),
            num_pending,
            num_ack_pending: state.pending.len() as u64,
            num_redelivered: state.redelivered.len() as u64,
            ack_floor: state.ack_floor(),
        })
    }

    async fn messages(
        &self,
    ) -> Result<BoxStream<'static, Result<Delivery, Self::Error>>, Self::Error> {
        if !self.online.load(Ordering::Acquire) {
            return Err(Error::NotConnected);
        }

        let (sender, receiver) = mpsc::channel(DELIVERY_BUFFER);
        let consumer = self.clone();

        tokio::spawn(async move {
            while !sender.is_closed() {
                let appended = consumer.stream.appended.notified();
                tokio::pin!(appended);
                appended.as_mut().enable();

                let mut wait = IDLE_POLL;
                if consumer.online.load(Ordering::Acquire) {
                    let (deliveries, next_deadline) = consumer.claim().await;
                    for delivery in deliveries {
                        if sender.send(Ok(delivery)).await.is_err() {
                            return;
                        }
                    }
                    if let Some(deadline) = next_deadline {
                        wait = wait.min(deadline.saturating_duration_since(Instant::now()));
                    }
                }

                tokio::select! {
                    () = sender.closed() => break,
                    () = &mut appended => {}
                    () = tokio::time::sleep(wait) => {}
                }
            }

            debug!(consumer = %consumer.shared.name, "consumer stream closed");
        });

        Ok(ReceiverStream::new(receiver).boxed())
    }
}

/// Acknowledges one delivery of an in-memory consumer.
#[derive(Debug)]
struct MemoryAcker {
    consumer: Arc<ConsumerShared>,
    online: Arc<AtomicBool>,
    sequence: u64,
}

#[async_trait]
impl Acknowledge for MemoryAcker {
    async fn ack(&self) -> Result<(), BoxError> {
        if !self.online.load(Ordering::Acquire) {
            return Err(Box::new(Error::NotConnected));
        }

        let mut state = self.consumer.state.lock().await;
        if state.pending.remove(&self.sequence).is_none() {
            return Err(Box::new(Error::NotPending(self.sequence)));
        }
        state.acknowledged.push(self.sequence);

        Ok(())
    }
}
