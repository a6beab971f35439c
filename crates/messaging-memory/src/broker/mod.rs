use crate::consumer::ConsumerShared;
use crate::error::Error;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use courier_messaging::Message;
use courier_messaging::context::PublishAck;
use courier_messaging::stream::{StreamConfig, StreamInfo};
use courier_messaging::subject::matches;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::{debug, trace};

/// An in-process broker with subject routing, queue groups and memory streams.
///
/// Every [`crate::MemoryConnection`] created from the same broker shares its
/// subscriptions and streams. Clones refer to the same broker.
#[derive(Clone, Debug, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Debug, Default)]
struct BrokerInner {
    credentials: Option<(String, String)>,
    next_connection: AtomicU64,
    unreachable: AtomicBool,
    streams_disabled: AtomicBool,
    hold_acks: AtomicBool,
    hold_provisioning: AtomicBool,
    provisioning_released: Notify,
    routes: Mutex<Routes>,
    streams: Mutex<HashMap<String, Arc<StreamShared>>>,
}

#[derive(Debug, Default)]
struct Routes {
    entries: Vec<Route>,
    queue_cursors: HashMap<(String, String), usize>,
}

impl Routes {
    /// Drops closed routes and the cursors of queue groups left without members.
    fn prune(&mut self) {
        self.entries.retain(|route| !route.sender.is_closed());

        let entries = &self.entries;
        self.queue_cursors.retain(|(pattern, queue), _| {
            entries.iter().any(|route| {
                route.queue.as_deref() == Some(queue.as_str()) && route.pattern == *pattern
            })
        });
    }
}

#[derive(Debug)]
pub(crate) struct Route {
    pub pattern: String,
    pub queue: Option<String>,
    pub connection: u64,
    pub online: Arc<AtomicBool>,
    pub sender: mpsc::UnboundedSender<Message>,
}

impl MemoryBroker {
    /// Creates a broker that accepts any credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker that only accepts the given credentials.
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                credentials: Some((username.into(), password.into())),
                ..BrokerInner::default()
            }),
        }
    }

    /// Makes new connections time out.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::Release);
    }

    /// Disables persistent streams, as on a broker without them enabled.
    pub fn set_streams_disabled(&self, disabled: bool) {
        self.inner
            .streams_disabled
            .store(disabled, Ordering::Release);
    }

    /// Stores durable publishes but never acknowledges them.
    pub fn set_hold_acks(&self, hold: bool) {
        self.inner.hold_acks.store(hold, Ordering::Release);
    }

    /// Leaves stream lookups and creation pending until released.
    pub fn set_hold_provisioning(&self, hold: bool) {
        self.inner
            .hold_provisioning
            .store(hold, Ordering::Release);
        if !hold {
            self.inner.provisioning_released.notify_waiters();
        }
    }

    /// Names of the existing streams in sorted order.
    pub async fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.streams.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of live core subscriptions across all connections.
    pub async fn subscription_count(&self) -> usize {
        let mut routes = self.inner.routes.lock().await;
        routes.prune();
        routes.entries.len()
    }

    pub(crate) fn is_unreachable(&self) -> bool {
        self.inner.unreachable.load(Ordering::Acquire)
    }

    pub(crate) fn streams_disabled(&self) -> bool {
        self.inner.streams_disabled.load(Ordering::Acquire)
    }

    pub(crate) fn holds_acks(&self) -> bool {
        self.inner.hold_acks.load(Ordering::Acquire)
    }

    /// Waits while provisioning is held.
    pub(crate) async fn provisioning_gate(&self) {
        loop {
            let released = self.inner.provisioning_released.notified();
            if !self.inner.hold_provisioning.load(Ordering::Acquire) {
                return;
            }
            trace!("stream provisioning held");
            released.await;
        }
    }

    pub(crate) fn accepts(&self, credentials: Option<(&str, &str)>) -> bool {
        match &self.inner.credentials {
            None => true,
            Some((username, password)) => {
                credentials == Some((username.as_str(), password.as_str()))
            }
        }
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.inner.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) async fn add_route(&self, route: Route) {
        self.inner.routes.lock().await.entries.push(route);
    }

    pub(crate) async fn remove_routes(&self, connection: u64) {
        let mut routes = self.inner.routes.lock().await;
        routes.entries.retain(|route| route.connection != connection);
        routes.prune();
    }

    /// Delivers `message` to matching subscriptions, one member per queue group.
    ///
    /// Returns the number of subscriptions that received it.
    pub(crate) async fn route(&self, message: &Message) -> usize {
        let mut guard = self.inner.routes.lock().await;
        let routes = &mut *guard;
        routes.prune();

        let mut delivered = 0;
        let mut groups: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();

        for (index, route) in routes.entries.iter().enumerate() {
            if !route.online.load(Ordering::Acquire) || !matches(&route.pattern, &message.subject) {
                continue;
            }

            match &route.queue {
                Some(queue) => groups
                    .entry((route.pattern.clone(), queue.clone()))
                    .or_default()
                    .push(index),
                None => {
                    if route.sender.send(message.clone()).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }

        for (group, members) in groups {
            let cursor = routes.queue_cursors.entry(group).or_insert(0);
            let member = members[*cursor % members.len()];
            *cursor = cursor.wrapping_add(1);

            if routes.entries[member].sender.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }

        trace!(subject = %message.subject, delivered, "message routed");

        delivered
    }

    /// Stores the message in the stream capturing its subject, if any.
    pub(crate) async fn ingest(&self, subject: &str, payload: &Bytes) -> Option<PublishAck> {
        let mut streams: Vec<_> = self.inner.streams.lock().await.values().cloned().collect();
        streams.sort_by(|a, b| a.name.cmp(&b.name));

        for stream in streams {
            let mut data = stream.data.lock().await;
            if !data.captures(subject) {
                continue;
            }

            let sequence = data.append(subject, payload.clone());
            drop(data);
            stream.appended.notify_waiters();

            return Some(PublishAck {
                stream: stream.name.clone(),
                sequence,
                duplicate: false,
            });
        }

        None
    }

    pub(crate) async fn get_stream(&self, name: &str) -> Result<Arc<StreamShared>, Error> {
        self.inner
            .streams
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::StreamNotFound(name.to_string()))
    }

    pub(crate) async fn create_stream(&self, config: StreamConfig) -> Result<Arc<StreamShared>, Error> {
        if config.name.is_empty() {
            return Err(Error::InvalidStream("name must not be empty"));
        }
        if config.name.contains(['.', '*', '>', ' ']) {
            return Err(Error::InvalidStream("name must not contain '.', '*', '>' or spaces"));
        }
        if config.subjects.is_empty() {
            return Err(Error::InvalidStream("at least one subject is required"));
        }

        let mut streams = self.inner.streams.lock().await;

        if let Some(existing) = streams.get(&config.name) {
            debug!(stream = %config.name, "updating stream configuration");
            existing.data.lock().await.config = config;
            return Ok(Arc::clone(existing));
        }

        let stream = Arc::new(StreamShared {
            name: config.name.clone(),
            data: Mutex::new(StreamData {
                config,
                messages: VecDeque::new(),
                last_sequence: 0,
                consumers: HashMap::new(),
            }),
            appended: Notify::new(),
        });
        streams.insert(stream.name.clone(), Arc::clone(&stream));

        Ok(stream)
    }
}

#[derive(Debug)]
pub(crate) struct StreamShared {
    pub name: String,
    pub data: Mutex<StreamData>,
    pub appended: Notify,
}

#[derive(Debug)]
pub(crate) struct StreamData {
    pub config: StreamConfig,
    pub messages: VecDeque<StoredMessage>,
    pub last_sequence: u64,
    pub consumers: HashMap<String, Arc<ConsumerShared>>,
}

#[derive(Clone, Debug)]
pub(crate) struct StoredMessage {
    pub sequence: u64,
    pub subject: String,
    pub payload: Bytes,
    pub stored_at: Instant,
}

impl StreamData {
    fn captures(&self, subject: &str) -> bool {
        self.config
            .subjects
            .iter()
            .any(|pattern| matches(pattern, subject))
    }

    fn append(&mut self, subject: &str, payload: Bytes) -> u64 {
        self.expire();

        self.last_sequence += 1;
        self.messages.push_back(StoredMessage {
            sequence: self.last_sequence,
            subject: subject.to_string(),
            payload,
            stored_at: Instant::now(),
        });

        self.last_sequence
    }

    /// Drops messages older than the retention window.
    pub fn expire(&mut self) {
        let Some(max_age) = self.config.max_age else {
            return;
        };

        while self
            .messages
            .front()
            .is_some_and(|message| message.stored_at.elapsed() > max_age)
        {
            self.messages.pop_front();
        }
    }

    pub fn get(&self, sequence: u64) -> Option<&StoredMessage> {
        self.messages
            .binary_search_by_key(&sequence, |message| message.sequence)
            .ok()
            .and_then(|index| self.messages.get(index))
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            name: self.config.name.clone(),
            subjects: self.config.subjects.clone(),
            storage: self.config.storage,
            max_age: self.config.max_age,
            messages: self.messages.len() as u64,
            last_sequence: self.last_sequence,
        }
    }
}
