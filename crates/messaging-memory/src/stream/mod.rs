use crate::broker::StreamShared;
use crate::consumer::{ConsumerShared, MemoryConsumer};
use crate::error::Error;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use async_trait::async_trait;
use courier_messaging::consumer::ConsumerConfig;
use courier_messaging::stream::{Stream, StreamInfo};
use tracing::debug;

/// A stream held by a [`crate::MemoryBroker`].
#[derive(Clone, Debug)]
pub struct MemoryStream {
    shared: Arc<StreamShared>,
    online: Arc<AtomicBool>,
}

impl MemoryStream {
    pub(crate) const fn new(shared: Arc<StreamShared>, online: Arc<AtomicBool>) -> Self {
        Self { shared, online }
    }

    /// Names of the consumers attached to the stream, sorted.
    pub async fn consumer_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .shared
            .data
            .lock()
            .await
            .consumers
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Returns true if every subject matched by `filter` is also matched by `pattern`.
fn covers(pattern: &str, filter: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut filter_tokens = filter.split('.');

    loop {
        match (pattern_tokens.next(), filter_tokens.next()) {
            (Some(">"), Some(_)) | (None, None) => return true,
            (Some("*"), Some(token)) if token != ">" => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            _ => return false,
        }
    }
}

#[async_trait]
impl Stream for MemoryStream {
    type Error = Error;

    type Consumer = MemoryConsumer;

    fn name(&self) -> String {
        self.shared.name.clone()
    }

    async fn info(&self) -> Result<StreamInfo, Self::Error> {
        let mut data = self.shared.data.lock().await;
        data.expire();

        Ok(data.info())
    }

    async fn create_consumer(&self, config: ConsumerConfig) -> Result<Self::Consumer, Self::Error> {
        if config.name.is_empty() {
            return Err(Error::InvalidConsumer("name must not be empty"));
        }
        if config.name.contains(['.', '*', '>', ' ']) {
            return Err(Error::InvalidConsumer(
                "name must not contain '.', '*', '>' or spaces",
            ));
        }
        if config.filter_subject.is_empty() {
            return Err(Error::InvalidConsumer("filter subject must not be empty"));
        }

        let mut data = self.shared.data.lock().await;

        if !data
            .config
            .subjects
            .iter()
            .any(|pattern| covers(pattern, &config.filter_subject))
        {
            return Err(Error::InvalidConsumer(
                "filter subject is not covered by the stream's subjects",
            ));
        }

        let shared = match data.consumers.get(&config.name) {
            Some(existing) => {
                debug!(consumer = %config.name, stream = %self.shared.name, "updating consumer");
                existing.state.lock().await.config = config;
                Arc::clone(existing)
            }
            None => {
                let shared = Arc::new(ConsumerShared::new(config));
                data.consumers
                    .insert(shared.name.clone(), Arc::clone(&shared));
                shared
            }
        };
        drop(data);

        Ok(MemoryConsumer::new(
            Arc::clone(&self.shared),
            shared,
            Arc::clone(&self.online),
        ))
    }
}
