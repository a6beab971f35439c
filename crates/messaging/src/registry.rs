use crate::subject::FULL_WILDCARD;
use crate::subscription::SubscriptionHandle;

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use tokio::sync::Mutex;

/// Key under which a subscription is registered.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    /// Key of the all-subjects subscription.
    #[must_use]
    pub fn all() -> Self {
        Self(FULL_WILDCARD.to_string())
    }

    /// Key of a single-subject subscription.
    pub fn subject(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    /// Key of a queue-group subscription: `subject:queue`.
    #[must_use]
    pub fn queue_group(subject: &str, queue: &str) -> Self {
        Self(format!("{subject}:{queue}"))
    }

    /// Key of a durable consumer: `consumer_` followed by the subject.
    #[must_use]
    pub fn consumer(subject: &str) -> Self {
        Self(format!("consumer_{subject}"))
    }

    /// The key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SubscriptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Active subscriptions of a client, at most one per key.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Arc<Mutex<HashMap<SubscriptionKey, SubscriptionHandle>>>,
}

impl SubscriptionRegistry {
    /// Registers `handle` under its key, returning the entry it displaced.
    pub(crate) async fn insert(&self, handle: SubscriptionHandle) -> Option<SubscriptionHandle> {
        self.entries
            .lock()
            .await
            .insert(handle.key().clone(), handle)
    }

    pub(crate) async fn remove(&self, key: &SubscriptionKey) -> Option<SubscriptionHandle> {
        self.entries.lock().await.remove(key)
    }

    pub(crate) async fn drain(&self) -> Vec<SubscriptionHandle> {
        self.entries
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect()
    }

    /// Looks a subscription up by key.
    pub async fn get(&self, key: &SubscriptionKey) -> Option<SubscriptionHandle> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Whether a subscription is registered under `key`.
    pub async fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    /// Registered keys in sorted order.
    pub async fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.entries.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered subscriptions.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation() {
        assert_eq!(SubscriptionKey::all().as_str(), ">");
        assert_eq!(SubscriptionKey::subject("orders.created").as_str(), "orders.created");
        assert_eq!(
            SubscriptionKey::queue_group("orders.created", "billing").as_str(),
            "orders.created:billing"
        );
        assert_eq!(
            SubscriptionKey::consumer("orders.created").to_string(),
            "consumer_orders.created"
        );
        assert_eq!(SubscriptionKey::consumer(">").as_str(), "consumer_>");
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = SubscriptionRegistry::default();

        assert!(registry.is_empty().await);
        assert_eq!(registry.len().await, 0);
        assert!(registry.keys().await.is_empty());
        assert!(registry.get(&SubscriptionKey::all()).await.is_none());
        assert!(registry.drain().await.is_empty());
    }
}
