use std::time::Duration;

use crate::consumer::RedeliveryPolicy;

/// Endpoint used when no URL is configured.
pub const DEFAULT_URL: &str = "nats://localhost:4222";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RECONNECTS: usize = 5;
const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECT_BUFFER_CAPACITY: usize = 2048;
const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(5);
const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HANDLER_CONCURRENCY: usize = 64;

/// Configuration for a messaging connection.
///
/// Zero-valued fields are replaced with defaults by [`ConnectionConfig::with_defaults`],
/// which [`crate::client::Client::connect`] applies before dialling.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Broker endpoint.
    pub url: String,

    /// Username for basic auth. Only used when the password is also set.
    pub username: String,

    /// Password for basic auth. Only used when the username is also set.
    pub password: String,

    /// Display name reported to the broker.
    pub name: String,

    /// Bound on establishing the transport.
    pub connect_timeout: Duration,

    /// Reconnect attempts after the connection drops.
    pub max_reconnects: usize,

    /// Delay between reconnect attempts.
    pub reconnect_wait: Duration,

    /// Commands buffered client-side while reconnecting.
    pub reconnect_buffer_capacity: usize,

    /// Client-side bound on waiting for a durable publish acknowledgement.
    pub ack_wait: Duration,

    /// Bound on stream and consumer provisioning for durable subscriptions.
    pub provision_timeout: Duration,

    /// Concurrent handler invocations per subscription.
    pub handler_concurrency: usize,

    /// Redelivery policy applied to durable consumers.
    pub redelivery: RedeliveryPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            username: String::new(),
            password: String::new(),
            name: default_name(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            reconnect_wait: DEFAULT_RECONNECT_WAIT,
            reconnect_buffer_capacity: DEFAULT_RECONNECT_BUFFER_CAPACITY,
            ack_wait: DEFAULT_ACK_WAIT,
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
            handler_concurrency: DEFAULT_HANDLER_CONCURRENCY,
            redelivery: RedeliveryPolicy::default(),
        }
    }
}

impl ConnectionConfig {
    /// Creates a configuration for the given endpoint with every other field defaulted.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets basic auth credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Replaces every zero-valued or empty field with its default.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if self.url.is_empty() {
            self.url = DEFAULT_URL.to_string();
        }
        if self.name.is_empty() {
            self.name = default_name();
        }
        if self.connect_timeout.is_zero() {
            self.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        }
        if self.max_reconnects == 0 {
            self.max_reconnects = DEFAULT_MAX_RECONNECTS;
        }
        if self.reconnect_wait.is_zero() {
            self.reconnect_wait = DEFAULT_RECONNECT_WAIT;
        }
        if self.reconnect_buffer_capacity == 0 {
            self.reconnect_buffer_capacity = DEFAULT_RECONNECT_BUFFER_CAPACITY;
        }
        if self.ack_wait.is_zero() {
            self.ack_wait = DEFAULT_ACK_WAIT;
        }
        if self.provision_timeout.is_zero() {
            self.provision_timeout = DEFAULT_PROVISION_TIMEOUT;
        }
        if self.handler_concurrency == 0 {
            self.handler_concurrency = DEFAULT_HANDLER_CONCURRENCY;
        }
        self
    }

    /// Returns the credentials when both halves are present.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }
}

fn default_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("courier-{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed() -> ConnectionConfig {
        ConnectionConfig {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            name: String::new(),
            connect_timeout: Duration::ZERO,
            max_reconnects: 0,
            reconnect_wait: Duration::ZERO,
            reconnect_buffer_capacity: 0,
            ack_wait: Duration::ZERO,
            provision_timeout: Duration::ZERO,
            handler_concurrency: 0,
            redelivery: RedeliveryPolicy::default(),
        }
    }

    #[test]
    fn test_zero_fields_take_defaults() {
        let config = zeroed().with_defaults();

        assert_eq!(config.url, DEFAULT_URL);
        assert!(config.name.starts_with("courier-"));
        assert_eq!(config.name.len(), "courier-".len() + 8);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_reconnects, 5);
        assert_eq!(config.reconnect_wait, Duration::from_secs(1));
        assert_eq!(config.reconnect_buffer_capacity, 2048);
        assert_eq!(config.ack_wait, Duration::from_secs(5));
        assert_eq!(config.provision_timeout, Duration::from_secs(10));
        assert_eq!(config.handler_concurrency, 64);
    }

    #[test]
    fn test_set_fields_are_kept() {
        let config = ConnectionConfig {
            name: "orders-api".to_string(),
            max_reconnects: 42,
            ack_wait: Duration::from_millis(250),
            ..zeroed()
        }
        .with_defaults();

        assert_eq!(config.name, "orders-api");
        assert_eq!(config.max_reconnects, 42);
        assert_eq!(config.ack_wait, Duration::from_millis(250));
    }

    #[test]
    fn test_credentials_require_both_halves() {
        let config = ConnectionConfig::new("nats://broker:4222");
        assert!(config.credentials().is_none());

        let config = config.with_credentials("svc", "");
        assert!(config.credentials().is_none());

        let config = config.with_credentials("svc", "hunter2");
        assert_eq!(config.credentials(), Some(("svc", "hunter2")));
    }
}
