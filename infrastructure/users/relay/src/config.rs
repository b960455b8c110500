use std::time::Duration;

use message_queue::QueueConfig;
use typed_builder::TypedBuilder;
use uuid::Uuid;

pub const CLIENT_REQUEST_GROUP: &str = "clientRequestConsuming";
pub const BACKEND_REQUEST_GROUP: &str = "backendRequestConsuming";
pub const RESPONSE_GROUP_PREFIX: &str = "uiResponseConsuming";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct RelayTopics {
    #[builder(default = "client_requests".to_string(), setter(into))]
    pub client_request: String,
    #[builder(default = "ui_request".to_string(), setter(into))]
    pub backend_request: String,
    #[builder(default = "ui_response".to_string(), setter(into))]
    pub response: String,
}

impl Default for RelayTopics {
    fn default() -> Self { Self::builder().build() }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct RelayConfig {
    #[builder(default)]
    pub topics: RelayTopics,
    #[builder(default = Duration::from_millis(500))]
    pub poll_interval: Duration,
    #[builder(default = 16)]
    pub batch_size: usize,
    /// How long a caller waits for its correlated reply.
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,
    /// Distinguishes this process's response consumer group.
    #[builder(default = Uuid::new_v4().simple().to_string(), setter(into))]
    pub instance_id: String,
    /// Stable member name inside the shared request groups, so a restarted
    /// process picks up its own pending entries. Falls back to `instance_id`.
    #[builder(default, setter(into))]
    pub consumer_name: Option<String>,
    /// Pending entries idle this long are taken over from other members.
    #[builder(default = Duration::from_secs(30))]
    pub claim_idle: Duration,
    /// Approximate per-topic stream cap. Zero disables trimming.
    #[builder(default = 10_000)]
    pub max_len: usize,
}

impl RelayConfig {
    /// Reads `RELAY_TIMEOUT_MS`, `RELAY_CONSUMER`, the queue settings and the
    /// three topic names (`TOPIC_CLIENT_REQUEST`, `TOPIC_BACKEND_REQUEST`,
    /// `TOPIC_RESPONSE`).
    pub fn from_env() -> Self {
        let queue = QueueConfig::from_env();
        let defaults = RelayTopics::default();
        let topic = |var: &str, default: String| {
            std::env::var(var).ok().filter(|v| !v.is_empty()).unwrap_or(default)
        };

        Self::builder()
            .topics(RelayTopics {
                client_request: topic("TOPIC_CLIENT_REQUEST", defaults.client_request),
                backend_request: topic("TOPIC_BACKEND_REQUEST", defaults.backend_request),
                response: topic("TOPIC_RESPONSE", defaults.response),
            })
            .poll_interval(queue.poll_interval())
            .batch_size(queue.batch_size)
            .claim_idle(queue.claim_idle())
            .max_len(queue.max_len)
            .consumer_name(std::env::var("RELAY_CONSUMER").ok().filter(|v| !v.is_empty()))
            .request_timeout(
                std::env::var("RELAY_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            )
            .build()
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            poll_interval_ms: millis(self.poll_interval),
            batch_size: self.batch_size,
            claim_idle_ms: millis(self.claim_idle),
            max_len: self.max_len,
        }
    }

    /// Member name for `role` (`executor`, `forwarder`) in a shared group.
    pub fn consumer(&self, role: &str) -> String {
        let name = self.consumer_name.as_deref().unwrap_or(&self.instance_id);
        format!("{role}-{name}")
    }

    pub fn response_group(&self) -> String {
        format!("{RESPONSE_GROUP_PREFIX}-{}", self.instance_id)
    }
}

impl Default for RelayConfig {
    fn default() -> Self { Self::builder().build() }
}

fn millis(d: Duration) -> u64 { u64::try_from(d.as_millis()).unwrap_or(u64::MAX) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.topics.client_request, "client_requests");
        assert_eq!(config.topics.backend_request, "ui_request");
        assert_eq!(config.topics.response, "ui_response");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.queue_config().poll_interval_ms, 500);
        assert_eq!(config.queue_config().claim_idle_ms, 30_000);
        assert_eq!(config.queue_config().max_len, 10_000);
    }

    #[test]
    fn test_consumer_name_survives_restart() {
        let before = RelayConfig::builder().consumer_name("node-1".to_string()).build();
        let after = RelayConfig::builder().consumer_name("node-1".to_string()).build();
        assert_ne!(before.instance_id, after.instance_id);
        assert_eq!(before.consumer("executor"), "executor-node-1");
        assert_eq!(before.consumer("executor"), after.consumer("executor"));
        assert_ne!(before.response_group(), after.response_group());
    }

    #[test]
    fn test_consumer_falls_back_to_instance_id() {
        let config = RelayConfig::builder().instance_id("abc").build();
        assert_eq!(config.consumer("forwarder"), "forwarder-abc");
    }

    #[test]
    fn test_response_group_is_per_instance() {
        let a = RelayConfig::default();
        let b = RelayConfig::default();
        assert!(a.response_group().starts_with("uiResponseConsuming-"));
        assert_ne!(a.response_group(), b.response_group());

        let fixed = RelayConfig::builder().instance_id("abc").build();
        assert_eq!(fixed.response_group(), "uiResponseConsuming-abc");
    }
}
