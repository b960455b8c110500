use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// How long one `next()` call blocks before reporting a quiet poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on entries fetched per read.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pending entries idle this long are taken over from whichever member
    /// of the group left them behind.
    #[serde(default = "default_claim_idle_ms")]
    pub claim_idle_ms: u64,
    /// Approximate cap on stream length, applied on publish. Zero disables
    /// trimming.
    #[serde(default = "default_max_len")]
    pub max_len: usize,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn claim_idle(&self) -> Duration {
        Duration::from_millis(self.claim_idle_ms)
    }

    /// Reads `QUEUE_POLL_INTERVAL_MS`, `QUEUE_BATCH_SIZE`,
    /// `QUEUE_CLAIM_IDLE_MS` and `QUEUE_MAX_LEN`.
    pub fn from_env() -> Self {
        Self {
            poll_interval_ms: positive_env("QUEUE_POLL_INTERVAL_MS")
                .unwrap_or_else(default_poll_interval_ms),
            batch_size: positive_env("QUEUE_BATCH_SIZE")
                .unwrap_or_else(default_batch_size),
            claim_idle_ms: positive_env("QUEUE_CLAIM_IDLE_MS")
                .unwrap_or_else(default_claim_idle_ms),
            max_len: std::env::var("QUEUE_MAX_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_len),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            claim_idle_ms: default_claim_idle_ms(),
            max_len: default_max_len(),
        }
    }
}

fn positive_env<T>(name: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|n| *n > T::default())
}

fn default_poll_interval_ms() -> u64 { 500 }

fn default_batch_size() -> usize { 16 }

fn default_claim_idle_ms() -> u64 { 30_000 }

fn default_max_len() -> usize { 10_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: QueueConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.claim_idle(), Duration::from_secs(30));
        assert_eq!(config.max_len, 10_000);
    }

    #[test]
    fn test_trimming_can_be_disabled() {
        let config: QueueConfig = serde_json::from_str(r#"{"max_len":0}"#).unwrap();
        assert_eq!(config.max_len, 0);
    }
}
