use std::time::Duration;

use typed_builder::TypedBuilder;

pub const DEFAULT_CORE_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_STORE_POOL_SIZE: usize = 10;

#[derive(Debug, Clone, TypedBuilder)]
pub struct CoreConfig {
    /// Upper bound on a single store call.
    #[builder(default = DEFAULT_CORE_TIMEOUT)]
    pub timeout: Duration,
    /// Admission permits for the in-memory store.
    #[builder(default = DEFAULT_STORE_POOL_SIZE)]
    pub store_pool_size: usize,
}

impl CoreConfig {
    /// Reads `CORE_TIMEOUT_MS` and `STORE_POOL_SIZE`, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let timeout = std::env::var("CORE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CORE_TIMEOUT);
        let store_pool_size = std::env::var("STORE_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_STORE_POOL_SIZE);

        Self {
            timeout,
            store_pool_size,
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self { Self::builder().build() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(1000));
        assert_eq!(config.store_pool_size, 10);

        let config = CoreConfig::builder()
            .timeout(Duration::from_millis(20))
            .build();
        assert_eq!(config.timeout, Duration::from_millis(20));
        assert_eq!(config.store_pool_size, 10);
    }
}
