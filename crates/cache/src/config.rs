use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default age after which cached data counts as stale.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);

/// Default capacity of the invalidation broadcast channel. Lagging
/// subscribers skip events beyond this many.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Settings for a [`QueryCache`](crate::QueryCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_stale_time_secs", rename = "stale_time_secs")]
    stale_time_secs: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl CacheConfig {
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time_secs = stale_time.as_secs();
        self
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            stale_time_secs: default_stale_time_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_stale_time_secs() -> u64 {
    DEFAULT_STALE_TIME.as_secs()
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, CacheConfig::default());
        assert_eq!(cfg.stale_time(), Duration::from_secs(30));
    }

    #[test]
    fn stale_time_reads_seconds() {
        let cfg: CacheConfig = serde_json::from_str(r#"{"stale_time_secs": 5}"#).unwrap();
        assert_eq!(cfg.stale_time(), Duration::from_secs(5));
        assert_eq!(cfg.event_capacity, DEFAULT_EVENT_CAPACITY);
    }
}
