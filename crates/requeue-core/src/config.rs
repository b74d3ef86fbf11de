//! Runtime settings.
//!
//! Defaults match the demo deployment; every field can be overridden from the
//! environment (`REQUEUE_*`), which is how the CLI is configured.

use std::time::Duration;

use crate::error::RequeueError;

/// Topic name for each position in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub main: String,
    pub retry1: String,
    pub retry2: String,
    pub retry3: String,
    pub dead_letter: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            main: "main".to_string(),
            retry1: "retry-1".to_string(),
            retry2: "retry-2".to_string(),
            retry3: "retry-3".to_string(),
            dead_letter: "deadletter".to_string(),
        }
    }
}

impl Topics {
    /// All topics that must exist before consumers start.
    pub fn all(&self) -> [&str; 5] {
        [
            &self.main,
            &self.retry1,
            &self.retry2,
            &self.retry3,
            &self.dead_letter,
        ]
    }
}

/// Per-stage backoff constants, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryDelays {
    pub retry1_ms: u64,
    pub retry2_ms: u64,
    pub retry3_base_ms: u64,
    /// Upper bound of the uniform jitter added at the final retryable stage.
    pub retry3_jitter_ms: u64,
}

impl Default for RetryDelays {
    fn default() -> Self {
        Self {
            retry1_ms: 5_000,
            retry2_ms: 15_000,
            retry3_base_ms: 30_000,
            retry3_jitter_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub broker_addr: String,
    pub group_id: String,
    pub topics: Topics,
    pub delays: RetryDelays,
    /// Cadence of the synthetic demo producer.
    pub producer_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker_addr: "localhost:9092".to_string(),
            group_id: "requeue-demo".to_string(),
            topics: Topics::default(),
            delays: RetryDelays::default(),
            producer_interval: Duration::from_millis(10_000),
        }
    }
}

impl Settings {
    /// Defaults overridden by `REQUEUE_*` environment variables.
    pub fn from_env() -> Result<Self, RequeueError> {
        let defaults = Self::default();
        Ok(Self {
            broker_addr: env_string("REQUEUE_BROKER", defaults.broker_addr),
            group_id: env_string("REQUEUE_GROUP_ID", defaults.group_id),
            topics: Topics {
                main: env_string("REQUEUE_TOPIC_MAIN", defaults.topics.main),
                retry1: env_string("REQUEUE_TOPIC_RETRY1", defaults.topics.retry1),
                retry2: env_string("REQUEUE_TOPIC_RETRY2", defaults.topics.retry2),
                retry3: env_string("REQUEUE_TOPIC_RETRY3", defaults.topics.retry3),
                dead_letter: env_string("REQUEUE_TOPIC_DEADLETTER", defaults.topics.dead_letter),
            },
            delays: RetryDelays {
                retry1_ms: env_u64("REQUEUE_RETRY1_MS", defaults.delays.retry1_ms)?,
                retry2_ms: env_u64("REQUEUE_RETRY2_MS", defaults.delays.retry2_ms)?,
                retry3_base_ms: env_u64("REQUEUE_RETRY3_BASE_MS", defaults.delays.retry3_base_ms)?,
                retry3_jitter_ms: env_u64(
                    "REQUEUE_RETRY3_JITTER_MS",
                    defaults.delays.retry3_jitter_ms,
                )?,
            },
            producer_interval: Duration::from_millis(env_u64(
                "REQUEUE_PRODUCER_INTERVAL_MS",
                defaults.producer_interval.as_millis() as u64,
            )?),
        })
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> Result<u64, RequeueError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| RequeueError::Config(format!("{key} must be an integer, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo_deployment() {
        let settings = Settings::default();
        assert_eq!(settings.topics.main, "main");
        assert_eq!(settings.topics.dead_letter, "deadletter");
        assert_eq!(settings.delays.retry1_ms, 5_000);
        assert_eq!(settings.delays.retry2_ms, 15_000);
        assert_eq!(settings.delays.retry3_base_ms, 30_000);
        assert_eq!(settings.delays.retry3_jitter_ms, 10_000);
        assert_eq!(settings.producer_interval, Duration::from_millis(10_000));
    }

    #[test]
    fn all_lists_every_stage_topic_once() {
        let topics = Topics::default();
        let all = topics.all();
        assert_eq!(all, ["main", "retry-1", "retry-2", "retry-3", "deadletter"]);
    }
}
