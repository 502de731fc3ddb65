//! Engine configuration for the workflow worker.

use serde::Deserialize;

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `BARKBASE_`:
/// - `BARKBASE_POLL_INTERVAL_SECS`: Worker poll interval (default: 5)
/// - `BARKBASE_BATCH_SIZE`: Max executions/jobs claimed per phase (default: 25)
/// - `BARKBASE_CLAIM_STALE_SECS`: Minimum age of `last_processed_at`
///   before an execution may be re-claimed (default: 1)
/// - `BARKBASE_MAX_STEP_ATTEMPTS`: Action retries before an execution
///   is forced to failed (default: 3)
/// - `BARKBASE_NOTIFY_URL`: Base URL of the notification service
/// - `BARKBASE_NOTIFY_TIMEOUT_SECS`: Per-request dispatch timeout (default: 10)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Worker poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum rows claimed per polling phase
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Seconds an execution's claim marker must age before re-claim
    #[serde(default = "default_claim_stale")]
    pub claim_stale_secs: f64,

    /// Action attempts before an execution is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_step_attempts: i32,

    /// Base URL of the notification service
    #[serde(default = "default_notify_url")]
    pub notify_url: String,

    /// Notification request timeout in seconds
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_batch_size() -> i64 {
    25
}

fn default_claim_stale() -> f64 {
    1.0
}

fn default_max_attempts() -> i32 {
    3
}

fn default_notify_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_notify_timeout() -> u64 {
    10
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `BARKBASE_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("BARKBASE_").from_env::<EngineConfig>()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            claim_stale_secs: default_claim_stale(),
            max_step_attempts: default_max_attempts(),
            notify_url: default_notify_url(),
            notify_timeout_secs: default_notify_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_step_attempts, 3);
    }

    #[test]
    fn test_claim_stale_default() {
        let config = EngineConfig::default();
        assert!(config.claim_stale_secs >= 1.0);
    }
}
