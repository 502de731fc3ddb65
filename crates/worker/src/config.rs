//! Worker configuration.

use anyhow::Result;

use barkbase_engine::config::{DatabaseConfig, EngineConfig};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique worker identifier (UUID unless `WORKER_ID` is set).
    pub worker_id: String,

    /// Database connection settings.
    pub database: DatabaseConfig,

    /// Engine settings (poll interval, batch sizes, retry bound,
    /// notification endpoint).
    pub engine: EngineConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let worker_id =
            std::env::var("WORKER_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            worker_id,
            database: DatabaseConfig::from_env()?,
            engine: EngineConfig::from_env()?,
        })
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}
