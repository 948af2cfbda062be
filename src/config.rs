// Cardbox Configuration
//
// Defines configuration for the batch engine, the reconciler, the study
// scheduler, the stats backfill and the task worker.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardboxConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub study: StudyConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Batch cursor engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cards fetched per invocation
    pub batch_size: usize,

    /// Wall-clock budget of one invocation (in seconds)
    #[serde(with = "serde_duration")]
    pub time_budget: Duration,
}

/// Membership reconciler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Task queue for reconciliation and card creation
    pub queue: String,

    /// Days a disabled card is kept before hard deletion
    pub grace_period_days: i64,

    /// Cards created per creation task
    pub create_batch_size: usize,
}

/// Study scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Target size of the active pool
    pub pool_size: usize,

    /// Candidates fetched per refill, as a multiple of the pool size
    pub refill_factor: usize,

    /// Soonest-due cards considered when nothing is eligible
    pub fallback_window: usize,

    /// Longest gap between answers counted as study time (in seconds)
    #[serde(with = "serde_duration")]
    pub idle_cap: Duration,
}

/// Stats aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Task queue for aggregation runs
    pub queue: String,

    /// Days covered by a backfill
    pub backfill_days: u32,

    /// Delay between consecutive backfill days (in seconds)
    #[serde(with = "serde_duration")]
    pub stagger: Duration,

    /// A backfill is scheduled when no snapshot is this recent
    pub recent_days: u32,

    /// Maximum snapshots returned for display
    pub history_limit: usize,
}

/// Task worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Attempts before a failing task is dropped
    pub max_attempts: u32,

    /// Delay before a failed task is retried (in seconds)
    #[serde(with = "serde_duration")]
    pub retry_delay: Duration,

    /// Idle polling interval (in milliseconds)
    #[serde(with = "serde_duration_millis")]
    pub poll_interval: Duration,

    /// Tasks executed concurrently by `Worker::run`
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            time_budget: Duration::from_secs(30),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            queue: "reconcile".to_string(),
            grace_period_days: 30,
            create_batch_size: 20,
        }
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            refill_factor: 10,
            fallback_window: 20,
            idle_cap: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            queue: "stats".to_string(),
            backfill_days: 40,
            stagger: Duration::from_secs(5),
            recent_days: 2,
            history_limit: 60,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            concurrency: 4,
        }
    }
}

// Custom serde module for Duration (serialize/deserialize as seconds)
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Custom serde module for Duration (serialize/deserialize as milliseconds)
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl CardboxConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: CardboxConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, else from `$CARDBOX_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("CARDBOX_CONFIG").ok().map(PathBuf::from));

        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_batch_size("engine.batch_size", self.engine.batch_size)?;

        if self.engine.time_budget < Duration::from_secs(1)
            || self.engine.time_budget > Duration::from_secs(600)
        {
            return Err(ConfigError::ValidationError(
                "engine.time_budget must be between 1 second and 10 minutes".to_string(),
            ));
        }

        check_batch_size("reconcile.create_batch_size", self.reconcile.create_batch_size)?;

        if self.reconcile.grace_period_days < 1 {
            return Err(ConfigError::ValidationError(
                "reconcile.grace_period_days must be at least 1".to_string(),
            ));
        }

        if self.study.pool_size < 2 || self.study.pool_size > 100 {
            return Err(ConfigError::ValidationError(
                "study.pool_size must be between 2 and 100".to_string(),
            ));
        }

        if self.study.refill_factor == 0 || self.study.fallback_window == 0 {
            return Err(ConfigError::ValidationError(
                "study.refill_factor and study.fallback_window must be positive".to_string(),
            ));
        }

        if self.stats.backfill_days == 0 || self.stats.backfill_days > 365 {
            return Err(ConfigError::ValidationError(
                "stats.backfill_days must be between 1 and 365".to_string(),
            ));
        }

        if self.worker.max_attempts == 0 || self.worker.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "worker.max_attempts and worker.concurrency must be at least 1".to_string(),
            ));
        }

        for (name, queue) in [
            ("reconcile.queue", &self.reconcile.queue),
            ("stats.queue", &self.stats.queue),
        ] {
            if queue.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{}: queue name cannot be empty",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

fn check_batch_size(name: &str, size: usize) -> Result<(), ConfigError> {
    if size == 0 || size > 1000 {
        return Err(ConfigError::ValidationError(format!(
            "{}: batch size must be between 1 and 1000",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = CardboxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.study.pool_size, 10);
        assert_eq!(config.reconcile.grace_period_days, 30);
    }

    #[test]
    fn test_validate_batch_size_zero() {
        let mut config = CardboxConfig::default();
        config.engine.batch_size = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("batch size must be between"));
    }

    #[test]
    fn test_validate_time_budget_too_long() {
        let mut config = CardboxConfig::default();
        config.engine.time_budget = Duration::from_secs(3600);

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("time_budget"));
    }

    #[test]
    fn test_validate_pool_size_too_small() {
        let mut config = CardboxConfig::default();
        config.study.pool_size = 1;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_queue_name() {
        let mut config = CardboxConfig::default();
        config.stats.queue = "  ".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("stats.queue"));
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let toml_str = r#"
            [engine]
            batch_size = 50
            time_budget = 60

            [study]
            pool_size = 8
            refill_factor = 5
            fallback_window = 10
            idle_cap = 120
        "#;

        let config = CardboxConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.engine.batch_size, 50);
        assert_eq!(config.engine.time_budget, Duration::from_secs(60));
        assert_eq!(config.study.pool_size, 8);
        assert_eq!(config.study.idle_cap, Duration::from_secs(120));
        // Untouched sections keep their defaults
        assert_eq!(config.reconcile.queue, "reconcile");
        assert_eq!(config.worker.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardbox.toml");

        let mut config = CardboxConfig::default();
        config.stats.backfill_days = 14;
        config.to_file(&path).unwrap();

        let loaded = CardboxConfig::from_file(&path).unwrap();
        assert_eq!(loaded.stats.backfill_days, 14);
        assert_eq!(loaded.worker.retry_delay, config.worker.retry_delay);
    }
}
