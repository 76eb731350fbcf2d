//! Driver configuration, loadable from TOML.
//!
//! ```toml
//! strategy = "monitor"
//! capacity = 5
//! producers = 2
//! consumers = 1
//! iterations = 20
//! delay_ms = 250
//! values = "sequential"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::{Strategy, DEFAULT_CAPACITY};
use crate::error::ConfigError;

pub const DEFAULT_DELAY_MS: u64 = 1_000;

/// How producers pick the values they publish.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// Uniform in `0..100`.
    #[default]
    Random,
    /// `(producer << 32) | sequence`, so every value is unique and traceable.
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub strategy: Strategy,
    pub capacity: usize,
    pub producers: usize,
    pub consumers: usize,
    /// Values per producer; `None` runs until cancelled.
    pub iterations: Option<u64>,
    /// Simulated work after each operation, outside the buffer lock.
    pub delay_ms: u64,
    pub duration_ms: Option<u64>,
    pub values: ValueSource,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            capacity: DEFAULT_CAPACITY,
            producers: 1,
            consumers: 1,
            iterations: None,
            delay_ms: DEFAULT_DELAY_MS,
            duration_ms: None,
            values: ValueSource::default(),
        }
    }
}

impl DemoConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("capacity", "must be at least 1"));
        }
        if self.producers == 0 {
            return Err(ConfigError::invalid("producers", "must be at least 1"));
        }
        if self.consumers == 0 {
            return Err(ConfigError::invalid("consumers", "must be at least 1"));
        }
        if self.iterations == Some(0) {
            return Err(ConfigError::invalid(
                "iterations",
                "must be at least 1 (omit it to run until cancelled)",
            ));
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }

    /// Total values the producers will publish, if bounded.
    pub fn total_values(&self) -> Option<u64> {
        self.iterations.map(|n| n * self.producers as u64)
    }

    /// Share of the total for consumer `index`; the remainder goes to the
    /// lowest indices so the shares always add up.
    pub fn consumer_quota(&self, index: usize) -> Option<u64> {
        let total = self.total_values()?;
        let consumers = self.consumers as u64;
        let extra = u64::from((index as u64) < total % consumers);
        Some(total / consumers + extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_demo() {
        let config = DemoConfig::default();
        assert_eq!(config.capacity, 5);
        assert_eq!(config.delay(), Duration::from_secs(1));
        assert_eq!(config.strategy, Strategy::LockCondition);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DemoConfig::from_toml_str(
            r#"
            strategy = "monitor"
            producers = 3
            values = "sequential"
            "#,
        )
        .unwrap();
        assert_eq!(config.strategy, Strategy::Monitor);
        assert_eq!(config.producers, 3);
        assert_eq!(config.values, ValueSource::Sequential);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.iterations, None);
    }

    #[test]
    fn test_zero_capacity_fails_fast() {
        let err = DemoConfig::from_toml_str("capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "capacity", .. }));
    }

    #[test]
    fn test_negative_capacity_is_a_parse_error() {
        let err = DemoConfig::from_toml_str("capacity = -1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            DemoConfig::from_toml_str("capcity = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = DemoConfig {
            iterations: Some(0),
            ..DemoConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "iterations", .. })
        ));
    }

    #[test]
    fn test_consumer_quotas_sum_to_total() {
        let config = DemoConfig {
            producers: 3,
            consumers: 4,
            iterations: Some(5),
            ..DemoConfig::default()
        };
        let quotas: Vec<u64> = (0..4).map(|i| config.consumer_quota(i).unwrap()).collect();
        assert_eq!(quotas, vec![4, 4, 4, 3]);
        assert_eq!(quotas.iter().sum::<u64>(), 15);

        let unbounded = DemoConfig::default();
        assert_eq!(unbounded.consumer_quota(0), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "strategy = \"channel\"\ncapacity = 2\ndelay_ms = 0").unwrap();

        let config = DemoConfig::load(file.path()).unwrap();
        assert_eq!(config.strategy, Strategy::Channel);
        assert_eq!(config.capacity, 2);
        assert_eq!(config.delay(), Duration::ZERO);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DemoConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("missing.toml"));
    }
}
