//! Log pipeline settings
//!
//! [`PipelineConfig`] is derived from the core [`LoronaConfig`] and holds the
//! resolved values the watchers and the aggregator run with.
//!
//! ```ignore
//! use lorona_core::config::LoronaConfig;
//! use lorona_log_pipeline::config::PipelineConfig;
//!
//! let core_config = LoronaConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::path::{Component, PathBuf};
use std::time::Duration;

use lorona_core::config::{LogPipelineConfig, LogSourceConfig, LoronaConfig};
use serde::{Deserialize, Serialize};

use crate::aggregator::SnapshotIdentity;
use crate::error::LogPipelineError;

/// Resolved log pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pattern registry file
    pub pattern_file: PathBuf,
    /// Position store file
    pub position_file: PathBuf,
    /// Aggregation tick length
    pub tick_interval: Duration,
    /// Log events folded per tick; the rest of the tick's events are dropped
    pub max_events_per_tick: usize,
    /// Largest unread region read by one watcher pass
    pub max_unread_bytes: u64,
    /// Files must be larger than this before the signature is checked
    pub signature_threshold_bytes: u64,
    /// Leading bytes kept as the rotation signature
    pub signature_bytes: usize,
    /// Sleep between two passes of one watcher
    pub poll_interval: Duration,
    /// Capacity of every producer -> aggregator queue
    pub channel_capacity: usize,
    /// Watched files
    pub sources: Vec<LogSourceConfig>,
    /// Identification carried by every snapshot
    pub identity: SnapshotIdentity,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_section(&LogPipelineConfig::default())
    }
}

impl PipelineConfig {
    /// Starts a builder from the default settings.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Builds the pipeline settings from the whole agent configuration.
    ///
    /// Malformed `[[logs]]` entries are skipped (see
    /// [`LoronaConfig::usable_log_sources`]).
    pub fn from_core(core: &LoronaConfig) -> Self {
        let mut config = Self::from_section(&core.log_pipeline);
        config.sources = core.usable_log_sources();
        config.identity = SnapshotIdentity {
            container_name: core.general.container_name.clone(),
            container_support: core.general.container_support.clone(),
            container_description: core.general.container_description.clone(),
        };
        config
    }

    fn from_section(section: &LogPipelineConfig) -> Self {
        Self {
            pattern_file: section.pattern_file.clone(),
            position_file: section.position_file.clone(),
            tick_interval: Duration::from_secs(section.tick_secs),
            max_events_per_tick: section.max_events_per_tick,
            max_unread_bytes: section.max_unread_bytes,
            signature_threshold_bytes: section.signature_threshold_bytes,
            signature_bytes: section.signature_bytes,
            poll_interval: Duration::from_secs(section.poll_interval_secs),
            channel_capacity: section.channel_capacity,
            sources: Vec::new(),
            identity: SnapshotIdentity::default(),
        }
    }

    /// Checks that a source path can be watched.
    ///
    /// Rejects empty paths and paths with `..` components.
    pub fn check_source(source: &LogSourceConfig) -> Result<(), LogPipelineError> {
        if source.path.as_os_str().is_empty() {
            return Err(LogPipelineError::Config {
                field: "logs.path".to_owned(),
                reason: "path must not be empty".to_owned(),
            });
        }

        if source
            .path
            .components()
            .any(|c| c == Component::ParentDir)
        {
            return Err(LogPipelineError::Config {
                field: "logs.path".to_owned(),
                reason: format!(
                    "path '{}' contains path traversal pattern '..'",
                    source.path.display()
                ),
            });
        }

        Ok(())
    }

    /// Validates the tuning values.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        const MAX_TICK: Duration = Duration::from_secs(3600);
        const MAX_CHANNEL_CAPACITY: usize = 1_000_000;

        if self.tick_interval.is_zero() || self.tick_interval > MAX_TICK {
            return Err(LogPipelineError::Config {
                field: "tick_interval".to_owned(),
                reason: format!("must be greater than 0 and at most {}s", MAX_TICK.as_secs()),
            });
        }

        if self.max_events_per_tick == 0 {
            return Err(LogPipelineError::Config {
                field: "max_events_per_tick".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_unread_bytes == 0 {
            return Err(LogPipelineError::Config {
                field: "max_unread_bytes".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.signature_bytes == 0 {
            return Err(LogPipelineError::Config {
                field: "signature_bytes".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.poll_interval.is_zero() {
            return Err(LogPipelineError::Config {
                field: "poll_interval".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(LogPipelineError::Config {
                field: "channel_capacity".to_owned(),
                reason: format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            });
        }

        Ok(())
    }
}

/// Pipeline settings builder
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pattern_file = path.into();
        self
    }

    pub fn position_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.position_file = path.into();
        self
    }

    pub fn tick_interval(mut self, tick: Duration) -> Self {
        self.config.tick_interval = tick;
        self
    }

    pub fn max_events_per_tick(mut self, max: usize) -> Self {
        self.config.max_events_per_tick = max;
        self
    }

    pub fn max_unread_bytes(mut self, max: u64) -> Self {
        self.config.max_unread_bytes = max;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Adds a watched file.
    pub fn source(mut self, source: LogSourceConfig) -> Self {
        self.config.sources.push(source);
        self
    }

    pub fn identity(mut self, identity: SnapshotIdentity) -> Self {
        self.config.identity = identity;
        self
    }

    /// Validates and returns the settings.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert_eq!(config.max_events_per_tick, 500);
        assert_eq!(config.max_unread_bytes, 1_000_000);
        assert_eq!(config.signature_threshold_bytes, 100);
    }

    #[test]
    fn from_core_preserves_values() {
        let mut core = LoronaConfig::default();
        core.log_pipeline.tick_secs = 7;
        core.log_pipeline.channel_capacity = 42;
        core.general.container_name = "web-01".to_owned();
        core.logs
            .push(LogSourceConfig::new("/var/log/nginx/error.log", "nginx_error"));
        core.logs.push(LogSourceConfig::new("/var/log/broken.log", ""));

        let config = PipelineConfig::from_core(&core);
        assert_eq!(config.tick_interval, Duration::from_secs(7));
        assert_eq!(config.channel_capacity, 42);
        assert_eq!(config.identity.container_name, "web-01");
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn validate_rejects_zero_tick() {
        let config = PipelineConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_channel_capacity() {
        let config = PipelineConfig {
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn check_source_rejects_traversal() {
        let source = LogSourceConfig::new("/var/log/../../etc/shadow", "syslog");
        let err = PipelineConfig::check_source(&source).unwrap_err();
        assert!(err.to_string().contains(".."));
    }

    #[test]
    fn check_source_accepts_plain_path() {
        let source = LogSourceConfig::new("/var/log/nginx/error.log", "nginx_error");
        PipelineConfig::check_source(&source).unwrap();
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = PipelineConfigBuilder::new()
            .tick_interval(Duration::from_millis(200))
            .max_events_per_tick(10)
            .source(LogSourceConfig::new("/tmp/a.log", "app"))
            .build()
            .unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(200));
        assert_eq!(config.max_events_per_tick, 10);
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let result = PipelineConfigBuilder::new().max_events_per_tick(0).build();
        assert!(result.is_err());
    }
}
