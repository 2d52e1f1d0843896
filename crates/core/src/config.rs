//! Configuration -- `lorona.toml` parsing and runtime settings
//!
//! [`LoronaConfig`] is the top-level structure holding every section.
//!
//! # Load precedence
//! 1. CLI arguments (daemon only, highest)
//! 2. Environment variables (`LORONA_LOG_PIPELINE_TICK_SECS=10` style)
//! 3. The configuration file (`lorona.toml`)
//! 4. Defaults (`Default` impls)
//!
//! Global invariants are checked by [`LoronaConfig::validate`]. Problems in a
//! single `[[logs]]`, `[[uptime]]` or `[[backups]]` entry never fail the whole
//! file: the `usable_*` accessors skip such entries with a warning.
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), lorona_core::error::LoronaError> {
//! use lorona_core::config::LoronaConfig;
//!
//! let config = LoronaConfig::load("lorona.toml").await?;
//! let sources = config.usable_log_sources();
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LoronaError};

/// Default advisory alert interval for a log source.
pub const DEFAULT_ALERT_INTERVAL: &str = "15m";

/// Default probe interval for an endpoint.
pub const DEFAULT_CHECK_INTERVAL: &str = "5m";

/// Default check interval for a backup folder.
pub const DEFAULT_BACKUP_CHECK_INTERVAL: &str = "1h";

/// Lorona configuration root
///
/// Mirrors the top level of `lorona.toml`. Each component reads only its own
/// section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoronaConfig {
    /// General settings (logging, identification)
    #[serde(default)]
    pub general: GeneralConfig,
    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Log ingestion / aggregation tuning
    #[serde(default)]
    pub log_pipeline: LogPipelineConfig,
    /// Watched log files
    #[serde(default)]
    pub logs: Vec<LogSourceConfig>,
    /// Probed HTTP endpoints
    #[serde(default)]
    pub uptime: Vec<EndpointConfig>,
    /// Checked backup folders
    #[serde(default)]
    pub backups: Vec<BackupConfig>,
    /// System resource sampling
    #[serde(default)]
    pub system: SystemConfig,
}

impl LoronaConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LoronaError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LoronaError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LoronaError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LoronaError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, LoronaError> {
        toml::from_str(toml_str).map_err(|e| {
            LoronaError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Overrides scalar settings from the environment.
    ///
    /// Naming: `LORONA_{SECTION}_{FIELD}`, e.g. `LORONA_GENERAL_LOG_LEVEL=debug`.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LORONA_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LORONA_GENERAL_LOG_FORMAT");
        override_string(
            &mut self.general.container_name,
            "LORONA_GENERAL_CONTAINER_NAME",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LORONA_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LORONA_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LORONA_METRICS_PORT");

        // Log pipeline
        override_path(
            &mut self.log_pipeline.pattern_file,
            "LORONA_LOG_PIPELINE_PATTERN_FILE",
        );
        override_path(
            &mut self.log_pipeline.position_file,
            "LORONA_LOG_PIPELINE_POSITION_FILE",
        );
        override_u64(&mut self.log_pipeline.tick_secs, "LORONA_LOG_PIPELINE_TICK_SECS");
        override_usize(
            &mut self.log_pipeline.max_events_per_tick,
            "LORONA_LOG_PIPELINE_MAX_EVENTS_PER_TICK",
        );
        override_u64(
            &mut self.log_pipeline.max_unread_bytes,
            "LORONA_LOG_PIPELINE_MAX_UNREAD_BYTES",
        );
        override_u64(
            &mut self.log_pipeline.poll_interval_secs,
            "LORONA_LOG_PIPELINE_POLL_INTERVAL_SECS",
        );
        override_usize(
            &mut self.log_pipeline.channel_capacity,
            "LORONA_LOG_PIPELINE_CHANNEL_CAPACITY",
        );

        // System
        override_bool(&mut self.system.enabled, "LORONA_SYSTEM_ENABLED");
        override_u64(&mut self.system.interval_secs, "LORONA_SYSTEM_INTERVAL_SECS");
    }

    /// Validates global invariants.
    ///
    /// Per-entry problems are not reported here; see the `usable_*` accessors.
    pub fn validate(&self) -> Result<(), LoronaError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero".to_owned()));
        }
        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only /metrics is supported".to_owned(),
            ));
        }

        self.log_pipeline.validate()?;

        if self.system.enabled && self.system.interval_secs == 0 {
            return Err(invalid(
                "system.interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Log sources that can be monitored; malformed entries are skipped.
    pub fn usable_log_sources(&self) -> Vec<LogSourceConfig> {
        self.logs
            .iter()
            .enumerate()
            .filter_map(|(idx, source)| match source.validate() {
                Ok(()) => Some(source.clone()),
                Err(e) => {
                    warn!(index = idx, error = %e, "skipping malformed log source");
                    None
                }
            })
            .collect()
    }

    /// Endpoints that can be probed; malformed entries are skipped.
    pub fn usable_endpoints(&self) -> Vec<EndpointConfig> {
        self.uptime
            .iter()
            .filter(|endpoint| {
                let ok = endpoint.endpoint.starts_with("http://")
                    || endpoint.endpoint.starts_with("https://");
                if !ok {
                    warn!(endpoint = %endpoint.endpoint, "skipping endpoint without http(s) scheme");
                }
                ok
            })
            .cloned()
            .collect()
    }

    /// Backup folders that can be checked; entries without a folder are skipped.
    pub fn usable_backups(&self) -> Vec<BackupConfig> {
        self.backups
            .iter()
            .filter(|backup| {
                if backup.folder.as_os_str().is_empty() {
                    warn!("skipping backup entry without folder");
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }
}

/// `[general]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
    /// Identification copied into every snapshot
    pub container_name: String,
    pub container_support: String,
    pub container_description: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            container_name: String::new(),
            container_support: String::new(),
            container_description: String::new(),
        }
    }
}

/// `[metrics]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0".to_owned(),
            port: 2112,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// `[log_pipeline]` -- tailing and aggregation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogPipelineConfig {
    /// Pattern registry (`log type -> pattern`) file
    pub pattern_file: PathBuf,
    /// Position store file (offset + signature per watched path)
    pub position_file: PathBuf,
    /// Aggregation tick length
    pub tick_secs: u64,
    /// Log events folded per tick before shedding
    pub max_events_per_tick: usize,
    /// Largest unread region a watcher pass will read
    pub max_unread_bytes: u64,
    /// Files at or below this size are not signature-checked
    pub signature_threshold_bytes: u64,
    /// Leading bytes kept as the rotation signature
    pub signature_bytes: usize,
    /// Delay between two passes of the same watcher
    pub poll_interval_secs: u64,
    /// Capacity of every producer -> aggregator queue
    pub channel_capacity: usize,
}

impl Default for LogPipelineConfig {
    fn default() -> Self {
        Self {
            pattern_file: PathBuf::from("log_formats.yaml"),
            position_file: PathBuf::from("/var/lib/lorona/positions.json"),
            tick_secs: 5,
            max_events_per_tick: 500,
            max_unread_bytes: 1_000_000,
            signature_threshold_bytes: 100,
            signature_bytes: 64,
            poll_interval_secs: 10,
            channel_capacity: 100,
        }
    }
}

impl LogPipelineConfig {
    /// Validates the tuning values.
    pub fn validate(&self) -> Result<(), LoronaError> {
        const MAX_TICK_SECS: u64 = 3600;
        const MAX_SIGNATURE_BYTES: usize = 4096;

        if self.tick_secs == 0 || self.tick_secs > MAX_TICK_SECS {
            return Err(invalid(
                "log_pipeline.tick_secs",
                format!("must be 1-{MAX_TICK_SECS}"),
            ));
        }
        if self.max_events_per_tick == 0 {
            return Err(invalid(
                "log_pipeline.max_events_per_tick",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.max_unread_bytes == 0 {
            return Err(invalid(
                "log_pipeline.max_unread_bytes",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.signature_bytes == 0 || self.signature_bytes > MAX_SIGNATURE_BYTES {
            return Err(invalid(
                "log_pipeline.signature_bytes",
                format!("must be 1-{MAX_SIGNATURE_BYTES}"),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(invalid(
                "log_pipeline.poll_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(invalid(
                "log_pipeline.channel_capacity",
                "must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// `[[logs]]` -- one watched log file
///
/// Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSourceConfig {
    /// Display name (defaults to the path when empty)
    #[serde(default)]
    pub name: String,
    /// File to tail
    #[serde(default)]
    pub path: PathBuf,
    /// Pattern registry key
    #[serde(default)]
    pub log_type: String,
    /// Explicit chrono format for the `timestamp` capture
    #[serde(default)]
    pub timestamp_format: Option<String>,
    /// Capture conditions, OR-ed together; empty keeps every matching line
    #[serde(default)]
    pub capture_conditions: Vec<String>,
    /// Advisory alert interval (consumed outside the pipeline)
    #[serde(default = "default_alert_interval")]
    pub alert_interval: String,
}

impl LogSourceConfig {
    /// Creates a source with default name, conditions and interval.
    pub fn new(path: impl Into<PathBuf>, log_type: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            path: path.into(),
            log_type: log_type.into(),
            timestamp_format: None,
            capture_conditions: Vec::new(),
            alert_interval: default_alert_interval(),
        }
    }

    /// Name shown in snapshots and diagnostics.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.path.display().to_string()
        } else {
            self.name.clone()
        }
    }

    /// Alert interval, falling back to the default when unparsable.
    pub fn alert_interval(&self) -> Duration {
        duration_or_default(&self.alert_interval, DEFAULT_ALERT_INTERVAL, "alert_interval")
    }

    /// Explicit timestamp format, if one is configured and non-empty.
    pub fn explicit_timestamp_format(&self) -> Option<&str> {
        self.timestamp_format
            .as_deref()
            .filter(|format| !format.trim().is_empty())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logs.path".to_owned(),
                reason: "path must not be empty".to_owned(),
            });
        }
        if self.log_type.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logs.log_type".to_owned(),
                reason: format!("log_type missing for {}", self.path.display()),
            });
        }
        Ok(())
    }
}

/// `[[uptime]]` -- one probed endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_check_interval")]
    pub check_interval: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl EndpointConfig {
    /// Probe interval, falling back to the default when unparsable.
    pub fn check_interval(&self) -> Duration {
        duration_or_default(&self.check_interval, DEFAULT_CHECK_INTERVAL, "check_interval")
    }
}

/// `[[backups]]` -- one checked backup folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub folder: PathBuf,
    /// Smallest file size (bytes) that counts as a backup
    #[serde(default)]
    pub minimum_file_size: u64,
    #[serde(default = "default_backup_check_interval")]
    pub check_interval: String,
}

impl BackupConfig {
    /// Check interval, falling back to the default when unparsable.
    pub fn check_interval(&self) -> Duration {
        duration_or_default(
            &self.check_interval,
            DEFAULT_BACKUP_CHECK_INTERVAL,
            "check_interval",
        )
    }
}

/// `[system]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Mount points to report; empty reports every disk
    pub drive_paths: Vec<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            drive_paths: Vec::new(),
        }
    }
}

/// Parses `"90s"`, `"15m"`, `"2h"`, `"1d"` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, 's')) => (&value[..idx], 1),
        Some((idx, 'm')) => (&value[..idx], 60),
        Some((idx, 'h')) => (&value[..idx], 60 * 60),
        Some((idx, 'd')) => (&value[..idx], 24 * 60 * 60),
        _ => (value, 1),
    };

    let amount: u64 = digits.trim().parse().ok()?;
    amount.checked_mul(multiplier).map(Duration::from_secs)
}

fn duration_or_default(value: &str, default: &str, field: &str) -> Duration {
    if value.trim().is_empty() {
        return parse_duration(default).unwrap_or_default();
    }
    parse_duration(value).unwrap_or_else(|| {
        warn!(field, value, default, "invalid duration, using default");
        parse_duration(default).unwrap_or_default()
    })
}

fn default_alert_interval() -> String {
    DEFAULT_ALERT_INTERVAL.to_owned()
}

fn default_check_interval() -> String {
    DEFAULT_CHECK_INTERVAL.to_owned()
}

fn default_backup_check_interval() -> String {
    DEFAULT_BACKUP_CHECK_INTERVAL.to_owned()
}

fn default_request_timeout() -> u64 {
    10
}

fn invalid(field: &str, reason: String) -> LoronaError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

// --- environment override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_path(target: &mut PathBuf, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = PathBuf::from(val);
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}
