//! Results pushed by the external monitors into the aggregation queues.
//!
//! Each monitor owns the sending half of one bounded queue; the aggregator
//! is the only reader. Sending may wait when the aggregator is behind.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One HTTP endpoint probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeResponse {
    pub endpoint: String,
    /// HTTP status code, `0` when the request failed at transport level
    pub response_code: u16,
    /// Round-trip time in seconds
    pub response_time_secs: f64,
    pub checked_at: DateTime<Utc>,
}

impl UptimeResponse {
    /// An endpoint counts as up only on `200`.
    pub fn is_up(&self) -> bool {
        self.response_code == 200
    }
}

/// Usage of one mounted volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveUsage {
    pub drive_path: PathBuf,
    pub volume_name: String,
    pub percent_used: f64,
    pub available_bytes: u64,
}

/// One system resource sample. The latest sample replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysMonitorInfo {
    pub uptime_secs: u64,
    pub cpu_usage_percent: f64,
    pub load_avg_1: f64,
    pub drives: Vec<DriveUsage>,
    pub sampled_at: DateTime<Utc>,
}

/// Result of checking one backup folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub backup_directory: PathBuf,
    /// Newest regular file was modified within the last day and is large enough
    pub was_backed_up: bool,
    pub last_backup_file: Option<String>,
    pub last_backup_size: u64,
    pub last_backup_time: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

impl BackupInfo {
    /// Result for a folder with no usable backup file.
    pub fn missing(backup_directory: impl Into<PathBuf>) -> Self {
        Self {
            backup_directory: backup_directory.into(),
            was_backed_up: false,
            last_backup_file: None,
            last_backup_size: 0,
            last_backup_time: None,
            checked_at: Utc::now(),
        }
    }
}
