//! Per-tick snapshot and per-path log summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lorona_core::event::{BackupInfo, SysMonitorInfo, UptimeResponse};
use serde::{Deserialize, Serialize};

use crate::event::ParsedEvent;

/// Format tag written into every exported snapshot.
pub const SNAPSHOT_FILE_FORMAT: &str = "LoronaV1";

/// Static identification carried across resets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotIdentity {
    pub container_name: String,
    pub container_support: String,
    pub container_description: String,
}

/// Occurrence counts of one log path within a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub status_codes: BTreeMap<String, u64>,
    pub severities: BTreeMap<String, u64>,
}

impl LogSummary {
    /// Counts an event. Empty status codes and severities are not counted.
    pub fn record(&mut self, event: &ParsedEvent) {
        if !event.status_code.is_empty() {
            *self.status_codes.entry(event.status_code.clone()).or_default() += 1;
        }
        if !event.severity.is_empty() {
            *self.severities.entry(event.severity.clone()).or_default() += 1;
        }
    }
}

/// Everything observed during one tick.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub file_format: String,
    #[serde(flatten)]
    pub identity: SnapshotIdentity,
    pub started_at: DateTime<Utc>,
    pub uptime_responses: Vec<UptimeResponse>,
    pub log_events: Vec<ParsedEvent>,
    pub backups: Vec<BackupInfo>,
    pub system_info: Option<SysMonitorInfo>,
    pub log_summaries: BTreeMap<String, LogSummary>,
    /// Log events shed by the per-tick cap
    pub dropped_log_events: u64,
}

impl Snapshot {
    pub fn new(identity: SnapshotIdentity) -> Self {
        Self {
            file_format: SNAPSHOT_FILE_FORMAT.to_owned(),
            identity,
            started_at: Utc::now(),
            uptime_responses: Vec::new(),
            log_events: Vec::new(),
            backups: Vec::new(),
            system_info: None,
            log_summaries: BTreeMap::new(),
            dropped_log_events: 0,
        }
    }

    /// Empties the snapshot, keeping only the identification.
    pub fn reset(&mut self) {
        *self = Self::new(self.identity.clone());
    }

    /// Adds an accepted log event and counts it under its path.
    pub fn record_log(&mut self, event: ParsedEvent) {
        self.log_summaries
            .entry(event.path_key())
            .or_default()
            .record(&event);
        self.log_events.push(event);
    }

    /// `true` when nothing was recorded this tick.
    pub fn is_empty(&self) -> bool {
        self.uptime_responses.is_empty()
            && self.log_events.is_empty()
            && self.backups.is_empty()
            && self.system_info.is_none()
            && self.dropped_log_events == 0
    }

    /// Summary of one path, if it produced events this tick.
    pub fn summary(&self, path: &str) -> Option<&LogSummary> {
        self.log_summaries.get(path)
    }
}
