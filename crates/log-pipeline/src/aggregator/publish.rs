//! Snapshot publishing.
//!
//! [`MetricsPublisher`] turns each finalized snapshot into gauges through the
//! `metrics` facade.
//!
//! Status code and severity gauges count one tick, so label sets missing from
//! the current tick are set back to 0. Monitor gauges (endpoint, system,
//! backup) keep their last value until the monitor reports again, since a
//! monitor usually runs far less often than the tick.

use std::collections::{HashMap, HashSet};

use lorona_core::metrics as m;
use metrics::Label;
use tokio::sync::mpsc;

use super::snapshot::Snapshot;

/// Receives every finalized snapshot.
pub trait SnapshotPublisher: Send + Sync {
    fn publish(&mut self, snapshot: &Snapshot);
}

type GaugeKey = (&'static str, Vec<Label>);

/// Publishes snapshot gauges to the installed metrics recorder.
#[derive(Debug, Default)]
pub struct MetricsPublisher {
    /// Per-tick log gauges written by the last publish
    previous: HashSet<GaugeKey>,
    /// Current `lorona_backup_info` label set per backup directory
    backup_labels: HashMap<String, Vec<Label>>,
}

impl MetricsPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-tick log gauges written by the last publish.
    pub fn published_len(&self) -> usize {
        self.previous.len()
    }

    /// Per-tick status code and severity gauges.
    fn collect_logs(snapshot: &Snapshot) -> Vec<(GaugeKey, f64)> {
        let mut gauges = Vec::new();

        for (path, summary) in &snapshot.log_summaries {
            for (code, count) in &summary.status_codes {
                gauges.push((
                    (
                        m::STATUS_CODES,
                        vec![
                            Label::new(m::LABEL_LOG_PATH, path.clone()),
                            Label::new(m::LABEL_STATUS_CODE, code.clone()),
                        ],
                    ),
                    *count as f64,
                ));
            }
            for (severity, count) in &summary.severities {
                gauges.push((
                    (
                        m::SEVERITY,
                        vec![
                            Label::new(m::LABEL_LOG_PATH, path.clone()),
                            Label::new(m::LABEL_SEVERITY, severity.clone()),
                        ],
                    ),
                    *count as f64,
                ));
            }
        }

        gauges
    }

    /// Gauges fed by the monitors.
    fn collect_monitors(snapshot: &Snapshot) -> Vec<(GaugeKey, f64)> {
        let mut gauges = Vec::new();

        if let Some(info) = &snapshot.system_info {
            gauges.push(((m::SYSTEM_UPTIME, Vec::new()), info.uptime_secs as f64));
            gauges.push(((m::SYSTEM_CPU_USAGE, Vec::new()), info.cpu_usage_percent));
            gauges.push(((m::SYSTEM_LOAD_AVG_1, Vec::new()), info.load_avg_1));
            for drive in &info.drives {
                gauges.push((
                    (
                        m::HD_AVAILABLE,
                        vec![
                            Label::new(m::LABEL_DRIVE_PATH, drive.drive_path.display().to_string()),
                            Label::new(m::LABEL_PHYSICAL_DRIVE, drive.volume_name.clone()),
                        ],
                    ),
                    drive.percent_used,
                ));
            }
        }

        for response in &snapshot.uptime_responses {
            let labels = vec![Label::new(m::LABEL_URL, response.endpoint.clone())];
            let up = if response.is_up() { 1.0 } else { 0.0 };
            gauges.push(((m::ENDPOINT_UP, labels.clone()), up));
            gauges.push(((m::ENDPOINT_DURATION, labels), response.response_time_secs));
        }

        for backup in &snapshot.backups {
            let file = backup.last_backup_file.clone().unwrap_or_default();
            gauges.push((
                (
                    m::BACKUP_INFO,
                    vec![
                        Label::new(
                            m::LABEL_BACKUP_DIRECTORY,
                            backup.backup_directory.display().to_string(),
                        ),
                        Label::new(m::LABEL_LAST_BACKUP_FILE, file),
                    ],
                ),
                if backup.was_backed_up { 1.0 } else { 0.0 },
            ));
        }

        gauges
    }

    /// A new last-backup file for a directory retires the previous label set.
    fn replace_backup_labels(&mut self, labels: &[Label]) {
        let Some(directory) = labels
            .iter()
            .find(|label| label.key() == m::LABEL_BACKUP_DIRECTORY)
            .map(|label| label.value().to_owned())
        else {
            return;
        };

        match self.backup_labels.insert(directory, labels.to_vec()) {
            Some(old) if old != labels => metrics::gauge!(m::BACKUP_INFO, old).set(0.0),
            _ => {}
        }
    }
}

impl SnapshotPublisher for MetricsPublisher {
    fn publish(&mut self, snapshot: &Snapshot) {
        let mut current = HashSet::new();

        for ((name, labels), value) in Self::collect_logs(snapshot) {
            metrics::gauge!(name, labels.clone()).set(value);
            current.insert((name, labels));
        }

        for (name, labels) in self.previous.difference(&current) {
            metrics::gauge!(*name, labels.clone()).set(0.0);
        }

        self.previous = current;

        for ((name, labels), value) in Self::collect_monitors(snapshot) {
            if name == m::BACKUP_INFO {
                self.replace_backup_labels(&labels);
            }
            metrics::gauge!(name, labels).set(value);
        }
    }
}

/// Forwards a copy of every snapshot to a bounded queue.
///
/// A full queue drops the snapshot with a warning.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<Snapshot>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Snapshot>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl SnapshotPublisher for ChannelPublisher {
    fn publish(&mut self, snapshot: &Snapshot) {
        if let Err(e) = self.tx.try_send(snapshot.clone()) {
            tracing::warn!(error = %e, "snapshot receiver is not keeping up, dropping snapshot");
        }
    }
}
