//! Aggregation multiplexer -- the single reader of every producer queue.
//!
//! The [`Aggregator`] owns the current [`Snapshot`]. Each loop iteration
//! first checks the tick deadline, then folds at most one queued item. The
//! deadline is polled ahead of the queues, so a producer that is always ready
//! cannot hold a tick open past its deadline.
//!
//! ```text
//! watchers ──ParsedEvent──┐
//! prober ──UptimeResponse─┤
//! sampler ─SysMonitorInfo─┼──> Aggregator ──tick──> SnapshotPublisher
//! checker ──BackupInfo────┘
//! ```

pub mod publish;
pub mod snapshot;

pub use publish::{ChannelPublisher, MetricsPublisher, SnapshotPublisher};
pub use snapshot::{LogSummary, SNAPSHOT_FILE_FORMAT, Snapshot, SnapshotIdentity};

use std::time::Duration;

use lorona_core::event::{BackupInfo, SysMonitorInfo, UptimeResponse};
use lorona_core::metrics as m;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::event::ParsedEvent;

/// One item taken from a producer queue.
#[derive(Debug, Clone)]
pub enum Incoming {
    Log(ParsedEvent),
    Uptime(UptimeResponse),
    System(SysMonitorInfo),
    Backup(BackupInfo),
}

/// Receiving halves of the producer queues.
#[derive(Debug)]
pub struct AggregatorInputs {
    pub logs: mpsc::Receiver<ParsedEvent>,
    pub uptime: mpsc::Receiver<UptimeResponse>,
    pub system: mpsc::Receiver<SysMonitorInfo>,
    pub backups: mpsc::Receiver<BackupInfo>,
}

/// Sending halves handed to the external monitors.
#[derive(Debug, Clone)]
pub struct MonitorSenders {
    pub uptime: mpsc::Sender<UptimeResponse>,
    pub system: mpsc::Sender<SysMonitorInfo>,
    pub backups: mpsc::Sender<BackupInfo>,
}

/// Creates the monitor queues with the given capacity.
pub fn monitor_channels(
    capacity: usize,
) -> (
    MonitorSenders,
    (
        mpsc::Receiver<UptimeResponse>,
        mpsc::Receiver<SysMonitorInfo>,
        mpsc::Receiver<BackupInfo>,
    ),
) {
    let (uptime_tx, uptime_rx) = mpsc::channel(capacity);
    let (system_tx, system_rx) = mpsc::channel(capacity);
    let (backup_tx, backup_rx) = mpsc::channel(capacity);
    (
        MonitorSenders {
            uptime: uptime_tx,
            system: system_tx,
            backups: backup_tx,
        },
        (uptime_rx, system_rx, backup_rx),
    )
}

/// Folds producer results into per-tick snapshots.
pub struct Aggregator {
    snapshot: Snapshot,
    tick: Duration,
    max_events_per_tick: usize,
    /// Log events counted in the current tick
    folded_logs: usize,
    publisher: Box<dyn SnapshotPublisher>,
}

impl Aggregator {
    pub fn new(
        identity: SnapshotIdentity,
        tick: Duration,
        max_events_per_tick: usize,
        publisher: Box<dyn SnapshotPublisher>,
    ) -> Self {
        Self {
            snapshot: Snapshot::new(identity),
            tick,
            max_events_per_tick,
            folded_logs: 0,
            publisher,
        }
    }

    /// The snapshot being filled.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Folds one item into the current snapshot.
    ///
    /// Log events past the per-tick cap are dropped; the first drop of a tick
    /// is logged.
    pub fn fold(&mut self, item: Incoming) {
        match item {
            Incoming::Log(event) => {
                if self.folded_logs >= self.max_events_per_tick {
                    if self.snapshot.dropped_log_events == 0 {
                        tracing::warn!(
                            cap = self.max_events_per_tick,
                            "per-tick log event cap reached, dropping events until the next tick"
                        );
                    }
                    self.snapshot.dropped_log_events += 1;
                    metrics::counter!(m::LOG_PIPELINE_EVENTS_DROPPED_TOTAL).increment(1);
                    return;
                }
                self.folded_logs += 1;
                self.snapshot.record_log(event);
            }
            Incoming::Uptime(response) => self.snapshot.uptime_responses.push(response),
            Incoming::System(info) => self.snapshot.system_info = Some(info),
            Incoming::Backup(info) => self.snapshot.backups.push(info),
        }
    }

    /// Exports and publishes the current snapshot, then starts a new tick.
    ///
    /// Returns the finished snapshot.
    pub fn finalize(&mut self) -> Snapshot {
        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::to_string(&self.snapshot) {
                Ok(json) => tracing::debug!(snapshot = %json, "snapshot exported"),
                Err(e) => tracing::warn!(error = %e, "failed to serialize snapshot"),
            }
        }

        self.publisher.publish(&self.snapshot);
        metrics::counter!(m::LOG_PIPELINE_TICKS_TOTAL).increment(1);

        tracing::debug!(
            log_events = self.snapshot.log_events.len(),
            dropped = self.snapshot.dropped_log_events,
            uptime_responses = self.snapshot.uptime_responses.len(),
            backups = self.snapshot.backups.len(),
            "tick finalized"
        );

        self.folded_logs = 0;
        let next = Snapshot::new(self.snapshot.identity.clone());
        std::mem::replace(&mut self.snapshot, next)
    }

    /// Runs ticks until cancelled or every input queue is closed.
    ///
    /// A last snapshot is finalized before returning.
    pub async fn run(mut self, mut inputs: AggregatorInputs, cancel: CancellationToken) {
        tracing::info!(tick_ms = self.tick.as_millis() as u64, "aggregator started");

        let mut deadline = Instant::now() + self.tick;
        let mut logs_open = true;
        let mut uptime_open = true;
        let mut system_open = true;
        let mut backups_open = true;

        loop {
            if Instant::now() >= deadline {
                self.finalize();
                deadline = Instant::now() + self.tick;
            }

            if !(logs_open || uptime_open || system_open || backups_open) {
                tracing::info!("all producer queues closed");
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {}
                msg = inputs.logs.recv(), if logs_open => match msg {
                    Some(event) => self.fold(Incoming::Log(event)),
                    None => logs_open = false,
                },
                msg = inputs.uptime.recv(), if uptime_open => match msg {
                    Some(response) => self.fold(Incoming::Uptime(response)),
                    None => uptime_open = false,
                },
                msg = inputs.system.recv(), if system_open => match msg {
                    Some(info) => self.fold(Incoming::System(info)),
                    None => system_open = false,
                },
                msg = inputs.backups.recv(), if backups_open => match msg {
                    Some(info) => self.fold(Incoming::Backup(info)),
                    None => backups_open = false,
                },
            }
        }

        self.finalize();
        tracing::info!("aggregator stopped");
    }
}
