//! Log watcher -- incremental tailing of one log file.
//!
//! One pass walks `Idle -> Opened -> Scanning -> Closed`:
//!
//! 1. open and stat the file; failure aborts the pass with state untouched
//! 2. above `signature_threshold_bytes` the leading window is compared to the
//!    stored signature; a mismatch means rotation: restart at 0
//! 3. otherwise a size below the stored offset means truncation: restart at 0
//! 4. an unread region above `max_unread_bytes` is cut to its newest part
//! 5. complete lines are parsed, filtered and sent in file order
//! 6. the new offset and signature are committed to the position store
//!
//! A line without its trailing newline is left for the next pass. A pass is
//! not interrupted by cancellation; [`LogWatcher::run`] checks the token
//! between passes.

pub mod signature;
pub mod supervisor;

pub use supervisor::WatcherSupervisor;

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lorona_core::config::LogSourceConfig;
use lorona_core::metrics as m;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::event::ParsedEvent;
use crate::filter::CaptureFilter;
use crate::parser::LineParser;
use crate::pattern::PatternSpec;
use crate::position::{PositionStore, WatcherState};

/// Characters of the description shown in per-event diagnostics.
const DESCRIPTION_PREVIEW_CHARS: usize = 20;

/// Tailing limits shared by every watcher.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub max_unread_bytes: u64,
    pub signature_threshold_bytes: u64,
    pub signature_bytes: usize,
    pub poll_interval: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for WatcherSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_unread_bytes: config.max_unread_bytes,
            signature_threshold_bytes: config.signature_threshold_bytes,
            signature_bytes: config.signature_bytes,
            poll_interval: config.poll_interval,
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Offset the scan started from (after resets and skips)
    pub start_offset: u64,
    /// Offset after the last consumed line
    pub end_offset: u64,
    pub lines_read: u64,
    pub events_emitted: u64,
    pub events_filtered: u64,
    pub rotated: bool,
    pub truncated: bool,
    /// Unread bytes given up to the unread cap
    pub skipped_bytes: u64,
}

/// Tails one configured log file.
pub struct LogWatcher {
    source: LogSourceConfig,
    parser: LineParser,
    filter: CaptureFilter,
    settings: WatcherSettings,
    store: Arc<PositionStore>,
    tx: mpsc::Sender<ParsedEvent>,
    state: WatcherState,
}

impl LogWatcher {
    /// Creates a watcher resuming from the stored position.
    pub async fn new(
        source: LogSourceConfig,
        spec: Arc<PatternSpec>,
        settings: WatcherSettings,
        store: Arc<PositionStore>,
        tx: mpsc::Sender<ParsedEvent>,
    ) -> Self {
        let parser = LineParser::new(spec, &source);
        let filter = CaptureFilter::compile(&source.capture_conditions);
        let state = store.get(&source.path).await;

        Self {
            source,
            parser,
            filter,
            settings,
            store,
            tx,
            state,
        }
    }

    pub fn path(&self) -> &Path {
        &self.source.path
    }

    /// In-memory tailing state.
    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    /// Runs passes until cancelled or the event queue closes.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            path = %self.source.path.display(),
            log_type = %self.parser.log_type(),
            offset = self.state.offset,
            "log watcher started"
        );

        while !cancel.is_cancelled() {
            match self.run_pass().await {
                Ok(report) => {
                    if report.lines_read > 0 || report.rotated || report.truncated {
                        tracing::debug!(
                            path = %self.source.path.display(),
                            lines = report.lines_read,
                            emitted = report.events_emitted,
                            filtered = report.events_filtered,
                            offset = report.end_offset,
                            "watcher pass complete"
                        );
                    }
                }
                Err(LogPipelineError::Channel(reason)) => {
                    tracing::info!(
                        path = %self.source.path.display(),
                        reason = %reason,
                        "event queue closed, stopping watcher"
                    );
                    break;
                }
                Err(e) => {
                    metrics::counter!(m::LOG_PIPELINE_PASS_FAILURES_TOTAL).increment(1);
                    tracing::warn!(
                        path = %self.source.path.display(),
                        error = %e,
                        "watcher pass failed, retrying next interval"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        tracing::info!(path = %self.source.path.display(), "log watcher stopped");
    }

    /// One full tailing pass.
    ///
    /// On error nothing is committed and the in-memory state is unchanged.
    pub async fn run_pass(&mut self) -> Result<PassReport, LogPipelineError> {
        let path = self.source.path.clone();
        let mut file = File::open(&path)
            .await
            .map_err(|e| watcher_error(&path, "open", &e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| watcher_error(&path, "stat", &e))?
            .len();

        let mut state = self.state.clone();
        let mut report = PassReport::default();

        let mut rotated = false;
        if size > self.settings.signature_threshold_bytes {
            let current = signature::read_signature(&mut file, self.settings.signature_bytes)
                .await
                .map_err(|e| watcher_error(&path, "read signature", &e))?;
            rotated = signature::is_rotated(&state.signature, &current);
            state.signature = current;
        }

        if rotated {
            tracing::info!(
                path = %path.display(),
                previous_offset = state.offset,
                "log rotated, reading new file from start"
            );
            metrics::counter!(m::LOG_PIPELINE_ROTATIONS_TOTAL).increment(1);
            state.offset = 0;
            report.rotated = true;
        } else if size < state.offset {
            tracing::info!(
                path = %path.display(),
                size,
                offset = state.offset,
                "log truncated, reading from start"
            );
            metrics::counter!(m::LOG_PIPELINE_TRUNCATIONS_TOTAL).increment(1);
            state.offset = 0;
            if size <= self.settings.signature_threshold_bytes {
                // re-captured once the file grows past the threshold
                state.signature.clear();
            }
            report.truncated = true;
        }

        let unread = size - state.offset;
        if unread > self.settings.max_unread_bytes {
            let skipped = unread - self.settings.max_unread_bytes;
            tracing::warn!(
                path = %path.display(),
                unread,
                skipped,
                "unread region exceeds cap, skipping oldest bytes"
            );
            metrics::counter!(m::LOG_PIPELINE_BYTES_SKIPPED_TOTAL).increment(skipped);
            state.offset = size - self.settings.max_unread_bytes;
            report.skipped_bytes = skipped;
        }

        file.seek(SeekFrom::Start(state.offset))
            .await
            .map_err(|e| watcher_error(&path, "seek", &e))?;
        report.start_offset = state.offset;

        // bytes appended after the stat are left for the next pass
        let mut reader = BufReader::new(file.take(size - state.offset));
        let mut buf = Vec::with_capacity(512);

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| watcher_error(&path, "read", &e))?;
            if read == 0 || buf.last() != Some(&b'\n') {
                break;
            }

            state.offset += read as u64;
            report.lines_read += 1;

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            let Some(event) = self.parser.parse(line) else {
                continue;
            };

            if !self.filter.should_keep(&event.condition_params()) {
                report.events_filtered += 1;
                continue;
            }

            tracing::debug!(
                path = %path.display(),
                severity = %event.severity,
                description = event.short_description(DESCRIPTION_PREVIEW_CHARS),
                "captured log event"
            );
            self.tx
                .send(event)
                .await
                .map_err(|_| LogPipelineError::Channel("aggregator queue closed".to_owned()))?;
            report.events_emitted += 1;
        }

        report.end_offset = state.offset;
        metrics::counter!(m::LOG_PIPELINE_LINES_READ_TOTAL).increment(report.lines_read);
        metrics::counter!(m::LOG_PIPELINE_EVENTS_EMITTED_TOTAL).increment(report.events_emitted);
        metrics::counter!(m::LOG_PIPELINE_EVENTS_FILTERED_TOTAL).increment(report.events_filtered);

        if let Err(e) = self.store.commit(&path, state.clone()).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist log position");
        }
        self.state = state;

        Ok(report)
    }
}

fn watcher_error(path: &Path, action: &str, err: &std::io::Error) -> LogPipelineError {
    LogPipelineError::Watcher {
        path: path.display().to_string(),
        reason: format!("{action} failed: {err}"),
    }
}
