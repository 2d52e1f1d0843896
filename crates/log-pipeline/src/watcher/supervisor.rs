//! Watcher supervisor -- starts one watcher per source and stops them all.
//!
//! The supervisor owns the parent cancellation token; each watcher gets a
//! child token, so nothing else can stop an individual watcher.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lorona_core::config::LogSourceConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{LogWatcher, WatcherSettings};
use crate::config::PipelineConfig;
use crate::event::ParsedEvent;
use crate::pattern::PatternRegistry;
use crate::position::PositionStore;

/// How long `stop_all` waits for a watcher to finish its current pass.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Running watchers.
#[derive(Default)]
pub struct WatcherSupervisor {
    cancel: CancellationToken,
    watchers: Vec<(PathBuf, JoinHandle<()>)>,
    skipped: usize,
}

impl WatcherSupervisor {
    /// Spawns a watcher for every usable source.
    ///
    /// Sources with an unusable path, an unknown log type or a path already
    /// watched are skipped with a warning.
    pub async fn spawn_all(
        sources: &[LogSourceConfig],
        registry: &PatternRegistry,
        settings: &WatcherSettings,
        store: Arc<PositionStore>,
        tx: &mpsc::Sender<ParsedEvent>,
    ) -> Self {
        let mut supervisor = Self::default();
        let mut seen = HashSet::new();

        for source in sources {
            if let Err(e) = PipelineConfig::check_source(source) {
                tracing::warn!(error = %e, "cannot monitor log source, skipping");
                supervisor.skipped += 1;
                continue;
            }

            let Some(spec) = registry.get(&source.log_type) else {
                tracing::warn!(
                    path = %source.path.display(),
                    log_type = %source.log_type,
                    "no pattern for log type, cannot monitor this source"
                );
                supervisor.skipped += 1;
                continue;
            };

            if !seen.insert(source.path.clone()) {
                tracing::warn!(
                    path = %source.path.display(),
                    "log file configured twice, skipping duplicate"
                );
                supervisor.skipped += 1;
                continue;
            }

            let watcher = LogWatcher::new(
                source.clone(),
                spec,
                settings.clone(),
                Arc::clone(&store),
                tx.clone(),
            )
            .await;
            let handle = tokio::spawn(watcher.run(supervisor.cancel.child_token()));
            supervisor.watchers.push((source.path.clone(), handle));
        }

        tracing::info!(
            watchers = supervisor.watchers.len(),
            skipped = supervisor.skipped,
            "log watchers started"
        );
        supervisor
    }

    /// Number of spawned watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Sources that could not be watched.
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    /// Watched paths.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.watchers.iter().map(|(path, _)| path)
    }

    /// Watchers whose task has not finished.
    pub fn active_count(&self) -> usize {
        self.watchers
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Cancels every watcher and waits for them to finish.
    ///
    /// A watcher still inside a pass after the timeout is aborted.
    pub async fn stop_all(&mut self) {
        self.cancel.cancel();

        for (path, mut handle) in self.watchers.drain(..) {
            match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "log watcher task failed");
                }
                Err(_) => {
                    tracing::warn!(path = %path.display(), "log watcher did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PatternRegistry {
        let mut registry = PatternRegistry::new();
        registry
            .insert("app", r"^(?P<severity>\w+): (?P<description>.*)$", None)
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn skips_unknown_types_duplicates_and_bad_paths() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        std::fs::write(&log, "error: boom\n").unwrap();

        let sources = vec![
            LogSourceConfig::new(&log, "app"),
            LogSourceConfig::new(&log, "app"),
            LogSourceConfig::new(dir.path().join("b.log"), "nginx"),
            LogSourceConfig::new("/var/log/../etc/passwd", "app"),
        ];
        let (tx, _rx) = mpsc::channel(16);
        let mut supervisor = WatcherSupervisor::spawn_all(
            &sources,
            &registry(),
            &WatcherSettings::default(),
            Arc::new(PositionStore::in_memory()),
            &tx,
        )
        .await;

        assert_eq!(supervisor.watcher_count(), 1);
        assert_eq!(supervisor.skipped_count(), 3);
        assert_eq!(supervisor.paths().next(), Some(&log));

        supervisor.stop_all().await;
        assert_eq!(supervisor.watcher_count(), 0);
    }

    #[tokio::test]
    async fn stop_all_ends_every_watcher() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = Vec::new();
        for i in 0..3 {
            let path = dir.path().join(format!("{i}.log"));
            std::fs::write(&path, "info: started\n").unwrap();
            sources.push(LogSourceConfig::new(path, "app"));
        }

        let (tx, mut rx) = mpsc::channel(16);
        let settings = WatcherSettings {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let mut supervisor = WatcherSupervisor::spawn_all(
            &sources,
            &registry(),
            &settings,
            Arc::new(PositionStore::in_memory()),
            &tx,
        )
        .await;
        assert_eq!(supervisor.watcher_count(), 3);

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(10), supervisor.stop_all())
            .await
            .unwrap();
        assert_eq!(supervisor.active_count(), 0);
    }
}
