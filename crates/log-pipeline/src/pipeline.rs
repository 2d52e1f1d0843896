//! Pipeline orchestration -- watchers feeding the aggregator.
//!
//! [`LogPipeline`] implements the core [`Pipeline`] trait so the daemon can
//! manage it with the same start / stop / health lifecycle as everything else.
//!
//! # Architecture
//! ```text
//! WatcherSupervisor ─┬─ LogWatcher ─┐
//!                    └─ LogWatcher ─┼─ mpsc<ParsedEvent> ─┐
//! MonitorSenders (daemon monitors) ─────────────────────┼─> Aggregator -> SnapshotPublisher
//! ```

use std::sync::Arc;
use std::time::Duration;

use lorona_core::error::{LoronaError, PipelineError};
use lorona_core::pipeline::{HealthStatus, Pipeline};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{
    Aggregator, AggregatorInputs, MetricsPublisher, MonitorSenders, SnapshotPublisher,
    monitor_channels,
};
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::event::ParsedEvent;
use crate::pattern::PatternRegistry;
use crate::position::PositionStore;
use crate::watcher::{WatcherSettings, WatcherSupervisor};

/// How long `stop` waits for the aggregator's last snapshot.
const AGGREGATOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Initialized,
    Running,
    Stopped,
}

/// Log pipeline: watchers, position store and the aggregation multiplexer.
///
/// # Example
/// ```ignore
/// use lorona_log_pipeline::{LogPipelineBuilder, PipelineConfig};
///
/// let (mut pipeline, monitors) = LogPipelineBuilder::new()
///     .config(PipelineConfig::from_core(&core_config))
///     .build()?;
///
/// pipeline.start().await?;
/// // hand `monitors.uptime` etc. to the monitor tasks
/// ```
pub struct LogPipeline {
    config: PipelineConfig,
    state: PipelineState,
    registry: Option<PatternRegistry>,
    store: Option<Arc<PositionStore>>,
    publisher: Option<Box<dyn SnapshotPublisher>>,
    log_tx: mpsc::Sender<ParsedEvent>,
    inputs: Option<AggregatorInputs>,
    supervisor: Option<WatcherSupervisor>,
    aggregator: Option<(CancellationToken, JoinHandle<()>)>,
}

impl LogPipeline {
    /// Current state name.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Watchers spawned by the last `start`.
    pub fn watcher_count(&self) -> usize {
        self.supervisor
            .as_ref()
            .map_or(0, WatcherSupervisor::watcher_count)
    }

    /// Sources that could not be watched.
    pub fn skipped_count(&self) -> usize {
        self.supervisor
            .as_ref()
            .map_or(0, WatcherSupervisor::skipped_count)
    }

    async fn load_registry(&mut self) -> Result<PatternRegistry, LogPipelineError> {
        match self.registry.take() {
            Some(registry) => Ok(registry),
            None => PatternRegistry::load(&self.config.pattern_file).await,
        }
    }

    async fn open_store(&mut self) -> Arc<PositionStore> {
        match self.store.take() {
            Some(store) => store,
            None => Arc::new(PositionStore::open(&self.config.position_file).await),
        }
    }
}

impl Pipeline for LogPipeline {
    async fn start(&mut self) -> Result<(), LoronaError> {
        match self.state {
            PipelineState::Running => return Err(PipelineError::AlreadyRunning.into()),
            PipelineState::Stopped => {
                return Err(
                    PipelineError::InitFailed("a stopped pipeline cannot be restarted".to_owned())
                        .into(),
                );
            }
            PipelineState::Initialized => {}
        }

        tracing::info!(sources = self.config.sources.len(), "starting log pipeline");

        let registry = self.load_registry().await?;
        if registry.is_empty() {
            tracing::warn!(
                path = %self.config.pattern_file.display(),
                "pattern registry is empty, no log source can be watched"
            );
        }
        let store = self.open_store().await;

        let inputs = self
            .inputs
            .take()
            .ok_or_else(|| PipelineError::InitFailed("aggregator inputs missing".to_owned()))?;
        let publisher = self
            .publisher
            .take()
            .unwrap_or_else(|| Box::new(MetricsPublisher::new()) as Box<dyn SnapshotPublisher>);

        // 1. aggregator first, so watcher output has a reader
        let aggregator = Aggregator::new(
            self.config.identity.clone(),
            self.config.tick_interval,
            self.config.max_events_per_tick,
            publisher,
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(aggregator.run(inputs, cancel.clone()));
        self.aggregator = Some((cancel, handle));

        // 2. one watcher per source
        let settings = WatcherSettings::from(&self.config);
        let supervisor = WatcherSupervisor::spawn_all(
            &self.config.sources,
            &registry,
            &settings,
            store,
            &self.log_tx,
        )
        .await;
        self.supervisor = Some(supervisor);

        self.state = PipelineState::Running;
        tracing::info!(
            watchers = self.watcher_count(),
            skipped = self.skipped_count(),
            "log pipeline started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LoronaError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping log pipeline");

        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.stop_all().await;
        }

        if let Some((cancel, mut handle)) = self.aggregator.take() {
            cancel.cancel();
            match tokio::time::timeout(AGGREGATOR_STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "aggregator task failed"),
                Err(_) => {
                    tracing::warn!("aggregator did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        self.state = PipelineState::Stopped;
        tracing::info!("log pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                if self
                    .aggregator
                    .as_ref()
                    .is_some_and(|(_, handle)| handle.is_finished())
                {
                    return HealthStatus::Unhealthy("aggregator stopped".to_owned());
                }
                if !self.config.sources.is_empty() && self.watcher_count() == 0 {
                    return HealthStatus::Degraded(format!(
                        "none of {} log sources could be watched",
                        self.config.sources.len()
                    ));
                }
                HealthStatus::Healthy
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// Log pipeline builder
///
/// Creates the producer queues. The pattern registry and the position store
/// are loaded from the configured files at `start` unless given here.
#[derive(Default)]
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    registry: Option<PatternRegistry>,
    store: Option<Arc<PositionStore>>,
    publisher: Option<Box<dyn SnapshotPublisher>>,
}

impl LogPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an already loaded pattern registry.
    pub fn registry(mut self, registry: PatternRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses an already opened position store.
    pub fn position_store(mut self, store: Arc<PositionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default [`MetricsPublisher`].
    pub fn publisher(mut self, publisher: impl SnapshotPublisher + 'static) -> Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    /// Builds the pipeline.
    ///
    /// # Returns
    /// - `LogPipeline`: the pipeline, not yet started
    /// - `MonitorSenders`: queues the external monitors push their results to
    pub fn build(self) -> Result<(LogPipeline, MonitorSenders), LogPipelineError> {
        self.config.validate()?;

        let capacity = self.config.channel_capacity;
        let (log_tx, log_rx) = mpsc::channel(capacity);
        let (senders, (uptime_rx, system_rx, backup_rx)) = monitor_channels(capacity);

        let pipeline = LogPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            registry: self.registry,
            store: self.store,
            publisher: self.publisher,
            log_tx,
            inputs: Some(AggregatorInputs {
                logs: log_rx,
                uptime: uptime_rx,
                system: system_rx,
                backups: backup_rx,
            }),
            supervisor: None,
            aggregator: None,
        };

        Ok((pipeline, senders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ChannelPublisher;
    use lorona_core::config::LogSourceConfig;

    fn registry() -> PatternRegistry {
        PatternRegistry::parse_yaml(
            "plain: '^(?P<severity>\\w+) (?P<description>.*)$'\n",
            "test",
        )
        .unwrap()
    }

    #[test]
    fn builder_creates_pipeline() {
        let (pipeline, _senders) = LogPipelineBuilder::new().build().unwrap();
        assert_eq!(pipeline.state_name(), "initialized");
        assert_eq!(pipeline.watcher_count(), 0);
    }

    #[test]
    fn builder_with_invalid_config_fails() {
        let mut config = PipelineConfig::default();
        config.channel_capacity = 0;
        let result = LogPipelineBuilder::new().config(config).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn lifecycle_errors() {
        let (mut pipeline, _senders) = LogPipelineBuilder::new()
            .registry(registry())
            .position_store(Arc::new(PositionStore::in_memory()))
            .build()
            .unwrap();

        assert!(pipeline.health_check().await.is_unhealthy());
        assert!(pipeline.stop().await.is_err());

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.state_name(), "running");
        assert!(pipeline.health_check().await.is_healthy());
        assert!(matches!(
            pipeline.start().await,
            Err(LoronaError::Pipeline(PipelineError::AlreadyRunning))
        ));

        pipeline.stop().await.unwrap();
        assert!(pipeline.health_check().await.is_unhealthy());
        assert!(pipeline.start().await.is_err());
    }

    #[tokio::test]
    async fn degraded_when_no_source_can_be_watched() {
        let config = PipelineConfig::builder()
            .source(LogSourceConfig::new("/var/log/unknown.log", "no_such_type"))
            .build()
            .unwrap();
        let (publisher, _rx) = ChannelPublisher::new(4);
        let (mut pipeline, _senders) = LogPipelineBuilder::new()
            .config(config)
            .registry(registry())
            .position_store(Arc::new(PositionStore::in_memory()))
            .publisher(publisher)
            .build()
            .unwrap();

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.skipped_count(), 1);
        assert!(matches!(
            pipeline.health_check().await,
            HealthStatus::Degraded(_)
        ));
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_pattern_file_fails_start() {
        let config = PipelineConfig::builder()
            .pattern_file("/nonexistent/lorona/log_formats.yaml")
            .build()
            .unwrap();
        let (mut pipeline, _senders) = LogPipelineBuilder::new()
            .config(config)
            .position_store(Arc::new(PositionStore::in_memory()))
            .build()
            .unwrap();

        assert!(pipeline.start().await.is_err());
        assert_eq!(pipeline.state_name(), "initialized");
    }
}
