//! Daemon orchestration -- assembly, monitor wiring and lifecycle.
//!
//! The [`Orchestrator`] validates the configuration, installs the metrics
//! exporter, builds the log pipeline and starts one task per monitor.
//!
//! # Startup order (consumer before producers)
//!
//! 1. Log pipeline (aggregator, then watchers)
//! 2. Endpoint probers, system sampler, backup checkers
//!
//! # Shutdown order
//!
//! 1. Monitors (stop producing results)
//! 2. Log pipeline (watchers, then the aggregator's final snapshot)

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lorona_core::config::LoronaConfig;
use lorona_core::pipeline::{HealthStatus, Pipeline};
use lorona_log_pipeline::{LogPipeline, LogPipelineBuilder, MonitorSenders, PipelineConfig};

use crate::metrics_server;
use crate::monitors::{BackupChecker, EndpointProber, SystemSampler};

/// How long shutdown waits for one monitor task.
const MONITOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the log pipeline and the monitor tasks.
pub struct Orchestrator {
    config: LoronaConfig,
    pipeline: LogPipeline,
    senders: MonitorSenders,
    cancel: CancellationToken,
    monitors: Vec<(String, JoinHandle<()>)>,
    start_time: Instant,
}

impl Orchestrator {
    /// Loads `lorona.toml` (with environment overrides) and builds.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LoronaConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;
        Self::build_from_config(config)
    }

    /// Builds from an already loaded configuration.
    ///
    /// Installs the metrics recorder when `[metrics]` is enabled, so call
    /// this once per process in that case.
    pub fn build_from_config(config: LoronaConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let (pipeline, senders) = LogPipelineBuilder::new()
            .config(PipelineConfig::from_core(&config))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build log pipeline: {e}"))?;

        tracing::info!(
            logs = config.logs.len(),
            endpoints = config.uptime.len(),
            backups = config.backups.len(),
            system = config.system.enabled,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            pipeline,
            senders,
            cancel: CancellationToken::new(),
            monitors: Vec::new(),
            start_time: Instant::now(),
        })
    }

    pub fn config(&self) -> &LoronaConfig {
        &self.config
    }

    /// Number of running monitor tasks.
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Starts the pipeline, then the monitors.
    pub async fn start(&mut self) -> Result<()> {
        self.pipeline
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start log pipeline: {e}"))?;

        for endpoint in self.config.usable_endpoints() {
            match EndpointProber::new(&endpoint, self.senders.uptime.clone()) {
                Ok(prober) => {
                    let name = format!("endpoint {}", prober.endpoint());
                    let handle = tokio::spawn(prober.run(self.cancel.child_token()));
                    self.monitors.push((name, handle));
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint.endpoint, error = %e, "cannot probe endpoint, skipping");
                }
            }
        }

        if self.config.system.enabled {
            let sampler = SystemSampler::new(&self.config.system, self.senders.system.clone());
            let handle = tokio::spawn(sampler.run(self.cancel.child_token()));
            self.monitors.push(("system".to_owned(), handle));
        }

        for backup in self.config.usable_backups() {
            let name = format!("backup {}", backup.folder.display());
            let checker = BackupChecker::new(&backup, self.senders.backups.clone());
            let handle = tokio::spawn(checker.run(self.cancel.child_token()));
            self.monitors.push((name, handle));
        }

        tracing::info!(monitors = self.monitors.len(), "lorona started");
        Ok(())
    }

    /// Starts everything and runs until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        let signal = wait_for_shutdown_signal()?;
        self.run_until(signal).await
    }

    /// Starts everything and runs until `shutdown` completes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = &'static str>,
    {
        if let Err(e) = self.start().await {
            self.shutdown().await;
            return Err(e);
        }

        tracing::info!("entering main loop");
        let reason = shutdown.await;
        tracing::info!(reason, uptime_secs = self.start_time.elapsed().as_secs(), "shutting down");

        self.shutdown().await;
        Ok(())
    }

    /// Stops the monitors, then the pipeline.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();

        for (name, mut handle) in self.monitors.drain(..) {
            match tokio::time::timeout(MONITOR_STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(monitor = %name, error = %e, "monitor task failed"),
                Err(_) => {
                    tracing::warn!(monitor = %name, "monitor did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        if let Err(e) = self.pipeline.stop().await {
            tracing::debug!(error = %e, "log pipeline was not running");
        }
    }

    /// Pipeline health, downgraded when a monitor task has died.
    pub async fn health(&self) -> HealthStatus {
        let pipeline = self.pipeline.health_check().await;
        if pipeline.is_unhealthy() {
            return pipeline;
        }

        let dead: Vec<&str> = self
            .monitors
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.as_str())
            .collect();
        if !dead.is_empty() {
            return HealthStatus::Degraded(format!("monitors stopped: {}", dead.join(", ")));
        }

        pipeline
    }
}

/// Resolves with the name of the first SIGTERM or SIGINT.
///
/// The handlers are installed before this returns.
fn wait_for_shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {e}"))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {e}"))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}
