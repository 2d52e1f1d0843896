//! System resource sampler.
//!
//! Reports uptime, global CPU usage, the 1-minute load average and, per
//! configured mount point (every disk when none are configured), the used
//! percentage, available bytes and volume name.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use lorona_core::config::SystemConfig;
use lorona_core::event::{DriveUsage, SysMonitorInfo};
use sysinfo::{Disks, System};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Samples the host at a fixed interval.
pub struct SystemSampler {
    system: System,
    disks: Disks,
    drive_paths: Vec<PathBuf>,
    interval: Duration,
    tx: mpsc::Sender<SysMonitorInfo>,
}

impl SystemSampler {
    pub fn new(config: &SystemConfig, tx: mpsc::Sender<SysMonitorInfo>) -> Self {
        let mut system = System::new();
        // first refresh only primes the CPU counters
        system.refresh_cpu();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            drive_paths: config.drive_paths.clone(),
            interval: Duration::from_secs(config.interval_secs),
            tx,
        }
    }

    /// Takes one sample.
    pub fn sample(&mut self) -> SysMonitorInfo {
        self.system.refresh_cpu();
        self.disks.refresh_list();

        let drives = self
            .disks
            .iter()
            .filter(|disk| {
                self.drive_paths.is_empty()
                    || self.drive_paths.iter().any(|p| p == disk.mount_point())
            })
            .map(|disk| DriveUsage {
                drive_path: disk.mount_point().to_path_buf(),
                volume_name: disk.name().to_string_lossy().into_owned(),
                percent_used: percent_used(disk.total_space(), disk.available_space()),
                available_bytes: disk.available_space(),
            })
            .collect();

        SysMonitorInfo {
            uptime_secs: System::uptime(),
            cpu_usage_percent: f64::from(self.system.global_cpu_info().cpu_usage()),
            load_avg_1: System::load_average().one,
            drives,
            sampled_at: Utc::now(),
        }
    }

    /// Samples until cancelled or the queue closes.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            drives = self.drive_paths.len(),
            "system sampler started"
        );

        // CPU usage needs two refreshes some time apart
        if !super::wait_next(&cancel, sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await {
            return;
        }

        loop {
            let info = self.sample();
            tracing::debug!(
                cpu = info.cpu_usage_percent,
                load_1 = info.load_avg_1,
                drives = info.drives.len(),
                "system sampled"
            );
            if self.tx.send(info).await.is_err() {
                tracing::debug!("system queue closed");
                break;
            }
            if !super::wait_next(&cancel, self.interval).await {
                break;
            }
        }

        tracing::info!("system sampler stopped");
    }
}

/// Used share of a volume in percent; `0` for an empty or unknown volume.
pub fn percent_used(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(available);
    used as f64 / total as f64 * 100.0
}
