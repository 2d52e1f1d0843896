//! Orchestrator integration tests.
//!
//! Tests the full flow: config -> pipeline and monitor start -> health ->
//! shutdown. Metrics stay disabled so no recorder is installed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lorona_core::config::LoronaConfig;
use lorona_daemon::orchestrator::Orchestrator;

fn pattern_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../log_formats.yaml")
}

/// One nginx error log, one unreachable endpoint and one backup folder.
fn test_config(dir: &Path) -> LoronaConfig {
    let log = dir.join("error.log");
    std::fs::write(&log, "2024/01/01 00:00:01 [error] 123#1: *9 disk failure\n").unwrap();
    let backups = dir.join("backups");
    std::fs::create_dir(&backups).unwrap();

    let toml_str = format!(
        r#"
[general]
log_level = "info"
container_name = "test-host"

[metrics]
enabled = false

[log_pipeline]
pattern_file = '{pattern}'
position_file = '{positions}'
tick_secs = 1
poll_interval_secs = 1

[[logs]]
path = '{log}'
log_type = "nginx_error"

[[uptime]]
endpoint = "http://127.0.0.1:1/health"
check_interval = "1h"
timeout_secs = 1

[[backups]]
folder = '{backups}'
check_interval = "1h"

[system]
enabled = false
"#,
        pattern = pattern_file().display(),
        positions = dir.join("positions.json").display(),
        log = log.display(),
        backups = backups.display(),
    );
    LoronaConfig::parse(&toml_str).expect("failed to parse test config")
}

#[tokio::test]
async fn build_from_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::build_from_config(test_config(dir.path())).unwrap();
    assert_eq!(orchestrator.config().general.container_name, "test-host");
    assert_eq!(orchestrator.monitor_count(), 0);
}

#[tokio::test]
async fn build_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.general.log_level = "verbose".to_owned();
    assert!(Orchestrator::build_from_config(config).is_err());
}

#[tokio::test]
async fn build_from_missing_file_fails() {
    let result = Orchestrator::build(Path::new("/nonexistent/lorona.toml")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn start_health_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::build_from_config(test_config(dir.path())).unwrap();

    assert!(orchestrator.health().await.is_unhealthy());

    orchestrator.start().await.unwrap();
    assert_eq!(orchestrator.monitor_count(), 2);
    assert!(orchestrator.health().await.is_healthy());

    orchestrator.shutdown().await;
    assert_eq!(orchestrator.monitor_count(), 0);
    assert!(orchestrator.health().await.is_unhealthy());
}

#[tokio::test]
async fn run_until_returns_after_shutdown_future() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::build_from_config(test_config(dir.path())).unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(15),
        orchestrator.run_until(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            "test"
        }),
    )
    .await
    .expect("orchestrator did not shut down in time");

    assert!(result.is_ok());
    assert_eq!(orchestrator.monitor_count(), 0);
}

#[tokio::test]
async fn start_fails_with_missing_pattern_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.log_pipeline.pattern_file = dir.path().join("missing.yaml");

    let mut orchestrator = Orchestrator::build_from_config(config).unwrap();
    let result = orchestrator.run_until(async { "unreachable" }).await;
    assert!(result.is_err());
    assert_eq!(orchestrator.monitor_count(), 0);
}

#[tokio::test]
async fn positions_are_persisted_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::build_from_config(test_config(dir.path())).unwrap();

    orchestrator
        .run_until(async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            "test"
        })
        .await
        .unwrap();

    let positions = std::fs::read_to_string(dir.path().join("positions.json")).unwrap();
    assert!(positions.contains("error.log"));
}
