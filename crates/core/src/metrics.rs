//! Metric names and descriptions
//!
//! Every Prometheus metric is named here so producers and the exporter agree.
//! Modules call `metrics::counter!()` / `metrics::gauge!()` with these constants.
//!
//! # Naming
//!
//! - prefix: `lorona_`
//! - per-tick snapshot gauges keep the historical names (`lorona_status_codes`,
//!   `lorona_severity`, ...) so existing dashboards keep working
//! - pipeline counters: `lorona_log_pipeline_*_total`
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(lorona_core::metrics::LOG_PIPELINE_LINES_READ_TOTAL).increment(1);
//! ```

// ─── Label keys ────────────────────────────────────────────────────

pub const LABEL_LOG_PATH: &str = "log_path";
pub const LABEL_STATUS_CODE: &str = "status_code";
pub const LABEL_SEVERITY: &str = "severity";
pub const LABEL_URL: &str = "url";
pub const LABEL_DRIVE_PATH: &str = "drive_path";
pub const LABEL_PHYSICAL_DRIVE: &str = "physical_drive";
pub const LABEL_BACKUP_DIRECTORY: &str = "backup_directory";
pub const LABEL_LAST_BACKUP_FILE: &str = "last_backup_file";

// ─── Snapshot gauges (refreshed once per tick) ─────────────────────

/// Events per status code in the last tick (labels: log_path, status_code)
pub const STATUS_CODES: &str = "lorona_status_codes";

/// Events per severity in the last tick (labels: log_path, severity)
pub const SEVERITY: &str = "lorona_severity";

/// Host uptime in seconds
pub const SYSTEM_UPTIME: &str = "lorona_system_uptime";

/// Global CPU usage percent
pub const SYSTEM_CPU_USAGE: &str = "lorona_system_cpu_usage";

/// 1-minute load average
pub const SYSTEM_LOAD_AVG_1: &str = "lorona_system_load_avg_1";

/// Disk used percent (labels: drive_path, physical_drive)
pub const HD_AVAILABLE: &str = "lorona_hd_available";

/// 1 when the last probe returned 200 (label: url)
pub const ENDPOINT_UP: &str = "lorona_endpoint_up";

/// Last probe duration in seconds (label: url)
pub const ENDPOINT_DURATION: &str = "lorona_endpoint_duration";

/// 1 when the folder holds a fresh backup (labels: backup_directory, last_backup_file)
pub const BACKUP_INFO: &str = "lorona_backup_info";

// ─── Log pipeline counters ─────────────────────────────────────────

pub const LOG_PIPELINE_LINES_READ_TOTAL: &str = "lorona_log_pipeline_lines_read_total";

pub const LOG_PIPELINE_EVENTS_EMITTED_TOTAL: &str = "lorona_log_pipeline_events_emitted_total";

pub const LOG_PIPELINE_EVENTS_FILTERED_TOTAL: &str = "lorona_log_pipeline_events_filtered_total";

/// Events shed by the per-tick cap
pub const LOG_PIPELINE_EVENTS_DROPPED_TOTAL: &str = "lorona_log_pipeline_events_dropped_total";

pub const LOG_PIPELINE_ROTATIONS_TOTAL: &str = "lorona_log_pipeline_rotations_total";

pub const LOG_PIPELINE_TRUNCATIONS_TOTAL: &str = "lorona_log_pipeline_truncations_total";

/// Bytes skipped because the unread region exceeded the cap
pub const LOG_PIPELINE_BYTES_SKIPPED_TOTAL: &str = "lorona_log_pipeline_bytes_skipped_total";

pub const LOG_PIPELINE_PASS_FAILURES_TOTAL: &str = "lorona_log_pipeline_pass_failures_total";

pub const LOG_PIPELINE_TICKS_TOTAL: &str = "lorona_log_pipeline_ticks_total";

pub const LOG_PIPELINE_CONDITION_ERRORS_TOTAL: &str =
    "lorona_log_pipeline_condition_errors_total";

/// Registers HELP text for every metric.
///
/// Call once after the recorder is installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Snapshot
    describe_gauge!(
        STATUS_CODES,
        "Log events per status code observed in the last tick"
    );
    describe_gauge!(SEVERITY, "Log events per severity observed in the last tick");
    describe_gauge!(SYSTEM_UPTIME, "Host uptime in seconds");
    describe_gauge!(SYSTEM_CPU_USAGE, "Global CPU usage in percent");
    describe_gauge!(SYSTEM_LOAD_AVG_1, "One minute load average");
    describe_gauge!(HD_AVAILABLE, "Disk space used in percent");
    describe_gauge!(ENDPOINT_UP, "1 when the endpoint answered 200, else 0");
    describe_gauge!(ENDPOINT_DURATION, "Endpoint probe duration in seconds");
    describe_gauge!(BACKUP_INFO, "1 when the folder holds a recent backup, else 0");

    // Log pipeline
    describe_counter!(
        LOG_PIPELINE_LINES_READ_TOTAL,
        "Complete lines read from watched log files"
    );
    describe_counter!(
        LOG_PIPELINE_EVENTS_EMITTED_TOTAL,
        "Parsed events accepted by capture conditions"
    );
    describe_counter!(
        LOG_PIPELINE_EVENTS_FILTERED_TOTAL,
        "Parsed events rejected by capture conditions"
    );
    describe_counter!(
        LOG_PIPELINE_EVENTS_DROPPED_TOTAL,
        "Events dropped by the per-tick aggregation cap"
    );
    describe_counter!(
        LOG_PIPELINE_ROTATIONS_TOTAL,
        "Log rotations detected by signature mismatch"
    );
    describe_counter!(
        LOG_PIPELINE_TRUNCATIONS_TOTAL,
        "Log truncations detected by size shrink"
    );
    describe_counter!(
        LOG_PIPELINE_BYTES_SKIPPED_TOTAL,
        "Unread bytes skipped by the unread-length cap"
    );
    describe_counter!(
        LOG_PIPELINE_PASS_FAILURES_TOTAL,
        "Watcher passes aborted by I/O errors"
    );
    describe_counter!(LOG_PIPELINE_TICKS_TOTAL, "Aggregation ticks finalized");
    describe_counter!(
        LOG_PIPELINE_CONDITION_ERRORS_TOTAL,
        "Capture condition evaluation errors"
    );
}
