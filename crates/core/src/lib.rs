//! Shared building blocks of the lorona monitoring agent: configuration,
//! error taxonomy, monitor result types, metric names and the pipeline
//! lifecycle trait.

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;

// configuration
pub use config::LoronaConfig;

pub use error::{ConfigError, LoronaError, PipelineError};

pub use event::{BackupInfo, DriveUsage, SysMonitorInfo, UptimeResponse};

pub use pipeline::{HealthStatus, Pipeline};
