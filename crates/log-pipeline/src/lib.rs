//! Lorona log pipeline: tails configured log files, extracts fields with
//! per-type patterns, keeps the lines matching the capture conditions and
//! folds everything into per-tick snapshots.
//!
//! # Modules
//!
//! - [`pattern`]: pattern registry loaded from `log_formats.yaml`
//! - [`parser`]: line parser with reserved fields and timestamp detection
//! - [`filter`]: capture-condition expression language
//! - [`watcher`]: incremental tailing with rotation and truncation handling
//! - [`position`]: persisted offsets and rotation signatures
//! - [`aggregator`]: aggregation multiplexer and snapshot publishing
//! - [`pipeline`]: lifecycle orchestration (`Pipeline` trait implementation)
//! - [`config`]: resolved pipeline settings
//! - [`error`]: domain error type
//!
//! # Architecture
//!
//! ```text
//! file -> LogWatcher -> LineParser -> CaptureFilter -> mpsc -> Aggregator -> SnapshotPublisher
//!             |                                                   ^
//!       PositionStore                     endpoint / system / backup monitors
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod parser;
pub mod pattern;
pub mod pipeline;
pub mod position;
pub mod watcher;

// --- re-exports ---

// pipeline
pub use pipeline::{LogPipeline, LogPipelineBuilder};

// settings
pub use config::{PipelineConfig, PipelineConfigBuilder};

// errors
pub use error::LogPipelineError;

// parsing
pub use event::{ConditionParams, FieldValue, ParsedEvent};
pub use parser::LineParser;
pub use pattern::{PatternRegistry, PatternSpec};

// filtering
pub use filter::{CaptureCondition, CaptureFilter};

// tailing
pub use position::{PositionStore, WatcherState};
pub use watcher::{LogWatcher, PassReport, WatcherSettings, WatcherSupervisor};

// aggregation
pub use aggregator::{
    Aggregator, AggregatorInputs, ChannelPublisher, Incoming, LogSummary, MetricsPublisher,
    MonitorSenders, Snapshot, SnapshotIdentity, SnapshotPublisher,
};
