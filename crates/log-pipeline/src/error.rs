//! Log pipeline error types
//!
//! [`LogPipelineError`] covers every failure inside the pipeline. The
//! `From<LogPipelineError> for LoronaError` impl lets callers propagate it
//! with `?`.

use lorona_core::error::{LoronaError, PipelineError};

/// Log pipeline domain error
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// The pattern registry file could not be read or parsed
    #[error("pattern registry load error: {path}: {reason}")]
    PatternLoad {
        /// Registry file path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// No usable pattern for a log type
    #[error("pattern error: '{log_type}': {reason}")]
    Pattern {
        /// Log type identifier
        log_type: String,
        /// Failure reason
        reason: String,
    },

    /// A capture condition failed to compile
    #[error("expression error at {position}: {reason}")]
    Expression {
        /// Byte offset in the condition text
        position: usize,
        /// Failure reason
        reason: String,
    },

    /// A watcher pass failed (stat, open, read)
    #[error("watcher error: {path}: {reason}")]
    Watcher {
        /// Watched file path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Position store read/write failure
    #[error("position store error: {path}: {reason}")]
    Position {
        /// Store file path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Config error
    #[error("config error: {field}: {reason}")]
    Config {
        /// Field name
        field: String,
        /// Failure reason
        reason: String,
    },

    /// Channel closed
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex compile error
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<LogPipelineError> for LoronaError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Channel(reason) => {
                LoronaError::Pipeline(PipelineError::ChannelSend(reason))
            }
            other => LoronaError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
