//! Error types shared by every lorona crate.

/// Top-level lorona error.
#[derive(Debug, thiserror::Error)]
pub enum LoronaError {
    /// Configuration errors
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline lifecycle / processing errors
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// The configuration file could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A configuration value is out of range or malformed
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Pipeline lifecycle / processing errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Sending on a channel failed (receiver dropped)
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// Pipeline could not be initialised
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// `start()` was called on a running pipeline
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// `stop()` was called on a pipeline that is not running
    #[error("pipeline is not running")]
    NotRunning,
}
