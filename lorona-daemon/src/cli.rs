//! CLI argument definitions for lorona-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Lorona host monitoring agent.
///
/// Tails the configured log files, probes endpoints, samples system
/// resources, checks backup folders and exposes the results as Prometheus
/// metrics.
#[derive(Parser, Debug)]
#[command(name = "lorona-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to lorona.toml configuration file.
    #[arg(short, long, default_value = "/etc/lorona/lorona.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the pattern registry file.
    #[arg(long)]
    pub pattern_file: Option<PathBuf>,

    /// Validate configuration and pattern files and exit without starting.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Applies the command-line overrides to a loaded configuration.
    pub fn apply_overrides(&self, config: &mut lorona_core::LoronaConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(path) = &self.pattern_file {
            config.log_pipeline.pattern_file = path.clone();
        }
    }
}
