//! Lorona daemon library.
//!
//! Exposes the daemon's modules for integration testing. In production
//! `lorona-daemon` runs as a binary (`main.rs`).

pub mod cli;
pub mod logging;
pub mod metrics_server;
pub mod monitors;
pub mod orchestrator;
