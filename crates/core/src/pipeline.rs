//! Pipeline lifecycle trait shared by long-running components.

use std::future::Future;

use crate::error::LoronaError;

/// Component health reported by [`Pipeline::health_check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Running normally
    Healthy,
    /// Running with reduced capability
    Degraded(String),
    /// Not running or unable to work
    Unhealthy(String),
}

impl HealthStatus {
    /// `true` for [`HealthStatus::Healthy`].
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// `true` for [`HealthStatus::Unhealthy`].
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// Start / stop / health lifecycle.
///
/// `start` on a running component fails with `PipelineError::AlreadyRunning`,
/// `stop` on a stopped one with `PipelineError::NotRunning`.
pub trait Pipeline: Send {
    /// Spawns the component's workers.
    fn start(&mut self) -> impl Future<Output = Result<(), LoronaError>> + Send;

    /// Stops the workers and waits for them to finish.
    fn stop(&mut self) -> impl Future<Output = Result<(), LoronaError>> + Send;

    /// Reports the current health.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
