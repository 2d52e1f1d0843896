//! Host monitors feeding the aggregator.
//!
//! Each monitor runs as its own task: do one check, push the result onto its
//! queue, then sleep until the next check or until cancelled. A closed queue
//! stops the monitor.

pub mod backup;
pub mod endpoint;
pub mod system;

pub use backup::BackupChecker;
pub use endpoint::EndpointProber;
pub use system::SystemSampler;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Shortest pause between two checks of one monitor.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Sleeps for `interval` (at least [`MIN_INTERVAL`]).
///
/// Returns `false` when cancelled first.
async fn wait_next(cancel: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval.max(MIN_INTERVAL)) => true,
    }
}
