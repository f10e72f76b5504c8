//! Bounded waits for background tasks during shutdown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Default time each task gets to stop after shutdown is signaled.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait up to `timeout` for `handle` to finish.
///
/// Returns the task's output, or `None` if it panicked or overran. An
/// overrunning task is aborted.
pub async fn join_within<T>(name: &str, mut handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            error!(task = name, error = %e, "Task failed during shutdown");
            None
        }
        Err(_) => {
            warn!(
                task = name,
                timeout_secs = timeout.as_secs_f64(),
                "Task did not shut down in time"
            );
            handle.abort();
            None
        }
    }
}
