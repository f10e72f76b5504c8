//! Monitor background worker.
//!
//! Runs the threshold monitor on a periodic interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, instrument};

use super::ThresholdMonitor;

pub struct MonitorWorker {
    monitor: Arc<ThresholdMonitor>,
    interval: Duration,
}

impl MonitorWorker {
    pub fn new(monitor: Arc<ThresholdMonitor>, interval: Duration) -> Self {
        Self { monitor, interval }
    }

    /// Run the monitor until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting threshold monitor"
        );

        let mut interval = tokio::time::interval(self.interval);
        // A slow poll must not cause a burst of catch-up polls.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let alerts = self.monitor.poll_once().await;
                    if !alerts.is_empty() {
                        info!(alerts = alerts.len(), "Threshold poll emitted alerts");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Threshold monitor shutting down");
                        break;
                    }
                }
            }
        }
    }
}
