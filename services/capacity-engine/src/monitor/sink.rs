//! Alert sinks.
//!
//! The monitor hands each emitted alert to a sink. Delivery to people (chat,
//! ticketing, email) happens outside the engine; the sinks here either log
//! the alert or forward it to the relay that does.

use std::sync::Arc;

use async_trait::async_trait;
use fleetcap_events::{AlertEvent, Severity};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("alert relay channel closed")]
    Closed,

    #[error("alert relay channel full")]
    Full,

    #[error("{failed} of {total} sinks failed")]
    Partial { failed: usize, total: usize },
}

impl SinkError {
    /// Whether publishing the same alert later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Destination for alert events.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Publish one alert event.
    async fn publish(&self, alert: &AlertEvent) -> Result<(), SinkError>;
}

/// Writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl AlertSink for TracingSink {
    async fn publish(&self, alert: &AlertEvent) -> Result<(), SinkError> {
        match alert.severity {
            Severity::Normal => info!(
                alert_id = %alert.id,
                pool = %alert.pool,
                dimension = %alert.dimension,
                previous = %alert.previous,
                usage_pct = alert.usage_pct,
                "Capacity alert resolved"
            ),
            Severity::Warning | Severity::Critical => warn!(
                alert_id = %alert.id,
                pool = %alert.pool,
                dimension = %alert.dimension,
                severity = %alert.severity,
                previous = %alert.previous,
                usage_pct = alert.usage_pct,
                used = alert.used,
                capacity = alert.capacity,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// Forwards alerts to a bounded channel read by the notification relay.
///
/// Never waits for room: a full channel is reported, not awaited, so a slow
/// relay cannot stall the monitor. The monitor holds alerts refused with
/// [`SinkError::Full`] and offers them again on its next poll.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AlertEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<AlertEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl AlertSink for ChannelSink {
    async fn publish(&self, alert: &AlertEvent) -> Result<(), SinkError> {
        self.tx.try_send(alert.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Publishes to every inner sink, even when some of them fail.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl AlertSink for FanoutSink {
    async fn publish(&self, alert: &AlertEvent) -> Result<(), SinkError> {
        let mut failed = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(alert).await {
                warn!(alert_id = %alert.id, error = %e, "Alert sink failed");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(SinkError::Partial {
                failed,
                total: self.sinks.len(),
            });
        }
        Ok(())
    }
}
