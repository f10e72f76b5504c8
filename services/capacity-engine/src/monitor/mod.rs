//! Threshold monitor.
//!
//! Polls ledger usage on a fixed interval and runs one hysteresis state
//! machine per (pool, dimension). Only transitions produce alerts; staying
//! at a level across polls is silent.

mod sink;
mod worker;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use fleetcap_events::{AlertEvent, Dimension, PoolName, Severity};
use fleetcap_id::AlertId;
use fleetcap_reconcile::{LevelTracker, ReconcileError, Thresholds, Transition};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::ledger::{AllocationLedger, DimensionUsage};

pub use sink::{AlertSink, ChannelSink, FanoutSink, SinkError, TracingSink};
pub use worker::MonitorWorker;

/// Alerts kept for the dashboard's recent-alerts view.
pub const RECENT_ALERTS: usize = 100;

/// Alerts held for redelivery after the sink refused them.
pub const MAX_UNDELIVERED: usize = 100;

/// Current level of one (pool, dimension) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertState {
    pub pool: PoolName,
    pub dimension: Dimension,
    pub severity: Severity,
}

pub struct ThresholdMonitor {
    ledger: Arc<AllocationLedger>,
    thresholds: Thresholds,
    sink: Arc<dyn AlertSink>,
    trackers: Mutex<HashMap<(PoolName, Dimension), LevelTracker>>,
    recent: Mutex<VecDeque<AlertEvent>>,
    undelivered: Mutex<VecDeque<AlertEvent>>,
}

impl ThresholdMonitor {
    pub fn new(
        ledger: Arc<AllocationLedger>,
        thresholds: Thresholds,
        sink: Arc<dyn AlertSink>,
    ) -> Result<Self, ReconcileError> {
        thresholds.validate()?;
        Ok(Self {
            ledger,
            thresholds,
            sink,
            trackers: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_ALERTS)),
            undelivered: Mutex::new(VecDeque::new()),
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Observe every allocatable pool once and publish any transitions.
    ///
    /// Alerts a previous poll could not deliver go out first, in order.
    /// Returns the alerts emitted by this poll.
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> Vec<AlertEvent> {
        let mut reports = Vec::new();
        for pool in PoolName::ALL.into_iter().filter(PoolName::is_allocatable) {
            reports.push(self.ledger.usage_report(pool).await);
        }

        let alerts: Vec<AlertEvent> = {
            let mut trackers = self.trackers.lock().await;
            reports
                .iter()
                .flat_map(|report| report.dimensions.iter().map(move |d| (report.pool, d)))
                .filter_map(|(pool, usage)| {
                    let Some(pct) = usage.usage_pct else {
                        debug!(pool = %pool, dimension = %usage.dimension, "No capacity; skipping");
                        return None;
                    };
                    let transition = trackers
                        .entry((pool, usage.dimension))
                        .or_default()
                        .observe(&self.thresholds, pct)?;
                    Some(self.alert(pool, usage, pct, transition))
                })
                .collect()
        };

        self.deliver(&alerts).await;

        if !alerts.is_empty() {
            let mut recent = self.recent.lock().await;
            for alert in &alerts {
                if recent.len() == RECENT_ALERTS {
                    recent.pop_front();
                }
                recent.push_back(alert.clone());
            }
        }

        alerts
    }

    async fn deliver(&self, alerts: &[AlertEvent]) {
        let mut undelivered = self.undelivered.lock().await;
        let mut queue: VecDeque<AlertEvent> = undelivered.drain(..).collect();
        queue.extend(alerts.iter().cloned());

        while let Some(alert) = queue.pop_front() {
            match self.sink.publish(&alert).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    // Keep order: nothing after a refused alert is tried.
                    queue.push_front(alert);
                    break;
                }
                Err(e) => {
                    warn!(alert_id = %alert.id, error = %e, "Failed to publish alert");
                }
            }
        }

        if !queue.is_empty() {
            debug!(pending = queue.len(), "Alert sink full; holding alerts for next poll");
        }
        while queue.len() > MAX_UNDELIVERED {
            if let Some(dropped) = queue.pop_front() {
                warn!(alert_id = %dropped.id, "Dropping undelivered alert");
            }
        }
        *undelivered = queue;
    }

    /// Alerts waiting for the sink to accept them.
    pub async fn undelivered(&self) -> usize {
        self.undelivered.lock().await.len()
    }

    fn alert(
        &self,
        pool: PoolName,
        usage: &DimensionUsage,
        pct: f64,
        transition: Transition,
    ) -> AlertEvent {
        let message = match transition.to {
            Severity::Critical => format!(
                "{pool} {} usage {pct:.1}% is above the critical threshold of {}%",
                usage.dimension, self.thresholds.critical_pct
            ),
            Severity::Warning => format!(
                "{pool} {} usage {pct:.1}% is above the warning threshold of {}%",
                usage.dimension, self.thresholds.warning_pct
            ),
            Severity::Normal => format!(
                "{pool} {} usage back to {pct:.1}%; {} alert resolved",
                usage.dimension, transition.from
            ),
        };

        AlertEvent {
            id: AlertId::new(),
            pool,
            dimension: usage.dimension,
            severity: transition.to,
            previous: transition.from,
            usage_pct: pct,
            used: usage.used,
            capacity: usage.capacity,
            message,
            timestamp: Utc::now(),
        }
    }

    /// Current level of every dimension of `pool`. Unobserved pairs are
    /// `Normal`.
    pub async fn states(&self, pool: PoolName) -> Vec<AlertState> {
        let trackers = self.trackers.lock().await;
        Dimension::ALL
            .into_iter()
            .map(|dimension| AlertState {
                pool,
                dimension,
                severity: trackers
                    .get(&(pool, dimension))
                    .map(LevelTracker::current)
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Up to `limit` most recent alerts, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<AlertEvent> {
        let recent = self.recent.lock().await;
        let skip = recent.len().saturating_sub(limit);
        recent.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::CapacityAggregator;
    use crate::registry::{PoolRegistry, DEFAULT_MAX_SERVERS};
    use crate::sections::PoolSections;
    use fleetcap_events::{Capacity, ServerSpec};
    use fleetcap_id::AllocationId;
    use tokio::sync::mpsc;

    struct Fixture {
        ledger: Arc<AllocationLedger>,
        monitor: ThresholdMonitor,
        alerts: mpsc::Receiver<AlertEvent>,
    }

    async fn fixture() -> Fixture {
        fixture_with_channel(16).await
    }

    /// One vm server with 100 cores and nothing else.
    async fn fixture_with_channel(buffer: usize) -> Fixture {
        let sections = Arc::new(PoolSections::new());
        let registry = Arc::new(PoolRegistry::new(
            Arc::clone(&sections),
            DEFAULT_MAX_SERVERS,
        ));
        let server = registry
            .register_server(ServerSpec {
                id: None,
                hostname: "bm-01".to_string(),
                ip: "10.4.0.1".parse().unwrap(),
                cpu_cores: 100,
                memory_gb: 0,
                storage_gb: 0,
                iops: 0,
            })
            .await
            .unwrap();
        registry.assign_pool(server.id, PoolName::Vm).await.unwrap();

        let aggregator = Arc::new(CapacityAggregator::new(Arc::clone(&registry)));
        let ledger = Arc::new(AllocationLedger::new(registry, aggregator, sections));
        let (tx, alerts) = mpsc::channel(buffer);
        let monitor = ThresholdMonitor::new(
            Arc::clone(&ledger),
            Thresholds::default(),
            Arc::new(ChannelSink::new(tx)),
        )
        .unwrap();

        Fixture {
            ledger,
            monitor,
            alerts,
        }
    }

    async fn reserve(ledger: &AllocationLedger, workload: &str, cpu: u64) -> AllocationId {
        ledger
            .reserve(PoolName::Vm, workload, Capacity::new(cpu, 0, 0, 0))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_rejects_invalid_thresholds() {
        let f = fixture().await;
        let result = ThresholdMonitor::new(
            f.ledger,
            Thresholds {
                warning_pct: 95.0,
                critical_pct: 90.0,
                hysteresis_pct: 5.0,
            },
            Arc::new(TracingSink),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_idle_pool_emits_nothing() {
        let f = fixture().await;
        assert!(f.monitor.poll_once().await.is_empty());
    }

    #[tokio::test]
    async fn test_warning_then_resolution() {
        let mut f = fixture().await;
        let id = reserve(&f.ledger, "w1", 80).await;

        let alerts = f.monitor.poll_once().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].dimension, Dimension::CpuCores);
        assert_eq!(f.alerts.recv().await.unwrap().id, alerts[0].id);

        f.ledger.release(id).await;
        let alerts = f.monitor.poll_once().await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].is_resolution());
        assert_eq!(alerts[0].previous, Severity::Warning);
    }

    #[tokio::test]
    async fn test_jump_to_critical_emits_one_event() {
        let f = fixture().await;
        reserve(&f.ledger, "w1", 95).await;

        let alerts = f.monitor.poll_once().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].previous, Severity::Normal);
        assert!(f.monitor.poll_once().await.is_empty());
    }

    #[tokio::test]
    async fn test_hysteresis_holds_level() {
        let f = fixture().await;
        let big = reserve(&f.ledger, "w1", 92).await;
        f.monitor.poll_once().await;

        // 88% is below critical but inside the 5 point margin.
        f.ledger.release(big).await;
        reserve(&f.ledger, "w2", 88).await;
        assert!(f.monitor.poll_once().await.is_empty());

        let states = f.monitor.states(PoolName::Vm).await;
        assert_eq!(states[0].severity, Severity::Critical);
        assert_eq!(states[1].severity, Severity::Normal);
    }

    #[tokio::test]
    async fn test_zero_capacity_dimensions_skipped() {
        let f = fixture().await;
        reserve(&f.ledger, "w1", 10).await;
        f.monitor.poll_once().await;

        let states = f.monitor.states(PoolName::K8s).await;
        assert!(states.iter().all(|s| s.severity == Severity::Normal));
    }

    #[tokio::test]
    async fn test_recent_keeps_latest() {
        let f = fixture().await;
        let id = reserve(&f.ledger, "w1", 80).await;
        f.monitor.poll_once().await;
        f.ledger.release(id).await;
        f.monitor.poll_once().await;

        let recent = f.monitor.recent(1).await;
        assert_eq!(recent.len(), 1);
        assert!(recent[0].is_resolution());
        assert_eq!(f.monitor.recent(10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_full_sink_redelivers_on_next_poll() {
        let mut f = fixture_with_channel(1).await;

        let id = reserve(&f.ledger, "w1", 80).await;
        let warning = f.monitor.poll_once().await;
        f.ledger.release(id).await;
        let resolved = f.monitor.poll_once().await;
        assert_eq!(resolved.len(), 1);

        // The relay has not read yet, so the resolution was held back.
        assert_eq!(f.monitor.undelivered().await, 1);
        assert_eq!(f.alerts.recv().await.unwrap().id, warning[0].id);

        // No new transition, but the held alert goes out.
        assert!(f.monitor.poll_once().await.is_empty());
        assert_eq!(f.monitor.undelivered().await, 0);
        assert_eq!(f.alerts.recv().await.unwrap().id, resolved[0].id);
    }

    #[tokio::test]
    async fn test_closed_sink_does_not_hold_alerts() {
        let Fixture {
            ledger,
            monitor,
            alerts,
        } = fixture().await;
        drop(alerts);

        reserve(&ledger, "w1", 95).await;
        assert_eq!(monitor.poll_once().await.len(), 1);
        assert_eq!(monitor.undelivered().await, 0);
        assert_eq!(monitor.recent(10).await.len(), 1);
    }
}
