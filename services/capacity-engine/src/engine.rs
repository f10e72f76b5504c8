//! Component wiring.

use std::sync::Arc;

use tracing::info;

use crate::capacity::CapacityAggregator;
use crate::config::Config;
use crate::error::EngineResult;
use crate::ledger::AllocationLedger;
use crate::monitor::{AlertSink, ThresholdMonitor};
use crate::reconciler::ScalingReconciler;
use crate::registry::PoolRegistry;
use crate::sections::PoolSections;

/// The engine's components, sharing one set of pool sections.
pub struct Engine {
    registry: Arc<PoolRegistry>,
    aggregator: Arc<CapacityAggregator>,
    ledger: Arc<AllocationLedger>,
    reconciler: Arc<ScalingReconciler>,
    monitor: Arc<ThresholdMonitor>,
}

impl Engine {
    pub fn new(config: &Config, sink: Arc<dyn AlertSink>) -> EngineResult<Self> {
        let sections = Arc::new(PoolSections::new());
        let registry = Arc::new(PoolRegistry::new(
            Arc::clone(&sections),
            config.max_servers,
        ));
        let aggregator = Arc::new(CapacityAggregator::new(Arc::clone(&registry)));
        let ledger = Arc::new(AllocationLedger::new(
            Arc::clone(&registry),
            Arc::clone(&aggregator),
            sections,
        ));
        let reconciler = Arc::new(ScalingReconciler::new(Arc::clone(&registry)));
        let monitor = Arc::new(ThresholdMonitor::new(
            Arc::clone(&ledger),
            config.thresholds,
            sink,
        )?);

        info!(
            max_servers = config.max_servers,
            warning_pct = config.thresholds.warning_pct,
            critical_pct = config.thresholds.critical_pct,
            hysteresis_pct = config.thresholds.hysteresis_pct,
            "Capacity engine initialized"
        );

        Ok(Self {
            registry,
            aggregator,
            ledger,
            reconciler,
            monitor,
        })
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn aggregator(&self) -> &Arc<CapacityAggregator> {
        &self.aggregator
    }

    pub fn ledger(&self) -> &Arc<AllocationLedger> {
        &self.ledger
    }

    pub fn reconciler(&self) -> &Arc<ScalingReconciler> {
        &self.reconciler
    }

    pub fn monitor(&self) -> &Arc<ThresholdMonitor> {
        &self.monitor
    }
}
