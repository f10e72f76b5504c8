//! Convergence primitives shared by the capacity engine's background loops.
//!
//! - [`Checkpoint`] remembers the last applied fleet event so replays from
//!   orchestration tooling are dropped.
//! - [`LevelTracker`] turns a stream of usage percentages into severity
//!   transitions, with a hysteresis band so a value hovering around a
//!   threshold does not flap.
//!
//! # Invariants
//!
//! - Applying the same observation twice yields no second transition
//! - Decisions are deterministic given the same inputs
//! - Checkpoints only move forward

use std::time::Duration;

use fleetcap_events::Severity;
use fleetcap_id::EventSeq;
use thiserror::Error;

/// Reconciliation errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    /// Threshold configuration is not internally consistent.
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
}

// =============================================================================
// Checkpoint
// =============================================================================

/// Tracks the last applied event for exactly-once semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Last applied event sequence.
    pub last_seq: EventSeq,

    /// Timestamp of last checkpoint update.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Checkpoint {
    pub fn new(last_seq: EventSeq) -> Self {
        Self {
            last_seq,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Check if an event has already been applied.
    pub fn is_processed(&self, seq: EventSeq) -> bool {
        seq <= self.last_seq
    }

    /// Advance the checkpoint. Older sequences are ignored.
    pub fn advance(&mut self, seq: EventSeq) {
        if seq > self.last_seq {
            self.last_seq = seq;
            self.updated_at = chrono::Utc::now();
        }
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new(EventSeq::ZERO)
    }
}

// =============================================================================
// Hysteresis
// =============================================================================

/// Warning/critical thresholds in percent, with a hysteresis margin.
///
/// Rising: `Normal -> Warning` above `warning_pct`, `-> Critical` above
/// `critical_pct`. Falling: a level is held until usage drops below its
/// threshold minus `hysteresis_pct`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning_pct: f64,
    pub critical_pct: f64,
    pub hysteresis_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning_pct: DEFAULT_WARNING_PCT,
            critical_pct: DEFAULT_CRITICAL_PCT,
            hysteresis_pct: DEFAULT_HYSTERESIS_PCT,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ReconcileError> {
        let Self {
            warning_pct,
            critical_pct,
            hysteresis_pct,
        } = *self;

        if !(warning_pct.is_finite() && critical_pct.is_finite() && hysteresis_pct.is_finite()) {
            return Err(ReconcileError::InvalidThresholds(
                "thresholds must be finite".to_string(),
            ));
        }
        if warning_pct <= 0.0 || warning_pct >= critical_pct {
            return Err(ReconcileError::InvalidThresholds(format!(
                "need 0 < warning ({warning_pct}) < critical ({critical_pct})"
            )));
        }
        if hysteresis_pct < 0.0 || hysteresis_pct >= warning_pct {
            return Err(ReconcileError::InvalidThresholds(format!(
                "need 0 <= hysteresis ({hysteresis_pct}) < warning ({warning_pct})"
            )));
        }
        // A held critical level must never sit below the warning threshold.
        if critical_pct - hysteresis_pct < warning_pct {
            return Err(ReconcileError::InvalidThresholds(format!(
                "need critical ({critical_pct}) - hysteresis ({hysteresis_pct}) >= warning ({warning_pct})"
            )));
        }
        Ok(())
    }

    /// Level reached purely by crossing thresholds upward.
    fn raised(&self, usage_pct: f64) -> Severity {
        if usage_pct > self.critical_pct {
            Severity::Critical
        } else if usage_pct > self.warning_pct {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    /// Lowest level `current` may fall to at `usage_pct`.
    fn held(&self, current: Severity, usage_pct: f64) -> Severity {
        let warning_floor = self.warning_pct - self.hysteresis_pct;
        let critical_floor = self.critical_pct - self.hysteresis_pct;

        match current {
            Severity::Critical if usage_pct >= critical_floor => Severity::Critical,
            Severity::Critical | Severity::Warning if usage_pct >= warning_floor => {
                Severity::Warning
            }
            _ => Severity::Normal,
        }
    }

    /// Next level given the current one and a fresh observation.
    pub fn next(&self, current: Severity, usage_pct: f64) -> Severity {
        let raised = self.raised(usage_pct);
        if raised > current {
            raised
        } else {
            self.held(current, usage_pct)
        }
    }
}

/// A level change produced by [`LevelTracker::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Severity,
    pub to: Severity,
}

/// Current severity of one monitored series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelTracker {
    current: Severity,
}

impl LevelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Severity {
        self.current
    }

    /// Feed an observation. Returns the transition, if the level changed.
    pub fn observe(&mut self, thresholds: &Thresholds, usage_pct: f64) -> Option<Transition> {
        let next = thresholds.next(self.current, usage_pct);
        if next == self.current {
            return None;
        }
        let transition = Transition {
            from: self.current,
            to: next,
        };
        self.current = next;
        Some(transition)
    }
}

/// Default monitor polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_WARNING_PCT: f64 = 75.0;
pub const DEFAULT_CRITICAL_PCT: f64 = 90.0;
pub const DEFAULT_HYSTERESIS_PCT: f64 = 5.0;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_checkpoint() {
        let mut cp = Checkpoint::new(EventSeq::new(100));

        assert!(cp.is_processed(EventSeq::new(50)));
        assert!(cp.is_processed(EventSeq::new(100)));
        assert!(!cp.is_processed(EventSeq::new(101)));

        cp.advance(EventSeq::new(150));
        assert!(cp.is_processed(EventSeq::new(150)));

        cp.advance(EventSeq::new(120));
        assert_eq!(cp.last_seq, EventSeq::new(150));
    }

    #[rstest]
    #[case(Severity::Normal, 50.0, Severity::Normal)]
    #[case(Severity::Normal, 75.0, Severity::Normal)]
    #[case(Severity::Normal, 75.1, Severity::Warning)]
    #[case(Severity::Normal, 95.0, Severity::Critical)]
    #[case(Severity::Warning, 90.5, Severity::Critical)]
    #[case(Severity::Warning, 72.0, Severity::Warning)]
    #[case(Severity::Warning, 69.9, Severity::Normal)]
    #[case(Severity::Critical, 86.0, Severity::Critical)]
    #[case(Severity::Critical, 84.9, Severity::Warning)]
    #[case(Severity::Critical, 72.0, Severity::Warning)]
    #[case(Severity::Critical, 10.0, Severity::Normal)]
    #[case(Severity::Critical, 250.0, Severity::Critical)]
    fn test_threshold_next(
        #[case] current: Severity,
        #[case] usage: f64,
        #[case] expected: Severity,
    ) {
        assert_eq!(Thresholds::default().next(current, usage), expected);
    }

    #[test]
    fn test_tracker_emits_once_per_transition() {
        let thresholds = Thresholds::default();
        let mut tracker = LevelTracker::new();

        let first = tracker.observe(&thresholds, 95.0);
        assert_eq!(
            first,
            Some(Transition {
                from: Severity::Normal,
                to: Severity::Critical
            })
        );
        for _ in 0..5 {
            assert_eq!(tracker.observe(&thresholds, 93.0), None);
        }
        // Inside the hysteresis band: still critical.
        assert_eq!(tracker.observe(&thresholds, 88.0), None);
        assert_eq!(
            tracker.observe(&thresholds, 50.0).map(|t| t.to),
            Some(Severity::Normal)
        );
    }

    #[rstest]
    #[case(90.0, 75.0, 5.0)]
    #[case(0.0, 90.0, 5.0)]
    #[case(75.0, 90.0, 80.0)]
    #[case(75.0, 90.0, -1.0)]
    #[case(f64::NAN, 90.0, 5.0)]
    #[case(75.0, 78.0, 5.0)]
    fn test_invalid_thresholds(#[case] warning: f64, #[case] critical: f64, #[case] hyst: f64) {
        let thresholds = Thresholds {
            warning_pct: warning,
            critical_pct: critical,
            hysteresis_pct: hyst,
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_default_thresholds_valid() {
        assert!(Thresholds::default().validate().is_ok());
    }

    #[test]
    fn test_critical_band_may_touch_warning() {
        let thresholds = Thresholds {
            warning_pct: 75.0,
            critical_pct: 80.0,
            hysteresis_pct: 5.0,
        };
        assert!(thresholds.validate().is_ok());
        assert_eq!(thresholds.next(Severity::Critical, 75.0), Severity::Critical);
        assert_eq!(thresholds.next(Severity::Critical, 74.9), Severity::Warning);
    }
}
