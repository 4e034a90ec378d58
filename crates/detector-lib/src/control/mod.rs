//! The detect → gate → dispatch pipeline
//!
//! One tick samples every configured metric in order, appends the value to
//! its window, runs the metric's detector, passes positive detections
//! through the gate chain and hands admitted ones to the executor.

mod r#loop;


pub use r#loop::{ControlLoop, ControlLoopBuilder};

use crate::actuator::ActionOutcome;
use crate::gate::GateRejection;
use chrono::{DateTime, Utc};

/// Terminal state of one metric on one tick
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    /// The source query failed; nothing was appended
    FetchFailed(String),
    /// Detector returned false (including short history)
    NotDetected { score: Option<f64> },
    /// Detector fired but has not yet fired `required` ticks in a row
    Pending { hits: u32, required: u32 },
    Rejected(GateRejection),
    /// Admitted while dry-run is on; the executor was not called
    DryRun,
    Dispatched(ActionOutcome),
}

impl MetricOutcome {
    pub fn is_detected(&self) -> bool {
        matches!(
            self,
            MetricOutcome::Rejected(_) | MetricOutcome::DryRun | MetricOutcome::Dispatched(_)
        )
    }
}

/// Summary of one tick, in configuration order
#[derive(Debug, Clone)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub outcomes: Vec<(String, MetricOutcome)>,
}

impl TickReport {
    pub fn outcome(&self, metric: &str) -> Option<&MetricOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, outcome)| outcome)
    }

    pub fn dispatched(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, MetricOutcome::Dispatched(_)))
            .count()
    }

    pub fn fetch_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, MetricOutcome::FetchFailed(_)))
            .count()
    }
}
