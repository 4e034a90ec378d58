//! Gates between a detected anomaly and a remediation action
//!
//! Evaluated strictly in order, each stage can only reject:
//! 1. Inhibition, keyed by metric name
//! 2. Cooldown, keyed by target
//! 3. Budget, global and keyed by target
//!
//! All state lives in an explicitly owned `GateChain`, never in globals.

mod budget;
mod cooldown;
mod inhibit;

pub use budget::{BudgetTracker, BUDGET_WINDOW_SECS};
pub use cooldown::CooldownTable;
pub use inhibit::{InhibitRule, InhibitionTable};

use crate::config::DetectorConfig;
use crate::models::TargetKey;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::Level;

/// Convert configured seconds to a signed duration, saturating instead of
/// overflowing
pub(crate) fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Gate stage names, used as metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    Inhibition,
    Cooldown,
    Budget,
}

impl GateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::Inhibition => "inhibition",
            GateKind::Cooldown => "cooldown",
            GateKind::Budget => "budget",
        }
    }

    /// Level a rejection by this gate is logged at. Cooldown rejections are
    /// expected while a target settles; the others mean actions are held back.
    pub fn log_level(&self) -> Level {
        match self {
            GateKind::Cooldown => Level::INFO,
            GateKind::Inhibition | GateKind::Budget => Level::WARN,
        }
    }
}

/// Which budget window ran out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetScope {
    Global,
    Target(String),
}

/// Why a detection was not allowed to act. A policy outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    /// The metric is an inhibition source; its window was (re)armed
    InhibitionArmed {
        metric: String,
        until: DateTime<Utc>,
    },
    /// Another metric's suppression window is open
    Inhibited {
        source: String,
        until: DateTime<Utc>,
    },
    CooldownActive {
        target: String,
        remaining_secs: i64,
    },
    BudgetExhausted {
        scope: BudgetScope,
        limit: usize,
    },
}

impl GateRejection {
    pub fn gate(&self) -> GateKind {
        match self {
            GateRejection::InhibitionArmed { .. } | GateRejection::Inhibited { .. } => {
                GateKind::Inhibition
            }
            GateRejection::CooldownActive { .. } => GateKind::Cooldown,
            GateRejection::BudgetExhausted { .. } => GateKind::Budget,
        }
    }
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRejection::InhibitionArmed { metric, until } => {
                write!(f, "inhibited by {} until {}", metric, until.to_rfc3339())
            }
            GateRejection::Inhibited { source, until } => {
                write!(f, "suppressed by {} until {}", source, until.to_rfc3339())
            }
            GateRejection::CooldownActive {
                target,
                remaining_secs,
            } => write!(f, "cooldown active for {} ({}s left)", target, remaining_secs),
            GateRejection::BudgetExhausted {
                scope: BudgetScope::Global,
                limit,
            } => write!(f, "global budget of {} actions/hour exhausted", limit),
            GateRejection::BudgetExhausted {
                scope: BudgetScope::Target(target),
                limit,
            } => write!(
                f,
                "budget of {} actions/hour exhausted for {}",
                limit, target
            ),
        }
    }
}

/// Inhibition → cooldown → budget. A stage left unconfigured always passes.
#[derive(Debug, Default)]
pub struct GateChain {
    inhibition: InhibitionTable,
    cooldown: Option<CooldownTable>,
    budget: Option<BudgetTracker>,
}

impl GateChain {
    /// A chain with no gates configured
    pub fn new() -> Self {
        Self::default()
    }

    /// Build all three stages from detector configuration
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new()
            .with_inhibition(config.inhibit.clone())
            .with_cooldown(config.cooldown_seconds)
            .with_budget(
                config.budgets.global_per_hour,
                config.budgets.per_target_per_hour,
            )
    }

    pub fn with_inhibition(mut self, rules: Vec<InhibitRule>) -> Self {
        self.inhibition = InhibitionTable::new(rules);
        self
    }

    pub fn with_cooldown(mut self, cooldown_seconds: u64) -> Self {
        self.cooldown = Some(CooldownTable::new(cooldown_seconds));
        self
    }

    pub fn with_budget(mut self, global_per_hour: usize, per_target_per_hour: usize) -> Self {
        self.budget = Some(BudgetTracker::new(global_per_hour, per_target_per_hour));
        self
    }

    /// Run every stage for a detection on `metric` acting on `target`.
    ///
    /// Stages run in order and the first rejection stops the chain. Grants
    /// made by earlier stages are not rolled back when a later stage rejects.
    pub fn admit(
        &mut self,
        metric: &str,
        target: &TargetKey,
        now: DateTime<Utc>,
    ) -> Result<(), GateRejection> {
        self.inhibition.admit(metric, now)?;
        if let Some(cooldown) = self.cooldown.as_mut() {
            cooldown.allow(target, now)?;
        }
        if let Some(budget) = self.budget.as_mut() {
            budget.allow(target, now)?;
        }
        Ok(())
    }

    pub fn inhibition(&self) -> &InhibitionTable {
        &self.inhibition
    }

    pub fn cooldown(&self) -> Option<&CooldownTable> {
        self.cooldown.as_ref()
    }

    pub fn budget(&self) -> Option<&BudgetTracker> {
        self.budget.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, ActionTarget};
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn key(name: &str) -> TargetKey {
        TargetKey::new(
            &ActionKind::ScaleDeployment,
            &ActionTarget {
                namespace: "selfheal".to_string(),
                name: Some(name.to_string()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_empty_chain_admits() {
        let mut chain = GateChain::new();
        for s in 0..10 {
            assert!(chain.admit("cpu", &key("api"), t(s)).is_ok());
        }
    }

    #[test]
    fn test_inhibition_runs_before_cooldown() {
        let mut chain = GateChain::new()
            .with_inhibition(vec![InhibitRule {
                when_metric: "errors".to_string(),
                suppress_actions_for_seconds: 120,
                metrics: vec![],
            }])
            .with_cooldown(300);

        let result = chain.admit("errors", &key("api"), t(0));
        assert_eq!(result.unwrap_err().gate(), GateKind::Inhibition);
        // the inhibited firing never reached the cooldown stage
        assert!(chain.cooldown().unwrap().last_granted(&key("api")).is_none());
    }

    #[test]
    fn test_cooldown_consumed_when_budget_rejects() {
        let mut chain = GateChain::new().with_cooldown(60).with_budget(0, 10);

        let result = chain.admit("cpu", &key("api"), t(0));
        assert_eq!(result.unwrap_err().gate(), GateKind::Budget);
        assert_eq!(
            chain.cooldown().unwrap().last_granted(&key("api")),
            Some(t(0))
        );
    }

    #[test]
    fn test_shared_target_rejected_at_cooldown() {
        let mut chain = GateChain::new().with_cooldown(300).with_budget(10, 10);
        assert!(chain.admit("cpu", &key("api"), t(0)).is_ok());
        let result = chain.admit("memory", &key("api"), t(5));
        assert_eq!(result.unwrap_err().gate(), GateKind::Cooldown);
        assert_eq!(chain.budget().unwrap().target_used(&key("api")), 1);
    }

    #[test]
    fn test_rejection_log_levels() {
        assert_eq!(GateKind::Cooldown.log_level(), Level::INFO);
        assert_eq!(GateKind::Inhibition.log_level(), Level::WARN);
        assert_eq!(GateKind::Budget.log_level(), Level::WARN);
    }

    #[test]
    fn test_rejection_messages() {
        let rejection = GateRejection::BudgetExhausted {
            scope: BudgetScope::Global,
            limit: 4,
        };
        assert_eq!(
            rejection.to_string(),
            "global budget of 4 actions/hour exhausted"
        );
        assert_eq!(rejection.gate().as_str(), "budget");
    }
}
