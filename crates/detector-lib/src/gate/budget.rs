//! Hourly action budgets, global and per target

use super::{BudgetScope, GateRejection};
use crate::models::TargetKey;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

/// Length of the sliding budget window
pub const BUDGET_WINDOW_SECS: i64 = 3600;

/// Sliding one-hour windows of granted actions
#[derive(Debug)]
pub struct BudgetTracker {
    global_limit: usize,
    target_limit: usize,
    global: VecDeque<DateTime<Utc>>,
    per_target: HashMap<TargetKey, VecDeque<DateTime<Utc>>>,
}

impl BudgetTracker {
    pub fn new(global_limit: usize, target_limit: usize) -> Self {
        Self {
            global_limit,
            target_limit,
            global: VecDeque::new(),
            per_target: HashMap::new(),
        }
    }

    /// Drop grants strictly older than one hour
    fn prune(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(BUDGET_WINDOW_SECS);
        while let Some(ts) = window.front() {
            if *ts < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Prune, check both limits, then record the grant in both windows
    pub fn allow(&mut self, key: &TargetKey, now: DateTime<Utc>) -> Result<(), GateRejection> {
        Self::prune(&mut self.global, now);
        let target = self.per_target.entry(key.clone()).or_default();
        Self::prune(target, now);

        if self.global.len() >= self.global_limit {
            return Err(GateRejection::BudgetExhausted {
                scope: BudgetScope::Global,
                limit: self.global_limit,
            });
        }
        if target.len() >= self.target_limit {
            return Err(GateRejection::BudgetExhausted {
                scope: BudgetScope::Target(key.to_string()),
                limit: self.target_limit,
            });
        }

        self.global.push_back(now);
        target.push_back(now);
        Ok(())
    }

    /// Grants currently held in the global window (as of the last prune)
    pub fn global_used(&self) -> usize {
        self.global.len()
    }

    pub fn target_used(&self, key: &TargetKey) -> usize {
        self.per_target.get(key).map_or(0, VecDeque::len)
    }
}
