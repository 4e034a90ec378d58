//! Per-target cooldown

use super::{seconds, GateRejection};
use crate::models::TargetKey;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Last permitted action per target
#[derive(Debug)]
pub struct CooldownTable {
    cooldown: Duration,
    last: HashMap<TargetKey, DateTime<Utc>>,
}

impl CooldownTable {
    pub fn new(cooldown_seconds: u64) -> Self {
        Self {
            cooldown: seconds(cooldown_seconds),
            last: HashMap::new(),
        }
    }

    /// Grant and stamp `now`, or reject while the previous grant is within the
    /// cooldown. The stamp is taken at grant time, so a slow or failing action
    /// still holds the slot.
    pub fn allow(&mut self, key: &TargetKey, now: DateTime<Utc>) -> Result<(), GateRejection> {
        let cooldown = self.cooldown;
        self.last.retain(|_, granted| now - *granted < cooldown);

        if let Some(&granted) = self.last.get(key) {
            let remaining = cooldown - (now - granted);
            return Err(GateRejection::CooldownActive {
                target: key.to_string(),
                remaining_secs: remaining.num_seconds(),
            });
        }

        self.last.insert(key.clone(), now);
        Ok(())
    }

    pub fn last_granted(&self, key: &TargetKey) -> Option<DateTime<Utc>> {
        self.last.get(key).copied()
    }

    pub fn cooldown_seconds(&self) -> i64 {
        self.cooldown.num_seconds()
    }
}
