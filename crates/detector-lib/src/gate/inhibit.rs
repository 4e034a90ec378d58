//! Inhibition: one metric's anomaly suppresses actions for related metrics

use super::{seconds, GateRejection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `when_metric` fires → suppress actions for `suppress_actions_for_seconds`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InhibitRule {
    pub when_metric: String,
    pub suppress_actions_for_seconds: u64,
    /// Metrics covered by the suppression; empty means every other metric
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
}

impl InhibitRule {
    fn covers(&self, metric: &str) -> bool {
        self.when_metric != metric
            && (self.metrics.is_empty() || self.metrics.iter().any(|m| m == metric))
    }
}

/// Active suppression windows keyed by source metric
#[derive(Debug, Default)]
pub struct InhibitionTable {
    rules: Vec<InhibitRule>,
    until: HashMap<String, DateTime<Utc>>,
}

impl InhibitionTable {
    pub fn new(rules: Vec<InhibitRule>) -> Self {
        Self {
            rules,
            until: HashMap::new(),
        }
    }

    /// Decide whether a detection on `metric` may proceed.
    ///
    /// A source metric arms its window and is itself rejected, including on
    /// its first firing. Any other metric is rejected while a covering
    /// window is open.
    pub fn admit(&mut self, metric: &str, now: DateTime<Utc>) -> Result<(), GateRejection> {
        let armed = self
            .rules
            .iter()
            .filter(|rule| rule.when_metric == metric)
            .map(|rule| {
                now.checked_add_signed(seconds(rule.suppress_actions_for_seconds))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            })
            .max();

        if let Some(until) = armed {
            self.until.insert(metric.to_string(), until);
            return Err(GateRejection::InhibitionArmed {
                metric: metric.to_string(),
                until,
            });
        }

        for rule in self.rules.iter().filter(|rule| rule.covers(metric)) {
            if let Some(&until) = self.until.get(&rule.when_metric) {
                if until > now {
                    return Err(GateRejection::Inhibited {
                        source: rule.when_metric.clone(),
                        until,
                    });
                }
            }
        }

        Ok(())
    }

    /// End of the suppression window armed by `source`, if any
    pub fn suppressed_until(&self, source: &str) -> Option<DateTime<Utc>> {
        self.until.get(source).copied()
    }

    pub fn rules(&self) -> &[InhibitRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn rule(source: &str, secs: u64, metrics: &[&str]) -> InhibitRule {
        InhibitRule {
            when_metric: source.to_string(),
            suppress_actions_for_seconds: secs,
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_source_rejected_on_first_firing() {
        let mut table = InhibitionTable::new(vec![rule("error_rate", 300, &[])]);
        let result = table.admit("error_rate", t(0));
        assert!(matches!(result, Err(GateRejection::InhibitionArmed { .. })));
        assert_eq!(table.suppressed_until("error_rate"), Some(t(300)));
    }

    #[test]
    fn test_other_metrics_suppressed_while_window_open() {
        let mut table = InhibitionTable::new(vec![rule("error_rate", 300, &[])]);
        assert!(table.admit("cpu_p99", t(0)).is_ok());

        let _ = table.admit("error_rate", t(10));
        let result = table.admit("cpu_p99", t(309));
        match result {
            Err(GateRejection::Inhibited { source, .. }) => assert_eq!(source, "error_rate"),
            other => panic!("expected inhibition, got {:?}", other),
        }
        assert!(table.admit("cpu_p99", t(310)).is_ok());
    }

    #[test]
    fn test_rule_scoped_to_listed_metrics() {
        let mut table = InhibitionTable::new(vec![rule("error_rate", 300, &["latency"])]);
        let _ = table.admit("error_rate", t(0));
        assert!(table.admit("cpu_p99", t(5)).is_ok());
        assert!(table.admit("latency", t(5)).is_err());
    }

    #[test]
    fn test_source_rearms_on_every_firing() {
        let mut table = InhibitionTable::new(vec![rule("error_rate", 60, &[])]);
        let _ = table.admit("error_rate", t(0));
        let _ = table.admit("error_rate", t(50));
        assert_eq!(table.suppressed_until("error_rate"), Some(t(110)));
        assert!(table.admit("cpu", t(100)).is_err());
    }

    #[test]
    fn test_oversized_window_saturates() {
        let mut table = InhibitionTable::new(vec![rule("error_rate", u64::MAX, &[])]);
        let result = table.admit("error_rate", t(0));
        assert!(matches!(result, Err(GateRejection::InhibitionArmed { .. })));
        assert_eq!(
            table.suppressed_until("error_rate"),
            Some(DateTime::<Utc>::MAX_UTC)
        );
        assert!(table.admit("cpu_p99", t(10)).is_err());
    }

    #[test]
    fn test_no_rules_admits_everything() {
        let mut table = InhibitionTable::default();
        assert!(table.admit("anything", t(0)).is_ok());
    }
}
