//! Anomaly detection over per-metric sample history
//!
//! Four stateless methods:
//! - zscore: standard score of the latest value against the history
//! - slope: least-squares trend of the history
//! - ewma_zscore: standard score against an exponentially smoothed history
//! - window_threshold: value above a bound for a sustained duration
//!
//! Every method returns false until it has enough history.

pub mod ewma;
pub mod slope;
pub mod stats;
pub mod window;
pub mod zscore;

use crate::models::Detection;

/// Inputs a detector may read for one metric on one tick
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    /// Latest sampled value
    pub value: f64,
    /// History in chronological order, including `value`
    pub history: &'a [f64],
    /// Seconds the window_threshold condition has held
    pub streak_secs: u64,
    /// Poll interval in seconds
    pub poll_step_secs: u64,
}

/// Outcome of a single detector call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub fired: bool,
    /// Method-specific score (z-score, slope or streak seconds); `None` when
    /// there was not enough history to compute one
    pub score: Option<f64>,
}

impl Evaluation {
    fn from_score(score: Option<f64>, threshold: f64) -> Self {
        Self {
            fired: score.is_some_and(|s| s > threshold),
            score,
        }
    }
}

impl Detection {
    /// Run this detection method against one tick's input
    pub fn evaluate(&self, input: &DetectionInput<'_>) -> Evaluation {
        match *self {
            Detection::ZScore { threshold, .. } => {
                Evaluation::from_score(zscore::score(input.value, input.history), threshold)
            }
            Detection::Slope { slope_threshold } => {
                Evaluation::from_score(slope::score(input.history), slope_threshold)
            }
            Detection::EwmaZscore {
                z_threshold,
                span_seconds,
                ..
            } => Evaluation::from_score(
                ewma::score(input.value, input.history, span_seconds, input.poll_step_secs),
                z_threshold,
            ),
            Detection::WindowThreshold { gt, for_seconds } => Evaluation {
                fired: window::check(input.value, gt, for_seconds, input.streak_secs),
                score: Some(input.streak_secs as f64),
            },
        }
    }

    /// Whether the streak condition holds for `value` (window_threshold only)
    pub fn streak_condition(&self, value: f64) -> Option<bool> {
        match *self {
            Detection::WindowThreshold { gt, .. } => Some(value > gt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(value: f64, history: &[f64]) -> DetectionInput<'_> {
        DetectionInput {
            value,
            history,
            streak_secs: 0,
            poll_step_secs: 15,
        }
    }

    #[test]
    fn test_short_history_never_fires_for_any_method() {
        let methods = [
            Detection::ZScore {
                threshold: 0.0,
                consecutive: 1,
            },
            Detection::Slope {
                slope_threshold: -1e9,
            },
            Detection::EwmaZscore {
                z_threshold: 0.0,
                span_seconds: 60,
                consecutive: 1,
            },
        ];
        let history = [1.0, 2.0, 3.0, 1e6, 1e9];
        for method in methods {
            let result = method.evaluate(&input(1e12, &history));
            assert!(!result.fired, "{} fired on short history", method.method());
            assert!(result.score.is_none());
        }
    }

    #[test]
    fn test_zscore_dispatch() {
        let mut history = vec![10.0; 10];
        history.push(50.0);
        let detection = Detection::ZScore {
            threshold: 3.0,
            consecutive: 1,
        };
        let result = detection.evaluate(&input(50.0, &history));
        assert!(result.fired);
        assert!(result.score.unwrap() > 3.0);
    }

    #[test]
    fn test_window_threshold_uses_streak() {
        let detection = Detection::WindowThreshold {
            gt: 0.5,
            for_seconds: 30,
        };
        let history = [0.9];
        let mut tick = input(0.9, &history);
        tick.streak_secs = 15;
        assert!(!detection.evaluate(&tick).fired);
        tick.streak_secs = 30;
        assert!(detection.evaluate(&tick).fired);
        assert_eq!(detection.streak_condition(0.9), Some(true));
        assert_eq!(detection.streak_condition(0.2), Some(false));
    }

    #[test]
    fn test_streak_condition_only_for_window_threshold() {
        let detection = Detection::Slope {
            slope_threshold: 1.0,
        };
        assert_eq!(detection.streak_condition(100.0), None);
    }
}
