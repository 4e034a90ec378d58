//! Z-score detection against the raw history

use super::stats::{mean, std_dev_or_one};

/// Minimum samples before a z-score is computed
pub const MIN_HISTORY: usize = 10;

/// Standard score of `value` against `history`, or `None` on insufficient data
pub fn score(value: f64, history: &[f64]) -> Option<f64> {
    if history.len() < MIN_HISTORY {
        return None;
    }
    Some((value - mean(history)) / std_dev_or_one(history))
}

/// True when the z-score strictly exceeds `threshold`
pub fn check(value: f64, history: &[f64], threshold: f64) -> bool {
    score(value, history).is_some_and(|z| z > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_history_never_fires() {
        let history = [10.0; MIN_HISTORY - 1];
        assert!(!check(1e12, &history, 0.0));
        assert!(score(1e12, &history).is_none());
    }

    #[test]
    fn test_flat_history_scores_raw_difference() {
        let history = [10.0; 10];
        assert_eq!(score(13.5, &history), Some(3.5));
        assert!(!check(10.0, &history, 0.0));
        assert!(check(10.5, &history, 0.0));
    }

    #[test]
    fn test_spike_over_baseline_fires() {
        let mut history = vec![10.0; 10];
        history.push(50.0);
        assert!(check(50.0, &history, 3.0));
    }

    #[test]
    fn test_normal_variation_does_not_fire() {
        let history: Vec<f64> = (0..60).map(|i| 0.5 + (i % 10) as f64 * 0.01).collect();
        assert!(!check(0.55, &history, 3.0));
    }

    #[test]
    fn test_score_monotonic_in_value() {
        let history: Vec<f64> = (0..30).map(|i| (i % 7) as f64).collect();
        let mut previous = f64::NEG_INFINITY;
        for step in 0..50 {
            let z = score(step as f64 * 0.5, &history).unwrap();
            assert!(z > previous);
            previous = z;
        }
    }
}
