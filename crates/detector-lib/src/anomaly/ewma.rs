//! Z-score against an exponentially weighted moving average of the history

use super::stats::{mean, std_dev_or_one};

/// Minimum samples before the EWMA is computed
pub const MIN_HISTORY: usize = 10;

/// Smoothing factor `2 / (1 + max(2, span / step))`, using whole polls
pub fn alpha(span_seconds: u64, poll_step_seconds: u64) -> f64 {
    let periods = span_seconds / poll_step_seconds.max(1);
    2.0 / (1.0 + periods.max(2) as f64)
}

/// EWMA series seeded with the first sample
pub fn smooth(history: &[f64], alpha: f64) -> Vec<f64> {
    let Some(&first) = history.first() else {
        return Vec::new();
    };
    let mut s = first;
    history
        .iter()
        .map(|&x| {
            s = alpha * x + (1.0 - alpha) * s;
            s
        })
        .collect()
}

/// Z-score of `value` against the smoothed series, or `None` on insufficient data
pub fn score(
    value: f64,
    history: &[f64],
    span_seconds: u64,
    poll_step_seconds: u64,
) -> Option<f64> {
    if history.len() < MIN_HISTORY {
        return None;
    }
    let smoothed = smooth(history, alpha(span_seconds, poll_step_seconds));
    Some((value - mean(&smoothed)) / std_dev_or_one(&smoothed))
}

/// True when the EWMA z-score strictly exceeds `z_threshold`
pub fn check(
    value: f64,
    history: &[f64],
    z_threshold: f64,
    span_seconds: u64,
    poll_step_seconds: u64,
) -> bool {
    score(value, history, span_seconds, poll_step_seconds).is_some_and(|z| z > z_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_uses_whole_periods_with_floor() {
        assert!((alpha(300, 15) - 2.0 / 21.0).abs() < 1e-12);
        assert!((alpha(20, 15) - 2.0 / 3.0).abs() < 1e-12);
        assert!((alpha(0, 15) - 2.0 / 3.0).abs() < 1e-12);
        assert!((alpha(100, 0) - 2.0 / 101.0).abs() < 1e-12);
    }

    #[test]
    fn test_smooth_seeds_with_first_sample() {
        let smoothed = smooth(&[10.0, 20.0], 0.5);
        assert_eq!(smoothed, vec![10.0, 15.0]);
        assert!(smooth(&[], 0.5).is_empty());
    }

    #[test]
    fn test_insufficient_history_never_fires() {
        let history = [1.0; MIN_HISTORY - 1];
        assert!(!check(1e9, &history, 0.0, 300, 15));
    }

    #[test]
    fn test_flat_history_scores_raw_difference() {
        let history = [4.0; 20];
        let z = score(9.0, &history, 300, 15).unwrap();
        assert!((z - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_jump_over_smoothed_baseline_fires() {
        let mut history: Vec<f64> = (0..40).map(|i| 100.0 + (i % 3) as f64).collect();
        history.push(400.0);
        assert!(check(400.0, &history, 3.0, 300, 15));
        assert!(!check(101.0, &history, 3.0, 300, 15));
    }

    #[test]
    fn test_score_monotonic_in_value() {
        let history: Vec<f64> = (0..30).map(|i| (i % 5) as f64 * 2.0).collect();
        let low = score(1.0, &history, 120, 10).unwrap();
        let high = score(2.0, &history, 120, 10).unwrap();
        assert!(high > low);
    }
}
