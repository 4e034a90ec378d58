//! Trend detection via least-squares slope over the history

use super::stats::linear_regression_slope;

/// Minimum samples before a slope is fitted
pub const MIN_HISTORY: usize = 6;

/// Slope per sample, or `None` on insufficient data
pub fn score(history: &[f64]) -> Option<f64> {
    if history.len() < MIN_HISTORY {
        return None;
    }
    Some(linear_regression_slope(history))
}

/// True when the fitted slope strictly exceeds `slope_threshold`
pub fn check(history: &[f64], slope_threshold: f64) -> bool {
    score(history).is_some_and(|m| m > slope_threshold)
}
