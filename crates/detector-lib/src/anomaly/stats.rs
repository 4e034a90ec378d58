//! Descriptive statistics shared by the detectors

/// Arithmetic mean; zero for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by n)
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Standard deviation with a floor of 1.0 when the series has no spread,
/// so a flat baseline scores a raw difference instead of dividing by zero
pub fn std_dev_or_one(values: &[f64]) -> f64 {
    let s = std_dev(values);
    if s < f64::EPSILON {
        1.0
    } else {
        s
    }
}

/// Least-squares slope of values against their index
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_population_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-12);
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_std_floor_for_flat_series() {
        assert_eq!(std_dev(&[10.0; 10]), 0.0);
        assert_eq!(std_dev_or_one(&[10.0; 10]), 1.0);
    }

    #[test]
    fn test_slope_of_line() {
        let values: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();
        assert!((linear_regression_slope(&values) - 0.5).abs() < 1e-9);
        assert_eq!(linear_regression_slope(&[1.0]), 0.0);
    }
}
