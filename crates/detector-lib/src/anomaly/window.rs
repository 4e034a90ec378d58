//! Threshold held for a duration

/// True when `value` is above `gt` and the condition has held for at least
/// `for_seconds`. The streak is maintained by the sample store.
pub fn check(value: f64, gt: f64, for_seconds: u64, streak_secs: u64) -> bool {
    value > gt && streak_secs >= for_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_both_value_and_duration() {
        assert!(!check(0.9, 0.5, 60, 45));
        assert!(check(0.9, 0.5, 60, 60));
        assert!(!check(0.4, 0.5, 60, 600));
        assert!(!check(0.5, 0.5, 0, 15));
    }
}
