/// Derived alert condition for one class count.
///
/// Never stored independently of its inputs; callers recompute on every new
/// aggregation rather than caching, so the alert can never go stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertState {
    pub class_name: String,
    pub observed_count: u32,
    pub threshold: u32,
    pub is_triggered: bool,
}

/// Evaluate the alert condition for a class count.
///
/// Pure and total; equality at the threshold boundary counts as triggered.
pub fn evaluate(class_name: &str, observed_count: u32, threshold: u32) -> AlertState {
    AlertState {
        class_name: class_name.to_string(),
        observed_count,
        threshold,
        is_triggered: observed_count >= threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_not_triggered() {
        let state = evaluate("apple", 4, 5);
        assert!(!state.is_triggered);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let state = evaluate("apple", 5, 5);
        assert!(state.is_triggered);
    }

    #[test]
    fn test_above_threshold_triggered() {
        let state = evaluate("apple", 12, 5);
        assert!(state.is_triggered);
        assert_eq!(state.observed_count, 12);
        assert_eq!(state.threshold, 5);
    }

    #[test]
    fn test_matches_comparison_for_sampled_inputs() {
        for threshold in 0..20u32 {
            for count in 0..20u32 {
                let state = evaluate("pear", count, threshold);
                assert_eq!(state.is_triggered, count >= threshold);
            }
        }
    }

    #[test]
    fn test_zero_threshold_always_triggers() {
        assert!(evaluate("lemon", 0, 0).is_triggered);
    }
}
