//! Strict edge trigger over successive observations.

/// Remembers the last observed value and reports only transitions.
///
/// An unprimed trigger takes its first observation as the baseline and
/// reports nothing; [`with_baseline`](Self::with_baseline) starts primed.
#[derive(Debug, Clone)]
pub struct EdgeTrigger<T> {
    last: Option<T>,
}

impl<T> Default for EdgeTrigger<T> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<T: Clone + PartialEq> EdgeTrigger<T> {
    /// An unprimed trigger.
    pub fn new() -> Self {
        Self::default()
    }

    /// A trigger already primed with `baseline`, so the first observation
    /// that differs from it is reported.
    pub fn with_baseline(baseline: T) -> Self {
        Self {
            last: Some(baseline),
        }
    }

    /// Record `value`; return `(previous, current)` if it differs from the
    /// last observation.
    pub fn observe(&mut self, value: T) -> Option<(T, T)> {
        match self.last.replace(value.clone()) {
            Some(previous) if previous != value => Some((previous, value)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_primes_silently() {
        let mut trigger = EdgeTrigger::new();
        assert_eq!(trigger.observe(5), None);
        assert_eq!(trigger.observe(6), Some((5, 6)));
    }

    #[test]
    fn explicit_baseline_reports_first_difference() {
        let mut trigger = EdgeTrigger::with_baseline(0);
        assert_eq!(trigger.observe(4), Some((0, 4)));
        assert_eq!(trigger.observe(4), None);

        let mut quiet = EdgeTrigger::with_baseline(0);
        assert_eq!(quiet.observe(0), None);
    }

    #[test]
    fn repeated_value_fires_once() {
        let mut trigger = EdgeTrigger::new();
        let _ = trigger.observe(3);
        let fired: Vec<_> = [5, 5].into_iter().filter_map(|v| trigger.observe(v)).collect();
        assert_eq!(fired, vec![(3, 5)]);
    }

    #[test]
    fn every_transition_reported() {
        let mut trigger = EdgeTrigger::new();
        let fired: Vec<_> = [1, 2, 2, 1, 1, 3]
            .into_iter()
            .filter_map(|v| trigger.observe(v))
            .collect();
        assert_eq!(fired, vec![(1, 2), (2, 1), (1, 3)]);
    }
}
