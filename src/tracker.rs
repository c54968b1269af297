use crate::evaluation::ResultRef;
use crate::types::ParameterVector;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Best (lowest) objective value observed so far and where it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub value: f64,
    pub parameters: ParameterVector,
    pub reference: ResultRef,
}

/// Run-wide (or process-wide) record of the best successful evaluation.
///
/// Shared through `Arc` by every evaluator that reports to it. Updates are
/// lower-value-wins, so the order in which concurrent outcomes arrive does
/// not change the final answer.
#[derive(Debug, Default)]
pub struct BestResultTracker {
    best: Mutex<Option<BestResult>>,
}

impl BestResultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the best result if `value` is strictly lower.
    ///
    /// Returns `true` when the candidate became the new best. Non-finite
    /// values are never accepted.
    pub fn offer(&self, value: f64, parameters: &[f64], reference: &ResultRef) -> bool {
        if !value.is_finite() {
            return false;
        }

        let mut best = self.best.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match best.as_ref() {
            Some(current) if current.value <= value => false,
            _ => {
                *best = Some(BestResult {
                    value,
                    parameters: parameters.to_vec(),
                    reference: reference.clone(),
                });
                true
            }
        }
    }

    /// Offer a previously recorded best, e.g. one restored from a checkpoint.
    pub fn restore(&self, result: &BestResult) -> bool {
        self.offer(result.value, &result.parameters, &result.reference)
    }

    pub fn best(&self) -> Option<BestResult> {
        self.best
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best().map(|b| b.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn reference(i: usize) -> ResultRef {
        ResultRef::new(format!("job-{i}"))
    }

    #[test]
    fn starts_empty() {
        let tracker = BestResultTracker::new();
        assert!(tracker.best().is_none());
    }

    #[test]
    fn only_strictly_lower_values_replace() {
        let tracker = BestResultTracker::new();

        assert!(tracker.offer(3.0, &[1.0], &reference(0)));
        assert!(!tracker.offer(3.0, &[2.0], &reference(1)));
        assert!(!tracker.offer(4.0, &[3.0], &reference(2)));
        assert!(tracker.offer(-1.0, &[4.0], &reference(3)));

        let best = tracker.best().unwrap();
        assert_eq!(best.value, -1.0);
        assert_eq!(best.parameters, vec![4.0]);
        assert_eq!(best.reference, reference(3));
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let tracker = BestResultTracker::new();
        assert!(!tracker.offer(f64::NAN, &[0.0], &reference(0)));
        assert!(!tracker.offer(f64::NEG_INFINITY, &[0.0], &reference(1)));
        assert!(tracker.best().is_none());
    }

    #[test]
    fn tracked_value_is_running_minimum() {
        let mut rng = StdRng::seed_from_u64(7);
        let tracker = BestResultTracker::new();
        let mut minimum = f64::INFINITY;
        let mut previous = f64::INFINITY;

        for i in 0..500 {
            let value: f64 = rng.gen_range(-100.0..100.0);
            // Roughly a third of the evaluations fail and never reach the tracker.
            if rng.gen_bool(0.3) {
                continue;
            }
            tracker.offer(value, &[value], &reference(i));
            minimum = minimum.min(value);

            let best = tracker.best_value().unwrap();
            assert_eq!(best, minimum);
            assert!(best <= previous);
            previous = best;
        }
    }

    #[test]
    fn concurrent_offers_keep_the_minimum() {
        let tracker = Arc::new(BestResultTracker::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let value = ((t * 200 + i) as f64 * 0.37).sin() + t as f64;
                        tracker.offer(value, &[value], &reference(t * 200 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let expected = (0..8)
            .flat_map(|t| (0..200).map(move |i| ((t * 200 + i) as f64 * 0.37).sin() + t as f64))
            .fold(f64::INFINITY, f64::min);
        assert_eq!(tracker.best_value(), Some(expected));
    }
}
