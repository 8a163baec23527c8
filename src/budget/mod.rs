//! Atomic token/premium-request budget tracker (§4.D). Never refuses a
//! call itself — it only reports the severity of crossing a threshold, and
//! fires each threshold exactly once per module run.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    ConfirmationRequired,
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetVerdict {
    pub severity: Severity,
    pub fraction_used: f64,
    pub already_notified: bool,
}

/// Ascending thresholds; the standard pipeline uses `[0.8, 0.9]` mapped to
/// `[Warning, ConfirmationRequired]` (§6 `budget_warning_threshold` /
/// `budget_confirmation_threshold`).
pub struct BudgetTracker {
    total: AtomicI64,
    budget: i64,
    thresholds: Vec<(f64, Severity)>,
    highest_crossed: AtomicUsize,
}

const NONE_CROSSED: usize = usize::MAX;

impl BudgetTracker {
    /// `budget <= 0` means unlimited: no threshold ever fires.
    pub fn new(budget: i64, thresholds: Vec<(f64, Severity)>) -> Self {
        let mut thresholds = thresholds;
        thresholds.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        Self {
            total: AtomicI64::new(0),
            budget,
            thresholds,
            highest_crossed: AtomicUsize::new(NONE_CROSSED),
        }
    }

    pub fn with_standard_thresholds(budget: i64, warning: f64, confirmation: f64) -> Self {
        Self::new(
            budget,
            vec![
                (warning, Severity::Warning),
                (confirmation, Severity::ConfirmationRequired),
            ],
        )
    }

    pub fn record(&self, amount: i64) -> BudgetVerdict {
        let new_total = self.total.fetch_add(amount, Ordering::SeqCst) + amount;
        self.verdict_for(new_total)
    }

    pub fn total(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }

    fn fraction(&self, total: i64) -> f64 {
        if self.budget <= 0 {
            0.0
        } else {
            total as f64 / self.budget as f64
        }
    }

    fn verdict_for(&self, total: i64) -> BudgetVerdict {
        let fraction = self.fraction(total);

        if self.budget <= 0 {
            return BudgetVerdict {
                severity: Severity::Info,
                fraction_used: fraction,
                already_notified: false,
            };
        }

        let mut highest_idx = None;
        for (i, (threshold, _)) in self.thresholds.iter().enumerate() {
            if fraction >= *threshold {
                highest_idx = Some(i);
            }
        }

        let Some(idx) = highest_idx else {
            return BudgetVerdict {
                severity: Severity::Info,
                fraction_used: fraction,
                already_notified: false,
            };
        };

        let severity = self.thresholds[idx].1;

        loop {
            let current = self.highest_crossed.load(Ordering::SeqCst);
            let already_past = current != NONE_CROSSED && current >= idx;
            if already_past {
                return BudgetVerdict {
                    severity,
                    fraction_used: fraction,
                    already_notified: true,
                };
            }
            if self
                .highest_crossed
                .compare_exchange(current, idx, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return BudgetVerdict {
                    severity,
                    fraction_used: fraction,
                    already_notified: false,
                };
            }
            // Lost the race; retry against the winner's value.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_never_fires() {
        let tracker = BudgetTracker::with_standard_thresholds(0, 0.8, 0.9);
        let verdict = tracker.record(1_000_000);
        assert_eq!(verdict.severity, Severity::Info);
    }

    #[test]
    fn crosses_warning_then_confirmation() {
        let tracker = BudgetTracker::with_standard_thresholds(100, 0.8, 0.9);
        let first = tracker.record(81);
        assert_eq!(first.severity, Severity::Warning);
        assert!(!first.already_notified);

        let second = tracker.record(1);
        assert_eq!(second.severity, Severity::Warning);
        assert!(second.already_notified);

        let third = tracker.record(9);
        assert_eq!(third.severity, Severity::ConfirmationRequired);
        assert!(!third.already_notified);
    }

    #[test]
    fn fires_exactly_once_under_concurrent_calls() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(BudgetTracker::with_standard_thresholds(100, 0.8, 0.9));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let t = tracker.clone();
            handles.push(thread::spawn(move || t.record(2)));
        }
        let verdicts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(tracker.total(), 100);

        let not_notified_warning = verdicts
            .iter()
            .filter(|v| v.severity == Severity::Warning && !v.already_notified)
            .count();
        assert_eq!(not_notified_warning, 1);
    }

    #[test]
    fn sum_of_recorded_equals_sum_of_inputs() {
        let tracker = BudgetTracker::with_standard_thresholds(1000, 0.8, 0.9);
        for i in 1..=10 {
            tracker.record(i);
        }
        assert_eq!(tracker.total(), (1..=10).sum::<i64>());
    }
}
