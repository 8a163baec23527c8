use std::collections::HashMap;

/// Per-task consecutive-failure counter. A success resets the counter to
/// zero; escalation fires once the counter reaches `threshold`.
pub struct ChurnDetector {
    threshold: u32,
    counts: HashMap<String, u32>,
    history: HashMap<String, Vec<FailureEvent>>,
}

#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub reason: String,
}

const MAX_HISTORY: usize = 20;

impl ChurnDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counts: HashMap::new(),
            history: HashMap::new(),
        }
    }

    pub fn record_failure(&mut self, task_id: &str, reason: &str) -> u32 {
        let count = self.counts.entry(task_id.to_string()).or_insert(0);
        *count += 1;
        let entry = self.history.entry(task_id.to_string()).or_default();
        entry.push(FailureEvent {
            reason: reason.to_string(),
        });
        if entry.len() > MAX_HISTORY {
            entry.remove(0);
        }
        *count
    }

    pub fn record_success(&mut self, task_id: &str) {
        self.counts.remove(task_id);
    }

    pub fn consecutive_failures(&self, task_id: &str) -> u32 {
        self.counts.get(task_id).copied().unwrap_or(0)
    }

    pub fn is_escalated(&self, task_id: &str) -> bool {
        self.consecutive_failures(task_id) >= self.threshold
    }

    pub fn history(&self, task_id: &str) -> &[FailureEvent] {
        self.history.get(task_id).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_at_threshold() {
        let mut d = ChurnDetector::new(3);
        d.record_failure("t1", "compile error");
        d.record_failure("t1", "compile error");
        assert!(!d.is_escalated("t1"));
        d.record_failure("t1", "compile error");
        assert!(d.is_escalated("t1"));
    }

    #[test]
    fn success_resets_the_counter() {
        let mut d = ChurnDetector::new(3);
        d.record_failure("t1", "x");
        d.record_failure("t1", "x");
        d.record_success("t1");
        assert_eq!(d.consecutive_failures("t1"), 0);
    }

    #[test]
    fn tasks_are_tracked_independently() {
        let mut d = ChurnDetector::new(2);
        d.record_failure("t1", "x");
        d.record_failure("t1", "x");
        assert!(d.is_escalated("t1"));
        assert!(!d.is_escalated("t2"));
    }
}
