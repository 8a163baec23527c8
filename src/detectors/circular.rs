use std::collections::HashMap;

use crate::sections::hash_hex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResourceAction {
    resource_id: String,
    action: String,
}

#[derive(Default, Clone)]
struct Observation {
    count: u32,
    last_content_hash: Option<String>,
    unchanged_streak: u32,
}

/// Distinguishes "read the same file 3 times and it never changed" (needs
/// intervention) from "read it 3 times and it changed each time" (fine).
pub struct CircularBehaviorDetector {
    threshold: u32,
    observations: HashMap<ResourceAction, Observation>,
}

impl CircularBehaviorDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            observations: HashMap::new(),
        }
    }

    /// Record one access and classify whether intervention is now needed.
    pub fn observe(&mut self, resource_id: &str, action: &str, content: &str) -> bool {
        let key = ResourceAction {
            resource_id: resource_id.to_string(),
            action: action.to_string(),
        };
        let content_hash = hash_hex(content);
        let entry = self.observations.entry(key).or_default();
        entry.count += 1;

        match &entry.last_content_hash {
            Some(prev) if *prev == content_hash => entry.unchanged_streak += 1,
            _ => entry.unchanged_streak = 1,
        }
        entry.last_content_hash = Some(content_hash);

        entry.unchanged_streak >= self.threshold
    }

    /// Clear all observations; called once per iteration.
    pub fn reset(&mut self) {
        self.observations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_unchanged_content_needs_intervention() {
        let mut d = CircularBehaviorDetector::new(3);
        assert!(!d.observe("src/main.rs", "read_file", "fn main() {}"));
        assert!(!d.observe("src/main.rs", "read_file", "fn main() {}"));
        assert!(d.observe("src/main.rs", "read_file", "fn main() {}"));
    }

    #[test]
    fn changing_content_never_triggers() {
        let mut d = CircularBehaviorDetector::new(3);
        assert!(!d.observe("src/main.rs", "read_file", "v1"));
        assert!(!d.observe("src/main.rs", "read_file", "v2"));
        assert!(!d.observe("src/main.rs", "read_file", "v3"));
    }

    #[test]
    fn reset_clears_all_streaks() {
        let mut d = CircularBehaviorDetector::new(2);
        d.observe("a", "read_file", "x");
        d.reset();
        assert!(!d.observe("a", "read_file", "x"));
    }

    #[test]
    fn different_resources_are_independent() {
        let mut d = CircularBehaviorDetector::new(2);
        d.observe("a", "read_file", "x");
        assert!(!d.observe("b", "read_file", "x"));
    }
}
