use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;

/// Time-windowed event counter. Events older than the window are evicted on
/// every observation. The clock is injected so tests can advance virtual
/// time instead of sleeping.
pub struct SlidingWindowCounter {
    window: Duration,
    clock: Arc<dyn Clock>,
    events: VecDeque<chrono::DateTime<chrono::Utc>>,
}

impl SlidingWindowCounter {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            events: VecDeque::new(),
        }
    }

    /// Record one event and return the count currently inside the window.
    pub fn observe(&mut self) -> usize {
        let now = self.clock.now();
        self.events.push_back(now);
        self.evict_expired(now);
        self.events.len()
    }

    pub fn count(&mut self) -> usize {
        let now = self.clock.now();
        self.evict_expired(now);
        self.events.len()
    }

    fn evict_expired(&mut self, now: chrono::DateTime<chrono::Utc>) {
        while let Some(&front) = self.events.front() {
            if now - front > self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn events_outside_window_are_evicted() {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let mut counter = SlidingWindowCounter::new(Duration::seconds(10), clock.clone());

        assert_eq!(counter.observe(), 1);
        clock.advance(Duration::seconds(5));
        assert_eq!(counter.observe(), 2);
        clock.advance(Duration::seconds(11));
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn count_does_not_add_a_new_event() {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let mut counter = SlidingWindowCounter::new(Duration::seconds(10), clock);
        counter.observe();
        counter.observe();
        assert_eq!(counter.count(), 2);
        assert_eq!(counter.count(), 2);
    }
}
