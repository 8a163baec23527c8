use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackPressureLevel {
    Normal,
    Warning,
    InterventionRequired,
    Halted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackPressureEvent {
    pub level: BackPressureLevel,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Aggregates a failure count into Normal -> Warning -> InterventionRequired
/// -> Halted by threshold.
pub struct BackPressure {
    warning_at: u32,
    intervention_at: u32,
    halted_at: u32,
    level: BackPressureLevel,
    history: Vec<BackPressureEvent>,
}

impl BackPressure {
    pub fn new(warning_at: u32, intervention_at: u32, halted_at: u32) -> Self {
        Self {
            warning_at,
            intervention_at,
            halted_at,
            level: BackPressureLevel::Normal,
            history: Vec::new(),
        }
    }

    pub fn level(&self) -> BackPressureLevel {
        self.level
    }

    pub fn record_failure_count(&mut self, count: u32, reason: &str, now: DateTime<Utc>) -> BackPressureLevel {
        let new_level = if count >= self.halted_at {
            BackPressureLevel::Halted
        } else if count >= self.intervention_at {
            BackPressureLevel::InterventionRequired
        } else if count >= self.warning_at {
            BackPressureLevel::Warning
        } else {
            BackPressureLevel::Normal
        };

        if new_level != self.level {
            self.level = new_level;
            self.history.push(BackPressureEvent {
                level: new_level,
                reason: reason.to_string(),
                at: now,
            });
        }
        self.level
    }

    pub fn reset(&mut self) {
        self.level = BackPressureLevel::Normal;
    }

    pub fn history(&self) -> &[BackPressureEvent] {
        &self.history
    }
}
