//! Churn and loop detectors (§4.E): three independent devices plus a
//! back-pressure state machine that aggregates their signal.

pub mod backpressure;
pub mod churn;
pub mod circular;
pub mod sliding_window;

pub use backpressure::{BackPressure, BackPressureLevel};
pub use churn::ChurnDetector;
pub use circular::CircularBehaviorDetector;
pub use sliding_window::SlidingWindowCounter;
