//! Presence signal module
//!
//! Turns the classifier's noisy per-frame output into a debounced stable
//! class and the (person present, water on) signal derived from it.

mod sample;
mod smoother;

pub use sample::{ClassificationSample, DerivedSignal, PresenceClass};
pub use smoother::{SignalSmoother, SmoothingResult, VoteCounts};
