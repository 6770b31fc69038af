//! Gesture module for the music question
//!
//! Classifies thumbs-up / thumbs-down from hand landmarks and requires the
//! gesture to be held before it is accepted as an answer.

mod confirmer;
mod geometry;

pub use confirmer::{GestureConfirmer, HoldResult};
pub use geometry::{classify_gesture, compute_geometry, Gesture, HandLandmarks};

#[cfg(test)]
pub(crate) use geometry::fixtures;
