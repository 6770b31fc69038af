//! Errors for input arriving from the external inference process
//!
//! None of these cross the controller boundary: they are logged and the
//! tick is treated as signal absence.

use thiserror::Error;

/// Number of landmarks produced by the hand-landmark model
pub const LANDMARK_COUNT: usize = 21;

/// Number of classes produced by the presence classifier
pub const CLASS_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("class id {0} is outside 1..=4")]
    ClassIdOutOfRange(u8),

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),

    #[error("expected {expected} class confidences, got {actual}")]
    ConfidenceVectorLength { expected: usize, actual: usize },

    #[error("expected {expected} hand landmarks, got {actual}")]
    LandmarkCount { expected: usize, actual: usize },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}
