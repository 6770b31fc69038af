//! Hold-to-confirm gate for recognized gestures
//!
//! A gesture only counts once it has been seen on every evaluation for the
//! configured hold duration. One confirmation is emitted per gesture window;
//! after that the confirmer ignores input until it is reset.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::geometry::Gesture;

/// Outcome of one hold evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldResult {
    /// Gesture currently being held (None when the hold is broken)
    pub candidate: Gesture,
    /// How long the candidate has been held
    pub held_for: Duration,
    /// Set only on the evaluation that confirms the gesture
    pub confirmed: Option<Gesture>,
}

#[derive(Debug, Clone, Copy, Default)]
struct HoldState {
    candidate: Gesture,
    started_at: Option<Instant>,
}

pub struct GestureConfirmer {
    hold_duration: Duration,
    hold: HoldState,
    confirmed: Option<Gesture>,
}

impl GestureConfirmer {
    pub fn new(hold_duration: Duration) -> Self {
        Self {
            hold_duration,
            hold: HoldState::default(),
            confirmed: None,
        }
    }

    /// Gesture confirmed in the current window, if any
    #[cfg(test)]
    pub fn confirmed(&self) -> Option<Gesture> {
        self.confirmed
    }

    /// Feed one evaluation; `Gesture::None` also covers "no hand detected"
    pub fn update(&mut self, gesture: Gesture, now: Instant) -> HoldResult {
        if self.confirmed.is_some() {
            return HoldResult {
                candidate: self.hold.candidate,
                held_for: Duration::ZERO,
                confirmed: None,
            };
        }

        if gesture == Gesture::None {
            if self.hold.started_at.is_some() {
                debug!(candidate = %self.hold.candidate, "gesture hold broken");
            }
            self.hold = HoldState::default();
            return HoldResult {
                candidate: Gesture::None,
                held_for: Duration::ZERO,
                confirmed: None,
            };
        }

        let started_at = match self.hold.started_at {
            Some(at) if self.hold.candidate == gesture => at,
            _ => {
                debug!(candidate = %gesture, "gesture hold started");
                self.hold = HoldState {
                    candidate: gesture,
                    started_at: Some(now),
                };
                now
            }
        };

        let held_for = now.saturating_duration_since(started_at);
        let confirmed = if held_for >= self.hold_duration {
            info!(
                gesture = %gesture,
                held_ms = held_for.as_millis() as u64,
                "gesture confirmed"
            );
            self.confirmed = Some(gesture);
            Some(gesture)
        } else {
            None
        };

        HoldResult {
            candidate: gesture,
            held_for,
            confirmed,
        }
    }

    /// Open a fresh gesture window
    pub fn reset(&mut self) {
        self.hold = HoldState::default();
        self.confirmed = None;
    }
}
