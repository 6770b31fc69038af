//! Timers and flags the flow state machine tracks alongside its state

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// How the visitor answered the music question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicResponse {
    None,
    Yes,
    No,
    Timeout,
}

impl Default for MusicResponse {
    fn default() -> Self {
        Self::None
    }
}

/// Mutable session data owned by the flow state machine
///
/// Read-only outside the machine; every field returns to its default when
/// the machine re-enters Idle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowContext {
    pub task_started_at: Option<Instant>,
    pub interruption_started_at: Option<Instant>,
    pub last_music_asked_at: Option<Instant>,
    pub person_arrived_at: Option<Instant>,
    /// Start of the current absence while in PersonArrived
    pub inactivity_started_at: Option<Instant>,
    pub gesture_window_started_at: Option<Instant>,
    pub music_already_asked_this_task: bool,
    pub music_response: MusicResponse,
    pub gesture_detection_active: bool,
}

impl FlowContext {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Time since the current task started
    pub fn task_duration(&self, now: Instant) -> Option<Duration> {
        self.task_started_at
            .map(|at| now.saturating_duration_since(at))
    }

    /// True when the music question was never asked or the last ask is
    /// older than `cooldown`
    pub fn cooldown_elapsed(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_music_asked_at
            .map_or(true, |at| now.saturating_duration_since(at) > cooldown)
    }

    /// Time the person has been gone while in PersonArrived
    pub fn inactivity(&self, now: Instant) -> Option<Duration> {
        self.inactivity_started_at
            .map(|at| now.saturating_duration_since(at))
    }

    pub fn gesture_window(&self, now: Instant) -> Option<Duration> {
        self.gesture_window_started_at
            .map(|at| now.saturating_duration_since(at))
    }

    /// Start or stop the absence timer from the latest presence flag
    pub(super) fn observe_presence(&mut self, person_present: bool, now: Instant) {
        if person_present {
            self.inactivity_started_at = None;
        } else if self.inactivity_started_at.is_none() {
            self.inactivity_started_at = Some(now);
        }
    }

    /// Forget the current task; the last ask time is kept for the cooldown
    pub(super) fn close_task(&mut self) {
        self.task_started_at = None;
        self.music_already_asked_this_task = false;
        self.gesture_window_started_at = None;
        self.gesture_detection_active = false;
    }
}
