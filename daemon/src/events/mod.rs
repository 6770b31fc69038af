//! Events module for the kiosk's external sinks
//!
//! Everything the presentation, audio and navigation collaborators need is
//! published as a `KioskEvent` on a broadcast channel.

use serde::{Deserialize, Serialize};

use crate::gesture::Gesture;
use crate::signal::{PresenceClass, VoteCounts};
use crate::state::{FlowState, Page, Track};

/// What the audio sink should do with a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioAction {
    Play,
    Stop,
    Pause,
}

impl std::fmt::Display for AudioAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioAction::Play => write!(f, "play"),
            AudioAction::Stop => write!(f, "stop"),
            AudioAction::Pause => write!(f, "pause"),
        }
    }
}

/// Events emitted by the flow controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KioskEvent {
    /// The flow state machine moved to a new state
    StateChanged { from: FlowState, to: FlowState },

    /// The screen should show this logical page
    NavigationRequested { page: Page },

    /// Play, stop or pause a narration track
    AudioCommand { action: AudioAction, track: Track },

    /// Per-tick diagnostics for the debug overlay
    DebugMetrics {
        stable_class: PresenceClass,
        confidence_ratio: f64,
        vote_counts: VoteCounts,
        /// Gesture candidate while the music question is open
        gesture: Gesture,
        /// How long the candidate has been held
        hold_ms: u64,
    },

    /// Frames are being processed
    DetectionStarted,

    /// Frames are ignored and the flow is back in Idle
    DetectionStopped,
}

impl std::fmt::Display for KioskEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KioskEvent::StateChanged { from, to } => {
                write!(f, "STATE_CHANGED ({} -> {})", from, to)
            }
            KioskEvent::NavigationRequested { page } => {
                write!(f, "NAVIGATION_REQUESTED ({})", page)
            }
            KioskEvent::AudioCommand { action, track } => {
                write!(f, "AUDIO_COMMAND ({} {})", action, track)
            }
            KioskEvent::DebugMetrics {
                stable_class,
                confidence_ratio,
                ..
            } => write!(f, "DEBUG_METRICS ({} @ {:.2})", stable_class, confidence_ratio),
            KioskEvent::DetectionStarted => write!(f, "DETECTION_STARTED"),
            KioskEvent::DetectionStopped => write!(f, "DETECTION_STOPPED"),
        }
    }
}
