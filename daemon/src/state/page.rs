//! Logical pages and narration tracks for each flow state

use serde::{Deserialize, Serialize};

use super::machine::FlowState;

/// Screen the presentation layer shows for a flow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Idle,
    Greeting,
    Task,
    MusicQuestion,
    Music,
    Interruption,
    Relief,
    SessionFinished,
    Goodbye,
}

/// Sound played while a page is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Track {
    Greeting,
    Task,
    MusicQuestion,
    Music,
    Interruption,
    Relief,
    SessionFinished,
    Goodbye,
}

impl Page {
    pub fn for_state(state: FlowState) -> Self {
        match state {
            FlowState::Idle => Page::Idle,
            FlowState::PersonArrived => Page::Greeting,
            FlowState::TaskActive => Page::Task,
            FlowState::LongTask => Page::MusicQuestion,
            FlowState::MusicPlaying => Page::Music,
            FlowState::Interruption => Page::Interruption,
            FlowState::ReturnAfterAbsence => Page::Relief,
            FlowState::SessionFinished => Page::SessionFinished,
            FlowState::SessionEnds => Page::Goodbye,
        }
    }

    /// The idle page is silent
    pub fn track(self) -> Option<Track> {
        match self {
            Page::Idle => None,
            Page::Greeting => Some(Track::Greeting),
            Page::Task => Some(Track::Task),
            Page::MusicQuestion => Some(Track::MusicQuestion),
            Page::Music => Some(Track::Music),
            Page::Interruption => Some(Track::Interruption),
            Page::Relief => Some(Track::Relief),
            Page::SessionFinished => Some(Track::SessionFinished),
            Page::Goodbye => Some(Track::Goodbye),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Page::Idle => "idle",
            Page::Greeting => "greeting",
            Page::Task => "task",
            Page::MusicQuestion => "music-question",
            Page::Music => "music",
            Page::Interruption => "interruption",
            Page::Relief => "relief",
            Page::SessionFinished => "session-finished",
            Page::Goodbye => "goodbye",
        }
    }
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Track::Greeting => "greeting",
            Track::Task => "task",
            Track::MusicQuestion => "music-question",
            Track::Music => "music",
            Track::Interruption => "interruption",
            Track::Relief => "relief",
            Track::SessionFinished => "session-finished",
            Track::Goodbye => "goodbye",
        };
        f.write_str(name)
    }
}
