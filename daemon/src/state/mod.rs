//! Flow state machine module
//!
//! Provides the kiosk flow with nine states:
//! - Idle: nobody around
//! - PersonArrived, TaskActive, LongTask, MusicPlaying: a visitor session
//! - Interruption, ReturnAfterAbsence: visitor stepped away and came back
//! - SessionFinished, SessionEnds: self-expiring wrap-up states

mod context;
mod machine;
mod page;
mod scheduler;

pub use context::FlowContext;
pub use machine::{FlowState, FlowStateMachine, Transition};
pub use page::{Page, Track};

#[cfg(test)]
pub(crate) use context::MusicResponse;
