//! Controller module tying the signal, gesture and flow pieces together
//!
//! The controller task is the single consumer of a control queue. Frames,
//! start/stop requests and heartbeats are processed one at a time, which
//! keeps the flow state free of locks.

mod input;
mod runner;

pub use input::{ControlEvent, Frame};
pub use runner::Controller;
