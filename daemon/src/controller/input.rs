//! Inputs accepted by the controller task

use serde::{Deserialize, Serialize};

/// Raw model output for one camera frame, as sent by the inference process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Per-class confidences, class 1 first
    pub probabilities: Option<Vec<f32>>,
    /// 21 `[x, y]` hand landmarks in normalized image coordinates
    pub landmarks: Option<Vec<[f32; 2]>>,
}

/// Everything that can reach the controller through its queue
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Frame(Frame),
    StartDetection,
    StopDetection,
}
