//! Thumbs-up / thumbs-down classification from hand landmarks
//!
//! Landmarks follow the 21-point hand model layout in normalized image
//! coordinates, so y grows downward.

use serde::{Deserialize, Serialize};

use crate::error::{InputError, LANDMARK_COUNT};

const WRIST: usize = 0;
const THUMB_TIP: usize = 4;
const INDEX_MCP: usize = 5;
const MIDDLE_MCP: usize = 9;
const RING_MCP: usize = 13;
const PINKY_MCP: usize = 17;

/// (tip, middle joint) pairs for index, middle, ring and pinky
const FINGERS: [(usize, usize); 4] = [(8, 6), (12, 10), (16, 14), (20, 18)];

/// Fingers that must be curled before any gesture is recognized
const MIN_CURLED_FINGERS: u8 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A validated set of 21 hand landmarks
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    points: [Point; LANDMARK_COUNT],
}

impl HandLandmarks {
    /// Validate raw `[x, y]` pairs from the landmark model
    pub fn from_points(raw: &[[f32; 2]]) -> Result<Self, InputError> {
        if raw.len() != LANDMARK_COUNT {
            return Err(InputError::LandmarkCount {
                expected: LANDMARK_COUNT,
                actual: raw.len(),
            });
        }

        let mut points = [Point::default(); LANDMARK_COUNT];
        for (slot, [x, y]) in points.iter_mut().zip(raw.iter().copied()) {
            if !x.is_finite() || !y.is_finite() {
                return Err(InputError::NonFinite("landmarks"));
            }
            *slot = Point { x, y };
        }

        Ok(Self { points })
    }

    pub fn point(&self, index: usize) -> Point {
        self.points[index]
    }

    /// Mean of the wrist and the four finger base joints
    pub fn palm_center(&self) -> Point {
        let joints = [WRIST, INDEX_MCP, MIDDLE_MCP, RING_MCP, PINKY_MCP];
        let (sx, sy) = joints.iter().fold((0.0, 0.0), |(sx, sy), &i| {
            (sx + self.points[i].x, sy + self.points[i].y)
        });
        let n = joints.len() as f32;
        Point {
            x: sx / n,
            y: sy / n,
        }
    }
}

/// Per-frame measurements the gesture decision is based on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandGeometry {
    /// Palm center y minus thumb tip y; positive when the thumb points up
    pub thumb_vertical_offset: f32,
    /// Curled fingers among index, middle, ring and pinky
    pub curled_finger_count: u8,
}

/// Answer to the music question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    /// Thumbs up
    Affirm,
    /// Thumbs down
    Deny,
    None,
}

impl Default for Gesture {
    fn default() -> Self {
        Self::None
    }
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gesture::Affirm => write!(f, "affirm"),
            Gesture::Deny => write!(f, "deny"),
            Gesture::None => write!(f, "none"),
        }
    }
}

pub fn compute_geometry(hand: &HandLandmarks) -> HandGeometry {
    let palm = hand.palm_center();
    let thumb = hand.point(THUMB_TIP);

    // A finger is curled when its tip sits below its middle joint
    let curled_finger_count = FINGERS
        .iter()
        .filter(|(tip, pip)| hand.point(*tip).y > hand.point(*pip).y)
        .count() as u8;

    HandGeometry {
        thumb_vertical_offset: palm.y - thumb.y,
        curled_finger_count,
    }
}

pub fn classify_gesture(geometry: &HandGeometry, thumb_threshold: f32) -> Gesture {
    if geometry.curled_finger_count < MIN_CURLED_FINGERS {
        return Gesture::None;
    }

    if geometry.thumb_vertical_offset > thumb_threshold {
        Gesture::Affirm
    } else if geometry.thumb_vertical_offset < -thumb_threshold {
        Gesture::Deny
    } else {
        Gesture::None
    }
}
