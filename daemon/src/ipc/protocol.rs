//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::controller::Frame;
use crate::events::KioskEvent;
use crate::state::{FlowState, Page};

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from the inference process or the presentation client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current kiosk status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to kiosk event notifications
    Subscribe,

    /// Start processing frames
    StartDetection,

    /// Stop processing frames and return to Idle
    StopDetection,

    /// Model output for one camera frame
    SubmitFrame(Frame),
}

/// Responses from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current kiosk status
    Status(KioskStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Request queued for the controller
    Accepted,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event { event: KioskEvent },
}

/// Kiosk status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskStatus {
    /// Daemon version
    pub version: String,

    /// Current flow state
    pub state: FlowState,

    /// Page currently requested from the presentation layer
    pub page: Page,

    /// Whether frames are being processed
    pub detecting: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for KioskStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: FlowState::Idle,
            page: Page::Idle,
            detecting: false,
            uptime_secs: 0,
        }
    }
}
