//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Heartbeat period for timers when no frames arrive
    pub tick_interval: Duration,

    /// Thresholds and durations for the flow controller
    pub flow: FlowConfig,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var("WAMA_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let home = std::env::var("HOME").context("HOME is not set")?;
                PathBuf::from(&home)
                    .join(".local")
                    .join("share")
                    .join("wama-kiosk")
            }
        };

        let socket_path = std::env::var("WAMA_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("kiosk.sock"));

        let tick_ms = match std::env::var("WAMA_TICK_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid WAMA_TICK_MS: {raw}"))?,
            Err(_) => 50,
        };

        let flow_path = std::env::var("WAMA_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(|| Some(data_dir.join("config.json")).filter(|p| p.exists()));

        let flow = match flow_path {
            Some(path) => FlowConfig::from_file(&path)?,
            None => FlowConfig::default(),
        };

        Ok(Self {
            socket_path,
            data_dir,
            tick_interval: Duration::from_millis(tick_ms.max(1)),
            flow,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

/// Invalid flow option values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Static thresholds and durations for the flow controller
///
/// Keys use the option names of the kiosk configuration map. All durations
/// are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct FlowConfig {
    /// Share of the buffer the majority class needs before it is accepted
    pub majority_threshold: f64,
    /// Samples below this confidence vote for the current stable class
    pub min_confidence_threshold: f32,
    pub prediction_buffer_size: usize,
    /// Minimum time between two stable class changes
    pub state_debounce_ms: u64,
    /// Thumb offset from the palm center, in normalized image units
    pub thumb_extension_threshold: f32,
    pub gesture_hold_duration: u64,
    /// Task duration after which the music question is asked
    pub long_task_threshold: u64,
    /// Minimum time between two music questions
    pub music_cooldown: u64,
    /// Length of the gesture window for the music question
    pub gesture_timeout: u64,
    /// Absence after which a greeted person is considered gone
    pub inactivity_timeout: u64,
    pub relief_duration: u64,
    pub session_finished_duration: u64,
    pub goodbye_duration: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            majority_threshold: 0.6,
            min_confidence_threshold: 0.5,
            prediction_buffer_size: 10,
            state_debounce_ms: 1_000,
            thumb_extension_threshold: 0.08,
            gesture_hold_duration: 1_000,
            long_task_threshold: 20_000,
            music_cooldown: 120_000,
            gesture_timeout: 10_000,
            inactivity_timeout: 15_000,
            relief_duration: 4_000,
            session_finished_duration: 6_000,
            goodbye_duration: 5_000,
        }
    }
}

impl FlowConfig {
    /// Parse a JSON options map; absent options keep their defaults
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: FlowConfig =
            serde_json::from_str(raw).context("failed to parse flow options")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("majorityThreshold", self.majority_threshold),
            ("minConfidenceThreshold", f64::from(self.min_confidence_threshold)),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { name, value });
            }
        }

        if self.prediction_buffer_size == 0 {
            return Err(ConfigError::Zero {
                name: "predictionBufferSize",
            });
        }
        if self.thumb_extension_threshold.is_nan() || self.thumb_extension_threshold <= 0.0 {
            return Err(ConfigError::Zero {
                name: "thumbExtensionThreshold",
            });
        }
        if self.gesture_timeout == 0 {
            return Err(ConfigError::Zero {
                name: "gestureTimeout",
            });
        }

        Ok(())
    }

    pub fn state_debounce(&self) -> Duration {
        Duration::from_millis(self.state_debounce_ms)
    }

    pub fn gesture_hold(&self) -> Duration {
        Duration::from_millis(self.gesture_hold_duration)
    }

    pub fn long_task(&self) -> Duration {
        Duration::from_millis(self.long_task_threshold)
    }

    pub fn music_cooldown(&self) -> Duration {
        Duration::from_millis(self.music_cooldown)
    }

    pub fn gesture_timeout(&self) -> Duration {
        Duration::from_millis(self.gesture_timeout)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout)
    }

    pub fn relief(&self) -> Duration {
        Duration::from_millis(self.relief_duration)
    }

    pub fn session_finished(&self) -> Duration {
        Duration::from_millis(self.session_finished_duration)
    }

    pub fn goodbye(&self) -> Duration {
        Duration::from_millis(self.goodbye_duration)
    }
}
