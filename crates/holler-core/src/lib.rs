//! Core types and configuration for holler.
//!
//! This crate provides platform-agnostic types that can be used across
//! all holler sub-crates.

use std::time::Duration;

mod config;
mod log;
mod state;

pub use config::{Config, ConfigManager};
pub use log::{LogEntry, LogKind};
pub use state::TurnState;

/// Application name
pub const APP_NAME: &str = "holler";

/// Pretty application name for display
pub const APP_NAME_PRETTY: &str = "Holler";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Capture sample rate. The backend's speech models expect 16 kHz.
pub const SAMPLE_RATE: u32 = 16_000;

/// Capture channel count. Speech input is always mono.
pub const CHANNELS: u16 = 1;

/// Hard ceiling on a single recording. The safety timer force-stops the
/// capture session once this much time has passed without a manual stop.
pub const RECORD_CEILING: Duration = Duration::from_secs(10);

/// Cadence at which the loudness meter is sampled, independent of the
/// render refresh so levels stay fresh even when drawing is throttled.
pub const LEVEL_INTERVAL: Duration = Duration::from_millis(50);

/// Default backend base URL when the config does not override it.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";
