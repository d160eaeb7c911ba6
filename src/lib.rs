// Re-export from sub-crates
pub use holler_audio::{
    CaptureError, CaptureHandle, CaptureSession, CaptureSource, CpalPlayer, LevelMeter, PlayReply,
    PlaybackError, Recorder, Recording, ReplySource,
};
pub use holler_client::{Bytes, ClientError, HttpBackend, VoiceBackend, VoiceTurnReply};
pub use holler_core::{
    APP_NAME, APP_NAME_PRETTY, Config, ConfigManager, DEFAULT_LOG_LEVEL, LEVEL_INTERVAL, LogEntry,
    LogKind, RECORD_CEILING, TurnState,
};

// App-specific modules
pub mod controller;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod ui;

// Version from this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
