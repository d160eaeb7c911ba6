//! Application events for the controller loop.
//!
//! Key input is polled directly by the terminal UI; this channel carries
//! the asynchronous results that must land back on the controller thread.

use crate::error::TurnError;

/// Events delivered to the single-threaded controller loop.
#[derive(Debug)]
pub enum AppEvent {
    /// The safety timer for capture session `session` elapsed
    RecordCeiling { session: u64 },
    /// The backend replied; transcript and decoded reply text for the log
    ReplyReceived {
        transcript: String,
        response_text: String,
    },
    /// The reply finished playing; the turn is complete
    TurnFinished,
    /// The in-flight turn failed
    TurnFailed(TurnError),
}
