//! Turn-level error taxonomy.
//!
//! Every failure a turn can hit is folded into one of these kinds at the
//! boundary where it occurs, then rendered as a log entry plus status text.
//! Nothing here propagates out of the event loop.

use holler_audio::{CaptureError, PlaybackError};
use holler_client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnError {
    /// Microphone access denied or no usable input device. Not retried;
    /// the user fixes permissions and toggles again.
    #[error("microphone unavailable: {0}")]
    Permission(String),

    /// The session stopped with zero captured samples. Logged, and no
    /// network call is made.
    #[error("nothing recorded, try speaking before stopping")]
    EmptyPayload,

    /// The backend answered with a non-success status.
    #[error("backend error ({status}): {detail}")]
    Backend { status: u16, detail: String },

    /// The exchange failed before a backend verdict: transport failure or
    /// a malformed reply.
    #[error("backend exchange failed: {0}")]
    Exchange(String),

    /// The returned audio could not be played. The staged reply source is
    /// still released.
    #[error("playback failed: {0}")]
    Playback(String),
}

impl From<ClientError> for TurnError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Backend { status, detail } => TurnError::Backend { status, detail },
            other => TurnError::Exchange(other.to_string()),
        }
    }
}

impl From<CaptureError> for TurnError {
    fn from(e: CaptureError) -> Self {
        TurnError::Permission(e.to_string())
    }
}

impl From<PlaybackError> for TurnError {
    fn from(e: PlaybackError) -> Self {
        TurnError::Playback(e.to_string())
    }
}
