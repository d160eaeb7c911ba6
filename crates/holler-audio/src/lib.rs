//! Microphone capture, loudness metering, and reply playback for holler.
//!
//! There can only be one active capture session at a time; sequencing is
//! enforced by the turn controller, not by this crate.

mod capture;
mod level;
mod playback;

pub use capture::{CaptureError, CaptureSession, Recorder, Recording};
pub use level::LevelMeter;
pub use playback::{CpalPlayer, PlayReply, PlaybackError, ReplySource};

/// Seam between the turn controller and the microphone, so turn sequencing
/// can be driven by a scripted source in tests.
pub trait CaptureSource {
    type Session: CaptureHandle;

    /// Open the microphone and start accumulating audio, feeding `meter`
    /// with live loudness data.
    fn open(&self, meter: &LevelMeter) -> Result<Self::Session, CaptureError>;
}

/// Handle to one live capture session.
pub trait CaptureHandle {
    /// Finalize the session and return the payload. Idempotent: the second
    /// and later calls return `Ok(None)`.
    fn finish(&mut self) -> Result<Option<Recording>, CaptureError>;
}

impl CaptureSource for Recorder {
    type Session = CaptureSession;

    fn open(&self, meter: &LevelMeter) -> Result<CaptureSession, CaptureError> {
        self.start_recording(meter)
    }
}

impl CaptureHandle for CaptureSession {
    fn finish(&mut self) -> Result<Option<Recording>, CaptureError> {
        CaptureSession::finish(self)
    }
}
