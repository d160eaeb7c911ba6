//! Voice-turn protocol client for holler.
//!
//! This crate provides a trait-based abstraction over the backend's single
//! `POST /voice_turn` exchange, with an HTTP implementation. One request in,
//! one reply out; there is no streaming and no automatic retry.

mod http;

use async_trait::async_trait;
pub use bytes::Bytes;
pub use http::{HttpBackend, decode_reply_text, detail_from_body};
use thiserror::Error;

/// Errors that can occur during a voice-turn exchange.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend answered with a non-success status. `detail` is the
    /// JSON error body's `detail` field when present, else generic.
    #[error("backend returned {status}: {detail}")]
    Backend { status: u16, detail: String },

    /// The request never completed (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A reply header was missing or not decodable.
    #[error("malformed reply header: {0}")]
    BadHeader(String),
}

/// Result type for voice-turn operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// One completed exchange: what the backend heard, what it said, and the
/// synthesized reply audio. Read-only once constructed.
#[derive(Debug, Clone)]
pub struct VoiceTurnReply {
    /// Raw transcript of the user's utterance (ASCII, from `X-Transcript`)
    pub transcript: String,
    /// Assistant reply text, percent-decoded from `X-Response-Text-Encoded`
    pub response_text: String,
    /// Playable reply audio (WAV)
    pub audio: Bytes,
}

/// Trait for voice-turn backends.
///
/// Implement this trait to add new backends (or to fake the exchange in
/// tests without a network).
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Send one finalized audio payload and await the full reply. Single
    /// attempt; the caller decides whether the user may retry.
    async fn exchange(&self, audio: Bytes) -> Result<VoiceTurnReply>;

    /// Returns the name of this backend for logging/debugging.
    fn name(&self) -> &str;
}
