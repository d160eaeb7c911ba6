//! Playback of the synthesized reply.
//!
//! The reply blob is staged to a temporary file (`ReplySource`) that is
//! released exactly once, whether playback succeeds or fails. Decoding and
//! the output stream run synchronously on the caller's thread; the turn
//! pipeline wraps the whole thing in a blocking task.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// generic anyhow error
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    /// No output device available
    #[error("no output device available")]
    NoOutputDevice,
    /// The reply bytes were not decodable audio
    #[error("could not decode reply audio: {0}")]
    Decode(String),
    /// Staging the reply to disk failed
    #[error("could not stage reply audio: {0}")]
    Stage(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, PlaybackError>;

/// A short-lived playable source for one reply blob. The backing file is
/// removed exactly once: on `release`, or on drop if release was never
/// called. Double release is a no-op, never a double delete.
pub struct ReplySource {
    file: Option<NamedTempFile>,
}

impl ReplySource {
    /// Stage the reply bytes into a fresh temporary file.
    pub fn write(audio: &[u8]) -> Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(audio)?;
        file.flush()?;
        debug!(bytes = audio.len(), path = %file.path().display(), "reply staged");
        Ok(Self { file: Some(file) })
    }

    /// Path to the staged audio, if not yet released.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(NamedTempFile::path)
    }

    /// Remove the staged file. Returns whether this call did the removal.
    pub fn release(&mut self) -> bool {
        match self.file.take() {
            Some(file) => {
                if let Err(e) = file.close() {
                    warn!("failed to remove staged reply audio: {}", e);
                }
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.file.is_none()
    }
}

/// Seam between the turn pipeline and the speakers, so turns can complete
/// in tests without an output device.
pub trait PlayReply: Send + Sync {
    /// Play one reply blob to completion. Implementations must release any
    /// staged resources on every path, success or failure.
    fn play(&self, audio: &[u8]) -> Result<()>;
}

/// Plays WAV replies through the default cpal output device.
#[derive(Debug, Default)]
pub struct CpalPlayer;

impl CpalPlayer {
    pub fn new() -> Self {
        Self
    }
}

impl PlayReply for CpalPlayer {
    fn play(&self, audio: &[u8]) -> Result<()> {
        let mut source = ReplySource::write(audio)?;
        let result = play_staged(&source);
        // Release on success and on every error path alike.
        source.release();
        result
    }
}

fn play_staged(source: &ReplySource) -> Result<()> {
    let path = source
        .path()
        .ok_or_else(|| anyhow!("reply source already released"))?;
    let bytes = std::fs::read(path)?;
    let (spec, samples) = decode_wav(&bytes)?;
    play_samples(spec, samples)
}

/// Decode a WAV blob into interleaved f32 samples.
fn decode_wav(bytes: &[u8]) -> Result<(hound::WavSpec, Vec<f32>)> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PlaybackError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| PlaybackError::Decode(e.to_string()))?
        }
    };

    if samples.is_empty() || spec.channels == 0 {
        return Err(PlaybackError::Decode("empty reply audio".to_string()));
    }
    Ok((spec, samples))
}

/// Block until the samples have played out on the default output device.
fn play_samples(spec: hound::WavSpec, samples: Vec<f32>) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoOutputDevice)?;

    let src_channels = spec.channels as usize;
    let total_frames = samples.len() / src_channels;

    let supported = device
        .supported_output_configs()
        .map_err(|e| anyhow!("output configs unavailable: {e}"))?
        .find(|c| {
            c.min_sample_rate() <= SampleRate(spec.sample_rate)
                && c.max_sample_rate() >= SampleRate(spec.sample_rate)
                && c.channels() as usize >= src_channels
                && c.sample_format() == cpal::SampleFormat::F32
        })
        .map(|c| c.with_sample_rate(SampleRate(spec.sample_rate)))
        .ok_or_else(|| anyhow!("no output config for {} Hz reply", spec.sample_rate))?;

    let config = supported.config();
    let out_channels = config.channels as usize;

    let playout = Duration::from_secs_f64(total_frames as f64 / spec.sample_rate as f64);
    debug!(
        frames = total_frames,
        sample_rate = spec.sample_rate,
        seconds = playout.as_secs_f64(),
        "reply playback starting"
    );

    let shared = Arc::new(Mutex::new((samples, 0usize)));
    let notified = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let shared_2 = shared.clone();
    let notified_2 = notified.clone();

    let stream = device
        .build_output_stream(
            &config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut guard = shared_2.lock();
                let (samples, pos) = &mut *guard;
                for frame in out.chunks_mut(out_channels) {
                    if *pos < total_frames {
                        for (ch, slot) in frame.iter_mut().enumerate() {
                            *slot = samples[*pos * src_channels + ch.min(src_channels - 1)];
                        }
                        *pos += 1;
                    } else {
                        frame.fill(0.0);
                    }
                }
                if *pos >= total_frames && !notified_2.swap(true, Ordering::SeqCst) {
                    done_tx.send(()).ok();
                }
            },
            |err| {
                warn!("an error occurred on output stream: {}", err);
            },
            None,
        )
        .map_err(|e| anyhow!("failed to build output stream: {e}"))?;

    stream
        .play()
        .map_err(|e| anyhow!("failed to start playback: {e}"))?;

    // Wait for the callback to run past the last frame, with slack so a
    // stalled device cannot wedge the turn forever.
    if done_rx.recv_timeout(playout + Duration::from_secs(2)).is_err() {
        warn!("playback did not signal completion, releasing anyway");
    }

    Ok(())
}
