//! One capture session per voice turn.
//!
//! The microphone stream writes 16-bit WAV into memory while feeding the
//! loudness meter. All session resources (stream, writer, meter tap) are
//! released together by `finish`, which every exit path funnels through:
//! manual stop, safety timeout, and drop.

use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Host, Sample, SampleRate};
use holler_core::{CHANNELS, SAMPLE_RATE};
use hound::WavWriter;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::level::LevelMeter;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// generic anyhow error
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    /// No recording device available, or access to it was denied
    #[error("no input device available")]
    NoInputDevice,
    /// Sample format not supported
    #[error("sample format not supported: {0}")]
    SampleFormatNotSupported(String),
    /// Build stream error
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
}

type Result<T> = std::result::Result<T, CaptureError>;
type WavWriterHandle = Arc<Mutex<Option<WavWriter<MemoryWriter>>>>;

/// A cheaply cloneable handle to the inner data that is being recorded. The
/// finalize method for the wav writer does not return the inner data, so we
/// store it behind an Arc<Mutex> to allow for cheap cloning and access to the
/// inner data.
#[derive(Debug, Clone)]
struct MemoryWriter {
    inner: Arc<Mutex<Cursor<Vec<u8>>>>,
}

impl MemoryWriter {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cursor::new(Vec::with_capacity(8 * 1024)))),
        }
    }

    fn try_into_inner(self) -> Result<Vec<u8>> {
        // Attempt to own the inner arc
        let owned = Arc::try_unwrap(self.inner).map_err(|_| {
            CaptureError::Anyhow(anyhow!("Failed to unwrap inner Arc in MemoryWriter"))
        })?;
        // Extract the cursor, then the Vec
        let cursor = owned.into_inner();
        Ok(cursor.into_inner())
    }
}

impl Seek for MemoryWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.lock().seek(pos)
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// Opens capture sessions against the default host.
pub struct Recorder {
    host: Host,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// Start a capture session on the default input device. Prefers the
    /// fixed 16 kHz mono config; falls back to the device default when the
    /// hardware cannot do it, since the payload spec records the real rate.
    pub fn start_recording(&self, meter: &LevelMeter) -> Result<CaptureSession> {
        let device = self
            .host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;

        let config = device
            .supported_input_configs()
            .ok()
            .and_then(|mut configs| {
                configs.find(|c| {
                    c.channels() == CHANNELS
                        && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
                })
            })
            .map(|c| c.with_sample_rate(SampleRate(SAMPLE_RATE)))
            .or_else(|| {
                warn!("16kHz mono capture unavailable, using device default");
                device.default_input_config().ok()
            })
            .ok_or(CaptureError::NoInputDevice)?;

        info!(
            device_name = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            "Recording from device"
        );

        let spec = wav_spec_from_config(&config);

        let buffer = MemoryWriter::new();
        let writer =
            WavWriter::new(buffer.clone(), spec).map_err(|e| CaptureError::Anyhow(e.into()))?;
        let writer = Arc::new(Mutex::new(Some(writer)));

        let samples = Arc::new(AtomicUsize::new(0));

        // The input stream runs on a separate audio thread.
        let writer_2 = writer.clone();
        let meter_2 = meter.clone();
        let samples_2 = samples.clone();

        let err_fn = move |err| {
            error!("an error occurred on stream: {}", err);
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| {
                    write_input_data(data, &writer_2, &meter_2, &samples_2)
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I32 => device.build_input_stream(
                &config.into(),
                move |data: &[i32], _: &_| {
                    write_input_data(data, &writer_2, &meter_2, &samples_2)
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| {
                    write_input_data(data, &writer_2, &meter_2, &samples_2)
                },
                err_fn,
                None,
            )?,
            sample_format => {
                return Err(CaptureError::SampleFormatNotSupported(format!(
                    "{:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|_| anyhow!("failed to play stream"))?;

        Ok(CaptureSession {
            stream,
            writer,
            meter: meter.clone(),
            samples,
            started: Instant::now(),
            buffer: Some(buffer),
        })
    }
}

/// Handle to the active capture session. When dropped or finished, the
/// recording ends. You must call `finish` to receive the payload.
pub struct CaptureSession {
    stream: cpal::Stream,
    writer: WavWriterHandle,
    meter: LevelMeter,
    samples: Arc<AtomicUsize>,
    started: Instant,
    // The buffer the data is being written to. Presence of this buffer
    // indicates if the session has been finalized or not.
    buffer: Option<MemoryWriter>,
}

impl CaptureSession {
    /// Finalize the session into a single WAV payload. Idempotent: once the
    /// buffer has been taken, later calls return `Ok(None)`.
    pub fn finish(&mut self) -> Result<Option<Recording>> {
        if self.buffer.is_none() {
            return Ok(None);
        }
        info!("Ending capture session.");
        let buffer = self.buffer.take().unwrap();
        // can not drop the stream because we have &mut self instead of self,
        // so pause and ignore errors.
        self.stream.pause().ok();
        // Finalize the writer so it writes the proper framing information.
        self.writer
            .lock()
            .take()
            .unwrap()
            .finalize()
            .map_err(|e| CaptureError::Anyhow(anyhow!("Failed to finalize writer: {}", e)))?;
        // The meter must read silence once the session is gone.
        self.meter.reset();
        // Now that its ended, we can grab out the actual data and return it.
        let data = buffer.try_into_inner()?;
        Ok(Some(Recording {
            data,
            samples: self.samples.load(Ordering::Relaxed),
            duration: self.started.elapsed(),
        }))
    }

    /// Whether the session still holds live resources.
    pub fn is_open(&self) -> bool {
        self.buffer.is_some()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.buffer.is_some() {
            if let Err(e) = self.finish() {
                error!("failed to finalize capture session: {}", e);
            }
        }
    }
}

/// One finalized recording: a single encoded WAV object plus capture stats.
#[derive(Debug, Clone)]
pub struct Recording {
    data: Vec<u8>,
    samples: usize,
    duration: Duration,
}

impl Recording {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Number of audio samples written, excluding WAV framing.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// A session that captured zero samples produced no usable payload.
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    #[cfg(any(test, feature = "test-fixtures"))]
    pub fn from_parts(data: Vec<u8>, samples: usize, duration: Duration) -> Self {
        Self {
            data,
            samples,
            duration,
        }
    }
}

fn wav_spec_from_config(config: &cpal::SupportedStreamConfig) -> hound::WavSpec {
    hound::WavSpec {
        channels: config.channels(),
        sample_rate: config.sample_rate().0,
        // Payloads are always written as 16-bit PCM, whatever the stream
        // format, to match what the backend's speech models expect.
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_input_data<T>(
    input: &[T],
    writer: &WavWriterHandle,
    meter: &LevelMeter,
    samples: &AtomicUsize,
) where
    T: Sample + Copy,
    i16: Sample + FromSample<T>,
    f32: Sample + FromSample<T>,
{
    meter.feed(input.iter().map(|&s| f32::from_sample(s)));
    if let Some(mut guard) = writer.try_lock() {
        if let Some(writer) = guard.as_mut() {
            let mut written = 0usize;
            for &sample in input.iter() {
                let sample: i16 = i16::from_sample(sample);
                if writer.write_sample(sample).is_ok() {
                    written += 1;
                }
            }
            samples.fetch_add(written, Ordering::Relaxed);
        }
    }
}
