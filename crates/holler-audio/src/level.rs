//! Instantaneous loudness for the pulsing indicator.
//!
//! The capture callback feeds the most recent block of samples into a shared
//! tap; `sample` reduces it to a single scalar. Loudness is visualization
//! only and never drives capture decisions.

use std::sync::Arc;

use parking_lot::Mutex;

/// Magnitudes live on an 8-bit (0..255) scale; half scale is the reference
/// ceiling, so a steady mid-level signal reads as full loudness.
const REFERENCE_MAGNITUDE: f32 = 128.0;

/// At 16 kHz this is 128 ms of audio, plenty for a stable mean.
const TAP_CAPACITY: usize = 2048;

/// Shared loudness tap. Cloning is cheap; all clones observe the same tap.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    tap: Arc<Mutex<Vec<u8>>>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            tap: Arc::new(Mutex::new(Vec::with_capacity(TAP_CAPACITY))),
        }
    }

    /// Replace the tap contents with the latest capture block. Samples are
    /// normalized floats; magnitudes above full scale clip to 255.
    pub fn feed<I>(&self, samples: I)
    where
        I: IntoIterator<Item = f32>,
    {
        let mut tap = self.tap.lock();
        tap.clear();
        tap.extend(
            samples
                .into_iter()
                .take(TAP_CAPACITY)
                .map(|s| (s.abs().min(1.0) * 255.0) as u8),
        );
    }

    /// Current loudness in [0, 1]: mean magnitude over the reference
    /// ceiling, clamped. An empty tap (no audio yet, or after reset) is
    /// silence.
    pub fn sample(&self) -> f32 {
        let tap = self.tap.lock();
        if tap.is_empty() {
            return 0.0;
        }
        let mean = tap.iter().map(|&m| m as f32).sum::<f32>() / tap.len() as f32;
        (mean / REFERENCE_MAGNITUDE).min(1.0)
    }

    /// Drop any held magnitudes so the indicator falls back to silence.
    pub fn reset(&self) {
        self.tap.lock().clear();
    }
}
