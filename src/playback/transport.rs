//! Transport: the original-time playhead over the source reader
//!
//! Owns the authoritative playhead (original-time, fractional source
//! frames), the linear gain, and the whole-stream playback-rate ratio. The
//! audio callback reads through [`Transport::read_into`]; command and
//! reporter threads reposition it. Everything is atomics + an `ArcSwap`
//! buffer slot, so no path here can block the callback.
//!
//! The rate ratio is applied as a fractional read step (resampling the whole
//! stream, not per segment); file-rate normalization happened at load time.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::audio::source::SourceBuffer;

/// Allowed playback-rate range
pub const RATE_MIN: f64 = 0.25;
pub const RATE_MAX: f64 = 4.0;

/// Allowed gain range
pub const GAIN_MIN: f64 = 0.0;
pub const GAIN_MAX: f64 = 2.0;

/// Original-time playhead with gain and rate over a swappable source buffer
pub struct Transport {
    audio: ArcSwapOption<SourceBuffer>,
    /// Fractional source-frame position, stored as f64 bits
    position_bits: AtomicU64,
    /// Engine sample rate of the installed buffer (0 = nothing installed)
    sample_rate: AtomicU32,
    /// Linear gain, f32 bits
    gain_bits: AtomicU32,
    /// Playback-rate ratio, f32 bits
    rate_bits: AtomicU32,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            audio: ArcSwapOption::empty(),
            position_bits: AtomicU64::new(0f64.to_bits()),
            sample_rate: AtomicU32::new(0),
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
            rate_bits: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    /// Install a new source buffer, resetting position and rate.
    pub fn install(&self, buffer: Arc<SourceBuffer>) {
        self.sample_rate.store(buffer.sample_rate(), Ordering::Release);
        self.position_bits.store(0f64.to_bits(), Ordering::Release);
        self.rate_bits.store(1.0f32.to_bits(), Ordering::Release);
        self.audio.store(Some(buffer));
    }

    /// Currently installed buffer, if any
    pub fn audio(&self) -> Option<Arc<SourceBuffer>> {
        self.audio.load_full()
    }

    /// Lock-free buffer access for the audio callback (no refcount churn)
    pub fn audio_guard(&self) -> arc_swap::Guard<Option<Arc<SourceBuffer>>> {
        self.audio.load()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.load().is_some()
    }

    /// Engine sample rate of the installed buffer (0 when unloaded)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    /// Playhead in fractional source frames
    pub fn position_frames(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Acquire))
    }

    pub fn set_position_frames(&self, frames: f64) {
        self.position_bits.store(frames.max(0.0).to_bits(), Ordering::Release);
    }

    /// Playhead in original-time seconds
    pub fn position_seconds(&self) -> f64 {
        let sr = self.sample_rate();
        if sr == 0 {
            return 0.0;
        }
        self.position_frames() / sr as f64
    }

    pub fn set_position_seconds(&self, seconds: f64) {
        let sr = self.sample_rate();
        if sr == 0 {
            return;
        }
        self.set_position_frames(seconds.max(0.0) * sr as f64);
    }

    /// Sanitize and set the playback-rate ratio: non-finite or non-positive
    /// values reset to 1.0, then clamp to [0.25, 4.0].
    pub fn set_rate(&self, rate: f64) {
        let safe = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        let clamped = safe.clamp(RATE_MIN, RATE_MAX) as f32;
        self.rate_bits.store(clamped.to_bits(), Ordering::Release);
    }

    pub fn rate(&self) -> f32 {
        f32::from_bits(self.rate_bits.load(Ordering::Acquire))
    }

    /// Sanitize and set the gain: non-finite resets to 1.0, then clamp to
    /// [0.0, 2.0].
    pub fn set_gain(&self, gain: f64) {
        let safe = if gain.is_finite() { gain } else { 1.0 };
        let clamped = safe.clamp(GAIN_MIN, GAIN_MAX) as f32;
        self.gain_bits.store(clamped.to_bits(), Ordering::Release);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Acquire))
    }

    /// Read `out.len() / 2` gain-scaled stereo frames starting at source
    /// frame `start_frame`. Unit rate at a whole-frame offset is a
    /// positioned block read; any other rate steps fractionally with linear
    /// interpolation. Returns the number of source frames consumed.
    ///
    /// Runs on the audio callback: no locks, no allocation.
    pub fn read_into(&self, buffer: &SourceBuffer, start_frame: f64, out: &mut [f32]) -> f64 {
        let rate = self.rate() as f64;
        let gain = self.gain();
        let out_frames = out.len() / 2;

        if rate == 1.0 && start_frame >= 0.0 && start_frame.fract() == 0.0 {
            buffer.read(start_frame as usize, out);
            for s in out.iter_mut() {
                *s *= gain;
            }
            return out_frames as f64;
        }

        let mut pos = start_frame;
        for i in 0..out_frames {
            let (l, r) = buffer.frame_lerp(pos);
            out[i * 2] = l * gain;
            out[i * 2 + 1] = r * gain;
            pos += rate;
        }

        pos - start_frame
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
