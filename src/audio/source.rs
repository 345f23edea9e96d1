//! Random-access source reader
//!
//! [`SourceBuffer`] holds a fully decoded media file as interleaved stereo
//! f32 at the engine sample rate, exposing positioned block reads. Keeping
//! the PCM in memory is what makes the audio callback's reads non-blocking:
//! no decoder, no file I/O, no seeks on the realtime path.

use tracing::warn;

use crate::audio::decode::DecodedAudio;
use crate::audio::resample;
use crate::error::Result;

/// Assumed rate when a reader reports none; matches the engine fallback
const FALLBACK_RATE: u32 = 48_000;

/// Immutable random-access PCM source at the engine rate
#[derive(Debug)]
pub struct SourceBuffer {
    /// Interleaved stereo samples at `sample_rate`
    samples: Vec<f32>,
    /// Engine playback rate (output device rate)
    sample_rate: u32,
    /// Native rate of the source file, reported in `loaded`
    source_sample_rate: u32,
    /// Native channel count of the source file, reported in `loaded`
    source_channels: u16,
}

impl SourceBuffer {
    /// Prepare a source buffer from decoded audio: collapse to stereo, then
    /// convert to the engine rate.
    ///
    /// A reader reporting a zero sample rate is treated as 48 kHz so the
    /// rate-conversion ratio stays finite.
    pub fn prepare(decoded: DecodedAudio, engine_rate: u32) -> Result<Self> {
        let source_rate = if decoded.sample_rate > 0 {
            decoded.sample_rate
        } else {
            warn!("reader reported no sample rate, assuming {}Hz", FALLBACK_RATE);
            FALLBACK_RATE
        };

        let stereo = to_stereo(&decoded.samples, decoded.channels);
        let engine_rate = if engine_rate > 0 { engine_rate } else { FALLBACK_RATE };
        let samples = resample::resample(&stereo, source_rate, engine_rate, 2)?;

        Ok(Self {
            samples,
            sample_rate: engine_rate,
            source_sample_rate: source_rate,
            source_channels: decoded.channels,
        })
    }

    /// Test/fixture constructor from raw stereo samples
    pub fn from_stereo_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            source_sample_rate: sample_rate,
            source_channels: 2,
        }
    }

    /// Engine sample rate all positions are expressed in
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Native rate of the loaded file
    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    /// Native channel count of the loaded file
    pub fn source_channels(&self) -> u16 {
        self.source_channels
    }

    /// Total length in frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Total length in seconds
    pub fn duration_sec(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Stereo frame at `frame`, or silence when out of range
    #[inline]
    pub fn frame(&self, frame: usize) -> (f32, f32) {
        let idx = frame * 2;
        if idx + 1 < self.samples.len() {
            (self.samples[idx], self.samples[idx + 1])
        } else {
            (0.0, 0.0)
        }
    }

    /// Stereo frame at a fractional position, linearly interpolated between
    /// neighboring frames.
    #[inline]
    pub fn frame_lerp(&self, position: f64) -> (f32, f32) {
        if position < 0.0 {
            return (0.0, 0.0);
        }
        let base = position as usize;
        let frac = (position - base as f64) as f32;
        let (l0, r0) = self.frame(base);
        let (l1, r1) = self.frame(base + 1);
        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }

    /// Positioned block read: copy up to `out.len() / 2` frames starting at
    /// `offset_frames` into `out` (interleaved stereo). Frames past the end
    /// are zero-filled. Returns the number of non-silent frames copied.
    pub fn read(&self, offset_frames: usize, out: &mut [f32]) -> usize {
        let wanted = out.len() / 2;
        let available = self.frames().saturating_sub(offset_frames).min(wanted);
        if available == 0 {
            out.fill(0.0);
            return 0;
        }

        let src_start = offset_frames * 2;
        out[..available * 2].copy_from_slice(&self.samples[src_start..src_start + available * 2]);
        out[available * 2..].fill(0.0);

        available
    }
}

/// Collapse interleaved audio to stereo: mono duplicates, wider layouts keep
/// the first two channels.
fn to_stereo(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => {
            let mut out = Vec::with_capacity(samples.len() * 2);
            for &s in samples {
                out.push(s);
                out.push(s);
            }
            out
        }
        2 => samples.to_vec(),
        n => {
            let ch = n as usize;
            let mut out = Vec::with_capacity(samples.len() / ch * 2);
            for frame in samples.chunks_exact(ch) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
            out
        }
    }
}
