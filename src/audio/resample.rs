//! Sample-rate conversion using rubato
//!
//! Converts decoded audio to the engine's playback rate (the output device
//! rate) in one whole-buffer pass at load time. Variable playback *rate*
//! (setRate) is applied separately in the transport; this module only
//! normalizes the file's native rate.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Resample interleaved audio from `input_rate` to `output_rate`.
///
/// Returns the input unchanged when the rates already match.
pub fn resample(input: &[f32], input_rate: u32, output_rate: u32, channels: u16) -> Result<Vec<f32>> {
    if input_rate == output_rate {
        debug!("sample rate already {}Hz, skipping resample", output_rate);
        return Ok(input.to_vec());
    }
    if input.is_empty() || channels == 0 {
        return Ok(Vec::new());
    }

    debug!("resampling {}Hz -> {}Hz ({} channels)", input_rate, output_rate, channels);

    let planar_input = deinterleave(input, channels);
    let input_frames = planar_input[0].len();

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        channels as usize,
    )
    .map_err(|e| {
        warn!("failed to create {}Hz -> {}Hz resampler: {}", input_rate, output_rate, e);
        Error::Resample(format!("failed to create resampler: {}", e))
    })?;

    let planar_output = resampler.process(&planar_input, None).map_err(|e| {
        warn!("resampling {}Hz -> {}Hz failed: {}", input_rate, output_rate, e);
        Error::Resample(e.to_string())
    })?;

    let output = interleave(&planar_output);

    debug!(
        "resampled {} input frames to {} output frames",
        input_frames,
        output.len() / channels as usize
    );

    Ok(output)
}

/// Split interleaved samples into per-channel vectors for rubato
fn deinterleave(input: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let ch = channels as usize;
    let frames = input.len() / ch;
    let mut planar = vec![Vec::with_capacity(frames); ch];
    for frame in input.chunks_exact(ch) {
        for (c, &sample) in frame.iter().enumerate() {
            planar[c].push(sample);
        }
    }
    planar
}

/// Merge per-channel vectors back into interleaved samples
fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let ch = planar.len();
    let frames = planar.first().map(|c| c.len()).unwrap_or(0);
    let mut output = Vec::with_capacity(frames * ch);
    for i in 0..frames {
        for channel in planar {
            output.push(channel[i]);
        }
    }
    output
}
