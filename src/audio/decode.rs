//! Audio file decoding using symphonia
//!
//! Decodes the first audio track of a media file (MP3, FLAC, WAV, AAC,
//! Vorbis, ...) into interleaved f32 PCM at the file's native rate and
//! channel count. Decoding happens once, at load time; playback reads the
//! resulting buffer, so decode latency never touches the audio callback.

use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Decoded PCM at the source file's native format
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples, `channels` per frame
    pub samples: Vec<f32>,
    /// Native sample rate of the file
    pub sample_rate: u32,
    /// Native channel count of the file
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Decode an entire audio file to PCM.
///
/// # Errors
/// - [`Error::AudioFileNotFound`] when the path does not exist
/// - [`Error::AudioOpen`] when probing or decoding fails
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    if !path.exists() {
        return Err(Error::AudioFileNotFound);
    }

    debug!("decoding file: {}", path.display());

    let file = std::fs::File::open(path).map_err(|e| {
        warn!("failed to open {}: {}", path.display(), e);
        Error::AudioFileNotFound
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Extension hint helps the probe pick the right demuxer
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| {
            warn!("format probe failed for {}: {}", path.display(), e);
            Error::AudioOpen(format!("probe failed: {}", e))
        })?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            warn!("no audio track found in {}", path.display());
            Error::AudioOpen("no audio track found".into())
        })?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| {
            warn!("codec reported no sample rate for {}", path.display());
            Error::AudioOpen("sample rate not found".into())
        })?;
    let channels = codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| {
            warn!("codec reported no channel count for {}", path.display());
            Error::AudioOpen("channel count not found".into())
        })?;

    debug!("audio format: sample_rate={}, channels={}", sample_rate, channels);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| {
            warn!("failed to create decoder for {}: {}", path.display(), e);
            Error::AudioOpen(format!("failed to create decoder: {}", e))
        })?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                warn!("error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
                });
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(e) => {
                // Corrupt packets are skipped, not fatal
                warn!("decode error: {}", e);
                continue;
            }
        }
    }

    if samples.is_empty() {
        warn!("decode of {} produced no audio", path.display());
        return Err(Error::AudioOpen("file produced no audio".into()));
    }

    debug!(
        "decoded {} samples ({} frames)",
        samples.len(),
        samples.len() / channels.max(1) as usize
    );

    Ok(DecodedAudio { samples, sample_rate, channels })
}
