//! Audio output using cpal
//!
//! Opens an output device and runs the playback stream whose callback pulls
//! from the EDL stitcher. The device is a collaborator behind this narrow
//! interface: the rest of the engine only ever sees the stream's sample
//! rate, channel count, and the start/stop pair.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::playback::stitcher::EdlStitcher;

/// Preferred stream rate when the device supports it
const PREFERRED_SAMPLE_RATE: u32 = 48_000;

/// Audio output manager
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Set by the stream error callback; a fatal device failure
    error_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Open an output device.
    ///
    /// A named device that cannot be found falls back to the default device;
    /// no device at all is a startup failure.
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .map_err(|e| Error::AudioOutput(format!("failed to enumerate devices: {}", e)))?;

                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(dev) => {
                        info!("using requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!("device '{}' not found, falling back to default", name);
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("no default output device found".into()))?,
        };

        let (config, sample_format) = Self::best_config(&device)?;
        debug!(
            "audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Pick a stereo f32 config at the preferred rate when available,
    /// otherwise whatever the device defaults to.
    fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("failed to get device configs: {}", e)))?;

        let preferred = supported.find(|c| {
            c.channels() == 2
                && c.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && c.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && c.sample_format() == SampleFormat::F32
        });

        if let Some(config) = preferred {
            let sample_format = config.sample_format();
            let config = config.with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE)).config();
            return Ok((config, sample_format));
        }

        let config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("failed to get default config: {}", e)))?;
        Ok((config.config(), config.sample_format()))
    }

    /// Build and start the output stream, handing the stitcher to the
    /// device callback. The stitcher runs for the life of the stream; play
    /// and pause are flags it observes, not stream operations.
    pub fn start(&mut self, mut stitcher: EdlStitcher) -> Result<()> {
        info!("starting audio stream");

        let channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);

        let err_fn = move |err: cpal::StreamError| {
            error!("audio stream error: {}", err);
            error_flag.store(true, Ordering::SeqCst);
        };

        let stream = match self.sample_format {
            SampleFormat::F32 => self
                .device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        stitcher.fill(data, channels);
                        for s in data.iter_mut() {
                            *s = s.clamp(-1.0, 1.0);
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| Error::AudioOutput(format!("failed to build stream: {}", e)))?,
            SampleFormat::I16 => {
                // Scratch buffer sized to the largest callback seen so far;
                // grows (allocates) at most a handful of times at startup
                let mut scratch: Vec<f32> = Vec::new();
                self.device
                    .build_output_stream(
                        &self.config,
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            if scratch.len() < data.len() {
                                scratch.resize(data.len(), 0.0);
                            }
                            let frame = &mut scratch[..data.len()];
                            stitcher.fill(frame, channels);
                            for (dst, src) in data.iter_mut().zip(frame.iter()) {
                                *dst = (src.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| Error::AudioOutput(format!("failed to build stream: {}", e)))?
            }
            format => {
                return Err(Error::AudioOutput(format!("unsupported sample format: {:?}", format)));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        info!("audio stream started");
        Ok(())
    }

    /// Stop and drop the stream, detaching the callback.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("stopping audio stream");
            if let Err(e) = stream.pause() {
                warn!("failed to pause stream on shutdown: {}", e);
            }
            drop(stream);
        }
    }

    /// Stream sample rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Stream channel count
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Whether the stream callback reported a device failure
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    /// Shared handle to the device-failure flag, for the reporter task
    pub fn error_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.error_flag)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
