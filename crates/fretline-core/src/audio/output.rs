//! CPAL output stream driving the playback engine
//!
//! The stream callback owns the [`PlaybackEngine`] outright: no mutex, no
//! shared state besides the engine's own atomics and command queue. Each
//! callback renders into pre-allocated left/right scratch and interleaves
//! into the device buffer; channels beyond the first two stay silent.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};
use super::device::{default_output_device, find_device_by_id};
use super::error::{AudioError, AudioResult};
use crate::engine::PlaybackEngine;
use crate::types::{Sample, DEFAULT_SAMPLE_RATE};

/// Keeps the output stream alive. Drop this to stop audio.
pub struct AudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// An opened output device with a negotiated stream configuration
///
/// Open first, build the engine at [`sample_rate`](Self::sample_rate), then
/// [`start`](Self::start) with it.
pub struct AudioOutput {
    device: cpal::Device,
    device_name: String,
    stream_config: StreamConfig,
    buffer_size: u32,
}

impl AudioOutput {
    /// Select the configured (or default) device and negotiate a config
    pub fn open(config: &AudioConfig) -> AudioResult<Self> {
        let device = match &config.device {
            Some(id) => find_device_by_id(id)?,
            None => default_output_device()?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let (supported, buffer_size) = output_config(&device, config)?;
        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(buffer_size),
        };

        log::info!(
            "Audio device {}: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
            device_name,
            stream_config.channels,
            stream_config.sample_rate.0,
            buffer_size,
            buffer_size as f32 / stream_config.sample_rate.0 as f32 * 1000.0
        );

        Ok(Self {
            device,
            device_name,
            stream_config,
            buffer_size,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate.0
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Build and start the stream; the engine moves into the callback
    ///
    /// The engine must have been built at the device rate: songs and the
    /// detector are tied to it, so a mismatch is refused rather than patched.
    pub fn start(self, mut engine: PlaybackEngine) -> AudioResult<AudioHandle> {
        check_engine_rate(engine.sample_rate(), self.sample_rate())?;

        let channels = self.stream_config.channels as usize;
        let mut left: Vec<Sample> = vec![0.0; MAX_BUFFER_SIZE];
        let mut right: Vec<Sample> = vec![0.0; MAX_BUFFER_SIZE];

        let stream = self
            .device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    // Oversized device buffers are rendered in MAX_BUFFER_SIZE slices
                    for block in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
                        let frames = block.len() / channels;
                        let (l, r) = (&mut left[..frames], &mut right[..frames]);
                        engine.read_frame(l, r);

                        for (i, frame) in block.chunks_mut(channels).enumerate() {
                            frame[0] = l[i];
                            if channels > 1 {
                                frame[1] = r[i];
                            }
                            for ch in frame.iter_mut().skip(2) {
                                *ch = 0.0;
                            }
                        }
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        log::info!("Audio stream started on {}", self.device_name);

        Ok(AudioHandle {
            _stream: stream,
            sample_rate: self.stream_config.sample_rate.0,
            buffer_size: self.buffer_size,
        })
    }
}

fn check_engine_rate(engine: u32, device: u32) -> AudioResult<()> {
    if engine == device {
        Ok(())
    } else {
        Err(AudioError::SampleRateMismatch { engine, device })
    }
}

/// Best output configuration for a device and the buffer size to request
///
/// Prefers f32 stereo at the requested rate (48kHz when unset), then any
/// stereo f32 config at its highest rate.
fn output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    let target_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0
    };

    let best = supported
        .iter()
        .filter(|c| c.channels() >= 2)
        .find(in_range)
        .or_else(|| supported.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported.first())
        .ok_or_else(|| AudioError::ConfigError("No f32 output configuration".to_string()))?;

    let sample_rate = if in_range(&best) {
        cpal::SampleRate(target_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_rate,
            fallback.0
        );
        fallback
    };

    let buffer_size = match config.buffer_size {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        fixed => fixed.as_frames().unwrap_or(DEFAULT_BUFFER_SIZE),
    };
    log::debug!("Selected buffer size: {} frames", buffer_size);

    Ok((best.clone().with_sample_rate(sample_rate), buffer_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_rate_must_match_device() {
        assert!(check_engine_rate(48000, 48000).is_ok());
        assert!(matches!(
            check_engine_rate(44100, 48000),
            Err(AudioError::SampleRateMismatch { engine: 44100, device: 48000 })
        ));
    }
}
