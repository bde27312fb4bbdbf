//! Audio output configuration
//!
//! Device selection and buffer settings, stored under `audio:` in the player
//! config. Compiled without CPAL so headless builds can still read and write
//! the whole config file.

use serde::{Deserialize, Serialize};

/// Largest device buffer the output callback pre-allocates scratch for
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Buffer size used when no preference is given (frames)
/// 512 frames @ 48kHz is ~10.7ms
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Smallest fixed buffer we will request from a device
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose
    #[default]
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames, or None for the system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some((*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32)),
        }
    }

    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate as f32) * 1000.0)
    }
}

/// Audio device identifier
///
/// Device name plus, optionally, the host backend it lives on ("ALSA",
/// "CoreAudio", "WASAPI"). Without a host every available host is searched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the output device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = 48kHz, falling back to what the device supports)
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_clamped() {
        assert_eq!(BufferSize::Default.as_frames(), None);
        assert_eq!(BufferSize::Fixed(16).as_frames(), Some(MIN_BUFFER_SIZE));
        assert_eq!(BufferSize::Fixed(100_000).as_frames(), Some(MAX_BUFFER_SIZE as u32));
        assert_eq!(BufferSize::Fixed(480).latency_ms(48000), Some(10.0));
    }

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::new("hw:0,0").display_label(), "hw:0,0");
        assert_eq!(DeviceId::with_host("hw:0,0", "ALSA").display_label(), "[ALSA] hw:0,0");
    }

    #[test]
    fn test_builder() {
        let config = AudioConfig::default()
            .with_device(DeviceId::new("Speakers"))
            .with_buffer_frames(256)
            .with_sample_rate(44100);
        assert_eq!(config.device.as_ref().map(|d| d.name.as_str()), Some("Speakers"));
        assert_eq!(config.buffer_size, BufferSize::Fixed(256));
        assert_eq!(config.sample_rate, Some(44100));
    }
}
