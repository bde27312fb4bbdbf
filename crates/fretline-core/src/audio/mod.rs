//! Device output
//!
//! The engine renders; this module only moves its output to a sound card.
//!
//! - **Control threads** talk to the engine through its `PlaybackHandle`
//! - **Audio thread** owns the `PlaybackEngine` exclusively inside the CPAL
//!   callback
//!
//! Configuration types are always available; the CPAL backend is behind the
//! `audio-output` feature.
//!
//! # Example Usage
//!
//! ```ignore
//! let output = AudioOutput::open(&AudioConfig::default())?;
//! let (mut player, engine) = Player::new(output.sample_rate(), &config)?;
//! let _audio = output.start(engine)?;
//! player.load("song.ogg")?;
//! ```

mod config;
mod error;

#[cfg(feature = "audio-output")]
mod device;
#[cfg(feature = "audio-output")]
mod output;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use error::{AudioError, AudioResult};

#[cfg(feature = "audio-output")]
pub use device::{default_output_device, find_device_by_id, list_output_devices, OutputDevice};
#[cfg(feature = "audio-output")]
pub use output::{AudioHandle, AudioOutput};
