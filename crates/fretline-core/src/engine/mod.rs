//! Real-time playback engine
//!
//! - [`PlaybackEngine`]: owned by the audio thread, renders one callback at a time
//! - [`PlaybackHandle`] / [`PlaybackControls`]: lock-free control surface for other threads
//! - [`EngineCommand`]: SPSC queue for song and stretcher swaps
//! - [`gc_handle`]: deferred deallocation so the audio thread never frees memory

mod command;
mod controls;
mod error;
mod gc;
mod playback;

pub use command::{command_channel, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use controls::{PlaybackControls, PlaybackHandle};
pub use error::{EngineError, EngineResult};
pub use gc::gc_handle;
pub use playback::PlaybackEngine;
