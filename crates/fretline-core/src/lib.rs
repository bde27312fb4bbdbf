//! Fretline Core - playback and pitch analysis engine for guitar and bass practice
//!
//! Decodes a song in the background, plays it through a real-time callback
//! with independent tempo and pitch control, and checks whether the notes a
//! player is asked to play are sounding in the output.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod music;
pub mod player;
pub mod ring;
pub mod song;
pub mod timestretch;
pub mod types;

pub use error::{Error, Result};
pub use player::Player;
pub use types::*;
