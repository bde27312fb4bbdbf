//! Playback engine error types

use thiserror::Error;

/// Errors raised by configuration calls on the playback engine
///
/// None of these can occur inside [`read_frame`](super::PlaybackEngine::read_frame);
/// the real-time path degrades to silence instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Output sample rate of zero
    #[error("Invalid output sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Tempo or pitch ratio outside what the time stretcher supports
    #[error("Invalid {kind} ratio: {value} (must be between 0.25 and 4)")]
    InvalidRatio { kind: &'static str, value: f64 },

    /// The audio thread has not drained the command queue
    #[error("Engine command queue is full")]
    CommandQueueFull,
}

pub type EngineResult<T> = Result<T, EngineError>;
