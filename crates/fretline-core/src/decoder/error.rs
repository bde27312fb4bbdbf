//! Decoder error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while opening or decoding a song
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The file is missing or unreadable; playback must not start
    #[error("Audio source unavailable: {path}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container or codec is not supported, or the stream is unparseable
    #[error("Unsupported audio format in {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// The codec does not report a frame count or sample rate
    #[error("Audio source does not report its duration: {0}")]
    UnknownDuration(PathBuf),

    /// Target output rate of zero
    #[error("Invalid output sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Resampler construction or processing failed
    #[error("Resampler error: {0}")]
    Resampler(String),

    /// The background decode thread could not be started
    #[error("Failed to spawn decode thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The background decode thread panicked
    #[error("Decode thread panicked")]
    ThreadPanicked,
}

pub type DecodeResult<T> = Result<T, DecodeError>;
