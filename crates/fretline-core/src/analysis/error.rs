//! Analysis error types

use thiserror::Error;

/// Configuration errors for the spectrum analyzer and pitch detector
///
/// These are programmer errors caught when the detector is built; a running
/// detector never fails, it reports "not detected" instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Transform size {0} is not a power of two")]
    TransformSizeNotPowerOfTwo(usize),

    #[error("Invalid analysis sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    #[error("Invalid maximum analysis frequency: {0}Hz")]
    InvalidMaxFrequency(f32),

    #[error("Analysis window of {window} samples exceeds the sample buffer ({capacity} samples)")]
    WindowExceedsCapacity { window: usize, capacity: usize },

    #[error("Failed to spawn analysis thread: {0}")]
    Spawn(String),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
