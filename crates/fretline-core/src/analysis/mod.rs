//! Pitch analysis of the played-back signal
//!
//! The playback engine appends its mono output to a
//! [`CircularSampleBuffer`](crate::ring::CircularSampleBuffer). A
//! [`PitchDetector`] wakes periodically, transforms the newest window and
//! publishes a [`SpectrumSnapshot`]; callers ask whether a note or chord is
//! currently sounding without ever touching the audio thread.

mod detector;
mod error;
mod spectrum;

pub use detector::PitchDetector;
pub use error::{AnalysisError, AnalysisResult};
pub use spectrum::{BinPower, SpectrumAnalyzer, SpectrumSnapshot, TOP_BIN_COUNT};

use serde::{Deserialize, Serialize};

/// Default FFT length; ~5.9Hz resolution at 48kHz, enough to separate low E
/// from F on a bass
pub const DEFAULT_TRANSFORM_SIZE: usize = 8192;

/// Default time between analysis cycles
pub const DEFAULT_PERIOD_MS: u64 = 50;

/// Detector tuning, stored under `analysis:` in the player config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// FFT length in samples, must be a power of two
    pub transform_size: usize,
    /// Milliseconds between analysis cycles
    pub period_ms: u64,
    /// Summed peak magnitude below which nothing is detected
    pub noise_floor: f32,
    /// Minimum peak power relative to the strongest peak for a match
    pub dominance_ratio: f32,
    /// Strongest peaks searched per target note
    pub candidates_per_target: usize,
    /// Chord notes allowed to go unmatched
    pub chord_tolerance: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            transform_size: DEFAULT_TRANSFORM_SIZE,
            period_ms: DEFAULT_PERIOD_MS,
            noise_floor: 0.001,
            dominance_ratio: 0.1,
            candidates_per_target: 3,
            chord_tolerance: 1,
        }
    }
}
