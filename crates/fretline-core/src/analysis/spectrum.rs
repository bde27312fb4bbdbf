//! Magnitude spectrum and note/chord matching
//!
//! [`SpectrumAnalyzer`] turns a window of samples into an immutable
//! [`SpectrumSnapshot`]:
//!
//! 1. Hamming window, forward complex FFT (imaginary parts zero)
//! 2. `magnitude[k] = (|X[k]| + |X[N-k]|) / N * (0.5 + k / 2N)` for `k < N/2`;
//!    the mirror bin folds in the negative-frequency half and the weight
//!    compensates energy smearing at low bins
//! 3. the strongest spectral peaks below the instrument's highest note
//!
//! [`SpectrumSnapshot::detect`] then answers "are these frequencies sounding".

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::error::{AnalysisError, AnalysisResult};
use super::AnalysisConfig;
use crate::types::Sample;

/// Number of peaks kept per snapshot
pub const TOP_BIN_COUNT: usize = 10;

/// One spectral peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinPower {
    pub power: f32,
    pub bin: usize,
}

/// An immutable analysis result, replaced wholesale every cycle
#[derive(Debug, Clone)]
pub struct SpectrumSnapshot {
    magnitudes: Vec<f32>,
    /// Bins below this index were searched for peaks
    max_bins: usize,
    /// Strongest peaks, descending by power
    top_bins: Vec<BinPower>,
    transform_size: usize,
    sample_rate: u32,
    noise_floor: f32,
    dominance_ratio: f32,
    candidates_per_target: usize,
    chord_tolerance: usize,
}

impl SpectrumSnapshot {
    /// Snapshot of silence, used before the first analysis cycle
    pub fn silent(transform_size: usize, sample_rate: u32, config: &AnalysisConfig) -> Self {
        Self {
            magnitudes: vec![0.0; transform_size / 2],
            max_bins: 0,
            top_bins: Vec::new(),
            transform_size,
            sample_rate,
            noise_floor: config.noise_floor,
            dominance_ratio: config.dominance_ratio,
            candidates_per_target: config.candidates_per_target,
            chord_tolerance: config.chord_tolerance,
        }
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn max_bins_considered(&self) -> usize {
        self.max_bins
    }

    pub fn top_bins(&self) -> &[BinPower] {
        &self.top_bins
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Fractional bin index of `frequency`
    pub fn bin_for_frequency(&self, frequency: f32) -> f32 {
        frequency * self.transform_size as f32 / self.sample_rate as f32
    }

    pub fn frequency_for_bin(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.transform_size as f32
    }

    /// Sum of the kept peaks' magnitudes
    pub fn total_power(&self) -> f32 {
        self.top_bins.iter().map(|p| p.power).sum()
    }

    /// Frequency of the strongest peak, if anything is above the noise floor
    pub fn dominant_frequency(&self) -> Option<f32> {
        if self.total_power() < self.noise_floor {
            return None;
        }
        self.top_bins.first().map(|p| self.frequency_for_bin(p.bin))
    }

    /// Whether `frequencies` are currently the dominant spectral content
    ///
    /// A target matches when one of the first `candidates_per_target * len`
    /// peaks (3 by default) lies on its rounded bin or an adjacent one, and
    /// that peak is at least `dominance_ratio` of the strongest peak. A single
    /// note needs its one match; a chord of N notes needs N - `chord_tolerance`
    /// (N - 1 by default: one muted or detuned string). Anything below the
    /// noise floor is never detected.
    pub fn detect(&self, frequencies: &[f32]) -> bool {
        if frequencies.is_empty() || self.top_bins.is_empty() {
            return false;
        }
        if self.total_power() < self.noise_floor {
            return false;
        }

        let gate = self.top_bins[0].power * self.dominance_ratio;
        let window = (self.candidates_per_target * frequencies.len()).min(self.top_bins.len());
        let candidates = &self.top_bins[..window];

        let matches = frequencies
            .iter()
            .filter(|&&frequency| {
                let target = self.bin_for_frequency(frequency).round() as i64;
                candidates
                    .iter()
                    .any(|peak| peak.power >= gate && (peak.bin as i64 - target).abs() <= 1)
            })
            .count();

        match frequencies.len() {
            1 => matches == 1,
            n => matches >= n.saturating_sub(self.chord_tolerance).max(1),
        }
    }
}

/// Windowed FFT front end of the pitch detector
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    transform_size: usize,
    sample_rate: u32,
    max_bins: usize,
    config: AnalysisConfig,
}

impl SpectrumAnalyzer {
    /// Build an analyzer for `config.transform_size`-point transforms
    ///
    /// Peaks are only searched below `max_frequency`.
    pub fn new(sample_rate: u32, max_frequency: f32, config: &AnalysisConfig) -> AnalysisResult<Self> {
        let n = config.transform_size;
        if n < 2 || !n.is_power_of_two() {
            return Err(AnalysisError::TransformSizeNotPowerOfTwo(n));
        }
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidSampleRate(sample_rate));
        }
        if !(max_frequency.is_finite() && max_frequency > 0.0) {
            return Err(AnalysisError::InvalidMaxFrequency(max_frequency));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let window = (0..n)
            .map(|i| {
                0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()
            })
            .collect();

        let max_bins = ((max_frequency * n as f32 / sample_rate as f32).ceil() as usize).min(n / 2);

        Ok(Self {
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); n],
            scratch,
            transform_size: n,
            sample_rate,
            max_bins,
            config: config.clone(),
        })
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Analyze one window (zero-padded or truncated to the transform size)
    pub fn analyze(&mut self, samples: &[Sample]) -> SpectrumSnapshot {
        let n = self.transform_size;

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let half = n / 2;
        let mut magnitudes = vec![0.0f32; half];
        for (k, magnitude) in magnitudes.iter_mut().enumerate() {
            let mirror = self.buffer[(n - k) % n].norm();
            let weight = 0.5 + k as f32 / (2.0 * n as f32);
            *magnitude = (self.buffer[k].norm() + mirror) / n as f32 * weight;
        }

        let top_bins = strongest_peaks(&magnitudes, self.max_bins);

        SpectrumSnapshot {
            magnitudes,
            max_bins: self.max_bins,
            top_bins,
            transform_size: n,
            sample_rate: self.sample_rate,
            noise_floor: self.config.noise_floor,
            dominance_ratio: self.config.dominance_ratio,
            candidates_per_target: self.config.candidates_per_target,
            chord_tolerance: self.config.chord_tolerance,
        }
    }
}

/// Up to [`TOP_BIN_COUNT`] local maxima below `limit`, strongest first
///
/// Neighbours are taken from the whole spectrum, so a slope still rising at
/// `limit` is not mistaken for a peak.
fn strongest_peaks(magnitudes: &[f32], limit: usize) -> Vec<BinPower> {
    let mut peaks: Vec<BinPower> = Vec::with_capacity(TOP_BIN_COUNT + 1);
    for bin in 1..limit.min(magnitudes.len()) {
        let power = magnitudes[bin];
        let next = magnitudes.get(bin + 1).copied().unwrap_or(0.0);
        if !(power > magnitudes[bin - 1] && power >= next) {
            continue;
        }
        if peaks.len() == TOP_BIN_COUNT && peaks[TOP_BIN_COUNT - 1].power >= power {
            continue;
        }
        let at = peaks.partition_point(|p| p.power >= power);
        peaks.insert(at, BinPower { power, bin });
        peaks.truncate(TOP_BIN_COUNT);
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 48000;
    const E2: f32 = 82.4;
    const A2: f32 = 110.0;
    const D3: f32 = 146.8;

    fn tones(frequencies: &[f32], len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                frequencies
                    .iter()
                    .map(|f| 0.3 * (2.0 * std::f32::consts::PI * f * i as f32 / RATE as f32).sin())
                    .sum()
            })
            .collect()
    }

    fn analyzer() -> SpectrumAnalyzer {
        SpectrumAnalyzer::new(RATE, 1200.0, &AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        let config = AnalysisConfig {
            transform_size: 6000,
            ..Default::default()
        };
        assert_eq!(
            SpectrumAnalyzer::new(RATE, 1200.0, &config).err(),
            Some(AnalysisError::TransformSizeNotPowerOfTwo(6000))
        );
        assert_eq!(
            SpectrumAnalyzer::new(0, 1200.0, &AnalysisConfig::default()).err(),
            Some(AnalysisError::InvalidSampleRate(0))
        );
    }

    #[test]
    fn test_single_note_detected() {
        let mut analyzer = analyzer();
        let snapshot = analyzer.analyze(&tones(&[A2], 8192));

        assert_eq!(snapshot.magnitudes().len(), 4096);
        assert!(snapshot.detect(&[110.0]));
        assert!(!snapshot.detect(&[220.0]));
        assert!(!snapshot.detect(&[82.4]));

        let dominant = snapshot.dominant_frequency().unwrap();
        assert!((dominant - 110.0).abs() < 6.0, "dominant {}", dominant);
    }

    #[test]
    fn test_silence_not_detected() {
        let mut analyzer = analyzer();
        let snapshot = analyzer.analyze(&vec![0.0; 8192]);

        assert!(snapshot.total_power() < 0.001);
        assert!(!snapshot.detect(&[110.0]));
        assert!(snapshot.dominant_frequency().is_none());
    }

    #[test]
    fn test_chord_detected() {
        let mut analyzer = analyzer();
        let snapshot = analyzer.analyze(&tones(&[E2, A2, D3], 8192));
        assert!(snapshot.detect(&[E2, A2, D3]));
    }

    #[test]
    fn test_chord_tolerates_one_silent_string() {
        let mut analyzer = analyzer();

        let snapshot = analyzer.analyze(&tones(&[E2, A2], 8192));
        assert!(snapshot.detect(&[E2, A2, D3]));

        let snapshot = analyzer.analyze(&tones(&[A2, D3], 8192));
        assert!(snapshot.detect(&[E2, A2, D3]));
    }

    #[test]
    fn test_chord_with_two_silent_strings_not_detected() {
        let mut analyzer = analyzer();
        let snapshot = analyzer.analyze(&tones(&[A2], 8192));
        assert!(!snapshot.detect(&[E2, A2, D3]));
    }

    #[test]
    fn test_strict_chord_matching() {
        let config = AnalysisConfig {
            chord_tolerance: 0,
            ..Default::default()
        };
        let mut analyzer = SpectrumAnalyzer::new(RATE, 1200.0, &config).unwrap();

        let snapshot = analyzer.analyze(&tones(&[E2, A2], 8192));
        assert!(!snapshot.detect(&[E2, A2, D3]));
        assert!(snapshot.detect(&[E2, A2]));
    }

    #[test]
    fn test_peaks_limited_to_max_frequency() {
        let mut analyzer = SpectrumAnalyzer::new(RATE, 400.0, &AnalysisConfig::default()).unwrap();
        let snapshot = analyzer.analyze(&tones(&[880.0], 8192));

        assert!(snapshot.max_bins_considered() <= 69);
        assert!(!snapshot.detect(&[880.0]));
    }

    #[test]
    fn test_strongest_peaks_sorted_and_bounded() {
        let mut magnitudes = vec![0.0f32; 64];
        for (i, bin) in (2..60).step_by(4).enumerate() {
            magnitudes[bin] = (i + 1) as f32;
        }
        let peaks = strongest_peaks(&magnitudes, magnitudes.len());

        assert_eq!(peaks.len(), TOP_BIN_COUNT);
        assert!(peaks.windows(2).all(|w| w[0].power >= w[1].power));
        assert_eq!(peaks[0].bin, 58);
    }

    #[test]
    fn test_rising_slope_at_limit_is_not_a_peak() {
        let mut magnitudes: Vec<f32> = (0..64).map(|bin| bin as f32).collect();
        magnitudes[10] = 50.0;

        let peaks = strongest_peaks(&magnitudes, 32);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].bin, 10);

        // The true last bin of the spectrum can still peak
        let peaks = strongest_peaks(&magnitudes, 64);
        assert_eq!(peaks[0].bin, 63);
    }
}
