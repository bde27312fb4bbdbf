//! Background pitch detector
//!
//! One thread per detector. Each cycle it copies the newest
//! `transform_size` samples out of the shared ring, runs the
//! [`SpectrumAnalyzer`] and swaps the result into an `ArcSwap`. Readers load
//! the latest snapshot lock-free, so `detect` can be called from any thread
//! at any rate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use arc_swap::ArcSwap;

use super::error::{AnalysisError, AnalysisResult};
use super::spectrum::{SpectrumAnalyzer, SpectrumSnapshot};
use super::AnalysisConfig;
use crate::ring::CircularSampleBuffer;

/// State shared between the analysis thread and the detector handle
struct DetectorShared {
    snapshot: ArcSwap<SpectrumSnapshot>,
    running: AtomicBool,
    cycles: AtomicU64,
}

/// Periodic FFT analysis of the playback ring
pub struct PitchDetector {
    shared: Arc<DetectorShared>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
    max_frequency: f32,
}

impl PitchDetector {
    /// Start analysing `ring` on a background thread
    ///
    /// `max_frequency` bounds the peak search, typically the highest note of
    /// the instrument being practised.
    pub fn start(
        ring: Arc<CircularSampleBuffer>,
        sample_rate: u32,
        max_frequency: f32,
        config: &AnalysisConfig,
    ) -> AnalysisResult<Self> {
        let mut analyzer = SpectrumAnalyzer::new(sample_rate, max_frequency, config)?;
        let window_len = analyzer.transform_size();
        if window_len > ring.capacity() {
            return Err(AnalysisError::WindowExceedsCapacity {
                window: window_len,
                capacity: ring.capacity(),
            });
        }

        let shared = Arc::new(DetectorShared {
            snapshot: ArcSwap::from_pointee(SpectrumSnapshot::silent(window_len, sample_rate, config)),
            running: AtomicBool::new(true),
            cycles: AtomicU64::new(0),
        });

        let period = Duration::from_millis(config.period_ms.max(1));
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("fretline-pitch".to_string())
            .spawn(move || {
                let mut window = vec![0.0f32; window_len];
                while thread_shared.running.load(Ordering::Acquire) {
                    ring.read_window(&mut window);
                    let snapshot = analyzer.analyze(&window);
                    thread_shared.snapshot.store(Arc::new(snapshot));
                    thread_shared.cycles.fetch_add(1, Ordering::Release);
                    std::thread::park_timeout(period);
                }
                log::debug!("Pitch detector thread exiting");
            })
            .map_err(|e| AnalysisError::Spawn(e.to_string()))?;

        log::info!(
            "Pitch detector started: {} point FFT every {:?}, peaks below {:.1}Hz",
            window_len,
            period,
            max_frequency
        );

        Ok(Self {
            shared,
            thread: Some(thread),
            sample_rate,
            max_frequency,
        })
    }

    /// Whether the given frequencies are currently sounding
    ///
    /// One frequency is a single note; several are a chord, matched with one
    /// string of tolerance.
    pub fn detect(&self, frequencies: &[f32]) -> bool {
        self.shared.snapshot.load().detect(frequencies)
    }

    /// Latest published spectrum
    pub fn snapshot(&self) -> Arc<SpectrumSnapshot> {
        self.shared.snapshot.load_full()
    }

    /// Completed analysis cycles since start
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_frequency(&self) -> f32 {
        self.max_frequency
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the analysis thread and wait for it; the last snapshot stays readable
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shared.running.store(false, Ordering::Release);
            thread.thread().unpark();
            if thread.join().is_err() {
                log::error!("Pitch detector thread panicked");
            }
        }
    }
}

impl Drop for PitchDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PitchDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PitchDetector")
            .field("sample_rate", &self.sample_rate)
            .field("max_frequency", &self.max_frequency)
            .field("running", &self.is_running())
            .field("cycles", &self.cycles())
            .finish()
    }
}
