//! Lock-free playback controls shared between control threads and the engine
//!
//! Every setting here is a single atomic word. Control threads store, the
//! audio thread loads (or takes) at the start of each callback, so a change
//! made mid-callback simply applies at the next callback boundary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF64;
use basedrop::{Owned, Shared};

use super::command::{EngineCommand, COMMAND_QUEUE_CAPACITY};
use super::error::{EngineError, EngineResult};
use super::gc::gc_handle;
use crate::song::DecodedSong;
use crate::timestretch::{TimeStretcher, MAX_RATIO, MIN_RATIO};

/// Bit pattern meaning "no seek pending"
///
/// Not the bit pattern of any finite `f64`, and seeks are only stored as
/// finite values.
const NO_SEEK: u64 = u64::MAX;

/// Atomic playback state
///
/// Written by control threads (seek/tempo/pitch/pause/stop) and by the audio
/// thread (position); readable from anywhere without locks.
#[derive(Debug)]
pub struct PlaybackControls {
    /// Pending seek target in seconds (f64 bits), or `NO_SEEK`
    pending_seek: AtomicU64,
    tempo_ratio: AtomicF64,
    pitch_ratio: AtomicF64,
    paused: AtomicBool,
    stopped: AtomicBool,
    /// Set by `stop()`, taken by the engine to rewind
    stop_requested: AtomicBool,
    /// Written by the audio thread only
    current_sample: AtomicU64,
    current_seconds: AtomicF64,
    song_loaded: AtomicBool,
}

impl PlaybackControls {
    pub fn new() -> Self {
        Self {
            pending_seek: AtomicU64::new(NO_SEEK),
            tempo_ratio: AtomicF64::new(1.0),
            pitch_ratio: AtomicF64::new(1.0),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            current_sample: AtomicU64::new(0),
            current_seconds: AtomicF64::new(0.0),
            song_loaded: AtomicBool::new(false),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Control side
    // ─────────────────────────────────────────────────────────────

    /// Request a seek; a later request overwrites an unconsumed one
    pub fn seek(&self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds } else { 0.0 };
        self.pending_seek.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn set_tempo_ratio(&self, ratio: f64) -> EngineResult<()> {
        validate_ratio("tempo", ratio)?;
        self.tempo_ratio.store(ratio, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_pitch_ratio(&self, ratio: f64) -> EngineResult<()> {
        validate_ratio("pitch", ratio)?;
        self.pitch_ratio.store(ratio, Ordering::Relaxed);
        Ok(())
    }

    pub fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    /// Rewind to the start and stay silent until [`play`](Self::play)
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Leave the stopped state (does not clear pause)
    pub fn play(&self) {
        self.stopped.store(false, Ordering::Relaxed);
    }

    // ─────────────────────────────────────────────────────────────
    // Read-only getters
    // ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn tempo_ratio(&self) -> f64 {
        self.tempo_ratio.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Read position in the decoded song, in samples
    #[inline]
    pub fn current_sample(&self) -> u64 {
        self.current_sample.load(Ordering::Relaxed)
    }

    /// Read position in seconds of song time
    #[inline]
    pub fn current_playback_seconds(&self) -> f64 {
        self.current_seconds.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn song_loaded(&self) -> bool {
        self.song_loaded.load(Ordering::Relaxed)
    }

    pub fn has_pending_seek(&self) -> bool {
        self.pending_seek.load(Ordering::Acquire) != NO_SEEK
    }

    // ─────────────────────────────────────────────────────────────
    // Engine side
    // ─────────────────────────────────────────────────────────────

    /// Take the pending seek, clearing it in the same atomic step
    pub(crate) fn take_pending_seek(&self) -> Option<f64> {
        match self.pending_seek.swap(NO_SEEK, Ordering::AcqRel) {
            NO_SEEK => None,
            bits => Some(f64::from_bits(bits)),
        }
    }

    pub(crate) fn take_stop_request(&self) -> bool {
        self.stop_requested.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn publish_position(&self, sample: usize, seconds: f64) {
        self.current_sample.store(sample as u64, Ordering::Relaxed);
        self.current_seconds.store(seconds, Ordering::Relaxed);
    }

    pub(crate) fn set_song_loaded(&self, loaded: bool) {
        self.song_loaded.store(loaded, Ordering::Relaxed);
    }
}

impl Default for PlaybackControls {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_ratio(kind: &'static str, value: f64) -> EngineResult<()> {
    if (MIN_RATIO..=MAX_RATIO).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidRatio { kind, value })
    }
}

/// Control-side handle to a [`PlaybackEngine`](super::PlaybackEngine)
///
/// Owns the producer end of the command queue plus a reference to the shared
/// controls. Lives on the UI / main thread while the engine lives on the
/// audio thread.
pub struct PlaybackHandle {
    controls: Arc<PlaybackControls>,
    commands: rtrb::Producer<EngineCommand>,
}

impl PlaybackHandle {
    pub(crate) fn new(controls: Arc<PlaybackControls>, commands: rtrb::Producer<EngineCommand>) -> Self {
        Self { controls, commands }
    }

    fn send(&mut self, command: EngineCommand) -> EngineResult<()> {
        self.commands.push(command).map_err(|_| {
            log::warn!(
                "Engine command queue full ({} slots); is the audio callback running?",
                COMMAND_QUEUE_CAPACITY
            );
            EngineError::CommandQueueFull
        })
    }

    /// Hand a song to the engine; playback restarts from the beginning
    pub fn load_song(&mut self, song: Shared<DecodedSong>) -> EngineResult<()> {
        self.send(EngineCommand::LoadSong { song })?;
        self.controls.play();
        Ok(())
    }

    pub fn unload_song(&mut self) -> EngineResult<()> {
        self.send(EngineCommand::UnloadSong)
    }

    /// Rebuild the stretcher for a new output rate
    ///
    /// The stretcher is constructed here, on the calling thread, and only
    /// swapped in by the audio thread.
    pub fn configure(&mut self, sample_rate: u32) -> EngineResult<()> {
        if sample_rate == 0 {
            return Err(EngineError::InvalidSampleRate(sample_rate));
        }
        let stretcher = Owned::new(&gc_handle(), TimeStretcher::new(sample_rate));
        self.send(EngineCommand::Configure { sample_rate, stretcher })
    }

    pub fn set_tempo_ratio(&self, ratio: f64) -> EngineResult<()> {
        self.controls.set_tempo_ratio(ratio)
    }

    pub fn set_pitch_ratio(&self, ratio: f64) -> EngineResult<()> {
        self.controls.set_pitch_ratio(ratio)
    }

    pub fn seek(&self, seconds: f64) {
        self.controls.seek(seconds);
    }

    pub fn pause(&self, paused: bool) {
        self.controls.pause(paused);
    }

    pub fn stop(&self) {
        self.controls.stop();
    }

    pub fn play(&self) {
        self.controls.play();
    }

    pub fn current_playback_seconds(&self) -> f64 {
        self.controls.current_playback_seconds()
    }

    /// Shared controls, for read-only observers on other threads
    pub fn controls(&self) -> &Arc<PlaybackControls> {
        &self.controls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_seek_wins() {
        let controls = PlaybackControls::new();
        controls.seek(1.5);
        controls.seek(3.25);

        assert!(controls.has_pending_seek());
        assert_eq!(controls.take_pending_seek(), Some(3.25));
        assert_eq!(controls.take_pending_seek(), None);
    }

    #[test]
    fn test_non_finite_seek_goes_to_start() {
        let controls = PlaybackControls::new();
        controls.seek(f64::NAN);
        assert_eq!(controls.take_pending_seek(), Some(0.0));
    }

    #[test]
    fn test_ratio_validation() {
        let controls = PlaybackControls::new();
        assert!(controls.set_tempo_ratio(0.5).is_ok());
        assert_eq!(controls.tempo_ratio(), 0.5);

        assert_eq!(
            controls.set_tempo_ratio(0.0),
            Err(EngineError::InvalidRatio { kind: "tempo", value: 0.0 })
        );
        assert!(controls.set_pitch_ratio(-1.0).is_err());
        assert!(controls.set_pitch_ratio(f64::INFINITY).is_err());
        assert!(controls.set_pitch_ratio(f64::NAN).is_err());
        assert_eq!(controls.tempo_ratio(), 0.5);
        assert_eq!(controls.pitch_ratio(), 1.0);
    }

    #[test]
    fn test_ratio_outside_stretch_range_rejected() {
        let controls = PlaybackControls::new();
        assert_eq!(
            controls.set_tempo_ratio(0.1),
            Err(EngineError::InvalidRatio { kind: "tempo", value: 0.1 })
        );
        assert!(controls.set_pitch_ratio(4.5).is_err());
        assert_eq!(controls.tempo_ratio(), 1.0);
        assert_eq!(controls.pitch_ratio(), 1.0);

        assert!(controls.set_tempo_ratio(MIN_RATIO).is_ok());
        assert!(controls.set_pitch_ratio(MAX_RATIO).is_ok());
        assert_eq!(controls.tempo_ratio(), MIN_RATIO);
        assert_eq!(controls.pitch_ratio(), MAX_RATIO);
    }

    #[test]
    fn test_stop_request_is_taken_once() {
        let controls = PlaybackControls::new();
        controls.stop();
        assert!(controls.is_stopped());
        assert!(controls.take_stop_request());
        assert!(!controls.take_stop_request());

        controls.play();
        assert!(!controls.is_stopped());
    }
}
