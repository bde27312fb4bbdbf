//! Control-thread facade over decoder, engine and detector
//!
//! [`Player::new`] hands back the [`PlaybackEngine`] for the audio callback
//! and keeps everything else: the engine's control handle, the current
//! decode job, the shared analysis ring and the pitch detector.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analysis::PitchDetector;
use crate::config::PlayerConfig;
use crate::decoder::{DecodeJob, StreamDecoder};
use crate::engine::{EngineError, PlaybackControls, PlaybackEngine, PlaybackHandle};
use crate::error::Result;
use crate::music::InstrumentPart;
use crate::ring::CircularSampleBuffer;

/// The configuration surface of a practice session
pub struct Player {
    config: PlayerConfig,
    sample_rate: u32,
    handle: PlaybackHandle,
    ring: Arc<CircularSampleBuffer>,
    decode: Option<DecodeJob>,
    song_path: Option<PathBuf>,
    detector: Option<PitchDetector>,
    part: InstrumentPart,
}

impl Player {
    /// Create a player and the engine its audio callback should own
    ///
    /// Tempo, pitch and part start from `config.playback`.
    pub fn new(sample_rate: u32, config: &PlayerConfig) -> Result<(Player, PlaybackEngine)> {
        if sample_rate == 0 {
            return Err(EngineError::InvalidSampleRate(sample_rate).into());
        }

        let ring = Arc::new(CircularSampleBuffer::new(ring_capacity(sample_rate, config)));
        let (engine, handle) = PlaybackEngine::new(sample_rate, Arc::clone(&ring))?;
        handle.set_tempo_ratio(config.playback.tempo_ratio)?;
        handle.set_pitch_ratio(config.playback.pitch_ratio)?;

        let player = Player {
            config: config.clone(),
            sample_rate,
            handle,
            ring,
            decode: None,
            song_path: None,
            detector: None,
            part: config.playback.part,
        };
        Ok((player, engine))
    }

    /// Start decoding `path` and hand it to the engine
    ///
    /// Returns the song duration in seconds. Any failure, from a missing
    /// source to a full command queue, leaves the current song and its
    /// decode untouched. The previous decode is cancelled once the new song
    /// has been handed to the engine.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<f64> {
        let path = path.as_ref();
        let decoder = StreamDecoder::open(path, self.sample_rate)?;
        let duration = decoder.duration_seconds();

        // On error the new job is dropped, which cancels and joins it
        let job = decoder.spawn()?;
        self.handle.load_song(job.song())?;

        if let Some(previous) = self.decode.replace(job) {
            finish_decode(previous);
        }
        self.song_path = Some(path.to_path_buf());

        log::info!("Loaded {:?} ({:.2}s)", path, duration);
        Ok(duration)
    }

    fn cancel_decode(&mut self) {
        if let Some(job) = self.decode.take() {
            finish_decode(job);
        }
    }

    /// Switch to a new device rate
    ///
    /// Rebuilds the engine's stretcher, re-decodes the current song at the
    /// new rate resuming from the same position, and restarts analysis.
    pub fn set_output_rate(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(EngineError::InvalidSampleRate(sample_rate).into());
        }
        if sample_rate == self.sample_rate {
            return Ok(());
        }

        log::info!("Output rate {}Hz -> {}Hz", self.sample_rate, sample_rate);
        self.handle.configure(sample_rate)?;
        self.sample_rate = sample_rate;

        if let Some(path) = self.song_path.clone() {
            let position = self.handle.current_playback_seconds();
            let paused = self.handle.controls().is_paused();
            let stopped = self.handle.controls().is_stopped();
            self.load(&path)?;
            self.handle.seek(position);
            self.handle.pause(paused);
            if stopped {
                self.handle.stop();
            }
        }

        if self.detector.is_some() {
            self.start_analysis(self.part)?;
        }
        Ok(())
    }

    pub fn set_tempo_ratio(&self, ratio: f64) -> Result<()> {
        Ok(self.handle.set_tempo_ratio(ratio)?)
    }

    pub fn set_pitch_ratio(&self, ratio: f64) -> Result<()> {
        Ok(self.handle.set_pitch_ratio(ratio)?)
    }

    pub fn seek(&self, seconds: f64) {
        self.handle.seek(seconds);
    }

    pub fn pause(&self, paused: bool) {
        self.handle.pause(paused);
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn play(&self) {
        self.handle.play();
    }

    /// Start (or restart) pitch detection tuned to `part`'s range
    pub fn start_analysis(&mut self, part: InstrumentPart) -> Result<()> {
        self.stop_analysis();
        let detector = PitchDetector::start(
            Arc::clone(&self.ring),
            self.sample_rate,
            part.max_frequency(),
            &self.config.analysis,
        )?;
        self.detector = Some(detector);
        self.part = part;
        Ok(())
    }

    pub fn stop_analysis(&mut self) {
        if let Some(mut detector) = self.detector.take() {
            detector.stop();
        }
    }

    /// Whether `frequencies` are sounding in the playback output
    ///
    /// Always false while analysis is stopped.
    pub fn detect(&self, frequencies: &[f32]) -> bool {
        self.detector
            .as_ref()
            .map(|d| d.detect(frequencies))
            .unwrap_or(false)
    }

    pub fn detector(&self) -> Option<&PitchDetector> {
        self.detector.as_ref()
    }

    pub fn current_playback_seconds(&self) -> f64 {
        self.handle.current_playback_seconds()
    }

    /// Fraction of the current song decoded so far (0.0 without a song)
    pub fn decode_progress(&self) -> f32 {
        self.decode.as_ref().map(|job| job.progress()).unwrap_or(0.0)
    }

    /// Block until the current song is fully decoded
    ///
    /// Returns the number of samples written, 0 without a song.
    pub fn wait_for_decode(&mut self) -> Result<usize> {
        match self.decode.as_mut() {
            Some(job) => Ok(job.wait()?),
            None => Ok(0),
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.decode.as_ref().map(|job| job.song().duration_seconds())
    }

    pub fn song_path(&self) -> Option<&Path> {
        self.song_path.as_deref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn part(&self) -> InstrumentPart {
        self.part
    }

    /// Read-only playback state shared with the engine
    pub fn controls(&self) -> &Arc<PlaybackControls> {
        self.handle.controls()
    }

    /// True once the cursor has reached the end of a fully decoded song
    pub fn is_finished(&self) -> bool {
        let Some(job) = self.decode.as_ref() else {
            return false;
        };
        let song = job.song();
        song.is_complete() && self.controls().current_sample() as usize >= song.total_samples()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop_analysis();
        self.cancel_decode();
    }
}

/// Cancel a decode that is no longer needed and wait for its thread
fn finish_decode(mut job: DecodeJob) {
    job.cancel();
    if let Err(e) = job.wait() {
        log::debug!("Previous decode ended with: {}", e);
    }
}

/// Ring sized to the configured duration, never smaller than one analysis window
fn ring_capacity(sample_rate: u32, config: &PlayerConfig) -> usize {
    let seconds = config.playback.analysis_buffer_seconds;
    let seconds = if seconds.is_finite() && seconds > 0.0 { seconds } else { 1.0 };
    ((sample_rate as f64 * seconds).ceil() as usize).max(config.analysis.transform_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodeError;
    use crate::engine::COMMAND_QUEUE_CAPACITY;
    use crate::error::Error;

    const RATE: u32 = 48000;

    fn write_sine(path: &Path, frequency: f32, rate: u32, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (rate as f32 * seconds) as usize;
        for i in 0..frames {
            let t = i as f32 / rate as f32;
            writer
                .write_sample(0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin())
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Cut the second half of a mono float WAV, keeping its header
    fn truncate_half(path: &Path) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        let len = file.metadata().unwrap().len();
        let data = (len - 44) / 2;
        file.set_len(len - data).unwrap();
    }

    fn render_until_finished(player: &Player, engine: &mut PlaybackEngine, max_callbacks: usize) -> bool {
        let mut left = vec![0.0f32; 512];
        let mut right = vec![0.0f32; 512];
        for _ in 0..max_callbacks {
            if player.is_finished() {
                return true;
            }
            engine.read_frame(&mut left, &mut right);
        }
        player.is_finished()
    }

    #[test]
    fn test_zero_rate_rejected() {
        let result = Player::new(0, &PlayerConfig::default());
        assert!(matches!(
            result.err(),
            Some(Error::Engine(EngineError::InvalidSampleRate(0)))
        ));
    }

    #[test]
    fn test_missing_file_surfaces_at_load() {
        let (mut player, _engine) = Player::new(RATE, &PlayerConfig::default()).unwrap();
        let result = player.load("/nonexistent/song.ogg");

        assert!(matches!(
            result,
            Err(Error::Decode(DecodeError::SourceUnavailable { .. }))
        ));
        assert!(player.song_path().is_none());
        assert_eq!(player.decode_progress(), 0.0);
    }

    #[test]
    fn test_load_and_play() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a2.wav");
        write_sine(&path, 110.0, RATE, 1.0);

        let (mut player, mut engine) = Player::new(RATE, &PlayerConfig::default()).unwrap();
        let duration = player.load(&path).unwrap();
        assert!((duration - 1.0).abs() < 1e-6);
        assert_eq!(player.wait_for_decode().unwrap(), 48000);
        assert_eq!(player.decode_progress(), 1.0);

        let mut left = vec![0.0f32; 512];
        let mut right = vec![0.0f32; 512];
        engine.read_frame(&mut left, &mut right);

        assert!(left.iter().any(|s| s.abs() > 0.1));
        assert_eq!(left, right);
        assert!(player.current_playback_seconds() > 0.0);
    }

    #[test]
    fn test_config_ratios_applied() {
        let mut config = PlayerConfig::default();
        config.playback.tempo_ratio = 1.25;
        let (player, _engine) = Player::new(RATE, &config).unwrap();

        assert_eq!(player.controls().tempo_ratio(), 1.25);
        assert!(player.set_pitch_ratio(-1.0).is_err());
        assert_eq!(player.controls().pitch_ratio(), 1.0);
    }

    #[test]
    fn test_invalid_config_ratio_rejected() {
        let mut config = PlayerConfig::default();
        config.playback.tempo_ratio = 0.0;
        assert!(matches!(
            Player::new(RATE, &config).err(),
            Some(Error::Engine(EngineError::InvalidRatio { .. }))
        ));
    }

    #[test]
    fn test_set_output_rate_reloads_at_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a2.wav");
        write_sine(&path, 110.0, RATE, 2.0);

        let (mut player, mut engine) = Player::new(RATE, &PlayerConfig::default()).unwrap();
        player.load(&path).unwrap();
        player.wait_for_decode().unwrap();

        let mut left = vec![0.0f32; 480];
        let mut right = vec![0.0f32; 480];
        for _ in 0..100 {
            engine.read_frame(&mut left, &mut right);
        }
        assert!((player.current_playback_seconds() - 1.0).abs() < 1e-3);

        player.set_output_rate(44100).unwrap();
        player.wait_for_decode().unwrap();
        assert_eq!(player.sample_rate(), 44100);

        engine.read_frame(&mut left[..441], &mut right[..441]);
        assert_eq!(engine.sample_rate(), 44100);
        // Reloaded song resumed at the previous second and advanced 10ms
        assert!((player.current_playback_seconds() - 1.01).abs() < 1e-3);
        assert_eq!(player.controls().current_sample(), 44100 + 441);
    }

    #[test]
    fn test_short_stream_still_reaches_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_sine(&path, 110.0, RATE, 1.0);
        truncate_half(&path);

        let (mut player, mut engine) = Player::new(RATE, &PlayerConfig::default()).unwrap();
        assert!((player.load(&path).unwrap() - 1.0).abs() < 1e-6);
        player.wait_for_decode().unwrap();
        assert_eq!(player.decode_progress(), 1.0);

        assert!(render_until_finished(&player, &mut engine, 200));
        assert!((player.current_playback_seconds() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_short_stream_flushes_stretcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_sine(&path, 110.0, RATE, 1.0);
        truncate_half(&path);

        let (mut player, mut engine) = Player::new(RATE, &PlayerConfig::default()).unwrap();
        player.load(&path).unwrap();
        player.wait_for_decode().unwrap();
        player.set_pitch_ratio(1.5).unwrap();

        assert!(render_until_finished(&player, &mut engine, 400));
        assert_eq!(player.controls().current_sample(), 48000);
    }

    #[test]
    fn test_failed_load_keeps_current_decode() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.wav");
        let second = dir.path().join("second.wav");
        write_sine(&first, 110.0, RATE, 0.1);
        write_sine(&second, 220.0, RATE, 0.1);

        // No callback drains the queue, so loads fill it up
        let (mut player, _engine) = Player::new(RATE, &PlayerConfig::default()).unwrap();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            player.load(&first).unwrap();
        }
        let result = player.load(&second);

        assert!(matches!(
            result,
            Err(Error::Engine(EngineError::CommandQueueFull))
        ));
        assert_eq!(player.song_path(), Some(first.as_path()));
        assert_eq!(player.wait_for_decode().unwrap(), 4800);
        assert_eq!(player.decode_progress(), 1.0);
    }

    #[test]
    fn test_detect_false_without_analysis() {
        let (mut player, _engine) = Player::new(RATE, &PlayerConfig::default()).unwrap();
        assert!(!player.detect(&[110.0]));

        player.start_analysis(InstrumentPart::Bass).unwrap();
        assert_eq!(player.part(), InstrumentPart::Bass);
        assert!(player.detector().is_some());

        player.stop_analysis();
        assert!(player.detector().is_none());
        assert!(!player.detect(&[110.0]));
    }

    #[test]
    fn test_ring_never_smaller_than_window() {
        let mut config = PlayerConfig::default();
        config.playback.analysis_buffer_seconds = 0.01;
        assert_eq!(ring_capacity(RATE, &config), 8192);
        config.playback.analysis_buffer_seconds = f64::NAN;
        assert_eq!(ring_capacity(RATE, &config), 48000);
    }
}
