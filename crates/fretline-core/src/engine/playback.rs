//! The playback engine: one `read_frame` per audio callback
//!
//! The engine is owned exclusively by the audio thread. Per callback it:
//!
//! 1. applies queued commands (song swap, stretcher swap) and a pending seek,
//! 2. outputs silence while paused, stopped or without a song,
//! 3. copies straight from the decoded arrays when tempo and pitch are both
//!    exactly 1.0, or pull-drives the [`TimeStretcher`] otherwise,
//! 4. appends the mono downmix of what it produced to the shared
//!    [`CircularSampleBuffer`] and publishes the playback position.
//!
//! Shortfalls (song still decoding, end of song, stretcher starved) become
//! silence. Nothing in the per-callback path locks, blocks or allocates.

use std::sync::Arc;

use basedrop::{Owned, Shared};

use super::command::{command_channel, EngineCommand};
use super::controls::{PlaybackControls, PlaybackHandle};
use super::error::{EngineError, EngineResult};
use super::gc::gc_handle;
use crate::ring::CircularSampleBuffer;
use crate::song::DecodedSong;
use crate::timestretch::{TimeStretcher, MAX_BLOCK_INPUT_FRAMES};
use crate::types::{Sample, StereoBuffer, StereoSample};

/// Frames downmixed per chunk when feeding the analysis ring
const DOWNMIX_CHUNK_FRAMES: usize = 1024;

/// Renders the loaded song into per-callback output buffers
pub struct PlaybackEngine {
    sample_rate: u32,
    song: Option<Shared<DecodedSong>>,
    /// Next sample to read from the decoded arrays; owned by this thread
    current_sample: usize,
    stretcher: Owned<TimeStretcher>,
    /// Ratios currently applied to the stretcher (NaN forces a re-apply)
    applied_tempo: f64,
    applied_pitch: f64,
    /// Whether the previous callback went through the stretcher
    stretch_active: bool,
    /// Pre-allocated input staging for the stretcher
    feed_buffer: StereoBuffer,
    /// Pre-allocated mono scratch for the analysis ring
    downmix: Vec<Sample>,
    ring: Arc<CircularSampleBuffer>,
    controls: Arc<PlaybackControls>,
    commands: rtrb::Consumer<EngineCommand>,
}

impl PlaybackEngine {
    /// Create an engine and its control handle
    ///
    /// Call on a non-real-time thread, then move the engine into the audio
    /// callback. Fails fast on a zero sample rate.
    pub fn new(
        sample_rate: u32,
        ring: Arc<CircularSampleBuffer>,
    ) -> EngineResult<(PlaybackEngine, PlaybackHandle)> {
        if sample_rate == 0 {
            return Err(EngineError::InvalidSampleRate(sample_rate));
        }

        let controls = Arc::new(PlaybackControls::new());
        let (producer, consumer) = command_channel();

        let engine = PlaybackEngine {
            sample_rate,
            song: None,
            current_sample: 0,
            stretcher: Owned::new(&gc_handle(), TimeStretcher::new(sample_rate)),
            applied_tempo: f64::NAN,
            applied_pitch: f64::NAN,
            stretch_active: false,
            feed_buffer: StereoBuffer::silence(MAX_BLOCK_INPUT_FRAMES),
            downmix: vec![0.0; DOWNMIX_CHUNK_FRAMES],
            ring,
            controls: Arc::clone(&controls),
            commands: consumer,
        };

        log::debug!("Playback engine created at {}Hz", sample_rate);
        Ok((engine, PlaybackHandle::new(controls, producer)))
    }

    /// Rebuild the stretcher for a new output rate
    ///
    /// Allocates, so only call this while the engine is not yet (or no
    /// longer) owned by the audio callback. From other threads use
    /// [`PlaybackHandle::configure`].
    pub fn configure(&mut self, sample_rate: u32) -> EngineResult<()> {
        if sample_rate == 0 {
            return Err(EngineError::InvalidSampleRate(sample_rate));
        }
        let stretcher = Owned::new(&gc_handle(), TimeStretcher::new(sample_rate));
        self.install_stretcher(sample_rate, stretcher);
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn controls(&self) -> &Arc<PlaybackControls> {
        &self.controls
    }

    fn install_stretcher(&mut self, sample_rate: u32, stretcher: Owned<TimeStretcher>) {
        self.sample_rate = sample_rate;
        // Old stretcher is dropped here; Owned defers the free to the collector
        self.stretcher = stretcher;
        self.applied_tempo = f64::NAN;
        self.applied_pitch = f64::NAN;
        self.stretch_active = false;
    }

    /// Apply queued commands (real-time safe, never blocks)
    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                EngineCommand::LoadSong { song } => {
                    self.song = Some(song);
                    self.rewind();
                    self.controls.set_song_loaded(true);
                }
                EngineCommand::UnloadSong => {
                    self.song = None;
                    self.rewind();
                    self.controls.set_song_loaded(false);
                }
                EngineCommand::Configure { sample_rate, stretcher } => {
                    self.install_stretcher(sample_rate, stretcher);
                }
            }
        }
    }

    fn rewind(&mut self) {
        self.current_sample = 0;
        self.stretcher.reset();
        self.stretch_active = false;
        self.publish_position();
    }

    fn publish_position(&self) {
        let seconds = self
            .song
            .as_ref()
            .map(|song| song.seconds_at(self.current_sample))
            .unwrap_or(0.0);
        self.controls.publish_position(self.current_sample, seconds);
    }

    /// Render one callback's worth of audio
    ///
    /// Always fills `left.len().min(right.len())` frames of both channels.
    /// Output is not clipped.
    pub fn read_frame(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let frames = left.len().min(right.len());
        let (left, right) = (&mut left[..frames], &mut right[..frames]);

        self.process_commands();

        if let Some(seconds) = self.controls.take_pending_seek() {
            if let Some(song) = self.song.as_ref() {
                self.current_sample = song.sample_at(seconds);
            }
            self.stretcher.reset();
            self.stretch_active = false;
            self.publish_position();
        }

        if self.controls.take_stop_request() {
            self.rewind();
        }

        // Cloning a Shared only bumps a refcount
        let song = match self.song.clone() {
            Some(song) if !self.controls.is_paused() && !self.controls.is_stopped() => song,
            _ => {
                left.fill(0.0);
                right.fill(0.0);
                return;
            }
        };

        let tempo = self.controls.tempo_ratio();
        let pitch = self.controls.pitch_ratio();

        if tempo == 1.0 && pitch == 1.0 {
            self.stretch_active = false;
            self.render_direct(&song, left, right);
        } else {
            self.apply_ratios(tempo, pitch);
            self.render_stretched(&song, left, right);
        }

        self.feed_analysis(left, right);
        self.publish_position();
    }

    fn render_direct(&mut self, song: &DecodedSong, left: &mut [Sample], right: &mut [Sample]) {
        let copied = song.read_channels(self.current_sample, left, right);
        left[copied..].fill(0.0);
        right[copied..].fill(0.0);
        self.current_sample += copied;
    }

    fn apply_ratios(&mut self, tempo: f64, pitch: f64) {
        if !self.stretch_active {
            // Entering the stretched path: drop anything left from before
            self.stretcher.reset();
            self.stretch_active = true;
        }
        if tempo != self.applied_tempo {
            self.stretcher.set_time_ratio(tempo);
            self.applied_tempo = tempo;
        }
        if pitch != self.applied_pitch {
            self.stretcher.set_pitch_ratio(pitch);
            self.applied_pitch = pitch;
        }
    }

    fn render_stretched(&mut self, song: &DecodedSong, left: &mut [Sample], right: &mut [Sample]) {
        let frames = left.len();
        let total = song.total_samples();
        let mut produced = 0;

        while produced < frames {
            if self.stretcher.available() > 0 {
                produced += self
                    .stretcher
                    .retrieve(&mut left[produced..], &mut right[produced..]);
                continue;
            }
            if self.stretcher.is_finished() {
                break;
            }

            let needed = self
                .stretcher
                .input_frames_needed()
                .min(self.feed_buffer.len());
            let got = if needed > 0 {
                song.read_stereo(
                    self.current_sample,
                    &mut self.feed_buffer.as_mut_slice()[..needed],
                )
            } else {
                0
            };
            self.current_sample += got;
            let is_final = self.current_sample >= total;

            if needed > 0 && got == 0 && !is_final {
                // Decoder hasn't caught up: starve to silence
                break;
            }
            let fed: &[StereoSample] = &self.feed_buffer.as_slice()[..got];
            self.stretcher.feed(fed, is_final);
        }

        left[produced..].fill(0.0);
        right[produced..].fill(0.0);
    }

    fn feed_analysis(&mut self, left: &[Sample], right: &[Sample]) {
        for (l_chunk, r_chunk) in left
            .chunks(DOWNMIX_CHUNK_FRAMES)
            .zip(right.chunks(DOWNMIX_CHUNK_FRAMES))
        {
            let mono = &mut self.downmix[..l_chunk.len()];
            for ((m, &l), &r) in mono.iter_mut().zip(l_chunk).zip(r_chunk) {
                *m = StereoSample::new(l, r).downmix();
            }
            self.ring.append(mono);
        }
    }
}
