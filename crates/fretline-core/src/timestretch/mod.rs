//! Time-stretching and pitch-shifting via signalsmith-stretch
//!
//! [`TimeStretcher`] turns signalsmith's "give me N in, I give you M out"
//! interface into a pull-driven state machine the playback engine can drive
//! one callback at a time:
//!
//! ```text
//!   feed(frames, is_final) ──► input FIFO ──► process one block ──► output block
//!                                                                      │
//!   retrieve(left, right) ◄──────────── available() frames ◄───────────┘
//! ```
//!
//! Output is produced in fixed blocks of [`STRETCH_BLOCK_FRAMES`]. Each block
//! consumes `round(block / time_ratio)` input frames, so the time ratio is the
//! ratio of output duration to input duration: 0.5 halves the duration (each
//! output frame consumes two input frames), 2.0 doubles it.
//!
//! All buffers are allocated at construction; feeding and retrieving never
//! allocate.

use signalsmith_stretch::Stretch;

use crate::types::{Sample, StereoBuffer, StereoSample, OUTPUT_CHANNELS};

/// Output frames produced per processed block
pub const STRETCH_BLOCK_FRAMES: usize = 512;

/// Smallest accepted time/pitch ratio
pub const MIN_RATIO: f64 = 0.25;

/// Largest accepted time/pitch ratio
pub const MAX_RATIO: f64 = 4.0;

/// Most input frames a single block can ask for (at `MIN_RATIO`)
pub const MAX_BLOCK_INPUT_FRAMES: usize = STRETCH_BLOCK_FRAMES * 4;

/// Input FIFO capacity; room for a full block plus a ratio change mid-block
const INPUT_CAPACITY: usize = MAX_BLOCK_INPUT_FRAMES * 2;

/// Pull-based stereo time stretcher with independent pitch control
pub struct TimeStretcher {
    stretcher: Stretch,
    sample_rate: u32,
    /// Output duration / input duration
    time_ratio: f64,
    /// Frequency multiplier (2.0 = one octave up)
    pitch_ratio: f64,
    /// Fed but not yet processed input
    input: StereoBuffer,
    /// Most recently processed block
    output: StereoBuffer,
    /// Frames of `output` already handed out
    read_pos: usize,
    /// Frames of tail produced by `flush` after the final input
    tail_frames: usize,
    finished: bool,
}

impl TimeStretcher {
    /// Create a stretcher for stereo audio at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        let stretcher = Stretch::preset_default(OUTPUT_CHANNELS as u32, sample_rate);
        let tail_frames = stretcher.output_latency();

        Self {
            stretcher,
            sample_rate,
            time_ratio: 1.0,
            pitch_ratio: 1.0,
            input: StereoBuffer::with_capacity(INPUT_CAPACITY),
            output: StereoBuffer::with_capacity(STRETCH_BLOCK_FRAMES + tail_frames),
            read_pos: 0,
            tail_frames,
            finished: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Set the time ratio (output duration / input duration)
    ///
    /// Clamped to `MIN_RATIO..=MAX_RATIO`; callers validate beforehand.
    /// Takes effect from the next block.
    pub fn set_time_ratio(&mut self, ratio: f64) {
        self.time_ratio = ratio.clamp(MIN_RATIO, MAX_RATIO);
    }

    pub fn time_ratio(&self) -> f64 {
        self.time_ratio
    }

    /// Set the pitch ratio (frequency multiplier), independent of tempo
    pub fn set_pitch_ratio(&mut self, ratio: f64) {
        self.pitch_ratio = ratio.clamp(MIN_RATIO, MAX_RATIO);
        let semitones = 12.0 * self.pitch_ratio.log2();
        // No tonality limit: transpose the whole spectrum
        self.stretcher
            .set_transpose_factor_semitones(semitones as f32, None);
    }

    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    /// Input frames consumed by one output block at the current ratio
    fn block_input_frames(&self) -> usize {
        ((STRETCH_BLOCK_FRAMES as f64 / self.time_ratio).round() as usize).max(1)
    }

    /// Input frames still required before the next block can be produced
    ///
    /// Zero once enough input is buffered, or after the final input.
    pub fn input_frames_needed(&self) -> usize {
        if self.finished {
            return 0;
        }
        self.block_input_frames().saturating_sub(self.input.len())
    }

    /// Frames fed but not yet turned into output
    pub fn buffered_frames(&self) -> usize {
        self.input.len()
    }

    /// Frames ready to [`retrieve`](Self::retrieve)
    pub fn available(&self) -> usize {
        self.output.len() - self.read_pos
    }

    /// Whether the final input has been processed and flushed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Total latency in frames
    pub fn latency(&self) -> usize {
        self.stretcher.input_latency() + self.stretcher.output_latency()
    }

    /// Feed input frames
    ///
    /// When enough input is buffered (and the previous block has been fully
    /// retrieved) one block is processed. With `is_final` set and less than a
    /// block buffered, the remainder is processed and the stretcher's tail is
    /// flushed; after that the stretcher reports [`is_finished`](Self::is_finished)
    /// until [`reset`](Self::reset). Frames beyond the FIFO capacity are dropped.
    pub fn feed(&mut self, frames: &[StereoSample], is_final: bool) {
        if self.finished {
            return;
        }
        let accepted = self.input.extend_within_capacity(frames);
        if accepted < frames.len() {
            log::debug!(
                "Stretcher input FIFO full, dropped {} frames",
                frames.len() - accepted
            );
        }

        if self.available() > 0 {
            return;
        }

        let block_input = self.block_input_frames();
        if self.input.len() >= block_input {
            self.process_block(block_input);
        } else if is_final {
            self.finish();
        }
    }

    fn process_block(&mut self, input_frames: usize) {
        self.output.set_len_from_capacity(STRETCH_BLOCK_FRAMES);
        self.output.fill_silence();

        self.stretcher.process(
            &self.input.as_interleaved()[..input_frames * OUTPUT_CHANNELS],
            self.output.as_interleaved_mut(),
        );

        self.input.discard_front(input_frames);
        self.read_pos = 0;
    }

    fn finish(&mut self) {
        let input_frames = self.input.len();
        let body = ((input_frames as f64 * self.time_ratio).round() as usize)
            .min(STRETCH_BLOCK_FRAMES);
        let total = body + self.tail_frames;

        self.output.set_len_from_capacity(total);
        self.output.fill_silence();

        let output = self.output.as_interleaved_mut();
        let (body_out, tail_out) = output.split_at_mut(body * OUTPUT_CHANNELS);
        if input_frames > 0 && body > 0 {
            self.stretcher.process(
                &self.input.as_interleaved()[..input_frames * OUTPUT_CHANNELS],
                body_out,
            );
        }
        self.stretcher.flush(tail_out);

        self.input.clear();
        self.read_pos = 0;
        self.finished = true;
    }

    /// Copy ready frames into separate channels, returning how many were copied
    pub fn retrieve(&mut self, left: &mut [Sample], right: &mut [Sample]) -> usize {
        let count = left.len().min(right.len()).min(self.available());
        let ready = &self.output.as_slice()[self.read_pos..self.read_pos + count];
        for (i, frame) in ready.iter().enumerate() {
            left[i] = frame.left;
            right[i] = frame.right;
        }
        self.read_pos += count;
        count
    }

    /// Discard all buffered audio and internal state (used on seek and stop)
    pub fn reset(&mut self) {
        self.stretcher.reset();
        self.input.clear();
        self.output.clear();
        self.read_pos = 0;
        self.finished = false;
    }
}
