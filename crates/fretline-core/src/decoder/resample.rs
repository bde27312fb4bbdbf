//! Streaming sample rate conversion for the decoder
//!
//! Wraps rubato's windowed-sinc `SincFixedIn` so packets of any size can be
//! pushed in; converted audio comes out whenever a full
//! [`RESAMPLE_CHUNK_FRAMES`] chunk of source frames has accumulated. The
//! resampler's leading delay is trimmed so output stays time-aligned with the
//! source.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::error::{DecodeError, DecodeResult};
use crate::types::Sample;

/// Source frames converted per resampler call
pub const RESAMPLE_CHUNK_FRAMES: usize = 1024;

pub(crate) struct ChunkResampler {
    resampler: SincFixedIn<Sample>,
    pending_left: Vec<Sample>,
    pending_right: Vec<Sample>,
    output: Vec<Vec<Sample>>,
    /// Leading output frames still to discard
    delay: usize,
}

impl ChunkResampler {
    pub(crate) fn new(source_rate: u32, target_rate: u32) -> DecodeResult<Self> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = SincFixedIn::<Sample>::new(ratio, 1.0, params, RESAMPLE_CHUNK_FRAMES, 2)
            .map_err(|e| DecodeError::Resampler(e.to_string()))?;

        let output = resampler.output_buffer_allocate(true);
        let delay = resampler.output_delay();

        log::debug!(
            "Resampling {}Hz -> {}Hz (ratio {:.5}, delay {} frames)",
            source_rate,
            target_rate,
            ratio,
            delay
        );

        Ok(Self {
            resampler,
            pending_left: Vec::with_capacity(RESAMPLE_CHUNK_FRAMES * 2),
            pending_right: Vec::with_capacity(RESAMPLE_CHUNK_FRAMES * 2),
            output,
            delay,
        })
    }

    /// Queue source frames, emitting converted audio for every full chunk
    pub(crate) fn push<F>(&mut self, left: &[Sample], right: &[Sample], mut sink: F) -> DecodeResult<()>
    where
        F: FnMut(&[Sample], &[Sample]),
    {
        self.pending_left.extend_from_slice(left);
        self.pending_right.extend_from_slice(right);

        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending_left.len() < needed {
                return Ok(());
            }
            let input = [&self.pending_left[..needed], &self.pending_right[..needed]];
            let (_, produced) = self
                .resampler
                .process_into_buffer(&input[..], &mut self.output, None)
                .map_err(|e| DecodeError::Resampler(e.to_string()))?;

            self.pending_left.drain(..needed);
            self.pending_right.drain(..needed);
            self.emit(produced, &mut sink);
        }
    }

    /// Convert whatever is still pending and drain the resampler's delay line
    pub(crate) fn finish<F>(&mut self, mut sink: F) -> DecodeResult<()>
    where
        F: FnMut(&[Sample], &[Sample]),
    {
        if !self.pending_left.is_empty() {
            let input = [&self.pending_left[..], &self.pending_right[..]];
            let (_, produced) = self
                .resampler
                .process_partial_into_buffer(Some(&input[..]), &mut self.output, None)
                .map_err(|e| DecodeError::Resampler(e.to_string()))?;
            self.pending_left.clear();
            self.pending_right.clear();
            self.emit(produced, &mut sink);
        }

        let (_, produced) = self
            .resampler
            .process_partial_into_buffer(None::<&[&[Sample]]>, &mut self.output, None)
            .map_err(|e| DecodeError::Resampler(e.to_string()))?;
        self.emit(produced, &mut sink);
        Ok(())
    }

    fn emit<F>(&mut self, produced: usize, sink: &mut F)
    where
        F: FnMut(&[Sample], &[Sample]),
    {
        let skip = self.delay.min(produced);
        self.delay -= skip;
        if produced > skip {
            sink(&self.output[0][skip..produced], &self.output[1][skip..produced]);
        }
    }
}
