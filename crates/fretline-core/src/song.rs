//! Decoded song storage shared between the decode thread and the audio thread
//!
//! A [`DecodedSong`] is allocated at its full nominal length before decoding
//! starts. The decode thread fills it front to back and publishes how far it
//! got through `decoded_through` (release store); the audio thread only ever
//! reads below the value it loads (acquire), so it never observes a slot that
//! has not been written yet. Anything past the cursor is treated as silence.
//!
//! Songs travel between threads as `basedrop::Shared<DecodedSong>`, so the
//! last reference being dropped on the audio thread only enqueues the
//! (potentially hundreds of MB) arrays for the collector thread.

use std::sync::atomic::{AtomicUsize, Ordering};

use atomic_float::AtomicF32;

use crate::types::{Sample, StereoSample};

fn silent_channel(len: usize) -> Box<[AtomicF32]> {
    (0..len).map(|_| AtomicF32::new(0.0)).collect()
}

/// Flat left/right PCM for a whole song at the output sample rate
pub struct DecodedSong {
    left: Box<[AtomicF32]>,
    right: Box<[AtomicF32]>,
    total_samples: usize,
    /// Native rate of the compressed source
    source_sample_rate: u32,
    /// Rate the arrays hold (the output device rate)
    sample_rate: u32,
    duration_seconds: f64,
    decoded_through: AtomicUsize,
}

impl DecodedSong {
    /// Allocate silent arrays for a song that is about to be decoded
    pub fn allocate(
        total_samples: usize,
        source_sample_rate: u32,
        sample_rate: u32,
        duration_seconds: f64,
    ) -> Self {
        Self {
            left: silent_channel(total_samples),
            right: silent_channel(total_samples),
            total_samples,
            source_sample_rate,
            sample_rate,
            duration_seconds,
            decoded_through: AtomicUsize::new(0),
        }
    }

    /// Build a fully decoded song from in-memory channels
    pub fn from_channels(left: &[Sample], right: &[Sample], sample_rate: u32) -> Self {
        assert_eq!(left.len(), right.len(), "Channel lengths must match");
        let duration = left.len() as f64 / sample_rate as f64;
        let song = Self::allocate(left.len(), sample_rate, sample_rate, duration);
        let written = song.write(0, left, right);
        song.publish(written);
        song
    }

    #[inline]
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    #[inline]
    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    #[inline]
    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples from the start that are safe to read
    #[inline]
    pub fn decoded_through(&self) -> usize {
        self.decoded_through.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.decoded_through() >= self.total_samples
    }

    /// Decode progress in `[0, 1]`
    pub fn progress(&self) -> f32 {
        if self.total_samples == 0 {
            return 1.0;
        }
        self.decoded_through() as f32 / self.total_samples as f32
    }

    /// Convert a sample index to seconds of song time
    pub fn seconds_at(&self, sample: usize) -> f64 {
        if self.total_samples == 0 {
            return 0.0;
        }
        (sample as f64 / self.total_samples as f64) * self.duration_seconds
    }

    /// Convert seconds of song time to a sample index in `[0, total_samples)`
    pub fn sample_at(&self, seconds: f64) -> usize {
        if self.total_samples == 0 || self.duration_seconds <= 0.0 || !seconds.is_finite() {
            return 0;
        }
        let index = ((seconds / self.duration_seconds) * self.total_samples as f64).round();
        (index.max(0.0) as usize).min(self.total_samples - 1)
    }

    /// Store samples starting at `start`, returning how many fit
    ///
    /// Writes are clipped to the array length. Nothing becomes visible to
    /// readers until [`publish`](Self::publish) is called.
    pub(crate) fn write(&self, start: usize, left: &[Sample], right: &[Sample]) -> usize {
        let count = left
            .len()
            .min(right.len())
            .min(self.total_samples.saturating_sub(start));
        for i in 0..count {
            self.left[start + i].store(left[i], Ordering::Relaxed);
            self.right[start + i].store(right[i], Ordering::Relaxed);
        }
        count
    }

    /// Make everything below `through` visible to readers
    ///
    /// The cursor only moves forward and never past `total_samples`.
    pub(crate) fn publish(&self, through: usize) {
        self.decoded_through
            .fetch_max(through.min(self.total_samples), Ordering::Release);
    }

    /// Copy decoded frames starting at `start` into `dest`
    ///
    /// Returns the number of frames copied, which is short when `start` is
    /// near the end of the decoded region. The rest of `dest` is untouched.
    pub fn read_stereo(&self, start: usize, dest: &mut [StereoSample]) -> usize {
        let available = self.decoded_through().min(self.total_samples);
        if start >= available {
            return 0;
        }
        let count = dest.len().min(available - start);
        for (i, frame) in dest[..count].iter_mut().enumerate() {
            frame.left = self.left[start + i].load(Ordering::Relaxed);
            frame.right = self.right[start + i].load(Ordering::Relaxed);
        }
        count
    }

    /// Same as [`read_stereo`](Self::read_stereo) but into separate channels
    pub fn read_channels(&self, start: usize, left: &mut [Sample], right: &mut [Sample]) -> usize {
        let available = self.decoded_through().min(self.total_samples);
        if start >= available {
            return 0;
        }
        let count = left.len().min(right.len()).min(available - start);
        for i in 0..count {
            left[i] = self.left[start + i].load(Ordering::Relaxed);
            right[i] = self.right[start + i].load(Ordering::Relaxed);
        }
        count
    }
}

impl std::fmt::Debug for DecodedSong {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedSong")
            .field("total_samples", &self.total_samples)
            .field("source_sample_rate", &self.source_sample_rate)
            .field("sample_rate", &self.sample_rate)
            .field("duration_seconds", &self.duration_seconds)
            .field("decoded_through", &self.decoded_through())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_stop_at_decoded_through() {
        let song = DecodedSong::allocate(8, 48000, 48000, 8.0 / 48000.0);
        song.write(0, &[1.0, 2.0, 3.0, 4.0], &[-1.0, -2.0, -3.0, -4.0]);

        let mut left = [0.0; 4];
        let mut right = [0.0; 4];
        // Written but not published yet
        assert_eq!(song.read_channels(0, &mut left, &mut right), 0);

        song.publish(3);
        assert_eq!(song.read_channels(0, &mut left, &mut right), 3);
        assert_eq!(left[..3], [1.0, 2.0, 3.0]);
        assert_eq!(right[..3], [-1.0, -2.0, -3.0]);
        assert_eq!(song.read_channels(3, &mut left, &mut right), 0);
    }

    #[test]
    fn test_write_is_clipped_to_length() {
        let song = DecodedSong::allocate(4, 44100, 48000, 1.0);
        let written = song.write(2, &[1.0; 10], &[1.0; 10]);
        assert_eq!(written, 2);
        assert_eq!(song.write(4, &[1.0], &[1.0]), 0);
    }

    #[test]
    fn test_publish_is_monotonic_and_bounded() {
        let song = DecodedSong::allocate(10, 48000, 48000, 1.0);
        song.publish(6);
        song.publish(4);
        assert_eq!(song.decoded_through(), 6);

        song.publish(50);
        assert_eq!(song.decoded_through(), 10);
        assert!(song.is_complete());
    }

    #[test]
    fn test_sample_at_clamps_to_song() {
        let song = DecodedSong::from_channels(&[0.0; 48000], &[0.0; 48000], 48000);
        assert_eq!(song.sample_at(0.5), 24000);
        assert_eq!(song.sample_at(-3.0), 0);
        assert_eq!(song.sample_at(2.0), 47999);
        assert_eq!(song.sample_at(f64::NAN), 0);
        assert!((song.seconds_at(12000) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_read_stereo_interleaves_channels() {
        let song = DecodedSong::from_channels(&[0.1, 0.2], &[0.3, 0.4], 48000);
        let mut frames = [StereoSample::silence(); 4];
        assert_eq!(song.read_stereo(0, &mut frames), 2);
        assert_eq!(frames[1], StereoSample::new(0.2, 0.4));
        assert_eq!(frames[2], StereoSample::silence());
    }
}
