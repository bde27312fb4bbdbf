//! Common audio types for Fretline
//!
//! Stereo sample and buffer types shared by the playback engine, the
//! time stretcher and the device output.

use std::ops::{Index, IndexMut};

/// Default output sample rate (48kHz)
///
/// The actual rate is negotiated with the output device at runtime; songs
/// are decoded straight to whatever rate the device runs at.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Number of output channels produced by the engine
pub const OUTPUT_CHANNELS: usize = 2;

/// Audio sample type (normalized 32-bit float, nominal range [-1, 1])
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// `#[repr(C)]` guarantees the layout `[left, right]`, so a slice of
/// `StereoSample` can be viewed as interleaved `f32` through bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Average of both channels
    #[inline]
    pub fn downmix(&self) -> Sample {
        (self.left + self.right) * 0.5
    }
}

/// A growable buffer of stereo samples
///
/// Buffers used on the audio thread are created with [`StereoBuffer::with_capacity`]
/// up front; the `*_from_capacity` and `push` paths never reallocate as long as the
/// capacity is respected.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Empty buffer with room for `capacity` stereo samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Buffer of `len` silent samples
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Build from separate left and right channel slices
    pub fn from_channels(left: &[Sample], right: &[Sample]) -> Self {
        assert_eq!(left.len(), right.len(), "Channel lengths must match");
        let samples = left
            .iter()
            .zip(right.iter())
            .map(|(&l, &r)| StereoSample::new(l, r))
            .collect();
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Drop all samples, keeping the allocation
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Newly exposed samples are silent. Must not exceed the capacity.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        debug_assert!(
            new_len <= self.samples.capacity(),
            "set_len_from_capacity called with len > capacity"
        );
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Append as many of `frames` as fit in the remaining capacity
    ///
    /// Returns the number of frames appended. Never reallocates.
    pub fn extend_within_capacity(&mut self, frames: &[StereoSample]) -> usize {
        let room = self.samples.capacity() - self.samples.len();
        let take = frames.len().min(room);
        self.samples.extend_from_slice(&frames[..take]);
        take
    }

    /// Remove the first `count` samples, shifting the rest to the front
    pub fn discard_front(&mut self, count: usize) {
        let count = count.min(self.samples.len());
        self.samples.copy_within(count.., 0);
        let remaining = self.samples.len() - count;
        self.samples.truncate(remaining);
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view as interleaved f32 `[L, R, L, R, ...]`
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Zero-copy mutable view as interleaved f32 `[L, R, L, R, ...]`
    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.samples)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}
