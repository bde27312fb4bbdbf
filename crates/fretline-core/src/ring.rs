//! Circular buffer of recent playback output
//!
//! The audio thread appends the mono downmix of everything it renders; the
//! pitch detector periodically copies out the trailing window it analyzes.
//!
//! Storage is a fixed slice of [`AtomicF32`] so both threads can touch it
//! without locks or `unsafe`. Consistency is deliberately relaxed: a window
//! read racing an append may see a handful of samples from the previous lap.
//! For an 8192-sample spectrum that is inaudible noise, and it keeps the
//! real-time side wait-free.

use std::sync::atomic::{AtomicUsize, Ordering};

use atomic_float::AtomicF32;

use crate::types::Sample;

/// Fixed-capacity ring of scalar samples with one writer and windowed readers
pub struct CircularSampleBuffer {
    storage: Box<[AtomicF32]>,
    /// Index of the next slot to be written (always `< capacity`)
    write_cursor: AtomicUsize,
}

fn allocate(capacity: usize) -> Box<[AtomicF32]> {
    (0..capacity.max(1)).map(|_| AtomicF32::new(0.0)).collect()
}

impl CircularSampleBuffer {
    /// Create a silent ring holding `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: allocate(capacity),
            write_cursor: AtomicUsize::new(0),
        }
    }

    /// Ring sized to hold `seconds` of audio at `sample_rate`
    pub fn for_duration(sample_rate: u32, seconds: f64) -> Self {
        Self::new((sample_rate as f64 * seconds).ceil() as usize)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Current write position (mod capacity)
    #[inline]
    pub fn write_cursor(&self) -> usize {
        self.write_cursor.load(Ordering::Acquire)
    }

    /// Copy `samples` into the ring, wrapping at capacity
    ///
    /// Must only be called from one thread at a time. If `samples` is longer
    /// than the ring, only the newest `capacity` samples are kept.
    pub fn append(&self, samples: &[Sample]) {
        let capacity = self.capacity();
        let skipped = samples.len().saturating_sub(capacity);
        let samples = &samples[skipped..];

        let start = (self.write_cursor.load(Ordering::Relaxed) + skipped) % capacity;
        let first = samples.len().min(capacity - start);

        for (slot, &value) in self.storage[start..start + first].iter().zip(samples) {
            slot.store(value, Ordering::Relaxed);
        }
        for (slot, &value) in self.storage.iter().zip(&samples[first..]) {
            slot.store(value, Ordering::Relaxed);
        }

        self.write_cursor
            .store((start + samples.len()) % capacity, Ordering::Release);
    }

    /// Copy the `destination.len()` most recent samples, oldest first
    ///
    /// The window ends at the write position observed when the call starts.
    /// Requests larger than the capacity are zero-filled at the front.
    pub fn read_window(&self, destination: &mut [Sample]) {
        let capacity = self.capacity();
        let take = destination.len().min(capacity);
        let lead = destination.len() - take;
        destination[..lead].fill(0.0);

        let end = self.write_cursor.load(Ordering::Acquire);
        let start = (end + capacity - take) % capacity;
        let first = take.min(capacity - start);

        let (head, tail) = destination[lead..].split_at_mut(first);
        for (dst, slot) in head.iter_mut().zip(&self.storage[start..start + first]) {
            *dst = slot.load(Ordering::Relaxed);
        }
        for (dst, slot) in tail.iter_mut().zip(self.storage.iter()) {
            *dst = slot.load(Ordering::Relaxed);
        }
    }

    /// Zero the contents and rewind the cursor
    pub fn clear(&self) {
        for slot in self.storage.iter() {
            slot.store(0.0, Ordering::Relaxed);
        }
        self.write_cursor.store(0, Ordering::Release);
    }

    /// Reallocate with a new capacity
    ///
    /// Takes `&mut self`, so it can only happen while nothing else holds the
    /// ring (before it is wrapped in an `Arc` and handed to other threads).
    pub fn resize(&mut self, capacity: usize) {
        self.storage = allocate(capacity);
        *self.write_cursor.get_mut() = 0;
    }
}
