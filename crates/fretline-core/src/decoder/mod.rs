//! Background song decoding
//!
//! [`StreamDecoder::open`] does everything that can fail up front and
//! synchronously: open the file, probe the container, find the audio track,
//! read its duration from the codec parameters and allocate the
//! [`DecodedSong`] at `ceil(output_rate * duration)` samples. A missing or
//! unreadable file therefore surfaces as [`DecodeError::SourceUnavailable`]
//! before any song exists.
//!
//! [`StreamDecoder::spawn`] then decodes on a dedicated thread, resampling to
//! the output rate when the source rate differs, and publishes progress
//! through the song's `decoded_through` cursor. The returned [`DecodeJob`]
//! owns that thread: cancel it, wait for it, or drop it (which cancels and
//! joins).
//!
//! # Example
//!
//! ```ignore
//! let decoder = StreamDecoder::open("song.ogg", 48000)?;
//! let duration = decoder.duration_seconds();
//! let job = decoder.spawn()?;
//! handle.load_song(job.song())?;   // playback can start while decoding
//! ```

mod error;
mod resample;

pub use error::{DecodeError, DecodeResult};
pub use resample::RESAMPLE_CHUNK_FRAMES;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use basedrop::Shared;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::gc_handle;
use crate::song::DecodedSong;
use crate::types::Sample;
use resample::ChunkResampler;

/// An opened, probed audio source ready to be decoded
pub struct StreamDecoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    source_rate: u32,
    output_rate: u32,
    song: Shared<DecodedSong>,
}

impl StreamDecoder {
    /// Open and probe `path`, allocating a song for decoding at `output_rate`
    pub fn open(path: impl AsRef<Path>, output_rate: u32) -> DecodeResult<Self> {
        let path = path.as_ref().to_path_buf();
        if output_rate == 0 {
            return Err(DecodeError::InvalidSampleRate(output_rate));
        }

        let file = File::open(&path).map_err(|source| DecodeError::SourceUnavailable {
            path: path.clone(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let unsupported = |reason: String| DecodeError::UnsupportedFormat {
            path: path.clone(),
            reason,
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| unsupported(e.to_string()))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| unsupported("no audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let (source_rate, n_frames) = match (params.sample_rate, params.n_frames) {
            (Some(rate), Some(frames)) if rate > 0 => (rate, frames),
            _ => return Err(DecodeError::UnknownDuration(path.clone())),
        };
        let duration_seconds = n_frames as f64 / source_rate as f64;
        let total_samples = (output_rate as f64 * duration_seconds).ceil() as usize;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| unsupported(e.to_string()))?;

        log::info!(
            "Opened {:?}: {:.2}s at {}Hz, {} channel(s) -> {} samples at {}Hz",
            path,
            duration_seconds,
            source_rate,
            params.channels.map(|c| c.count()).unwrap_or(0),
            total_samples,
            output_rate
        );

        let song = Shared::new(
            &gc_handle(),
            DecodedSong::allocate(total_samples, source_rate, output_rate, duration_seconds),
        );

        Ok(Self {
            path,
            format,
            decoder,
            track_id,
            source_rate,
            output_rate,
            song,
        })
    }

    /// Song duration as reported by the codec
    pub fn duration_seconds(&self) -> f64 {
        self.song.duration_seconds()
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_rate
    }

    /// The song being filled; safe to hand to the engine immediately
    pub fn song(&self) -> Shared<DecodedSong> {
        self.song.clone()
    }

    /// Decode on a dedicated background thread
    pub fn spawn(self) -> DecodeResult<DecodeJob> {
        let song = self.song.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = Arc::clone(&cancel);
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let handle = thread::Builder::new()
            .name("fretline-decode".to_string())
            .spawn(move || {
                let result = self.run(&thread_cancel);
                if let Err(ref e) = result {
                    log::error!("Decoding {} failed: {}", name, e);
                }
                result
            })
            .map_err(DecodeError::Spawn)?;

        Ok(DecodeJob {
            song,
            cancel,
            handle: Some(handle),
        })
    }

    /// Decode on the calling thread until the end of the stream
    pub fn decode_blocking(self) -> DecodeResult<Shared<DecodedSong>> {
        let song = self.song.clone();
        self.run(&AtomicBool::new(false))?;
        Ok(song)
    }

    /// Decode loop; returns the number of output samples written
    ///
    /// Unless cancelled, the whole song is published on return, including
    /// any silent remainder of a stream that ended early.
    fn run(mut self, cancel: &AtomicBool) -> DecodeResult<usize> {
        let started = Instant::now();
        let total = self.song.total_samples();
        let mut resampler = if self.source_rate != self.output_rate {
            Some(ChunkResampler::new(self.source_rate, self.output_rate)?)
        } else {
            None
        };

        let mut sample_buf: Option<SampleBuffer<Sample>> = None;
        let mut left: Vec<Sample> = Vec::new();
        let mut right: Vec<Sample> = Vec::new();
        let mut written = 0usize;

        while written < total {
            if cancel.load(Ordering::Relaxed) {
                log::info!("Decode of {:?} cancelled at {}/{} samples", self.path, written, total);
                return Ok(written);
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(e) => {
                    log::warn!("Stopping decode of {:?}: {}", self.path, e);
                    break;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping corrupt packet in {:?}: {}", self.path, e);
                    continue;
                }
                Err(e) => {
                    log::warn!("Stopping decode of {:?}: {}", self.path, e);
                    break;
                }
            };

            let spec = *decoded.spec();
            let needs_buffer = sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < decoded.capacity() * spec.channels.count());
            if needs_buffer {
                sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            split_stereo(buf.samples(), spec.channels.count(), &mut left, &mut right);

            let song = &self.song;
            match resampler.as_mut() {
                Some(resampler) => resampler.push(&left, &right, |l, r| {
                    written += song.write(written, l, r);
                })?,
                None => written += song.write(written, &left, &right),
            }
            song.publish(written);
        }

        if let Some(resampler) = resampler.as_mut() {
            let song = &self.song;
            resampler.finish(|l, r| {
                written += song.write(written, l, r);
            })?;
            song.publish(written);
        }

        if written < total {
            log::debug!(
                "{:?} ended {} samples short of its nominal length (left silent)",
                self.path,
                total - written
            );
        }
        // Unwritten slots are zero: expose them so playback can reach the end
        self.song.publish(total);
        log::info!(
            "Decoded {:?}: {} samples in {:.0}ms",
            self.path,
            written,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(written)
    }
}

/// De-interleave into stereo, duplicating mono and dropping channels past two
fn split_stereo(interleaved: &[Sample], channels: usize, left: &mut Vec<Sample>, right: &mut Vec<Sample>) {
    left.clear();
    right.clear();
    if channels == 0 {
        return;
    }
    for frame in interleaved.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(if channels > 1 { frame[1] } else { frame[0] });
    }
}

/// A running background decode
///
/// Dropping the job cancels the decode and joins its thread.
pub struct DecodeJob {
    song: Shared<DecodedSong>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<DecodeResult<usize>>>,
}

impl DecodeJob {
    /// The song being filled
    pub fn song(&self) -> Shared<DecodedSong> {
        self.song.clone()
    }

    /// Decode progress in `[0, 1]`
    pub fn progress(&self) -> f32 {
        self.song.progress()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Ask the decode thread to stop at the next packet
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Block until decoding ends, returning the number of samples written
    ///
    /// Further calls return the published cursor.
    pub fn wait(&mut self) -> DecodeResult<usize> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| DecodeError::ThreadPanicked)?,
            None => Ok(self.song.decoded_through()),
        }
    }
}

impl Drop for DecodeJob {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel();
            let _ = handle.join();
        }
    }
}

/// Open and fully decode `path` on the calling thread
pub fn decode_to_song(path: impl AsRef<Path>, output_rate: u32) -> DecodeResult<Shared<DecodedSong>> {
    StreamDecoder::open(path, output_rate)?.decode_blocking()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(dir: &TempDir, name: &str, rate: u32, channels: u16, frames: &[(f32, f32)]) -> PathBuf {
        let path = dir.path().join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &(l, r) in frames {
            writer.write_sample(l).unwrap();
            if channels > 1 {
                writer.write_sample(r).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    fn sine(rate: u32, len: usize, freq: f32) -> Vec<(f32, f32)> {
        (0..len)
            .map(|i| {
                let v = 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin();
                (v, v)
            })
            .collect()
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let result = StreamDecoder::open("/nonexistent/fretline/song.ogg", 48000);
        assert!(matches!(result, Err(DecodeError::SourceUnavailable { .. })));
    }

    #[test]
    fn test_garbage_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ogg");
        std::fs::write(&path, b"definitely not an ogg stream").unwrap();

        let result = StreamDecoder::open(&path, 48000);
        assert!(matches!(result, Err(DecodeError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_zero_output_rate_rejected() {
        let result = StreamDecoder::open("/nonexistent/song.ogg", 0);
        assert!(matches!(result, Err(DecodeError::InvalidSampleRate(0))));
    }

    #[test]
    fn test_same_rate_stereo_decode_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<(f32, f32)> = (0..12000)
            .map(|i| (i as f32 / 12000.0, -(i as f32) / 12000.0))
            .collect();
        let path = write_wav(&dir, "stereo.wav", 48000, 2, &frames);

        let song = decode_to_song(&path, 48000).unwrap();
        assert_eq!(song.total_samples(), 12000);
        assert_eq!(song.decoded_through(), 12000);
        assert!((song.duration_seconds() - 0.25).abs() < 1e-9);

        let mut left = vec![0.0; 12000];
        let mut right = vec![0.0; 12000];
        assert_eq!(song.read_channels(0, &mut left, &mut right), 12000);
        assert_eq!(left[6000], 0.5);
        assert_eq!(right[6000], -0.5);
    }

    #[test]
    fn test_resampled_total_matches_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(&dir, "mono.wav", 44100, 1, &sine(44100, 22050, 220.0));

        let decoder = StreamDecoder::open(&path, 48000).unwrap();
        assert_eq!(decoder.source_sample_rate(), 44100);
        let expected = (48000.0 * decoder.duration_seconds()).round() as i64;

        let song = decoder.decode_blocking().unwrap();
        assert!((song.total_samples() as i64 - expected).abs() <= 1);
        assert_eq!(song.decoded_through(), song.total_samples());
        assert_eq!(song.source_sample_rate(), 44100);
        assert_eq!(song.sample_rate(), 48000);

        // Mono is duplicated to both channels and keeps its level
        let mut left = vec![0.0; 4800];
        let mut right = vec![0.0; 4800];
        song.read_channels(9600, &mut left, &mut right);
        assert_eq!(left, right);
        let peak = left.iter().fold(0.0f32, |p, s| p.max(s.abs()));
        assert!(peak > 0.45 && peak < 0.55, "peak {}", peak);
    }

    #[test]
    fn test_background_job_publishes_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(&dir, "job.wav", 44100, 2, &sine(44100, 44100, 330.0));

        let mut job = StreamDecoder::open(&path, 48000).unwrap().spawn().unwrap();
        let song = job.song();
        let written = job.wait().unwrap();

        assert_eq!(written, song.decoded_through());
        assert_eq!(song.total_samples(), 48000);
        assert!(song.is_complete());
        assert_eq!(job.progress(), 1.0);
        assert!(job.is_finished());
    }

    #[test]
    fn test_truncated_stream_publishes_silent_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![(0.5, 0.5); 48000];
        let path = write_wav(&dir, "truncated.wav", 48000, 1, &frames);

        // Header still claims 48000 frames, only the first half is left
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 24000 * 4).unwrap();
        drop(file);

        let mut job = StreamDecoder::open(&path, 48000).unwrap().spawn().unwrap();
        let song = job.song();
        let written = job.wait().unwrap();

        assert!(written > 0 && written <= 24000, "written {}", written);
        assert_eq!(song.total_samples(), 48000);
        assert_eq!(song.decoded_through(), 48000);
        assert!(song.is_complete());

        let mut left = vec![1.0; 48000];
        let mut right = vec![1.0; 48000];
        assert_eq!(song.read_channels(0, &mut left, &mut right), 48000);
        assert_eq!(left[100], 0.5);
        assert!(left[24000..].iter().all(|&s| s == 0.0));
        assert!(right[24000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_cancelled_job_stops_early() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(&dir, "long.wav", 44100, 2, &sine(44100, 44100 * 20, 110.0));

        let mut job = StreamDecoder::open(&path, 48000).unwrap().spawn().unwrap();
        job.cancel();
        let written = job.wait().unwrap();
        assert!(written <= job.song().total_samples());
    }
}
