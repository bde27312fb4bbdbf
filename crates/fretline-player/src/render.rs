//! Offline rendering to a WAV file
//!
//! Drives the engine from this thread instead of a sound card, so a practice
//! setting can be checked (or shared) without audio hardware. Target notes
//! are analysed synchronously on the rendered output.

use std::path::Path;

use anyhow::{Context, Result};
use fretline_core::analysis::SpectrumAnalyzer;
use fretline_core::config::PlayerConfig;
use fretline_core::types::{StereoSample, DEFAULT_SAMPLE_RATE};
use fretline_core::Player;

use crate::args::Args;

const BLOCK_FRAMES: usize = 512;

/// Output kept rendering after the song ends, for the stretcher's tail
const TAIL_SECONDS: f64 = 0.5;

/// Seconds between detection reports
const REPORT_INTERVAL: f64 = 0.25;

pub fn run(args: &Args, config: &PlayerConfig, song: &Path, out_path: &Path) -> Result<()> {
    let sample_rate = config.audio.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let (mut player, mut engine) = Player::new(sample_rate, config)?;

    let duration = player
        .load(song)
        .with_context(|| format!("Failed to load {:?}", song))?;
    crate::apply_playback_args(&player, args)?;
    player.wait_for_decode()?;

    let part = args.part.unwrap_or(config.playback.part);
    let targets = args.target_frequencies();
    let mut analyzer = SpectrumAnalyzer::new(sample_rate, part.max_frequency(), &config.analysis)?;
    let window_len = analyzer.transform_size();

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(out_path, spec)
        .with_context(|| format!("Failed to create {:?}", out_path))?;

    // Generous upper bound in case the song never reports finished
    let tempo = player.controls().tempo_ratio();
    let max_frames = ((duration * tempo + 2.0 * TAIL_SECONDS) * sample_rate as f64) as usize;
    let tail_frames = (TAIL_SECONDS * sample_rate as f64) as usize;
    let report_frames = (REPORT_INTERVAL * sample_rate as f64) as usize;

    let mut left = vec![0.0f32; BLOCK_FRAMES];
    let mut right = vec![0.0f32; BLOCK_FRAMES];
    let mut mono: Vec<f32> = Vec::with_capacity(window_len * 2);
    let mut rendered = 0usize;
    let mut tail_left: Option<usize> = None;
    let mut next_report = report_frames;
    let mut hits = 0usize;
    let mut reports = 0usize;

    while rendered < max_frames {
        engine.read_frame(&mut left, &mut right);
        for (l, r) in left.iter().zip(&right) {
            writer.write_sample(*l)?;
            writer.write_sample(*r)?;
        }
        mono.extend(
            left.iter()
                .zip(&right)
                .map(|(&l, &r)| StereoSample::new(l, r).downmix()),
        );
        if mono.len() > window_len {
            mono.drain(..mono.len() - window_len);
        }
        rendered += BLOCK_FRAMES;

        if !targets.is_empty() && rendered >= next_report && mono.len() == window_len {
            next_report += report_frames;
            reports += 1;
            let snapshot = analyzer.analyze(&mono);
            let detected = snapshot.detect(&targets);
            hits += detected as usize;
            log::info!(
                "{:>7.2}s  {}  dominant {}",
                player.current_playback_seconds(),
                if detected { "DETECTED" } else { "-" },
                snapshot
                    .dominant_frequency()
                    .map(|f| format!("{:.1}Hz", f))
                    .unwrap_or_else(|| "-".to_string())
            );
        }

        if let Some(frames) = tail_left.as_mut() {
            if *frames == 0 {
                break;
            }
            *frames = frames.saturating_sub(BLOCK_FRAMES);
        } else if player.is_finished() {
            tail_left = Some(tail_frames);
        }
    }

    writer.finalize().context("Failed to finish WAV file")?;
    log::info!(
        "Rendered {:.2}s to {:?}",
        rendered as f64 / sample_rate as f64,
        out_path
    );
    if reports > 0 {
        println!("Targets detected in {}/{} windows", hits, reports);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_song(path: &Path, frequency: f32, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..(48000.0 * seconds) as usize {
            let t = i as f32 / 48000.0;
            writer
                .write_sample(0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin())
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_render_at_half_speed() {
        let dir = tempfile::tempdir().unwrap();
        let song = dir.path().join("a2.wav");
        let out = dir.path().join("out.wav");
        write_song(&song, 110.0, 1.0);

        let args = Args::parse([song.to_str().unwrap(), "--tempo", "2.0", "--target", "A2"]).unwrap();
        run(&args, &PlayerConfig::default(), &song, &out).unwrap();

        let reader = hound::WavReader::open(&out).unwrap();
        assert_eq!(reader.spec().channels, 2);
        let seconds = reader.duration() as f64 / 48000.0;
        // Twice as long, plus the tail
        assert!(seconds > 1.9 && seconds < 2.0 + 3.0 * TAIL_SECONDS, "rendered {}s", seconds);
    }

    #[test]
    fn test_missing_song_fails() {
        let dir = tempfile::tempdir().unwrap();
        let song = dir.path().join("missing.ogg");
        let args = Args::parse([song.to_str().unwrap()]).unwrap();
        assert!(run(&args, &PlayerConfig::default(), &song, &dir.path().join("out.wav")).is_err());
        assert!(!dir.path().join("out.wav").exists());
    }
}
