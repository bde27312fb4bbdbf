//! Decode -> engine -> ring -> detector, driven the way an audio callback would

use std::path::Path;
use std::time::{Duration, Instant};

use fretline_core::config::PlayerConfig;
use fretline_core::music::{InstrumentPart, Note};
use fretline_core::{Player, Sample};

const RATE: u32 = 48000;
const BLOCK: usize = 512;

fn write_song(path: &Path, source_rate: u32, seconds: f32, frequencies: &[f32]) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: source_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (source_rate as f32 * seconds) as usize;
    for i in 0..frames {
        let t = i as f32 / source_rate as f32;
        let value: f32 = frequencies
            .iter()
            .map(|f| 0.3 * (2.0 * std::f32::consts::PI * f * t).sin())
            .sum();
        writer.write_sample(value).unwrap();
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

fn render(engine: &mut fretline_core::engine::PlaybackEngine, blocks: usize) -> Vec<Sample> {
    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];
    let mut out = Vec::with_capacity(blocks * BLOCK);
    for _ in 0..blocks {
        engine.read_frame(&mut left, &mut right);
        out.extend_from_slice(&left);
    }
    out
}

/// Wait for the detector to analyse what has been rendered so far
fn settle(player: &Player) {
    let detector = player.detector().expect("analysis running");
    let target = detector.cycles() + 2;
    let deadline = Instant::now() + Duration::from_secs(5);
    while detector.cycles() < target {
        assert!(Instant::now() < deadline, "detector stalled");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn analysis_config() -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.analysis.period_ms = 5;
    config
}

#[test]
fn test_played_note_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a2.wav");
    write_song(&path, 44100, 2.0, &[110.0]);

    let (mut player, mut engine) = Player::new(RATE, &analysis_config()).unwrap();
    let duration = player.load(&path).unwrap();
    assert!((duration - 2.0).abs() < 1e-3);
    player.wait_for_decode().unwrap();
    player.start_analysis(InstrumentPart::Guitar).unwrap();

    // Nothing played yet
    settle(&player);
    assert!(!player.detect(&[110.0]));

    render(&mut engine, 24);
    settle(&player);

    let a2 = Note::parse("A2").unwrap().frequency();
    assert!(player.detect(&[a2]));
    assert!(!player.detect(&[220.0]));
    assert!(!player.detect(&[Note::parse("E2").unwrap().frequency()]));
}

#[test]
fn test_chord_detected_through_playback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("power-chord.wav");
    // E2 and A2 sounding, D3 muted
    write_song(&path, RATE, 1.0, &[82.4, 110.0]);

    let (mut player, mut engine) = Player::new(RATE, &analysis_config()).unwrap();
    player.load(&path).unwrap();
    player.wait_for_decode().unwrap();
    player.start_analysis(InstrumentPart::Guitar).unwrap();

    render(&mut engine, 24);
    settle(&player);

    assert!(player.detect(&[82.4, 110.0, 146.8]));
    assert!(!player.detect(&[146.8, 196.0, 246.9]));
}

#[test]
fn test_pause_keeps_last_analysis_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a2.wav");
    write_song(&path, RATE, 1.0, &[110.0]);

    let (mut player, mut engine) = Player::new(RATE, &analysis_config()).unwrap();
    player.load(&path).unwrap();
    player.wait_for_decode().unwrap();
    player.start_analysis(InstrumentPart::Bass).unwrap();

    render(&mut engine, 24);
    player.pause(true);
    let paused = render(&mut engine, 8);
    assert!(paused.iter().all(|s| *s == 0.0));

    // Paused output is not appended, so the ring still holds the note
    settle(&player);
    assert!(player.detect(&[110.0]));
}

#[test]
fn test_song_runs_out_into_silence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.wav");
    write_song(&path, RATE, 0.25, &[110.0]);

    let (mut player, mut engine) = Player::new(RATE, &analysis_config()).unwrap();
    player.load(&path).unwrap();
    player.wait_for_decode().unwrap();

    let out = render(&mut engine, 30);
    assert!(player.is_finished());
    assert!(out[12000..].iter().all(|s| *s == 0.0));
    assert!((player.current_playback_seconds() - 0.25).abs() < 1e-6);
}
