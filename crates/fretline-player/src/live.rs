//! Live playback on the sound card with an interactive command prompt
//!
//! Commands are read line by line from stdin on a helper thread and applied
//! on the main thread, which also polls the detector every
//! [`POLL_INTERVAL`]. The session ends at the end of the song, on `quit`, or
//! when stdin closes (Ctrl-D).

use std::io::BufRead;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::{Context, Result};
use fretline_core::audio::AudioOutput;
use fretline_core::config::PlayerConfig;
use fretline_core::music::InstrumentPart;
use fretline_core::Player;

use crate::args::Args;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub const HELP: &str = "\
Commands:
  p               pause / resume
  s               stop (rewind)
  r               play
  t R             tempo ratio
  k R             pitch ratio
  seek S          jump to S seconds
  part guitar|bass
  q               quit";

/// A parsed prompt command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TogglePause,
    Stop,
    Play,
    Tempo(f64),
    Pitch(f64),
    Seek(f64),
    Part(InstrumentPart),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or("");
        let number = |value: Option<&str>| {
            value
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(|| format!("{} needs a number", name))
        };

        match name {
            "p" | "pause" => Ok(Command::TogglePause),
            "s" | "stop" => Ok(Command::Stop),
            "r" | "play" => Ok(Command::Play),
            "t" | "tempo" => number(words.next()).map(Command::Tempo),
            "k" | "pitch" => number(words.next()).map(Command::Pitch),
            "seek" => number(words.next()).map(Command::Seek),
            "part" => words
                .next()
                .and_then(InstrumentPart::parse)
                .map(Command::Part)
                .ok_or_else(|| "part must be guitar or bass".to_string()),
            "h" | "help" | "?" => Ok(Command::Help),
            "q" | "quit" => Ok(Command::Quit),
            "" => Err(String::new()),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

pub fn run(args: &Args, config: &PlayerConfig, song: &Path) -> Result<()> {
    let output = AudioOutput::open(&config.audio).context("Failed to open audio output")?;
    let (mut player, engine) = Player::new(output.sample_rate(), config)?;
    let _audio = output.start(engine)?;

    let duration = player
        .load(song)
        .with_context(|| format!("Failed to load {:?}", song))?;
    crate::apply_playback_args(&player, args)?;

    let targets = args.target_frequencies();
    if !targets.is_empty() {
        player.start_analysis(args.part.unwrap_or(config.playback.part))?;
    }

    println!("Playing {} ({:.1}s)", song.display(), duration);
    println!("{}", HELP);

    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("fretline-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => match Command::parse(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => {
                    if let Err(e) = apply(&mut player, command) {
                        println!("{}", e);
                    }
                }
                Err(e) if !e.is_empty() => println!("{}", e),
                Err(_) => {}
            },
            Err(RecvTimeoutError::Timeout) => {
                report(&player, &targets);
                if player.is_finished() {
                    println!("End of song");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    player.stop();
    Ok(())
}

fn apply(player: &mut Player, command: Command) -> Result<()> {
    match command {
        Command::TogglePause => {
            let paused = !player.controls().is_paused();
            player.pause(paused);
            println!("{}", if paused { "Paused" } else { "Playing" });
        }
        Command::Stop => player.stop(),
        Command::Play => player.play(),
        Command::Tempo(ratio) => player.set_tempo_ratio(ratio)?,
        Command::Pitch(ratio) => player.set_pitch_ratio(ratio)?,
        Command::Seek(seconds) => player.seek(seconds),
        Command::Part(part) => {
            if player.detector().is_some() {
                player.start_analysis(part)?;
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn report(player: &Player, targets: &[f32]) {
    let Some(detector) = player.detector() else { return };
    let snapshot = detector.snapshot();
    log::info!(
        "{:>7.2}s  {}  dominant {}",
        player.current_playback_seconds(),
        if snapshot.detect(targets) { "DETECTED" } else { "-" },
        snapshot
            .dominant_frequency()
            .map(|f| format!("{:.1}Hz", f))
            .unwrap_or_else(|| "-".to_string())
    );
}
