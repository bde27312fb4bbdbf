//! Fretline Player - slow a song down, transpose it, and check your notes
//!
//! This is the command line front end. It:
//! 1. Loads `config.yaml` (defaults when missing)
//! 2. Plays the song on the sound card, or renders it to WAV with `--render`
//! 3. Reports whether the `--target` notes are sounding in the output
//!
//! ## Command line flags
//!
//! See [`args::USAGE`], or run with `--help`.

mod args;
mod live;
mod render;

use anyhow::Result;
use fretline_core::config::{default_config_path, load_config, PlayerConfig};
use fretline_core::Player;

use args::Args;

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match Args::from_env() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, args::USAGE);
            std::process::exit(2);
        }
    };

    if args.help {
        println!("{}", args::USAGE);
        return Ok(());
    }

    if args.list_devices {
        for device in fretline_core::audio::list_output_devices()? {
            println!("{}", device);
        }
        return Ok(());
    }

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config: PlayerConfig = load_config(&config_path);

    let Some(song) = args.song.as_deref() else {
        anyhow::bail!("no song given");
    };

    log::info!("fretline-player starting up");
    match args.render.as_deref() {
        Some(out) => render::run(&args, &config, song, out),
        None => live::run(&args, &config, song),
    }
}

/// Apply the command line's tempo, pitch and seek on top of the config
pub(crate) fn apply_playback_args(player: &Player, args: &Args) -> Result<()> {
    if let Some(tempo) = args.tempo {
        player.set_tempo_ratio(tempo)?;
    }
    if let Some(pitch) = args.pitch {
        player.set_pitch_ratio(pitch)?;
    }
    if let Some(seconds) = args.seek {
        player.seek(seconds);
    }
    Ok(())
}
