//! Command line parsing

use std::path::PathBuf;

use fretline_core::music::{InstrumentPart, Note};
use fretline_core::timestretch::{MAX_RATIO, MIN_RATIO};

pub const USAGE: &str = "\
Usage: fretline-player <song> [options]
       fretline-player --list-devices

Options:
  --tempo R            time ratio, 2.0 plays at half speed (0.25 to 4, default 1.0)
  --pitch R            frequency ratio, 1.0595 is one semitone up (0.25 to 4, default 1.0)
  --part guitar|bass   range analysed by the pitch detector
  --seek S             start position in seconds
  --target NOTE[,..]   notes to listen for, e.g. A2 or E2,A2,D3
  --config PATH        config file (default: <config dir>/fretline/config.yaml)
  --render PATH        render to a WAV file instead of the sound card
  --list-devices       list output devices and exit
  -h, --help           show this help";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub song: Option<PathBuf>,
    pub tempo: Option<f64>,
    pub pitch: Option<f64>,
    pub part: Option<InstrumentPart>,
    pub seek: Option<f64>,
    pub targets: Vec<Note>,
    pub config: Option<PathBuf>,
    pub render: Option<PathBuf>,
    pub list_devices: bool,
    pub help: bool,
}

impl Args {
    pub fn from_env() -> Result<Self, String> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Args::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            let mut value = |name: &str| args.next().ok_or_else(|| format!("{} needs a value", name));
            match arg.as_str() {
                "--tempo" => parsed.tempo = Some(parse_ratio("--tempo", &value("--tempo")?)?),
                "--pitch" => parsed.pitch = Some(parse_ratio("--pitch", &value("--pitch")?)?),
                "--part" => {
                    let part = value("--part")?;
                    parsed.part = Some(
                        InstrumentPart::parse(&part).ok_or_else(|| format!("unknown part: {}", part))?,
                    );
                }
                "--seek" => {
                    let seconds = value("--seek")?;
                    parsed.seek = Some(
                        seconds
                            .parse::<f64>()
                            .ok()
                            .filter(|s| s.is_finite() && *s >= 0.0)
                            .ok_or_else(|| format!("invalid seek position: {}", seconds))?,
                    );
                }
                "--target" => {
                    for name in value("--target")?.split(',').filter(|n| !n.trim().is_empty()) {
                        parsed.targets.push(name.parse::<Note>()?);
                    }
                }
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--render" => parsed.render = Some(PathBuf::from(value("--render")?)),
                "--list-devices" => parsed.list_devices = true,
                "-h" | "--help" => parsed.help = true,
                flag if flag.starts_with('-') => return Err(format!("unknown option: {}", flag)),
                song => {
                    if parsed.song.is_some() {
                        return Err(format!("unexpected argument: {}", song));
                    }
                    parsed.song = Some(PathBuf::from(song));
                }
            }
        }

        if parsed.song.is_none() && !parsed.list_devices && !parsed.help {
            return Err("no song given".to_string());
        }
        Ok(parsed)
    }

    pub fn target_frequencies(&self) -> Vec<f32> {
        self.targets.iter().map(|n| n.frequency()).collect()
    }
}

fn parse_ratio(name: &str, value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|r| (MIN_RATIO..=MAX_RATIO).contains(r))
        .ok_or_else(|| {
            format!(
                "{} must be between {} and {}, got {}",
                name, MIN_RATIO, MAX_RATIO, value
            )
        })
}
