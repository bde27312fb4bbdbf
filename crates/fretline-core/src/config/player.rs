//! The player's configuration file

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisConfig;
use crate::audio::AudioConfig;
use crate::music::InstrumentPart;

/// Everything `fretline-player` reads from `config.yaml`
///
/// Every section and field is optional; omitted values take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
    pub analysis: AnalysisConfig,
}

/// Initial practice settings applied when a song is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Output duration / input duration; 2.0 plays at half speed
    pub tempo_ratio: f64,
    /// Frequency multiplier; 2^(1/12) is one semitone up
    pub pitch_ratio: f64,
    /// Part analysed by the pitch detector
    pub part: InstrumentPart,
    /// Seconds of playback output kept for analysis
    pub analysis_buffer_seconds: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tempo_ratio: 1.0,
            pitch_ratio: 1.0,
            part: InstrumentPart::Guitar,
            analysis_buffer_seconds: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferSize;
    use crate::config::{load_config, save_config};

    #[test]
    fn test_partial_file_fills_defaults() {
        let yaml = "playback:\n  tempo_ratio: 1.5\n  part: bass\naudio:\n  buffer_size: !Fixed 256\n";
        let config: PlayerConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.playback.tempo_ratio, 1.5);
        assert_eq!(config.playback.pitch_ratio, 1.0);
        assert_eq!(config.playback.part, InstrumentPart::Bass);
        assert_eq!(config.audio.buffer_size, BufferSize::Fixed(256));
        assert_eq!(config.analysis, AnalysisConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = PlayerConfig::default();
        config.playback.pitch_ratio = 2f64.powf(-2.0 / 12.0);
        config.analysis.period_ms = 25;
        save_config(&config, &path).unwrap();

        let loaded: PlayerConfig = load_config(&path);
        assert_eq!(loaded, config);
    }
}
