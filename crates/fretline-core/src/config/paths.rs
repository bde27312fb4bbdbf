//! Standard locations of fretline configuration files

use std::path::PathBuf;

/// Per-user configuration directory
///
/// Returns: `{config_dir}/fretline` (e.g. `~/.config/fretline` on Linux),
/// or `./fretline` when the platform has no config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fretline")
}

/// Default player config file: `{config_dir}/fretline/config.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.yaml")
}
