//! Configuration files
//!
//! YAML via serde. Missing or broken files fall back to defaults.

mod io;
mod paths;
mod player;

pub use io::{load_config, save_config, try_load_config};
pub use paths::{config_dir, default_config_path};
pub use player::{PlaybackConfig, PlayerConfig};
