//! Logger setup for the binaries.
//!
//! The engine's numeric `logging_level` (0 = everything, 255 = silent) maps
//! onto a `log::LevelFilter`. `RUST_LOG` overrides it when set.

use anyhow::{anyhow, Result};
use log::LevelFilter;

pub fn level_filter(logging_level: u8) -> LevelFilter {
    match logging_level {
        0 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        2 | 3 => LevelFilter::Info,
        4 => LevelFilter::Warn,
        255 => LevelFilter::Off,
        _ => LevelFilter::Error,
    }
}

/// Installs `env_logger` as the global logger.
pub fn init(logging_level: u8) -> Result<()> {
    let default_filter = level_filter(logging_level).to_string().to_lowercase();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logger: {}", e))
}
