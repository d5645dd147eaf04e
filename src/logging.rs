use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex,
};

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Route `tracing` output to the session log file. The terminal is in raw
/// mode for the whole session, so nothing is written to stderr. Returns the
/// log path, or `None` when logging could not be set up.
pub fn init(config: &Config) -> Option<PathBuf> {
    let path = config.log_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .ok()?;
    Some(path)
}
