//! Tracing initialization.
//!
//! Sets up `tracing-subscriber` with an env-filter (default `info`,
//! overridable via `RUST_LOG`). In production the fmt layer writes to the
//! agent log file without ANSI colors; otherwise it logs to the console.

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config;

const PRODUCTION_LOG_FILE: &str = "/var/log/pdagent/pdagent.log";

pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config::is_production() {
        let path = Path::new(PRODUCTION_LOG_FILE);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .try_init()?;
    }

    Ok(())
}
