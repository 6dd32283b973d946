use std::path::Path;

use crate::config::{self, Config};

/// Write a default `config.yaml`, generating a fresh shared secret.
/// Refuses to overwrite an existing file.
pub fn run(config_file: Option<&Path>) -> anyhow::Result<()> {
    let path = config_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::default_config_dir().join("config.yaml"));

    if path.exists() {
        anyhow::bail!("config file already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let config = Config {
        secret: fanout::generate_key(),
        ..Config::default()
    };
    std::fs::write(&path, serde_yaml::to_string(&config)?)?;

    println!("Wrote default config to {}.", path.display());
    Ok(())
}
