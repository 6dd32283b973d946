//! Agent configuration.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. Sources are merged in the following order (later sources
//! override earlier ones):
//!
//! 1. **YAML config file**: `{config_dir}/config.yaml` by default, or the
//!    path given with `-f`/`PDAGENT_CONFIG`.
//! 2. **Environment variables**: variables prefixed with `PDAGENT_`.
//!
//! `APP_ENV=production` selects the production filesystem layout
//! (`/etc/pdagent`, `/var/db/pdagent`, `/var/run/pdagent`); anything else
//! keeps state under `~/.pdagent`.
//!
//! An empty `secret` disables control-plane authentication (development
//! mode); `pdagent init` writes a config file with a generated secret.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};

use fanout::Region;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:49463";

pub fn is_production() -> bool {
    std::env::var("APP_ENV").as_deref() == Ok("production")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Directory holding `config.yaml` (and, outside production, all agent
/// state).
pub fn default_config_dir() -> PathBuf {
    if is_production() {
        PathBuf::from("/etc/pdagent")
    } else {
        home_dir().join(".pdagent")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the control server binds to, and the address the CLI
    /// producers talk to.
    pub address: String,
    /// Shared secret for the control plane. Empty disables authentication.
    pub secret: String,
    /// Path of the event store file.
    pub database: PathBuf,
    /// Path of the single-instance pidfile.
    pub pidfile: PathBuf,
    /// Service region selecting the events API base URL.
    pub region: Region,
    /// Periodic vendor heartbeat from the server process.
    pub heartbeat: HeartbeatConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeartbeatConfig {
    pub enabled: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        let (database, pidfile) = if is_production() {
            (
                PathBuf::from("/var/db/pdagent/pdagent.db"),
                PathBuf::from("/var/run/pdagent/pidfile"),
            )
        } else {
            let dir = default_config_dir();
            (dir.join("pdagent.db"), dir.join("pidfile"))
        };

        Self {
            address: DEFAULT_ADDRESS.to_string(),
            secret: String::new(),
            database,
            pidfile,
            region: Region::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration, optionally from an explicit config file path.
    #[allow(clippy::result_large_err)]
    pub fn load(config_file: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(config_file).extract()
    }

    pub fn figment(config_file: Option<&Path>) -> Figment {
        let file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_config_dir().join("config.yaml"));

        Figment::new()
            .merge(Yaml::file(file))
            // PDAGENT_CONFIG belongs to the CLI, not the Config shape.
            .merge(Env::prefixed("PDAGENT_").ignore(&["config"]).split("__"))
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_without_any_sources() {
        Jail::expect_with(|jail| {
            jail.set_env("HOME", "/home/agent");
            jail.set_env("APP_ENV", "development");
            let config = Config::load(None)?;
            assert_eq!(config.address, DEFAULT_ADDRESS);
            assert_eq!(config.secret, "");
            assert_eq!(config.database, Path::new("/home/agent/.pdagent/pdagent.db"));
            assert_eq!(config.pidfile, Path::new("/home/agent/.pdagent/pidfile"));
            assert_eq!(config.region, Region::Us);
            assert!(config.heartbeat.enabled);
            Ok(())
        });
    }

    #[test]
    fn production_env_selects_system_paths() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_ENV", "production");
            let config = Config::load(None)?;
            assert_eq!(config.database, Path::new("/var/db/pdagent/pdagent.db"));
            assert_eq!(config.pidfile, Path::new("/var/run/pdagent/pidfile"));
            Ok(())
        });
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
address: 127.0.0.1:7777
secret: 11863b592c824bfc8989d9cba76abcde
region: eu
heartbeat:
  enabled: false
"#,
            )?;
            let config = Config::load(Some(Path::new("config.yaml")))?;
            assert_eq!(config.address, "127.0.0.1:7777");
            assert_eq!(config.secret, "11863b592c824bfc8989d9cba76abcde");
            assert_eq!(config.region, Region::Eu);
            assert!(!config.heartbeat.enabled);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "address: 127.0.0.1:7777\n")?;
            jail.set_env("PDAGENT_ADDRESS", "127.0.0.1:8888");
            jail.set_env("PDAGENT_SECRET", "from-env");
            let config = Config::load(Some(Path::new("config.yaml")))?;
            assert_eq!(config.address, "127.0.0.1:8888");
            assert_eq!(config.secret, "from-env");
            Ok(())
        });
    }

    #[test]
    fn unknown_fields_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "adress: typo\n")?;
            assert!(Config::load(Some(Path::new("config.yaml"))).is_err());
            Ok(())
        });
    }
}
