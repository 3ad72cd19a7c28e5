//! Configuration file handling
//!
//! The file lives at `<config dir>/config.toml`. Every field is optional;
//! command-line flags override whatever the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use relay_core::{RealmNumber, RealmOptions};
use relay_net::OfflineOptions;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cli::Cli;
use crate::error::{Error, Result};

const CONFIG_FILE: &str = "config.toml";
const OFFLINE_DATA_FILE: &str = "offline.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub relay: RelaySection,
    pub realm: RealmSection,
    pub offline: OfflineSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    pub address: String,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", relay_net::DEFAULT_PORT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmSection {
    pub number: RealmNumber,
    /// Unset means the realm is never sharded
    pub child_capacity: Option<usize>,
}

impl Default for RealmSection {
    fn default() -> Self {
        Self {
            number: 1,
            child_capacity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineSection {
    pub ping_ms: u64,
    pub persist_data: bool,
}

impl Default for OfflineSection {
    fn default() -> Self {
        Self {
            ping_ms: relay_net::DEFAULT_PING.as_millis() as u64,
            persist_data: false,
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "relay", "relay-peer")
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                info!(path = %path.display(), "Loaded configuration");
                Self::parse(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the file named on the command line (or the default) and
    /// apply the remaining flags on top
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => Self::default_path()?,
        };
        let mut config = Self::load(&path)?;
        config.apply(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, cli: &Cli) {
        if let Some(address) = &cli.address {
            self.relay.address = address.clone();
        }
        if let Some(realm) = cli.realm {
            self.realm.number = realm;
        }
        if let Some(capacity) = cli.capacity {
            self.realm.child_capacity = Some(capacity);
        }
        if let Some(ping_ms) = cli.ping_ms {
            self.offline.ping_ms = ping_ms;
        }
        if cli.persist {
            self.offline.persist_data = true;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.realm.child_capacity == Some(0) {
            return Err(Error::Config("child_capacity must be at least 1".into()));
        }
        if self.relay.address.is_empty() {
            return Err(Error::Config("relay address is empty".into()));
        }
        Ok(())
    }

    pub fn realm_options(&self) -> RealmOptions {
        match self.realm.child_capacity {
            Some(capacity) => RealmOptions::sharded(self.realm.number, capacity),
            None => RealmOptions::flat(self.realm.number),
        }
    }

    /// Offline relay settings; persisting creates the data directory
    pub fn offline_options(&self) -> Result<OfflineOptions> {
        let data_path = if self.offline.persist_data {
            let dir = project_dirs()?.data_dir().to_path_buf();
            std::fs::create_dir_all(&dir)?;
            Some(dir.join(OFFLINE_DATA_FILE))
        } else {
            None
        };

        Ok(OfflineOptions {
            ping: Duration::from_millis(self.offline.ping_ms),
            data_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_file() {
        let config = Config::parse(
            r#"
            [relay]
            address = "relay.example:9000"

            [realm]
            number = 12
            child_capacity = 4

            [offline]
            ping_ms = 10
            persist_data = true
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.address, "relay.example:9000");
        assert_eq!(config.realm.number, 12);
        assert_eq!(config.realm.child_capacity, Some(4));
        assert_eq!(config.offline.ping_ms, 10);
        assert!(config.offline.persist_data);
        assert_eq!(config.realm_options(), RealmOptions::sharded(12, 4));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("[realm]\nnumber = 3\n").unwrap();
        assert_eq!(config.realm.number, 3);
        assert_eq!(config.relay, RelaySection::default());
        assert_eq!(config.offline.ping_ms, 50);
        assert_eq!(config.realm_options(), RealmOptions::flat(3));
    }

    #[test]
    fn test_invalid_files_rejected() {
        assert!(matches!(
            Config::parse("[realm]\nnumber = \"one\"\n"),
            Err(Error::ConfigParse(_))
        ));
        assert!(matches!(
            Config::parse("[realm]\nchild_capacity = 0\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[relay]\naddress = \"a:1\"\n[realm]\nnumber = 2\n").unwrap();

        let cli = Cli::parse_from([
            "relay-peer",
            "--config",
            path.to_str().unwrap(),
            "--realm",
            "9",
            "--capacity",
            "3",
            "--ping-ms",
            "5",
        ]);
        let config = Config::from_cli(&cli).unwrap();

        assert_eq!(config.relay.address, "a:1");
        assert_eq!(config.realm.number, 9);
        assert_eq!(config.realm.child_capacity, Some(3));
        assert_eq!(config.offline.ping_ms, 5);
        assert!(!config.offline.persist_data);
    }

    #[test]
    fn test_cli_capacity_zero_rejected() {
        let dir = tempdir().unwrap();
        let cli = Cli::parse_from([
            "relay-peer",
            "--config",
            dir.path().join("none.toml").to_str().unwrap(),
            "--capacity",
            "0",
        ]);
        assert!(matches!(Config::from_cli(&cli), Err(Error::Config(_))));
    }

    #[test]
    fn test_offline_options_in_memory_by_default() {
        let options = Config::default().offline_options().unwrap();
        assert_eq!(options.ping, Duration::from_millis(50));
        assert_eq!(options.data_path, None);
    }
}
