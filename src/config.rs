//! Scraper configuration
//!
//! Loaded from a YAML file; every key is optional and falls back to the
//! defaults below. Paths default to the platform data directory.

use crate::display::DisplayDefaults;
use crate::runner::CommandRunner;
use crate::store::{ResultStore, RAW_RESULTS_FILE, SERIALIZED_RESULTS_FILE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// File name of the lock inside the cache directory
pub const LOCK_FILE: &str = "scrape.lock";

/// File name of the scholar registry inside the cache directory
pub const REGISTRY_FILE: &str = "scholars.db";

const DEFAULT_LOCK_TTL_SECS: u64 = 60 * 60;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 15 * 60;
const MAX_LOCK_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScraperConfig {
    /// Python interpreter; unset means "not configured"
    pub python_path: Option<PathBuf>,
    /// pip executable used to install the scraper's requirements
    pub pip_path: Option<PathBuf>,
    pub script_path: PathBuf,
    pub requirements_path: PathBuf,
    pub cache_dir: PathBuf,
    /// Defaults to `scholars.db` inside `cache_dir`
    pub registry_path: Option<PathBuf>,
    pub lock_ttl_secs: u64,
    /// 0 disables the subprocess timeout
    pub command_timeout_secs: u64,
    /// Exec strategies this host forbids: `shell`, `direct`, `pipe`
    pub disabled_exec: Vec<String>,
    pub display: DisplayDefaults,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            python_path: None,
            pip_path: None,
            script_path: base.join("scraper").join("scraper.py"),
            requirements_path: base.join("scraper").join("requirements.txt"),
            cache_dir: base.join("cache"),
            registry_path: None,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            disabled_exec: Vec::new(),
            display: DisplayDefaults::default(),
        }
    }
}

/// Get the default base directory (~/.local/share/scholar-scraper)
fn default_base_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("scholar-scraper")
}

impl ScraperConfig {
    /// Default config file location (~/.config/scholar-scraper/config.yaml)
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"));
        config_dir.join("scholar-scraper").join("config.yaml")
    }

    /// Parse a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Load `path`, or the default location. A missing default file yields
    /// the built-in defaults; a missing explicit file is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.is_file() {
                    Self::load(&path)
                } else {
                    debug!(path = %path.display(), "no config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn raw_results_path(&self) -> PathBuf {
        self.cache_dir.join(RAW_RESULTS_FILE)
    }

    pub fn serialized_results_path(&self) -> PathBuf {
        self.cache_dir.join(SERIALIZED_RESULTS_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.cache_dir.join(LOCK_FILE)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(|| self.cache_dir.join(REGISTRY_FILE))
    }

    pub fn lock_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_ttl_secs.min(MAX_LOCK_TTL_SECS) as i64)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }

    pub fn result_store(&self) -> ResultStore {
        ResultStore::new(self.raw_results_path(), self.serialized_results_path())
    }

    /// Default strategies minus the disabled ones, with the configured timeout
    pub fn command_runner(&self) -> CommandRunner {
        CommandRunner::with_default_strategies()
            .without(&self.disabled_exec)
            .with_timeout(self.command_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::SortDirection;
    use crate::model::SortField;

    #[test]
    fn empty_file_means_defaults() {
        assert_eq!(ScraperConfig::from_yaml("").unwrap(), ScraperConfig::default());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = ScraperConfig::from_yaml(
            r#"
python_path: /usr/bin/python3
cache_dir: /var/cache/scholar
command_timeout_secs: 0
disabled_exec: [shell]
display:
  number_papers_to_show: 5
  sort_by_field: year
"#,
        )
        .unwrap();

        assert_eq!(config.python_path, Some(PathBuf::from("/usr/bin/python3")));
        assert_eq!(config.pip_path, None);
        assert_eq!(config.lock_ttl_secs, DEFAULT_LOCK_TTL_SECS);
        assert_eq!(config.command_timeout(), None);
        assert_eq!(config.display.number_papers_to_show, 5);
        assert_eq!(config.display.sort_by_field, SortField::Year);
        assert_eq!(config.display.sort_by_direction, SortDirection::Desc);
        assert_eq!(
            config.raw_results_path(),
            PathBuf::from("/var/cache/scholar/results.json")
        );
        assert_eq!(
            config.registry_path(),
            PathBuf::from("/var/cache/scholar/scholars.db")
        );
        assert_eq!(config.command_runner().strategy_names(), vec!["direct", "pipe"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ScraperConfig::from_yaml("pyhton_path: /usr/bin/python3").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScraperConfig::load_or_default(Some(dir.path().join("nope.yaml").as_path()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "lock_ttl_secs: 120\n").unwrap();

        let config = ScraperConfig::load(&path).unwrap();
        assert_eq!(config.lock_ttl(), chrono::Duration::seconds(120));
        assert_eq!(
            config.command_timeout(),
            Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS))
        );
    }
}
