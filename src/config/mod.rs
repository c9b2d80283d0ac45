// ABOUTME: Layered engine configuration loaded from TOML files
// Local project config overrides user config, which overrides system config

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config from {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// git executable, looked up on PATH unless absolute
    pub git_binary: String,

    /// Upper bound on probes running at the same time
    pub max_concurrent_probes: usize,

    /// Timeout applied to every git invocation
    #[serde(rename = "process_timeout_secs", with = "duration_secs")]
    pub process_timeout: Duration,

    /// Scan editor and agent manifests for projects
    pub discovery_enabled: bool,

    /// Projects tracked from startup (`~/` is expanded)
    pub projects: Vec<PathBuf>,

    // Engine constants, not read from config files
    #[serde(skip)]
    pub poll_interval: Duration,
    #[serde(skip)]
    pub discovery_interval: Duration,
    #[serde(skip)]
    pub failure_backoff_step: Duration,
    #[serde(skip)]
    pub max_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            git_binary: "git".to_string(),
            max_concurrent_probes: 4,
            process_timeout: Duration::from_secs(15),
            discovery_enabled: true,
            projects: Vec::new(),
            poll_interval: Duration::from_secs(30),
            discovery_interval: Duration::from_secs(300),
            failure_backoff_step: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_paths())
    }

    /// Load the default locations with `explicit` layered on top.
    /// Unlike the default locations, an explicit file must exist.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut paths = Self::config_paths();
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }
            paths.insert(0, path.to_path_buf());
        }
        Self::load_from(&paths)
    }

    /// Load from `paths` in order of precedence (first wins); missing files are skipped
    pub fn load_from(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        for path in paths.iter().rev() {
            if !path.exists() {
                continue;
            }
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let table: toml::Table = toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), keys = table.len(), "Loaded config file");
            merged.extend(table);
        }

        let mut config: Self = toml::Value::Table(merged)
            .try_into()
            .map_err(|source| ConfigError::Parse {
                path: paths.first().cloned().unwrap_or_default(),
                source,
            })?;
        config.projects = config.projects.iter().map(|p| expand_home(p)).collect();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_probes == 0 {
            return Err(ConfigError::Invalid("max_concurrent_probes must be at least 1".to_string()));
        }
        if self.process_timeout.is_zero() {
            return Err(ConfigError::Invalid("process_timeout_secs must be at least 1".to_string()));
        }
        if self.git_binary.trim().is_empty() {
            return Err(ConfigError::Invalid("git_binary must not be empty".to_string()));
        }
        Ok(())
    }

    /// Delay before the next probe after `consecutive_failures` failures in a row
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        let backoff = self.failure_backoff_step.saturating_mul(consecutive_failures);
        self.poll_interval.saturating_add(backoff).min(self.max_backoff.max(self.poll_interval))
    }

    /// Configuration file paths in order of precedence
    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(".gitbar").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".gitbar").join("config").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/gitbar/config.toml"));

        paths
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
