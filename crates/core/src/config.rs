//! Configuration loading
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The CLI applies its own flags on top. The result
//! is resolved once and handed to the transfer backend at construction; no
//! component reads the environment in the middle of a copy.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Region used when neither the config file nor `AWS_REGION` names one
pub const DEFAULT_REGION: &str = "us-east-2";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "BCP_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Retry policy for individual backend requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
        }
    }
}

/// Resolved settings for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Region of the object store endpoint
    pub region: String,

    /// Custom endpoint URL for S3-compatible services
    pub endpoint: Option<String>,

    /// Use path-style addressing (`endpoint/bucket/key`)
    pub force_path_style: bool,

    /// Default parts in flight per file, 0 = backend default
    pub parallel: usize,

    /// Default part size in bytes, 0 = backend default
    pub part_size: u64,

    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            force_path_style: false,
            parallel: 0,
            part_size: 0,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Apply `AWS_REGION` and `AWS_ENDPOINT_URL` from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(region) = lookup("AWS_REGION").filter(|r| !r.is_empty()) {
            self.region = region;
        }
        if let Some(endpoint) = lookup("AWS_ENDPOINT_URL").filter(|e| !e.is_empty()) {
            self.endpoint = Some(endpoint);
        }
    }

    /// Check values that cannot be caught by deserialization
    pub fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(Error::Config("region cannot be empty".into()));
        }

        if let Some(endpoint) = &self.endpoint {
            let url = url::Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("invalid endpoint '{endpoint}': {e}")))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(Error::Config(format!(
                    "endpoint '{endpoint}' must use http or https"
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }

        Ok(())
    }
}

/// Locates and loads the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Use `$BCP_CONFIG_DIR/config.toml`, falling back to the platform
    /// config directory (`~/.config/bucketcp/config.toml` on Linux)
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("cannot determine config directory".into()))?
                .join("bucketcp"),
        };

        Ok(Self::with_path(dir.join(CONFIG_FILE)))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the file (if present) and apply environment overrides
    pub fn load(&self) -> Result<Config> {
        let mut config = self.load_file()?;
        config.apply_env();
        config.validate()?;

        tracing::debug!(
            path = %self.config_path.display(),
            region = %config.region,
            endpoint = ?config.endpoint,
            "Loaded configuration"
        );

        Ok(config)
    }

    /// Load only the file; a missing file yields the defaults
    pub fn load_file(&self) -> Result<Config> {
        match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                Error::Config(format!(
                    "failed to parse {}: {e}",
                    self.config_path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
