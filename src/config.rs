//! Configuration for rdsbackup.
//!
//! Settings come from CLI flags, an optional rdsbackup.toml and built-in
//! defaults, in that order of precedence. Credentials are never read from the
//! file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_SOURCE_REGION: &str = "us-east-1";
pub const DEFAULT_DEST_REGION: &str = "us-west-1";
pub const DEFAULT_POLL_INTERVAL: u64 = 10;

/// Root structure of rdsbackup.toml
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub regions: RegionsConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub copy: CopyConfig,
}

/// Source and destination regions
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RegionsConfig {
    pub source: Option<String>,
    pub dest: Option<String>,
}

/// Retention of managed copies in the destination region
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Managed snapshots to keep (0 = never purge)
    #[serde(default)]
    pub keep: usize,
}

/// Copy wait settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CopyConfig {
    /// Seconds between status polls (default: 10)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Give up waiting after this many seconds (default: wait forever)
    #[serde(default)]
    pub max_wait: Option<u64>,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL
}

impl Config {
    /// Load config from file, or return None if not found.
    ///
    /// An explicit `path` must exist. Without one, ./rdsbackup.toml is used
    /// when present.
    pub fn load(path: Option<&Path>) -> Result<Option<Self>> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::config(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                p.to_path_buf()
            }
            None => {
                let default_path = PathBuf::from("./rdsbackup.toml");
                if !default_path.exists() {
                    return Ok(None);
                }
                default_path
            }
        };

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", config_path.display(), e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            Error::config(format!("failed to parse {}: {}", config_path.display(), e))
        })?;

        config.validate()?;

        tracing::debug!("Loaded config from {}", config_path.display());
        Ok(Some(config))
    }

    fn validate(&self) -> Result<()> {
        if self.copy.poll_interval == 0 {
            return Err(Error::config("copy.poll_interval must be at least 1 second"));
        }
        for (name, region) in [("source", &self.regions.source), ("dest", &self.regions.dest)] {
            if region.as_deref().is_some_and(str::is_empty) {
                return Err(Error::config(format!("regions.{} cannot be empty", name)));
            }
        }
        Ok(())
    }
}

/// Static AWS credentials
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .finish()
    }
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub instance_id: String,
    pub source: Option<String>,
    pub dest: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub purge: Option<usize>,
    pub poll_interval: Option<u64>,
    pub max_wait: Option<u64>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub instance_id: String,
    pub source_region: String,
    pub dest_region: String,
    pub credentials: AwsCredentials,
    /// Managed snapshots to keep in the destination (0 = disabled)
    pub keep: usize,
    pub poll_interval: Duration,
    pub max_wait: Option<Duration>,
}

impl Settings {
    /// Merge CLI overrides over the config file and defaults.
    pub fn resolve(cli: Overrides, file: Option<Config>) -> Result<Self> {
        let file = file.unwrap_or_default();

        let instance_id = cli.instance_id.trim().to_string();
        if instance_id.is_empty() {
            return Err(Error::config("a DB instance identifier is required"));
        }

        let credentials = match (non_empty(cli.access_key_id), non_empty(cli.secret_access_key)) {
            (Some(access_key_id), Some(secret_access_key)) => AwsCredentials {
                access_key_id,
                secret_access_key,
            },
            _ => {
                return Err(Error::config(
                    "must use -K and -S options or set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables",
                ))
            }
        };

        let source_region = cli
            .source
            .or(file.regions.source)
            .unwrap_or_else(|| DEFAULT_SOURCE_REGION.to_string());
        let dest_region = cli
            .dest
            .or(file.regions.dest)
            .unwrap_or_else(|| DEFAULT_DEST_REGION.to_string());

        if source_region.is_empty() || dest_region.is_empty() {
            return Err(Error::config("regions cannot be empty"));
        }
        if source_region == dest_region {
            return Err(Error::config(format!(
                "source and destination region are both {}",
                source_region
            )));
        }

        let poll_interval = cli.poll_interval.unwrap_or(file.copy.poll_interval);
        if poll_interval == 0 {
            return Err(Error::config("poll interval must be at least 1 second"));
        }

        Ok(Self {
            instance_id,
            source_region,
            dest_region,
            credentials,
            keep: cli.purge.unwrap_or(file.retention.keep),
            poll_interval: Duration::from_secs(poll_interval),
            max_wait: cli.max_wait.or(file.copy.max_wait).map(Duration::from_secs),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
