//! Configuration management
//!
//! This module handles loading, saving, and migrating the s3-client configuration file.
//! The configuration file is stored in TOML format at ~/.config/s3-client/config.toml,
//! or under the directory named by `S3_CLIENT_CONFIG_DIR` when that is set.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pool::FailurePolicy;

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "S3_CLIENT_CONFIG_DIR";

/// Default download chunk size in MiB
pub const DEFAULT_CHUNK_SIZE_MB: u64 = 10;

/// Default number of parallel chunk workers
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default multipart upload part size in MiB
pub const DEFAULT_PART_SIZE_MB: u64 = 10;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Output settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Transfer engine settings
    #[serde(default)]
    pub transfer: TransferDefaults,

    /// Storage endpoint settings
    #[serde(default)]
    pub connection: ConnectionOptions,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            transfer: TransferDefaults::default(),
            connection: ConnectionOptions::default(),
        }
    }
}

/// Default settings for CLI output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Output format: "human" or "json"
    #[serde(default = "default_output")]
    pub output: String,

    /// Color mode: "auto", "always", or "never"
    #[serde(default = "default_color")]
    pub color: String,

    /// Show progress bars
    #[serde(default = "default_true")]
    pub progress: bool,
}

fn default_output() -> String {
    "human".to_string()
}

fn default_color() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            progress: true,
        }
    }
}

/// Transfer engine defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDefaults {
    /// Download chunk size in MiB
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,

    /// Number of parallel download workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Multipart upload part size in MiB
    #[serde(default = "default_part_size_mb")]
    pub part_size_mb: u64,

    /// What download workers do after a sibling fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_chunk_size_mb() -> u64 {
    DEFAULT_CHUNK_SIZE_MB
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_part_size_mb() -> u64 {
    DEFAULT_PART_SIZE_MB
}

impl Default for TransferDefaults {
    fn default() -> Self {
        Self {
            chunk_size_mb: DEFAULT_CHUNK_SIZE_MB,
            concurrency: DEFAULT_CONCURRENCY,
            part_size_mb: DEFAULT_PART_SIZE_MB,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Connection settings for an S3-compatible endpoint
///
/// Unset fields fall through to the SDK's default resolution chain
/// (environment, shared config files, instance metadata).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Shared config/credentials profile name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Region override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint URL, e.g. http://localhost:9000
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Force path-style bucket addressing
    #[serde(default)]
    pub path_style: bool,
}

impl ConnectionOptions {
    /// Cache key identifying a client built from these options
    ///
    /// `profile|region|endpoint`, with a `|path` suffix for path-style clients
    /// since the addressing style is fixed when the client is built.
    pub fn cache_key(&self) -> String {
        let mut key = format!(
            "{}|{}|{}",
            self.profile.as_deref().unwrap_or_default(),
            self.region.as_deref().unwrap_or_default(),
            self.endpoint.as_deref().unwrap_or_default()
        );
        if self.path_style {
            key.push_str("|path");
        }
        key
    }

    /// Overlay explicitly set fields from `other`
    pub fn merge(mut self, other: ConnectionOptions) -> Self {
        if other.profile.is_some() {
            self.profile = other.profile;
        }
        if other.region.is_some() {
            self.region = other.region;
        }
        if other.endpoint.is_some() {
            self.endpoint = other.endpoint;
        }
        self.path_style |= other.path_style;
        self
    }

    /// Validate the endpoint URL if one is set
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            let url = url::Url::parse(endpoint)?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(Error::Config(format!(
                    "endpoint must use http or https: {endpoint}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("s3-client"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade s3-client.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        config.connection.validate()?;
        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        Ok(())
    }

    fn migrate(&self, mut config: Config) -> Result<Config> {
        tracing::debug!(from = config.schema_version, to = SCHEMA_VERSION, "migrating config");
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}
