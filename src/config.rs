//! Configuration parsing and structures

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::env::substitute_env_vars;
use crate::tree::ContentStrategy;

/// Default attribute TTL handed to the kernel
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Top-level store defaults
    #[serde(default)]
    pub stores: StoreDefaults,

    /// Mount points
    pub mounts: Vec<RawMountConfig>,
}

/// Top-level store defaults section
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreDefaults {
    /// S3 store defaults
    pub s3: Option<S3StoreDefaults>,
}

/// Which deployment the store endpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreEnv {
    /// LocalStack on localhost with path-style addressing
    Local,
    /// Endpoint, region and credentials from the AWS default chain
    #[default]
    Remote,
}

/// S3 store defaults (bucket is required)
#[derive(Debug, Clone, Deserialize)]
pub struct S3StoreDefaults {
    /// S3 bucket name
    pub bucket: String,

    /// Environment selector
    #[serde(default)]
    pub env: StoreEnv,

    /// AWS region
    pub region: Option<String>,

    /// Key prefix for mounting a subpath
    pub prefix: Option<String>,

    /// Custom endpoint URL (for S3-compatible stores)
    pub endpoint: Option<String>,

    /// Force path-style addressing (for MinIO, LocalStack, etc.)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Raw mount configuration before resolution
#[derive(Debug, Clone, Deserialize)]
pub struct RawMountConfig {
    /// Path where the filesystem will be mounted
    pub path: PathBuf,

    /// Store configuration (may be partial, inheriting from defaults)
    pub store: MountStoreConfig,

    /// When file content is fetched
    #[serde(default)]
    pub content: ContentStrategy,

    /// Attribute and entry TTL reported to the kernel (e.g., "1s", "500ms")
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub attr_ttl: Option<Duration>,

    /// User ID reported for all entries (defaults to process uid)
    pub uid: Option<u32>,

    /// Group ID reported for all entries (defaults to process gid)
    pub gid: Option<u32>,

    /// Let other users access the mount (needs user_allow_other in /etc/fuse.conf)
    #[serde(default)]
    pub allow_other: bool,
}

/// Mount-level store configuration (tagged enum)
/// All fields except `type` are optional - missing values inherit from top-level defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MountStoreConfig {
    /// S3 store
    S3(S3MountStoreConfig),
}

/// S3 mount store - all fields optional for override mode
#[derive(Debug, Clone, Deserialize, Default)]
pub struct S3MountStoreConfig {
    pub bucket: Option<String>,
    pub env: Option<StoreEnv>,
    pub region: Option<String>,
    pub prefix: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: Option<bool>,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Mount points (fully resolved)
    pub mounts: Vec<MountConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Mount point configuration (resolved)
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub path: PathBuf,
    pub store: StoreConfig,
    pub content: ContentStrategy,
    pub attr_ttl: Duration,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub allow_other: bool,
}

/// Store configuration (tagged enum, fully resolved)
#[derive(Debug, Clone)]
pub enum StoreConfig {
    S3(S3StoreConfig),
}

/// S3 store configuration (fully resolved)
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    /// S3 bucket name
    pub bucket: String,

    /// Environment selector
    pub env: StoreEnv,

    /// AWS region
    pub region: Option<String>,

    /// Key prefix for mounting a subpath within the bucket.
    pub prefix: Option<String>,

    /// Custom endpoint URL (for S3-compatible stores)
    pub endpoint: Option<String>,

    /// Force path-style addressing
    pub force_path_style: bool,
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by merging mount overrides with defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            stores,
            mounts,
        } = self;

        let mounts = mounts
            .into_iter()
            .map(|raw| Self::resolve_mount(&stores, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config { logging, mounts })
    }

    fn resolve_mount(stores: &StoreDefaults, raw: RawMountConfig) -> Result<MountConfig, ConfigError> {
        let store = match raw.store {
            MountStoreConfig::S3(mount_s3) => {
                StoreConfig::S3(Self::resolve_s3_store(stores, mount_s3, &raw.path)?)
            }
        };

        Ok(MountConfig {
            path: raw.path,
            store,
            content: raw.content,
            attr_ttl: raw.attr_ttl.unwrap_or(DEFAULT_ATTR_TTL),
            uid: raw.uid,
            gid: raw.gid,
            allow_other: raw.allow_other,
        })
    }

    fn resolve_s3_store(
        stores: &StoreDefaults,
        mount: S3MountStoreConfig,
        mount_path: &PathBuf,
    ) -> Result<S3StoreConfig, ConfigError> {
        let defaults = stores.s3.as_ref();

        // Mount values override defaults; bucket must be specified somewhere
        let bucket = mount
            .bucket
            .or_else(|| defaults.map(|d| d.bucket.clone()))
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "Mount {:?} uses S3 store but no bucket specified (either on mount or in stores.s3 defaults)",
                    mount_path
                ))
            })?;

        Ok(S3StoreConfig {
            bucket,
            env: mount
                .env
                .or_else(|| defaults.map(|d| d.env))
                .unwrap_or_default(),
            region: mount.region.or_else(|| defaults.and_then(|d| d.region.clone())),
            prefix: mount.prefix.or_else(|| defaults.and_then(|d| d.prefix.clone())),
            endpoint: mount
                .endpoint
                .or_else(|| defaults.and_then(|d| d.endpoint.clone())),
            force_path_style: mount
                .force_path_style
                .or_else(|| defaults.map(|d| d.force_path_style))
                .unwrap_or(false),
        })
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, expanding `${VAR}` references first
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mounts.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one mount point is required".to_string(),
            ));
        }

        let mut paths = std::collections::HashSet::new();
        for mount in &self.mounts {
            if !paths.insert(&mount.path) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate mount path: {:?}",
                    mount.path
                )));
            }

            match &mount.store {
                StoreConfig::S3(s3) => {
                    if s3.bucket.trim().is_empty() {
                        return Err(ConfigError::ValidationError(format!(
                            "Mount {:?}: S3 bucket cannot be empty",
                            mount.path
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
