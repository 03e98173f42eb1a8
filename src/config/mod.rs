use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted upload body in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_path")]
    pub uploads_path: PathBuf,
    /// Unix permission bits applied when the uploads directory is created
    #[serde(default = "default_uploads_permissions")]
    pub permissions: u32,
    /// Length of generated image identifiers
    #[serde(default = "default_id_length")]
    pub id_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a rendered entry. Zero keeps entries until the next reset.
    #[serde(default = "default_cache_ttl", with = "duration")]
    pub ttl: Duration,
    /// Interval between full cache resets. Zero disables the reset.
    #[serde(default = "default_cache_reset_interval", with = "duration")]
    pub reset_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Requests processed at the same time across all clients
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_rate_limiting")]
    pub rate_limiting: bool,
    #[serde(default = "default_rate_window", with = "duration")]
    pub window: Duration,
    #[serde(default = "default_rate_threshold")]
    pub threshold: u32,
    /// Added to a client's block every time it exceeds the threshold again
    #[serde(default = "default_rate_penalty", with = "duration")]
    pub penalty: Duration,
    #[serde(default = "default_read_weight")]
    pub read_weight: u32,
    #[serde(default = "default_write_weight")]
    pub write_weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_render_timeout", with = "duration")]
    pub timeout: Duration,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,
    /// Width of the thumbnail an upload redirects to
    #[serde(default = "default_thumbnail_width")]
    pub default_thumbnail_width: u32,
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_upload_size() -> usize {
    DEFAULT_MAX_UPLOAD_SIZE
}

// Storage defaults
fn default_uploads_path() -> PathBuf {
    PathBuf::from(DEFAULT_UPLOADS_PATH)
}

fn default_uploads_permissions() -> u32 {
    DEFAULT_UPLOADS_PERMISSIONS
}

fn default_id_length() -> usize {
    DEFAULT_ID_LENGTH
}

// Cache defaults
fn default_cache_ttl() -> Duration {
    parse_default(DEFAULT_CACHE_TTL)
}

fn default_cache_reset_interval() -> Duration {
    parse_default(DEFAULT_CACHE_RESET_INTERVAL)
}

// Limits defaults
fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_rate_limiting() -> bool {
    DEFAULT_RATE_LIMITING
}

fn default_rate_window() -> Duration {
    parse_default(DEFAULT_RATE_WINDOW)
}

fn default_rate_threshold() -> u32 {
    DEFAULT_RATE_THRESHOLD
}

fn default_rate_penalty() -> Duration {
    parse_default(DEFAULT_RATE_PENALTY)
}

fn default_read_weight() -> u32 {
    DEFAULT_READ_WEIGHT
}

fn default_write_weight() -> u32 {
    DEFAULT_WRITE_WEIGHT
}

// Render defaults
fn default_render_timeout() -> Duration {
    parse_default(DEFAULT_RENDER_TIMEOUT)
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

fn default_min_dimension() -> u32 {
    DEFAULT_MIN_DIMENSION
}

fn default_thumbnail_width() -> u32 {
    DEFAULT_THUMBNAIL_WIDTH
}

fn parse_default(value: &str) -> Duration {
    duration_serde::parse(value).unwrap_or_default()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_path: default_uploads_path(),
            permissions: default_uploads_permissions(),
            id_length: default_id_length(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            reset_interval: default_cache_reset_interval(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            rate_limiting: default_rate_limiting(),
            window: default_rate_window(),
            threshold: default_rate_threshold(),
            penalty: default_rate_penalty(),
            read_weight: default_read_weight(),
            write_weight: default_write_weight(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout: default_render_timeout(),
            max_dimension: default_max_dimension(),
            min_dimension: default_min_dimension(),
            default_thumbnail_width: default_thumbnail_width(),
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.storage.id_length == 0 {
            bail!("storage.id_length must be greater than zero");
        }
        if self.storage.uploads_path.as_os_str().is_empty() {
            bail!("storage.uploads_path must not be empty");
        }
        if self.limits.max_concurrent == 0 {
            bail!("limits.max_concurrent must be greater than zero");
        }
        if self.render.min_dimension > self.render.max_dimension {
            bail!(
                "render.min_dimension ({}) exceeds render.max_dimension ({})",
                self.render.min_dimension,
                self.render.max_dimension
            );
        }
        if self.render.timeout.is_zero() {
            bail!("render.timeout must be greater than zero");
        }
        Ok(())
    }
}
