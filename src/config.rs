use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use uuid::Uuid;

use crate::controller::MAX_UPLOAD_SIZE;
use crate::processor::ResizeFilter;
use crate::records::RecordBackendConfig;

static CONFIG: OnceCell<RuntimeConfig> = OnceCell::new();

/// Written out by `stowage init`.
pub const EXAMPLE_CONFIG: &str = r#"# Where blobs are written, one directory per owner.
storage_root: "./data"

host: "127.0.0.1"
port: 8000
base_path: "/v1"

# Uploads above this many bytes are refused.
max_upload_size: 10485760

records:
  type: sqlite
  config:
    connection_uri: "sqlite://stowage.db?mode=rwc"
    pool_size: 10

identity:
  tokens:
    # token: owner id
    "change-me": "00000000-0000-0000-0000-000000000001"

# Caps how many image variants are rendered at once.
max_concurrency: 8
resize_filter: lanczos3
avif_speed: 8
"#;

pub fn config() -> &'static RuntimeConfig {
    CONFIG.get().expect("config not initialised")
}

/// Loads the config file at `path` into the global slot.
pub async fn init(path: &Path) -> Result<()> {
    let data = tokio::fs::read_to_string(path).await?;
    init_from_str(&data)
}

pub fn init_from_str(data: &str) -> Result<()> {
    let cfg = RuntimeConfig::parse(data)?;
    CONFIG
        .set(cfg)
        .map_err(|_| anyhow!("config already initialised"))
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_base_path")]
    /// The URL prefix the API is nested under.
    pub base_path: String,

    /// The directory every blob is stored below.
    pub storage_root: PathBuf,

    #[serde(default = "default_max_upload_size")]
    /// Maximum upload size in bytes.
    ///
    /// Defaults to 10 MiB.
    pub max_upload_size: usize,

    #[serde(default)]
    /// The upload metadata backend.
    pub records: RecordBackendConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    /// The max amount of image transformations running at once.
    ///
    /// Unlimited when not set.
    pub max_concurrency: Option<usize>,

    #[serde(default)]
    /// The resampling filter used when shrinking images.
    pub resize_filter: ResizeFilter,

    #[serde(default = "default_avif_speed")]
    /// The AVIF encoder speed from 1 (slowest, smallest) to 10 (fastest).
    pub avif_speed: u8,
}

impl RuntimeConfig {
    pub fn parse(data: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(data)?;

        if cfg.max_upload_size == 0 {
            return Err(anyhow!("max_upload_size must be greater than 0"));
        }

        if !(1..=10).contains(&cfg.avif_speed) {
            return Err(anyhow!("avif_speed must be between 1 and 10 inclusive"));
        }

        if cfg.max_concurrency == Some(0) {
            return Err(anyhow!("max_concurrency must be greater than 0 when set"));
        }

        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    /// Static bearer tokens mapped to the owner id they authenticate as.
    pub tokens: HashMap<String, Uuid>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_base_path() -> String {
    "/v1".to_string()
}

const fn default_max_upload_size() -> usize {
    MAX_UPLOAD_SIZE
}

const fn default_avif_speed() -> u8 {
    8
}
