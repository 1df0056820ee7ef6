use crate::cache::CacheLayout;
use crate::catalog::Catalog;
use crate::fetch::CurlOptions;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry policy for digest mismatches (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of download attempts (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.5,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Result<RetryPolicy> {
        if self.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        let base_delay = Duration::try_from_secs_f64(self.base_delay_secs)
            .context("retry.base_delay_secs must be a non-negative number")?;
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay,
            max_delay: Duration::from_secs(self.max_delay_secs),
        })
    }
}

/// Transfer limits (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub connect_timeout_secs: u64,
    /// Upper bound for a whole download.
    pub timeout_secs: u64,
    /// Abort when throughput stays below this many bytes/s ...
    pub low_speed_limit: u32,
    /// ... for this many seconds.
    pub low_speed_time_secs: u64,
    pub max_redirections: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let d = CurlOptions::default();
        Self {
            connect_timeout_secs: d.connect_timeout.as_secs(),
            timeout_secs: d.timeout.as_secs(),
            low_speed_limit: d.low_speed_limit,
            low_speed_time_secs: d.low_speed_time.as_secs(),
            max_redirections: d.max_redirections,
        }
    }
}

impl From<&NetworkConfig> for CurlOptions {
    fn from(n: &NetworkConfig) -> Self {
        CurlOptions {
            connect_timeout: Duration::from_secs(n.connect_timeout_secs),
            timeout: Duration::from_secs(n.timeout_secs),
            low_speed_limit: n.low_speed_limit,
            low_speed_time: Duration::from_secs(n.low_speed_time_secs),
            max_redirections: n.max_redirections,
        }
    }
}

fn default_family() -> String {
    "nccl".to_string()
}

fn default_toolkit_tag() -> String {
    "cu".to_string()
}

fn default_true() -> bool {
    true
}

/// Global configuration loaded from `~/.config/ncclfetch/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NcclFetchConfig {
    /// Cache root; defaults to `$XDG_CONFIG_HOME/vllm`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_root: Option<PathBuf>,
    /// Artifact family directory under the cache root.
    #[serde(default = "default_family")]
    pub family: String,
    /// Two-letter toolkit tag stripped from version specs (`2.18+cu12`).
    #[serde(default = "default_toolkit_tag")]
    pub toolkit_tag: String,
    /// Catalog file replacing the built-in table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
    /// Hold an advisory lock while downloading into the cache.
    #[serde(default = "default_true")]
    pub lock_downloads: bool,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional transfer limits; if missing, built-in defaults are used.
    #[serde(default)]
    pub network: Option<NetworkConfig>,
}

impl Default for NcclFetchConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            family: default_family(),
            toolkit_tag: default_toolkit_tag(),
            catalog_path: None,
            lock_downloads: true,
            retry: None,
            network: None,
        }
    }
}

impl NcclFetchConfig {
    /// Cache root, falling back to `$XDG_CONFIG_HOME/vllm`.
    pub fn cache_root(&self) -> Result<PathBuf> {
        match &self.cache_root {
            Some(root) => Ok(root.clone()),
            None => {
                let xdg_dirs = xdg::BaseDirectories::new()?;
                Ok(xdg_dirs.get_config_home().join("vllm"))
            }
        }
    }

    pub fn layout(&self) -> Result<CacheLayout> {
        Ok(CacheLayout::new(
            self.cache_root()?,
            &self.family,
            &self.toolkit_tag,
        ))
    }

    pub fn catalog(&self) -> Result<Catalog> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path),
            None => Ok(Catalog::builtin()),
        }
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        self.retry.clone().unwrap_or_default().policy()
    }

    pub fn curl_options(&self) -> CurlOptions {
        self.network
            .as_ref()
            .map(CurlOptions::from)
            .unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        if self.toolkit_tag.is_empty() || self.toolkit_tag.contains(['+', '/']) {
            anyhow::bail!("toolkit_tag {:?} is not a usable prefix", self.toolkit_tag);
        }
        if self.family.is_empty() || self.family.contains('/') {
            anyhow::bail!("family {:?} must be a single directory name", self.family);
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ncclfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<NcclFetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = NcclFetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<NcclFetchConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: NcclFetchConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
