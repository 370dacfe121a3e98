//! Settings file and fixed endpoints.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const BASE_URL: &str = "https://movie.douban.com";
pub const EXPLORE_URL: &str = "https://movie.douban.com/explore";
pub const CATEGORY_API_URL: &str = "https://m.douban.com/rexxar/api/v2/subject/recent_hot/movie";
pub const REGION_API_URL: &str = "https://m.douban.com/rexxar/api/v2/movie/recommend";

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "douban.conl";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Crawler settings (loaded from douban.conl, every key optional)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub data_dir: PathBuf,
    /// Response cache; disabled when unset
    pub cache_dir: Option<PathBuf>,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub api_timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub fetch_detail: bool,
    /// Rewrite the JSON array after every record instead of once per source
    pub incremental_json: bool,
    pub strict_csv_header: bool,
    pub top250_pages: u32,
    pub api_pages: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cache_dir: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 10,
            api_timeout_secs: 30,
            retries: 3,
            retry_backoff_ms: 2000,
            delay_min_ms: 1000,
            delay_max_ms: 3000,
            fetch_detail: true,
            incremental_json: false,
            strict_csv_header: false,
            top250_pages: 10,
            api_pages: 500,
        }
    }
}

impl Settings {
    /// Load settings from a CONL file. A missing file yields the defaults;
    /// a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config: {}", path.display()))
            }
        };
        Self::parse(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = serde_conl::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.delay_min_ms <= self.delay_max_ms,
            "delay_min_ms ({}) is greater than delay_max_ms ({})",
            self.delay_min_ms,
            self.delay_max_ms
        );
        anyhow::ensure!(self.retries > 0, "retries must be at least 1");
        Ok(())
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
