//! Configuration system for wbcrawl.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/wbcrawl/config.toml`
//! 3. **Environment variables** - `WBCRAWL_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [crawl]
//! since_days = 30
//! posts_per_page = 10
//! on_page_error = "skip"
//! utc_offset_hours = 8
//!
//! [throttle]
//! enabled = true
//! min_interval_pages = 1
//! max_interval_pages = 5
//! min_pause_secs = 6
//! max_pause_secs = 10
//!
//! [http]
//! base_url = "https://m.weibo.cn/api/container/getIndex"
//! timeout_secs = 20
//!
//! [output]
//! format = "text"
//! colors = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{CrawlError, Result};
use crate::profile::POSTS_PER_PAGE;
use crate::throttle::ThrottlePolicy;
use crate::walker::PageErrorPolicy;

/// Default endpoint of the mobile container API.
pub const DEFAULT_BASE_URL: &str = "https://m.weibo.cn/api/container/getIndex";

/// The endpoint renders relative times in China Standard Time.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

/// Main configuration structure for wbcrawl.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crawl behavior configuration.
    pub crawl: CrawlConfig,
    /// Pacing between page fetches.
    pub throttle: ThrottlePolicy,
    /// HTTP transport configuration.
    pub http: HttpConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// Crawl behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Default cutoff, in days before today, when `--since` is not given.
    /// Unset means no cutoff.
    /// Environment variable: `WBCRAWL_SINCE_DAYS`
    pub since_days: Option<u64>,

    /// Posts the endpoint returns per page.
    pub posts_per_page: u64,

    /// What to do when a page cannot be fetched: `skip` or `abort`.
    /// Environment variable: `WBCRAWL_ON_PAGE_ERROR`
    pub on_page_error: PageErrorPolicy,

    /// Offset of the clock used to resolve relative times.
    pub utc_offset_hours: i32,
}

/// HTTP transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Environment variable: `WBCRAWL_BASE_URL`
    pub base_url: String,
    /// Environment variable: `WBCRAWL_TIMEOUT`
    pub timeout_secs: u64,
    /// Environment variable: `WBCRAWL_USER_AGENT`
    pub user_agent: String,
}

/// Output formatting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json, json-pretty, jsonl.
    pub format: String,

    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output (progress bars, etc.).
    pub quiet: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            since_days: None,
            posts_per_page: POSTS_PER_PAGE,
            on_page_error: PageErrorPolicy::Skip,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 20,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
            quiet: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file (`path`, or the user config file)
    /// 3. Compiled defaults
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = Self::default();

        let file_config = match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_user_config(),
        };
        if let Some(file_config) = file_config {
            config.merge(file_config);
        }

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match Self::parse_file(path) {
            Ok(config) => {
                info!("Loaded config from: {}", path.display());
                Some(config)
            }
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    /// Parse a config file, reporting why it could not be used.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or is not valid TOML.
    pub fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CrawlError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| CrawlError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("wbcrawl").join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(days) = std::env::var("WBCRAWL_SINCE_DAYS") {
            if let Ok(n) = days.parse() {
                self.crawl.since_days = Some(n);
            }
        }
        if let Ok(policy) = std::env::var("WBCRAWL_ON_PAGE_ERROR") {
            match policy.parse() {
                Ok(policy) => self.crawl.on_page_error = policy,
                Err(e) => warn!("Ignoring WBCRAWL_ON_PAGE_ERROR: {e}"),
            }
        }
        if std::env::var("WBCRAWL_NO_THROTTLE").is_ok() {
            self.throttle.enabled = false;
        }

        if let Ok(url) = std::env::var("WBCRAWL_BASE_URL") {
            self.http.base_url = url;
        }
        if let Ok(timeout) = std::env::var("WBCRAWL_TIMEOUT") {
            if let Ok(n) = timeout.parse() {
                self.http.timeout_secs = n;
            }
        }
        if let Ok(agent) = std::env::var("WBCRAWL_USER_AGENT") {
            self.http.user_agent = agent;
        }

        if let Ok(format) = std::env::var("WBCRAWL_FORMAT") {
            self.output.format = format;
        }
        if std::env::var("WBCRAWL_NO_COLOR").is_ok() || std::env::var("NO_COLOR").is_ok() {
            self.output.colors = false;
        }
        if std::env::var("WBCRAWL_QUIET").is_ok() {
            self.output.quiet = true;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.crawl.since_days.is_some() {
            self.crawl.since_days = other.crawl.since_days;
        }
        self.crawl.posts_per_page = other.crawl.posts_per_page;
        self.crawl.on_page_error = other.crawl.on_page_error;
        self.crawl.utc_offset_hours = other.crawl.utc_offset_hours;

        self.throttle = other.throttle;

        self.http.base_url = other.http.base_url;
        self.http.timeout_secs = other.http.timeout_secs;
        self.http.user_agent = other.http.user_agent;

        self.output.format = other.output.format;
        self.output.colors = other.output.colors;
        self.output.quiet = other.output.quiet;
    }

    /// Set a single dotted key, as used by `wbcrawl config --set key=value`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for unknown keys or values of the wrong type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value.trim().parse().map_err(|_| {
                CrawlError::invalid_argument(format!("invalid value '{value}' for {key}"))
            })
        }

        match key {
            "crawl.since_days" => {
                self.crawl.since_days = if value.trim().is_empty() || value == "none" {
                    None
                } else {
                    Some(parse(key, value)?)
                };
            }
            "crawl.posts_per_page" => self.crawl.posts_per_page = parse(key, value)?,
            "crawl.on_page_error" => {
                self.crawl.on_page_error = value
                    .parse()
                    .map_err(|e: String| CrawlError::invalid_argument(e))?;
            }
            "crawl.utc_offset_hours" => self.crawl.utc_offset_hours = parse(key, value)?,
            "throttle.enabled" => self.throttle.enabled = parse(key, value)?,
            "throttle.min_interval_pages" => self.throttle.min_interval_pages = parse(key, value)?,
            "throttle.max_interval_pages" => self.throttle.max_interval_pages = parse(key, value)?,
            "throttle.min_pause_secs" => self.throttle.min_pause_secs = parse(key, value)?,
            "throttle.max_pause_secs" => self.throttle.max_pause_secs = parse(key, value)?,
            "http.base_url" => self.http.base_url = value.to_string(),
            "http.timeout_secs" => self.http.timeout_secs = parse(key, value)?,
            "http.user_agent" => self.http.user_agent = value.to_string(),
            "output.format" => self.output.format = value.to_string(),
            "output.colors" => self.output.colors = parse(key, value)?,
            "output.quiet" => self.output.quiet = parse(key, value)?,
            _ => {
                return Err(CrawlError::invalid_argument(format!(
                    "unknown config key '{key}'"
                )));
            }
        }
        Ok(())
    }

    /// Save the current configuration to `path`, or the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self, path: Option<&Path>) -> std::io::Result<PathBuf> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let config_path = write_config_file(path, &content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(config_path)
    }

    /// Write the commented default config to `path`, or the user config file.
    ///
    /// # Errors
    ///
    /// Same as [`Config::save`].
    pub fn init_file(path: Option<&Path>) -> std::io::Result<PathBuf> {
        let config_path = write_config_file(path, &Self::default_config_content())?;
        info!("Wrote default config to: {}", config_path.display());
        Ok(config_path)
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        let body = toml::to_string_pretty(&Self::default()).unwrap_or_default();
        let body = body.replacen(
            "[crawl]\n",
            "[crawl]\n# Only keep posts from the last N days; unset walks the whole feed.\n# since_days = 30\n",
            1,
        );
        format!("{DEFAULT_CONFIG_HEADER}{body}")
    }
}

const DEFAULT_CONFIG_HEADER: &str = "\
# wbcrawl configuration
#
# WBCRAWL_* environment variables override these values, and command-line
# flags override both. Run `wbcrawl config --show` for the effective config.

";

fn write_config_file(path: Option<&Path>, content: &str) -> std::io::Result<PathBuf> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?,
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, content)?;
    Ok(config_path)
}
