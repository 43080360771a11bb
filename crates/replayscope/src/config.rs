//! Configuration for the fetch client, the cache and the investigations.
//!
//! ## Example
//!
//! ```ignore
//! use replayscope::config::GuardConfig;
//!
//! let config = GuardConfig::builder()
//!     .api_key("key")
//!     .cache_path("replays.db")
//!     .cache(true)
//!     .build();
//!
//! // or from a TOML file
//! let config = GuardConfig::load("replayscope.toml")?;
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

pub const DEFAULT_API_BASE_URL: &str = "https://osu.ppy.sh/api";

/// Rate limit window of the scoring service
pub mod ratelimit {
    /// Length of one limiting window in seconds
    pub const WINDOW_SECS: u64 = 60;
    /// Heavy calls allowed per window
    pub const HEAVY_BUDGET: u32 = 10;
}

/// Retry tuning for transient failures
pub mod retry {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const INITIAL_BACKOFF_MS: u64 = 500;
    pub const MAX_BACKOFF_MS: u64 = 8000;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub heavy_budget: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: ratelimit::WINDOW_SECS,
            heavy_budget: ratelimit::HEAVY_BUDGET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            initial_backoff_ms: retry::INITIAL_BACKOFF_MS,
            max_backoff_ms: retry::MAX_BACKOFF_MS,
        }
    }
}

/// Default thresholds for snap detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Degrees
    pub max_angle: f64,
    /// osu!pixels
    pub min_distance: f64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            max_angle: 10.0,
            min_distance: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Cache database location; no cache is used when unset
    pub cache_path: Option<PathBuf>,
    /// Global caching default, overridable per container and per replay
    pub cache: bool,
    /// Resolve beatmap ids of local replays through the scoring service
    pub resolve_file_ids: bool,
    pub ratelimit: RateLimitConfig,
    pub retry: RetryConfig,
    pub snaps: SnapConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
            cache_path: None,
            cache: false,
            resolve_file_ids: false,
            ratelimit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            snaps: SnapConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Create a new configuration builder
    pub fn builder() -> GuardConfigBuilder {
        GuardConfigBuilder::default()
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: GuardConfig = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        debug!(
            "cache={}, cache_path={:?}, heavy_budget={}",
            config.cache, config.cache_path, config.ratelimit.heavy_budget
        );
        Ok(config)
    }
}

/// Builder for GuardConfig
#[derive(Debug, Clone, Default)]
pub struct GuardConfigBuilder {
    api_key: Option<String>,
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    cache_path: Option<PathBuf>,
    cache: Option<bool>,
    resolve_file_ids: Option<bool>,
    ratelimit: Option<RateLimitConfig>,
    retry: Option<RetryConfig>,
    snaps: Option<SnapConfig>,
}

impl GuardConfigBuilder {
    pub fn api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn api_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    pub fn cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Enable or disable caching by default
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = Some(enabled);
        self
    }

    pub fn resolve_file_ids(mut self, enabled: bool) -> Self {
        self.resolve_file_ids = Some(enabled);
        self
    }

    pub fn ratelimit(mut self, ratelimit: RateLimitConfig) -> Self {
        self.ratelimit = Some(ratelimit);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn snaps(mut self, snaps: SnapConfig) -> Self {
        self.snaps = Some(snaps);
        self
    }

    /// Build the configuration
    pub fn build(self) -> GuardConfig {
        let default = GuardConfig::default();
        GuardConfig {
            api_key: self.api_key.or(default.api_key),
            api_base_url: self.api_base_url.unwrap_or(default.api_base_url),
            request_timeout_secs: self
                .request_timeout_secs
                .unwrap_or(default.request_timeout_secs),
            cache_path: self.cache_path.or(default.cache_path),
            cache: self.cache.unwrap_or(default.cache),
            resolve_file_ids: self.resolve_file_ids.unwrap_or(default.resolve_file_ids),
            ratelimit: self.ratelimit.unwrap_or(default.ratelimit),
            retry: self.retry.unwrap_or(default.retry),
            snaps: self.snaps.unwrap_or(default.snaps),
        }
    }
}

/// Effective caching flag for one load: the most specific explicit setting wins.
pub fn resolve_cache(global: bool, container: Option<bool>, replay: Option<bool>) -> bool {
    replay.or(container).unwrap_or(global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_resolve_cache_cascade() {
        assert!(!resolve_cache(false, None, None));
        assert!(resolve_cache(true, None, None));
        assert!(resolve_cache(false, Some(true), None));
        assert!(!resolve_cache(true, Some(false), None));
        assert!(!resolve_cache(true, Some(true), Some(false)));
        assert!(resolve_cache(false, Some(false), Some(true)));
        assert!(resolve_cache(false, None, Some(true)));
    }

    #[test]
    fn test_builder_falls_back_to_defaults() {
        let config = GuardConfig::builder().api_key("secret").cache(true).build();
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert!(config.cache);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.retry.max_attempts, retry::MAX_ATTEMPTS);
        assert_eq!(config.snaps.max_angle, 10.0);
    }

    #[test]
    fn test_load_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_key = "abc"
cache = true
cache_path = "/tmp/replays.db"

[ratelimit]
heavy_budget = 5

[snaps]
min_distance = 12.0
"#
        )
        .unwrap();

        let config = GuardConfig::load(file.path()).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert!(config.cache);
        assert_eq!(config.cache_path, Some(PathBuf::from("/tmp/replays.db")));
        assert_eq!(config.ratelimit.heavy_budget, 5);
        assert_eq!(config.ratelimit.window_secs, ratelimit::WINDOW_SECS);
        assert_eq!(config.snaps.min_distance, 12.0);
        assert_eq!(config.snaps.max_angle, 10.0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = GuardConfig::load("/nonexistent/replayscope.toml").unwrap_err();
        assert!(err.is_not_found());
    }
}
