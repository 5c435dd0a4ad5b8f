//! Application and cache configuration.
//!
//! `CacheConfig` holds the timing knobs of the local-first caches.
//! `Config` is the persisted application configuration (remote endpoint,
//! token, last user), stored at `~/.config/gymtracker/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::RetryPolicy;
use crate::storage::file::sanitize_file_name;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "gymtracker";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Snapshots are trusted for reads for 10 minutes after they were written.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Delay that coalesces a burst of mutations into a single drain.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Interval of the background drain while entries are pending.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Delay between a drain finishing and the deferred remote refresh.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(100);

/// Timing configuration for one local-first cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub debounce: Duration,
    pub sync_interval: Duration,
    pub refresh_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            debounce: DEFAULT_DEBOUNCE,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            refresh_delay: DEFAULT_REFRESH_DELAY,
            retry: RetryPolicy::default(),
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub remote_url: Option<String>,
    pub token: Option<String>,
    pub last_uid: Option<String>,
    /// Overrides the snapshot TTL, in minutes.
    pub ttl_minutes: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Per-user cache directory holding snapshots and pending queues.
    pub fn cache_dir(&self, uid: &str) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(user_cache_dir(&cache_dir, uid))
    }

    pub fn cache_config(&self) -> CacheConfig {
        match self.ttl_minutes {
            Some(minutes) => CacheConfig::default().with_ttl(Duration::from_secs(minutes * 60)),
            None => CacheConfig::default(),
        }
    }
}

/// `<base>/gymtracker/<uid>`, with the uid reduced to one path component.
fn user_cache_dir(base: &Path, uid: &str) -> PathBuf {
    base.join(APP_NAME).join(sanitize_file_name(uid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_override() {
        let config = Config {
            ttl_minutes: Some(3),
            ..Default::default()
        };
        assert_eq!(config.cache_config().ttl, Duration::from_secs(180));
        assert_eq!(Config::default().cache_config().ttl, DEFAULT_TTL);
    }

    #[test]
    fn test_config_roundtrips_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"remote_url":"http://localhost:8080"}"#)
            .expect("config should parse");
        assert_eq!(config.remote_url.as_deref(), Some("http://localhost:8080"));
        assert!(config.token.is_none());
        assert!(config.ttl_minutes.is_none());
    }

    #[test]
    fn test_user_cache_dir_stays_under_base() {
        let base = Path::new("/tmp/cache");
        assert_eq!(user_cache_dir(base, "u1"), base.join("gymtracker").join("u1"));

        let escaped = user_cache_dir(base, "../x");
        assert_eq!(escaped, base.join("gymtracker").join("___x"));
        assert!(escaped.starts_with(base.join("gymtracker")));
    }
}
