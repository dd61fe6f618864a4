//! File-based caching for vulnerability feed responses.
//!
//! Each entry is a JSON file whose modification time decides expiry.
//!
//! # Cache Location
//!
//! - Linux: `~/.cache/ders/`
//! - macOS: `~/Library/Caches/ders/`
//! - Windows: `%LOCALAPPDATA%\ders\`
//!
//! # Example
//!
//! ```no_run
//! use ders::Cache;
//!
//! let cache = Cache::with_ttl_hours(1);
//! cache.set("osv_requests_2.19.0", &vec!["PYSEC-2018-28".to_string()]).unwrap();
//!
//! let ids: Option<Vec<String>> = cache.get("osv_requests_2.19.0");
//! assert_eq!(ids.map(|v| v.len()), Some(1));
//! ```

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::debug;

const CACHE_TTL_HOURS: u64 = 24;

pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
}

impl Cache {
    pub fn new() -> Self {
        Self::with_ttl_hours(CACHE_TTL_HOURS)
    }

    pub fn with_ttl_hours(hours: u64) -> Self {
        Self::with_dir(default_cache_dir(), Duration::from_secs(hours * 3600))
    }

    pub fn with_dir(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("Failed to create cache dir {}", self.dir.display()))?;
        }
        Ok(())
    }

    /// Converts a cache key to a safe filename.
    fn cache_path(&self, key: &str) -> PathBuf {
        let safe_key: String = key
            .chars()
            .map(|c| match c {
                c if c.is_alphanumeric() => c,
                '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("{}.json", safe_key))
    }

    /// Returns `None` if the key is missing, expired, or unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.cache_path(key);
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;

        let expired = SystemTime::now()
            .duration_since(modified)
            .map(|age| age > self.ttl)
            .unwrap_or(false);
        if expired {
            debug!("Cache entry {} expired", key);
            let _ = fs::remove_file(&path);
            return None;
        }

        let content = fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;
        let content = serde_json::to_string(value)?;
        fs::write(self.cache_path(key), content)?;
        Ok(())
    }

    /// Removes every cached entry.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)?.flatten() {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    let _ = fs::remove_file(path);
                }
            }
        }
        Ok(())
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ders")
}
