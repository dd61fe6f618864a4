//! Configuration file handling.
//!
//! Settings are read from a TOML file. Every field has a default, so a
//! missing file or a partial file is fine. Command-line flags override
//! whatever is loaded here.
//!
//! # Configuration Location
//!
//! - Linux: `~/.config/ders/config.toml`
//! - macOS: `~/Library/Application Support/ders/config.toml`
//! - Windows: `%APPDATA%\ders\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! cache_ttl_hours = 24
//! default_format = "text"
//! max_concurrent_queries = 8
//! request_timeout_secs = 10
//! python = "python3"
//! vuln_db = "/etc/ders/vulndb.json"
//!
//! [ignore]
//! packages = ["types-*"]
//! vulnerabilities = ["CVE-2018-18074"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long cached feed responses stay valid, in hours.
    pub cache_ttl_hours: u64,

    /// Output format used when `--format` is not given.
    ///
    /// Valid values: "text", "table", "json"
    pub default_format: String,

    /// Upper bound on simultaneous queries to the remote feed.
    pub max_concurrent_queries: usize,

    /// Timeout for a single remote query or sandbox metadata lookup.
    pub request_timeout_secs: u64,

    /// Interpreter used to create the resolution sandbox.
    pub python: String,

    /// Local vulnerability database used when `--vuln-db` is not given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vuln_db: Option<PathBuf>,

    /// Findings to suppress.
    pub ignore: IgnoreConfig,
}

/// Suppresses known false positives or accepted risks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names whose findings are dropped. Supports `*` wildcards.
    pub packages: Vec<String>,

    /// Vulnerability ids (CVE or advisory id) whose findings are dropped.
    pub vulnerabilities: Vec<String>,
}

impl IgnoreConfig {
    pub fn should_ignore_package(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.packages
            .iter()
            .any(|pattern| glob_match(&pattern.to_lowercase(), &name))
    }

    pub fn should_ignore_vulnerability(&self, id: &str) -> bool {
        self.vulnerabilities.iter().any(|v| v.eq_ignore_ascii_case(id))
    }
}

/// Glob matching with `*` as the only wildcard.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return text.is_empty(),
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return pattern == text,
    };

    // Suffix is stripped after the prefix so the two never overlap.
    let Some(mut remaining) = text
        .strip_prefix(first)
        .and_then(|rest| rest.strip_suffix(last))
    else {
        return false;
    };

    for part in middle.iter().filter(|p| !p.is_empty()) {
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }

    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            default_format: "text".to_string(),
            max_concurrent_queries: 8,
            request_timeout_secs: 10,
            python: "python3".to_string(),
            vuln_db: None,
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration file, or defaults if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ders")
            .join("config.toml")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
