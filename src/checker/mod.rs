//! Vulnerability matching against a local database or a remote feed.
//!
//! [`VulnerabilityScanner::scan`] takes the flattened dependency list and a
//! [`VulnerabilitySource`]:
//!
//! - [`VulnerabilitySource::Local`] evaluates each database entry's range
//!   expression against the installed version.
//! - [`VulnerabilitySource::Remote`] asks a [`VulnerabilityFeed`] that already
//!   returns version-scoped records, so no range evaluation is done here.
//!
//! Anything that cannot be checked for one package is reported as a
//! [`ScanWarning`] and never stops the other packages from being checked.
//!
//! # Example
//!
//! ```
//! use ders::checker::{VulnerabilityDatabase, VulnerabilityScanner};
//! use ders::Dependency;
//!
//! let db = VulnerabilityDatabase::from_json(
//!     r#"{"requests": [{"vulnerable": "<=2.19.0", "fixed": "2.20.0", "cve": "CVE-2018-18074"}]}"#,
//! )
//! .unwrap();
//! let installed = vec![Dependency::new("requests", "2.19.0")];
//!
//! let outcome = VulnerabilityScanner::default().scan_local(&installed, &db);
//! assert_eq!(outcome.findings[0].fixed_version.as_deref(), Some("2.20.0"));
//! ```

mod local;
mod osv;

pub use local::{VulnerabilityDatabase, VulnerabilityEntry};
pub use osv::{OsvAffected, OsvClient, OsvEvent, OsvRange, OsvVulnerability};

use crate::error::RemoteQueryError;
use crate::model::{Dependency, Finding, ScanWarning};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_MAX_CONCURRENCY: usize = 8;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A remote source of version-scoped vulnerability records.
#[async_trait]
pub trait VulnerabilityFeed: Send + Sync {
    fn name(&self) -> &'static str;

    /// Records affecting exactly `name` at `version`.
    async fn query(&self, name: &str, version: &str) -> Result<Vec<OsvVulnerability>, RemoteQueryError>;
}

pub enum VulnerabilitySource {
    Local(VulnerabilityDatabase),
    Remote(Arc<dyn VulnerabilityFeed>),
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub findings: Vec<Finding>,
    pub warnings: Vec<ScanWarning>,
}

pub struct VulnerabilityScanner {
    max_concurrency: usize,
    timeout: Duration,
}

impl VulnerabilityScanner {
    pub fn new(max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            timeout,
        }
    }

    pub async fn scan(&self, installed: &[Dependency], source: &VulnerabilitySource) -> ScanOutcome {
        match source {
            VulnerabilitySource::Local(db) => self.scan_local(installed, db),
            VulnerabilitySource::Remote(feed) => self.scan_remote(installed, feed.as_ref()).await,
        }
    }

    pub fn scan_local(&self, installed: &[Dependency], db: &VulnerabilityDatabase) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        for dep in installed {
            for entry in db.entries_for(&dep.name) {
                if entry.vulnerable.trim().is_empty() {
                    continue;
                }

                let range = match entry.affected_range() {
                    Ok(range) => range,
                    Err(e) => {
                        warn!("{}: {}", dep.name, e);
                        outcome.warnings.push(ScanWarning::UnsupportedRange {
                            package: dep.name.clone(),
                            range: entry.vulnerable.clone(),
                        });
                        continue;
                    }
                };

                if range.contains(&dep.version) {
                    outcome.findings.push(Finding {
                        package: dep.name.clone(),
                        installed_version: dep.version.to_string(),
                        vulnerable_range: entry.vulnerable.clone(),
                        fixed_version: non_blank(&entry.fixed),
                        identifier: non_blank(&entry.cve),
                        summary: non_blank(&entry.summary),
                        advisory_id: None,
                    });
                }
            }
        }

        info!(
            "Checked {} packages against local database: {} findings",
            installed.len(),
            outcome.findings.len()
        );
        outcome
    }

    /// Queries the feed for every dependency, at most `max_concurrency` at a
    /// time. Results keep the order of `installed`.
    pub async fn scan_remote(&self, installed: &[Dependency], feed: &dyn VulnerabilityFeed) -> ScanOutcome {
        let timeout = self.timeout;

        let results: Vec<_> = stream::iter(installed)
            .map(|dep| async move {
                let version = dep.version.to_string();
                let result = match tokio::time::timeout(timeout, feed.query(&dep.name, &version)).await {
                    Ok(result) => result,
                    Err(_) => Err(RemoteQueryError::Timeout(timeout)),
                };
                (dep, result)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut outcome = ScanOutcome::default();
        for (dep, result) in results {
            match result {
                Ok(vulns) => {
                    debug!("{}: {} records from {}", dep, vulns.len(), feed.name());
                    outcome
                        .findings
                        .extend(vulns.iter().map(|vuln| vuln.to_finding(dep)));
                }
                Err(e) => {
                    warn!("Skipping {}: {}", dep, e);
                    outcome.warnings.push(ScanWarning::RemoteQuery {
                        package: dep.name.clone(),
                        version: dep.version.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Queried {} for {} packages: {} findings, {} skipped",
            feed.name(),
            installed.len(),
            outcome.findings.len(),
            outcome.warnings.len()
        );
        outcome
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

impl Default for VulnerabilityScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DB: &str = r#"{
        "requests": [
            {"vulnerable": "<=2.19.0", "fixed": "2.20.0", "cve": "CVE-2018-18074", "summary": "Authorization header leak"},
            {"vulnerable": "~=2.0", "cve": "CVE-0000-0000"},
            {"vulnerable": "<2.3.0", "fixed": "2.3.0"},
            {"vulnerable": ""}
        ],
        "Django": [
            {"vulnerable": "==1.11.0", "fixed": "1.11.1"}
        ]
    }"#;

    fn db() -> VulnerabilityDatabase {
        VulnerabilityDatabase::from_json(DB).unwrap()
    }

    #[tokio::test]
    async fn test_local_scan_single_finding() {
        let installed = vec![Dependency::new("requests", "2.19.0")];
        let source = VulnerabilitySource::Local(db());

        let outcome = VulnerabilityScanner::default().scan(&installed, &source).await;

        assert_eq!(outcome.findings.len(), 1);
        let finding = &outcome.findings[0];
        assert_eq!(finding.fixed_version.as_deref(), Some("2.20.0"));
        assert_eq!(finding.identifier.as_deref(), Some("CVE-2018-18074"));
        assert_eq!(finding.vulnerable_range, "<=2.19.0");
        assert_eq!(finding.installed_version, "2.19.0");
    }

    #[test]
    fn test_local_scan_reports_unsupported_range() {
        let installed = vec![Dependency::new("requests", "2.19.0")];

        let outcome = VulnerabilityScanner::default().scan_local(&installed, &db());

        assert_eq!(
            outcome.warnings,
            vec![ScanWarning::UnsupportedRange {
                package: "requests".to_string(),
                range: "~=2.0".to_string(),
            }]
        );
    }

    #[test]
    fn test_local_scan_drops_blank_fields() {
        let db = VulnerabilityDatabase::from_json(
            r#"{"idna": [{"vulnerable": "<2.8", "fixed": " ", "cve": "", "summary": ""}]}"#,
        )
        .unwrap();
        let installed = vec![Dependency::new("idna", "2.7")];

        let outcome = VulnerabilityScanner::default().scan_local(&installed, &db);

        assert_eq!(outcome.findings.len(), 1);
        let finding = &outcome.findings[0];
        assert_eq!(finding.fixed_version, None);
        assert_eq!(finding.identifier, None);
        assert_eq!(finding.summary, None);
    }

    #[test]
    fn test_local_scan_no_entry() {
        let installed = vec![Dependency::new("flask", "0.12")];
        let outcome = VulnerabilityScanner::default().scan_local(&installed, &db());
        assert!(outcome.findings.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_local_scan_is_case_insensitive_and_multi_match() {
        let installed = vec![
            Dependency::new("DJANGO", "1.11"),
            Dependency::new("requests", "2.2.1"),
        ];

        let outcome = VulnerabilityScanner::default().scan_local(&installed, &db());

        let ranges: Vec<&str> = outcome
            .findings
            .iter()
            .map(|f| f.vulnerable_range.as_str())
            .collect();
        assert_eq!(ranges, vec!["==1.11.0", "<=2.19.0", "<2.3.0"]);
        assert_eq!(outcome.findings[0].package, "django");
    }

    /// Feed backed by a map. `slow` packages never answer, `broken` ones fail.
    struct FakeFeed {
        records: HashMap<String, Vec<OsvVulnerability>>,
        slow: Vec<String>,
        broken: Vec<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeFeed {
        fn new() -> Self {
            Self {
                records: HashMap::new(),
                slow: Vec::new(),
                broken: Vec::new(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VulnerabilityFeed for FakeFeed {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn query(&self, name: &str, _version: &str) -> Result<Vec<OsvVulnerability>, RemoteQueryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.slow.iter().any(|s| s == name) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.broken.iter().any(|s| s == name) {
                return Err(RemoteQueryError::Unavailable("HTTP 503".to_string()));
            }
            Ok(self.records.get(name).cloned().unwrap_or_default())
        }
    }

    fn osv_record(id: &str, fixed: &str) -> OsvVulnerability {
        OsvVulnerability {
            id: id.to_string(),
            aliases: vec!["CVE-2018-18074".to_string()],
            summary: Some("leak".to_string()),
            affected: vec![OsvAffected {
                ranges: vec![OsvRange {
                    range_type: "ECOSYSTEM".to_string(),
                    events: vec![
                        OsvEvent {
                            introduced: Some("0".to_string()),
                            fixed: None,
                        },
                        OsvEvent {
                            introduced: None,
                            fixed: Some(fixed.to_string()),
                        },
                    ],
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_remote_scan_normalizes_records() {
        let mut feed = FakeFeed::new();
        feed.records
            .insert("requests".to_string(), vec![osv_record("PYSEC-2018-28", "2.20.0")]);
        let source = VulnerabilitySource::Remote(Arc::new(feed));

        let installed = vec![
            Dependency::new("requests", "2.19.0"),
            Dependency::new("idna", "2.7"),
        ];
        let outcome = VulnerabilityScanner::default().scan(&installed, &source).await;

        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].vulnerable_range, ">= 0, < 2.20.0");
        assert_eq!(outcome.findings[0].fixed_version.as_deref(), Some("2.20.0"));
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_remote_failures_do_not_abort_scan() {
        let mut feed = FakeFeed::new();
        feed.records
            .insert("urllib3".to_string(), vec![osv_record("PYSEC-2019-1", "1.24.2")]);
        feed.slow.push("slowpkg".to_string());
        feed.broken.push("brokenpkg".to_string());

        let installed = vec![
            Dependency::new("slowpkg", "1.0"),
            Dependency::new("brokenpkg", "1.0"),
            Dependency::new("urllib3", "1.23"),
        ];
        let scanner = VulnerabilityScanner::new(4, Duration::from_millis(200));

        let outcome = scanner.scan_remote(&installed, &feed).await;

        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].package, "urllib3");
        assert_eq!(outcome.warnings.len(), 2);

        let skipped: Vec<&str> = outcome
            .warnings
            .iter()
            .filter_map(|w| match w {
                ScanWarning::RemoteQuery { package, .. } => Some(package.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(skipped, vec!["slowpkg", "brokenpkg"]);
    }

    #[tokio::test]
    async fn test_remote_scan_respects_concurrency_limit() {
        let feed = FakeFeed::new();
        let installed: Vec<Dependency> = (0..20)
            .map(|i| Dependency::new(format!("pkg{}", i), "1.0"))
            .collect();

        let outcome = VulnerabilityScanner::new(3, Duration::from_secs(5))
            .scan_remote(&installed, &feed)
            .await;

        assert!(outcome.findings.is_empty());
        let peak = feed.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {}", peak);
        assert!(peak >= 1);
    }
}
