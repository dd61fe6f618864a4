use super::VulnerabilityFeed;
use crate::cache::Cache;
use crate::error::RemoteQueryError;
use crate::model::{Dependency, Finding};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const OSV_QUERY_URL: &str = "https://api.osv.dev/v1/query";
const ECOSYSTEM: &str = "PyPI";

/// Client for the OSV.dev single-package query endpoint.
pub struct OsvClient {
    client: reqwest::Client,
    endpoint: String,
    cache: Option<Cache>,
}

impl OsvClient {
    pub fn new(timeout: Duration) -> Result<Self, RemoteQueryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ders/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: OSV_QUERY_URL.to_string(),
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn cache_key(name: &str, version: &str) -> String {
        format!("osv_{}_{}", name, version)
    }
}

#[derive(Serialize)]
struct OsvQuery<'a> {
    package: OsvPackage<'a>,
    version: &'a str,
}

#[derive(Serialize)]
struct OsvPackage<'a> {
    name: &'a str,
    ecosystem: &'a str,
}

#[derive(Deserialize)]
struct OsvResponse {
    #[serde(default)]
    vulns: Vec<OsvVulnerability>,
}

/// One vulnerability record as returned by the feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsvVulnerability {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub affected: Vec<OsvAffected>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsvAffected {
    #[serde(default)]
    pub ranges: Vec<OsvRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsvRange {
    #[serde(rename = "type", default)]
    pub range_type: String,
    #[serde(default)]
    pub events: Vec<OsvEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsvEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introduced: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<String>,
}

impl OsvVulnerability {
    fn ecosystem_events(&self) -> impl Iterator<Item = &OsvEvent> {
        self.affected
            .iter()
            .flat_map(|a| a.ranges.iter())
            .filter(|r| r.range_type == "ECOSYSTEM")
            .flat_map(|r| r.events.iter())
    }

    /// First `fixed` boundary among ecosystem ranges.
    pub fn fixed_version(&self) -> Option<&str> {
        self.ecosystem_events().find_map(|e| e.fixed.as_deref())
    }

    /// First alias that looks like a CVE id.
    pub fn cve(&self) -> Option<&str> {
        self.aliases
            .iter()
            .map(String::as_str)
            .find(|alias| alias.starts_with("CVE-"))
    }

    /// Textual range such as `">= 1.0.0, < 2.19.0"`, or `"unknown"`.
    pub fn range_description(&self) -> String {
        let bounds: Vec<String> = self
            .ecosystem_events()
            .flat_map(|e| {
                let introduced = e.introduced.as_ref().map(|v| format!(">= {}", v));
                let fixed = e.fixed.as_ref().map(|v| format!("< {}", v));
                introduced.into_iter().chain(fixed)
            })
            .collect();

        if bounds.is_empty() {
            "unknown".to_string()
        } else {
            bounds.join(", ")
        }
    }

    pub fn to_finding(&self, dependency: &Dependency) -> Finding {
        Finding {
            package: dependency.name.clone(),
            installed_version: dependency.version.to_string(),
            vulnerable_range: self.range_description(),
            fixed_version: self.fixed_version().map(String::from),
            identifier: self.cve().map(String::from),
            summary: self.summary.clone().filter(|s| !s.trim().is_empty()),
            advisory_id: Some(self.id.clone()).filter(|id| !id.is_empty()),
        }
    }
}

#[async_trait]
impl VulnerabilityFeed for OsvClient {
    fn name(&self) -> &'static str {
        "OSV.dev"
    }

    async fn query(&self, name: &str, version: &str) -> Result<Vec<OsvVulnerability>, RemoteQueryError> {
        let cache_key = Self::cache_key(name, version);
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&cache_key)) {
            debug!("Cache hit for {}=={}", name, version);
            return Ok(cached);
        }

        let query = OsvQuery {
            package: OsvPackage {
                name,
                ecosystem: ECOSYSTEM,
            },
            version,
        };

        let response = self.client.post(&self.endpoint).json(&query).send().await?;
        if !response.status().is_success() {
            return Err(RemoteQueryError::Status(response.status().as_u16()));
        }

        let body: OsvResponse = response.json().await?;

        if let Some(cache) = &self.cache {
            let _ = cache.set(&cache_key, &body.vulns);
        }

        Ok(body.vulns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "vulns": [{
            "id": "PYSEC-2018-28",
            "summary": "Requests sends Authorization header over HTTP after redirect",
            "aliases": ["GHSA-x84v-xcm2-53pg", "CVE-2018-18074", "CVE-2099-0001"],
            "affected": [{
                "package": {"name": "requests", "ecosystem": "PyPI"},
                "ranges": [
                    {"type": "GIT", "events": [{"introduced": "0"}, {"fixed": "abc123"}]},
                    {"type": "ECOSYSTEM", "events": [{"introduced": "0"}, {"fixed": "2.20.0"}]}
                ],
                "versions": ["2.19.0"]
            }]
        }]
    }"#;

    fn record() -> OsvVulnerability {
        let response: OsvResponse = serde_json::from_str(RESPONSE).unwrap();
        response.vulns.into_iter().next().unwrap()
    }

    #[test]
    fn test_range_description_from_ecosystem_events() {
        assert_eq!(record().range_description(), ">= 0, < 2.20.0");
    }

    #[test]
    fn test_fixed_version_ignores_git_ranges() {
        assert_eq!(record().fixed_version(), Some("2.20.0"));
    }

    #[test]
    fn test_first_cve_alias_wins() {
        assert_eq!(record().cve(), Some("CVE-2018-18074"));
    }

    #[test]
    fn test_multiple_ranges_are_joined() {
        let vuln = OsvVulnerability {
            affected: vec![OsvAffected {
                ranges: vec![
                    OsvRange {
                        range_type: "ECOSYSTEM".to_string(),
                        events: vec![
                            OsvEvent {
                                introduced: Some("1.0.0".to_string()),
                                fixed: None,
                            },
                            OsvEvent {
                                introduced: None,
                                fixed: Some("2.19.0".to_string()),
                            },
                        ],
                    },
                    OsvRange {
                        range_type: "ECOSYSTEM".to_string(),
                        events: vec![OsvEvent {
                            introduced: Some("3.0".to_string()),
                            fixed: Some("3.1".to_string()),
                        }],
                    },
                ],
            }],
            ..Default::default()
        };

        assert_eq!(vuln.range_description(), ">= 1.0.0, < 2.19.0, >= 3.0, < 3.1");
        assert_eq!(vuln.fixed_version(), Some("2.19.0"));
    }

    #[test]
    fn test_no_boundaries_is_unknown() {
        let vuln = OsvVulnerability {
            id: "PYSEC-1".to_string(),
            ..Default::default()
        };
        assert_eq!(vuln.range_description(), "unknown");
        assert_eq!(vuln.fixed_version(), None);
        assert_eq!(vuln.cve(), None);
    }

    #[test]
    fn test_to_finding() {
        let dep = Dependency::new("Requests", "2.19.0");
        let finding = record().to_finding(&dep);

        assert_eq!(finding.package, "requests");
        assert_eq!(finding.installed_version, "2.19.0");
        assert_eq!(finding.vulnerable_range, ">= 0, < 2.20.0");
        assert_eq!(finding.fixed_version.as_deref(), Some("2.20.0"));
        assert_eq!(finding.identifier.as_deref(), Some("CVE-2018-18074"));
        assert_eq!(finding.advisory_id.as_deref(), Some("PYSEC-2018-28"));
        assert!(finding.summary.is_some());
    }

    #[test]
    fn test_empty_summary_is_dropped() {
        let vuln = OsvVulnerability {
            summary: Some("  ".to_string()),
            ..Default::default()
        };
        let finding = vuln.to_finding(&Dependency::new("x", "1"));
        assert_eq!(finding.summary, None);
        assert_eq!(finding.advisory_id, None);
    }

    #[test]
    fn test_response_without_vulns() {
        let response: OsvResponse = serde_json::from_str("{}").unwrap();
        assert!(response.vulns.is_empty());
    }

    #[test]
    fn test_query_serialization() {
        let query = OsvQuery {
            package: OsvPackage {
                name: "requests",
                ecosystem: ECOSYSTEM,
            },
            version: "2.19.0",
        };
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            serde_json::json!({"package": {"name": "requests", "ecosystem": "PyPI"}, "version": "2.19.0"})
        );
    }

    #[tokio::test]
    async fn test_cached_response_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::with_dir(dir.path(), Duration::from_secs(60));
        cache
            .set(&OsvClient::cache_key("requests", "2.19.0"), &vec![record()])
            .unwrap();

        let client = OsvClient::new(Duration::from_secs(1))
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/unreachable")
            .with_cache(Cache::with_dir(dir.path(), Duration::from_secs(60)));

        let vulns = client.query("requests", "2.19.0").await.unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].id, "PYSEC-2018-28");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let client = OsvClient::new(Duration::from_secs(2))
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/unreachable");

        let result = client.query("requests", "2.19.0").await;
        assert!(matches!(result, Err(RemoteQueryError::Request(_))));
    }

    #[test]
    fn test_feed_name() {
        let client = OsvClient::new(Duration::from_secs(1)).unwrap();
        assert_eq!(client.name(), "OSV.dev");
    }
}
