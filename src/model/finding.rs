use super::Dependency;
use crate::config::IgnoreConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One installed dependency matched against one known vulnerability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub package: String,
    pub installed_version: String,
    pub vulnerable_range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    /// CVE identifier, when one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// The feed's own record id (e.g. `PYSEC-2018-28`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory_id: Option<String>,
}

impl Finding {
    /// The best available identifier: the CVE if known, else the advisory id.
    pub fn display_id(&self) -> Option<&str> {
        self.identifier.as_deref().or(self.advisory_id.as_deref())
    }
}

/// A package or entry that could not be fully checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanWarning {
    UnsupportedRange { package: String, range: String },
    RemoteQuery {
        package: String,
        version: String,
        reason: String,
    },
    Unresolved { package: String, reason: String },
    InstallFailed { requirement: String },
    NotInstalled { package: String },
    SandboxUnavailable { reason: String },
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanWarning::UnsupportedRange { package, range } => {
                write!(f, "{}: unsupported range expression {:?}, entry not evaluated", package, range)
            }
            ScanWarning::RemoteQuery {
                package,
                version,
                reason,
            } => write!(f, "{}=={}: vulnerability query failed ({})", package, version, reason),
            ScanWarning::Unresolved { package, reason } => {
                write!(f, "{}: requirements unavailable ({})", package, reason)
            }
            ScanWarning::InstallFailed { requirement } => {
                write!(f, "{}: installation failed, dependency tree incomplete", requirement)
            }
            ScanWarning::NotInstalled { package } => {
                write!(f, "{}: required but no installed version found, not scanned", package)
            }
            ScanWarning::SandboxUnavailable { reason } => {
                write!(f, "transitive resolution unavailable, scanned manifest pins only ({})", reason)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_time: DateTime<Utc>,
    pub mode: ScanMode,
    pub dependencies: Vec<Dependency>,
    pub findings: Vec<Finding>,
    pub warnings: Vec<ScanWarning>,
}

impl ScanReport {
    pub fn new(mode: ScanMode, dependencies: Vec<Dependency>) -> Self {
        Self {
            scan_time: Utc::now(),
            mode,
            dependencies,
            findings: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Drops findings for ignored packages or ignored vulnerability ids.
    /// Returns the number of findings removed.
    pub fn apply_ignore(&mut self, ignore: &IgnoreConfig) -> usize {
        let before = self.findings.len();
        self.findings.retain(|f| {
            let ignored_id = [f.identifier.as_deref(), f.advisory_id.as_deref()]
                .into_iter()
                .flatten()
                .any(|id| ignore.should_ignore_vulnerability(id));
            !ignore.should_ignore_package(&f.package) && !ignored_id
        });
        before - self.findings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(package: &str, cve: Option<&str>, advisory: Option<&str>) -> Finding {
        Finding {
            package: package.to_string(),
            installed_version: "1.0".to_string(),
            vulnerable_range: "<2.0".to_string(),
            fixed_version: Some("2.0".to_string()),
            identifier: cve.map(String::from),
            summary: None,
            advisory_id: advisory.map(String::from),
        }
    }

    #[test]
    fn test_display_id_prefers_cve() {
        assert_eq!(
            finding("a", Some("CVE-1"), Some("PYSEC-1")).display_id(),
            Some("CVE-1")
        );
        assert_eq!(finding("a", None, Some("PYSEC-1")).display_id(), Some("PYSEC-1"));
        assert_eq!(finding("a", None, None).display_id(), None);
    }

    #[test]
    fn test_apply_ignore() {
        let mut report = ScanReport::new(ScanMode::Local, Vec::new());
        report.findings = vec![
            finding("requests", Some("CVE-2018-18074"), None),
            finding("django", Some("CVE-2019-0001"), None),
            finding("types-requests", None, Some("PYSEC-2020-1")),
            finding("urllib3", None, Some("GHSA-xxxx")),
        ];

        let ignore = IgnoreConfig {
            packages: vec!["types-*".to_string()],
            vulnerabilities: vec!["CVE-2019-0001".to_string(), "GHSA-xxxx".to_string()],
        };

        assert_eq!(report.apply_ignore(&ignore), 3);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].package, "requests");
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = ScanWarning::UnsupportedRange {
            package: "requests".to_string(),
            range: "~=1.0".to_string(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "unsupported_range");
        assert_eq!(json["range"], "~=1.0");
    }
}
