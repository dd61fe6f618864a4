//! Offline vulnerability database.
//!
//! The file is a JSON object mapping package name to entries:
//!
//! ```json
//! {
//!   "requests": [
//!     { "vulnerable": "<=2.19.0", "fixed": "2.20.0", "cve": "CVE-2018-18074", "summary": "..." }
//!   ]
//! }
//! ```

use crate::error::{DatabaseError, UnsupportedRangeError};
use crate::model::canonical_name;
use crate::version::{parse_range, RangeExpression};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityEntry {
    /// Range expression for affected versions, e.g. `<=2.19.0`.
    #[serde(default)]
    pub vulnerable: String,
    #[serde(default)]
    pub fixed: Option<String>,
    #[serde(default)]
    pub cve: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl VulnerabilityEntry {
    pub fn affected_range(&self) -> Result<RangeExpression, UnsupportedRangeError> {
        parse_range(&self.vulnerable)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VulnerabilityDatabase {
    entries: HashMap<String, Vec<VulnerabilityEntry>>,
}

impl VulnerabilityDatabase {
    pub fn load(path: &Path) -> Result<Self, DatabaseError> {
        let content = fs::read_to_string(path).map_err(|source| DatabaseError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, DatabaseError> {
        let raw: HashMap<String, Vec<VulnerabilityEntry>> = serde_json::from_str(content)?;
        Ok(raw.into_iter().collect())
    }

    /// Entries for `name`, compared case-insensitively and across `-`, `_`, `.`.
    pub fn entries_for(&self, name: &str) -> &[VulnerabilityEntry] {
        self.entries
            .get(&canonical_name(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<VulnerabilityEntry>)> for VulnerabilityDatabase {
    /// Keys that name the same package are merged, keeping entry order.
    fn from_iter<I: IntoIterator<Item = (String, Vec<VulnerabilityEntry>)>>(iter: I) -> Self {
        let mut entries: HashMap<String, Vec<VulnerabilityEntry>> = HashMap::new();
        for (name, list) in iter {
            entries.entry(canonical_name(&name)).or_default().extend(list);
        }
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: &str = r#"{
        "Requests": [
            {"vulnerable": "<=2.19.0", "fixed": "2.20.0", "cve": "CVE-2018-18074", "summary": "Authorization header leak"},
            {"vulnerable": "<2.3.0"}
        ],
        "flask": []
    }"#;

    #[test]
    fn test_from_json_lowercases_keys() {
        let db = VulnerabilityDatabase::from_json(DB).unwrap();
        assert_eq!(db.len(), 2);

        let entries = db.entries_for("REQUESTS");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].cve.as_deref(), Some("CVE-2018-18074"));
        assert_eq!(entries[1].fixed, None);
        assert!(db.entries_for("django").is_empty());
    }

    #[test]
    fn test_lookup_ignores_separator_spelling() {
        let db = VulnerabilityDatabase::from_json(
            r#"{"charset_normalizer": [{"vulnerable": "<3.0"}], "Charset-Normalizer": [{"vulnerable": "==3.1"}]}"#,
        )
        .unwrap();

        assert_eq!(db.len(), 1);
        assert_eq!(db.entries_for("charset-normalizer").len(), 2);
    }

    #[test]
    fn test_affected_range() {
        let entry = VulnerabilityEntry {
            vulnerable: "<=2.19.0".to_string(),
            ..Default::default()
        };
        assert_eq!(entry.affected_range().unwrap().as_str(), "<=2.19.0");

        let bad = VulnerabilityEntry {
            vulnerable: ">2.0".to_string(),
            ..Default::default()
        };
        assert!(bad.affected_range().is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            VulnerabilityDatabase::from_json("[1, 2]"),
            Err(DatabaseError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = VulnerabilityDatabase::load(&dir.path().join("db.json")).unwrap_err();
        assert!(matches!(err, DatabaseError::Unreadable { .. }));
    }
}
