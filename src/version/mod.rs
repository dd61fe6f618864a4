//! Lenient numeric versions and range expressions.
//!
//! Versions are parsed as a sequence of non-negative integers. Parsing never
//! fails: it stops at the first segment that is not a number, so `1.2.3rc1`
//! becomes `1.2` and `abc` becomes the empty version.
//!
//! # Example
//!
//! ```
//! use std::cmp::Ordering;
//! use ders::version::{compare, Version};
//!
//! let a = Version::parse("1.2.3");
//! let b = Version::parse("1.2.3.0");
//!
//! assert_ne!(a, b);
//! assert_eq!(compare(&a, &b), Ordering::Equal);
//! ```

pub mod range;

pub use range::{matches, parse_range, RangeExpression, RangeOperator};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A parsed version together with the text it was parsed from.
///
/// `==` compares the raw segment tuples; use [`compare`] for the
/// zero-padded ordering used by range matching.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Version {
    raw: String,
    segments: Vec<u64>,
}

impl Version {
    pub fn parse(s: &str) -> Self {
        let raw = s.trim();
        let segments = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split('.')
                .map_while(|part| part.parse::<u64>().ok())
                .collect()
        };

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if nothing numeric could be parsed.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version::parse(&s)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::parse(s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.raw
    }
}

/// Compares two versions after padding the shorter one with zeros.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    let len = a.segments.len().max(b.segments.len());
    let padded = |v: &Version, i: usize| v.segments.get(i).copied().unwrap_or(0);

    (0..len)
        .map(|i| padded(a, i).cmp(&padded(b, i)))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}
