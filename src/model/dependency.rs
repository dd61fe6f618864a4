use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Identity key for a package name. Package names are case-insensitive.
pub fn package_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Lower-cased name with every run of `-`, `_` and `.` folded to one `-`.
///
/// `charset_normalizer`, `Charset.Normalizer` and `charset-normalizer` are
/// the same distribution; metadata and `pip freeze` spell them differently.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: Version,
}

impl Dependency {
    pub fn new(name: impl AsRef<str>, version: impl Into<Version>) -> Self {
        Self {
            name: package_key(name.as_ref()),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// Adjacency list from a package to the packages it directly requires.
///
/// Keys are lower-cased names. Cycles are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the direct requirements of `name`, replacing any earlier entry.
    pub fn insert(&mut self, name: &str, requirements: Vec<String>) {
        self.edges.insert(package_key(name), requirements);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(&package_key(name))
    }

    pub fn requirements(&self, name: &str) -> Option<&[String]> {
        self.edges.get(&package_key(name)).map(Vec::as_slice)
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.edges
            .iter()
            .map(|(name, reqs)| (name.as_str(), reqs.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Pairs every graph node with its installed version.
    ///
    /// Names are joined on [`canonical_name`]. Output follows the order of
    /// `installed`. Nodes with no installed version (e.g. requirements behind
    /// an unmet environment marker) are returned in [`Flattened::missing`].
    pub fn flatten(&self, installed: &[Dependency]) -> Flattened {
        let nodes: HashSet<String> = self.packages().map(canonical_name).collect();

        let dependencies: Vec<Dependency> = installed
            .iter()
            .filter(|dep| nodes.contains(&canonical_name(&dep.name)))
            .cloned()
            .collect();

        let versioned: HashSet<String> = dependencies.iter().map(|d| canonical_name(&d.name)).collect();
        let mut missing: Vec<String> = self
            .packages()
            .filter(|name| !versioned.contains(&canonical_name(name)))
            .map(String::from)
            .collect();
        missing.sort_unstable();
        missing.dedup_by_key(|name| canonical_name(name));

        for name in &missing {
            debug!("No installed version for {}", name);
        }

        Flattened {
            dependencies,
            missing,
        }
    }
}

/// Graph nodes paired with installed versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flattened {
    pub dependencies: Vec<Dependency>,
    /// Graph nodes with no installed version, sorted.
    pub missing: Vec<String>,
}

impl FromIterator<(String, Vec<String>)> for DependencyGraph {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        let mut graph = DependencyGraph::new();
        for (name, reqs) in iter {
            graph.insert(&name, reqs);
        }
        graph
    }
}
