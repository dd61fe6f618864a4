//! Requirements manifest loading.
//!
//! A manifest is a `requirements.txt`-style file. Only exact pins
//! (`name==version`) become [`Dependency`] entries; every other non-comment
//! line is still kept as an install requirement for the sandbox, except pip
//! option lines (`-r base.txt`, `--index-url ...`).

use crate::error::ManifestError;
use crate::model::Dependency;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    /// Exactly pinned dependencies, in file order.
    pub pinned: Vec<Dependency>,
    /// Every requirement line except pip options, verbatim and trimmed.
    pub requirements: Vec<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ManifestError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            pinned: parse_pinned(&content),
            requirements: requirement_lines(&content)
                .filter(|line| !line.starts_with('-'))
                .map(String::from)
                .collect(),
        })
    }
}

fn requirement_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Parses `name==version` lines. Anything else is skipped.
///
/// This is also the format of `pip freeze` output.
pub fn parse_pinned(content: &str) -> Vec<Dependency> {
    requirement_lines(content)
        .filter_map(|line| {
            let (name, version) = line.split_once("==")?;
            let (name, version) = (name.trim(), version.trim());
            if name.is_empty() || version.is_empty() || version.starts_with('=') {
                return None;
            }
            Some(Dependency::new(name, version))
        })
        .collect()
}
