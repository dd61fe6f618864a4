//! Error types for resolution, matching and scanning.
//!
//! Only [`ManifestError`], [`DatabaseError`] and [`SandboxError`] stop a run.
//! The others are recovered per package and surface as
//! [`ScanWarning`](crate::model::ScanWarning)s.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A package's declared requirements could not be looked up.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("package not found: {0}")]
    NotFound(String),

    #[error("failed to look up requirements of {package}: {reason}")]
    Lookup { package: String, reason: String },

    #[error("requirement lookup for {package} timed out after {timeout:?}")]
    Timeout { package: String, timeout: Duration },
}

/// A range expression uses an operator the matcher does not understand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported range expression: {expression:?}")]
pub struct UnsupportedRangeError {
    pub expression: String,
}

/// A query to the remote vulnerability feed failed.
#[derive(Debug, Error)]
pub enum RemoteQueryError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("feed returned HTTP {0}")]
    Status(u16),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read manifest {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to read vulnerability database {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid vulnerability database: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}
