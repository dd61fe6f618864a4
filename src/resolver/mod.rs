//! Transitive dependency resolution.
//!
//! [`DependencyResolver`] builds a [`DependencyGraph`] from a set of root
//! requirements. It knows nothing about how a package's requirements are
//! discovered; that is the job of a [`RequirementSource`], such as
//! [`VenvSandbox`] which asks an installed package's metadata.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use ders::error::ResolutionError;
//! use ders::resolver::{DependencyResolver, RequirementSource};
//!
//! struct Fixed;
//!
//! #[async_trait]
//! impl RequirementSource for Fixed {
//!     async fn requirements_of(&self, package: &str) -> Result<Vec<String>, ResolutionError> {
//!         match package {
//!             "requests" => Ok(vec!["idna<2.8,>=2.5".to_string()]),
//!             _ => Ok(Vec::new()),
//!         }
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let resolution = DependencyResolver::new(Fixed).resolve(&["requests"]).await;
//! assert_eq!(resolution.graph.requirements("requests"), Some(&["idna".to_string()][..]));
//! assert!(resolution.graph.contains("idna"));
//! # }
//! ```

mod venv;

pub use venv::{Provisioned, VenvSandbox};

use crate::error::ResolutionError;
use crate::model::{package_key, DependencyGraph, ScanWarning};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Looks up the declared requirements of a single package.
///
/// Implementations must be safe to call concurrently for different packages.
/// Returned strings may carry version specifiers and environment markers;
/// the resolver strips them.
#[async_trait]
pub trait RequirementSource: Send + Sync {
    async fn requirements_of(&self, package: &str) -> Result<Vec<String>, ResolutionError>;
}

#[async_trait]
impl<S: RequirementSource + ?Sized> RequirementSource for &S {
    async fn requirements_of(&self, package: &str) -> Result<Vec<String>, ResolutionError> {
        (**self).requirements_of(package).await
    }
}

#[async_trait]
impl<S: RequirementSource + ?Sized> RequirementSource for Arc<S> {
    async fn requirements_of(&self, package: &str) -> Result<Vec<String>, ResolutionError> {
        (**self).requirements_of(package).await
    }
}

/// Result of a resolution run.
#[derive(Debug, Default)]
pub struct Resolution {
    pub graph: DependencyGraph,
    /// Packages whose lookup failed, with the reason. They appear in the
    /// graph as leaves.
    pub unresolved: Vec<(String, String)>,
}

impl Resolution {
    pub fn warnings(&self) -> Vec<ScanWarning> {
        self.unresolved
            .iter()
            .map(|(package, reason)| ScanWarning::Unresolved {
                package: package.clone(),
                reason: reason.clone(),
            })
            .collect()
    }
}

pub struct DependencyResolver<S> {
    source: S,
}

impl<S: RequirementSource> DependencyResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Builds the graph of everything reachable from `roots`.
    ///
    /// Each round takes every queued name not yet visited, marks it visited,
    /// and looks all of them up concurrently. Results are then written to
    /// the graph by this task alone, so no name is ever expanded twice and
    /// cycles terminate. A failed lookup turns the package into a leaf.
    pub async fn resolve<R: AsRef<str>>(&self, roots: &[R]) -> Resolution {
        let mut resolution = Resolution::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = roots
            .iter()
            .filter_map(|r| normalize_requirement(r.as_ref()))
            .collect();

        while !queue.is_empty() {
            let batch: Vec<String> = queue
                .drain(..)
                .filter(|name| visited.insert(name.clone()))
                .collect();
            if batch.is_empty() {
                break;
            }

            debug!("Resolving {} packages", batch.len());

            let lookups = batch.iter().map(|name| async move {
                (name, self.source.requirements_of(name).await)
            });

            for (name, result) in join_all(lookups).await {
                let requirements = match result {
                    Ok(raw) => dedup_requirements(&raw),
                    Err(e) => {
                        warn!("Could not resolve requirements of {}: {}", name, e);
                        resolution.unresolved.push((name.clone(), e.to_string()));
                        Vec::new()
                    }
                };

                queue.extend(
                    requirements
                        .iter()
                        .filter(|req| !visited.contains(*req))
                        .cloned(),
                );
                resolution.graph.insert(name, requirements);
            }
        }

        info!(
            "Resolved {} packages ({} unresolved)",
            resolution.graph.len(),
            resolution.unresolved.len()
        );

        resolution
    }
}

fn dedup_requirements(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|r| normalize_requirement(r))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Reduces a requirement string to the bare, lower-cased package name.
///
/// Drops an environment marker (`; python_version < "3.8"`), anything after
/// the first whitespace, and inline extras or version specifiers
/// (`idna<4,>=2.5`, `requests[socks]`). Returns `None` when no name is left.
pub fn normalize_requirement(requirement: &str) -> Option<String> {
    let before_marker = requirement.split(';').next().unwrap_or_default();
    let word = before_marker.split_whitespace().next()?;
    let name = word
        .split(|c: char| matches!(c, '[' | '(' | '<' | '>' | '=' | '!' | '~' | ','))
        .next()
        .unwrap_or_default();

    if name.is_empty() {
        None
    } else {
        Some(package_key(name))
    }
}
