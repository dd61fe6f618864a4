//! End-to-end flow: manifest to installed set to report.

use crate::checker::{VulnerabilityScanner, VulnerabilitySource};
use crate::config::IgnoreConfig;
use crate::manifest::Manifest;
use crate::model::{canonical_name, Dependency, ScanMode, ScanReport, ScanWarning};
use crate::resolver::{DependencyResolver, RequirementSource, VenvSandbox};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

/// The flattened dependency set to scan, plus what went wrong producing it.
#[derive(Debug, Default)]
pub struct InstalledSet {
    pub dependencies: Vec<Dependency>,
    pub warnings: Vec<ScanWarning>,
}

impl InstalledSet {
    /// Only the manifest's exact pins, without transitive resolution.
    pub fn from_pins(manifest: &Manifest) -> Self {
        Self {
            dependencies: manifest.pinned.clone(),
            warnings: Vec::new(),
        }
    }

    /// Appends pins whose package is not in the set, e.g. because the pinned
    /// requirement failed to install. Returns how many were added.
    pub fn add_missing_pins(&mut self, pins: &[Dependency]) -> usize {
        let present: HashSet<String> = self.dependencies.iter().map(|d| canonical_name(&d.name)).collect();
        let before = self.dependencies.len();

        for pin in pins {
            if !present.contains(&canonical_name(&pin.name)) {
                info!("{} is not installed in the sandbox, scanning the manifest pin", pin);
                self.dependencies.push(pin.clone());
            }
        }

        // Added pins are scanned after all.
        let added: HashSet<String> = self.dependencies[before..]
            .iter()
            .map(|d| canonical_name(&d.name))
            .collect();
        self.warnings.retain(|w| match w {
            ScanWarning::NotInstalled { package } => !added.contains(&canonical_name(package)),
            _ => true,
        });

        self.dependencies.len() - before
    }
}

/// Installs the manifest into a sandbox and resolves its transitive closure.
///
/// If the sandbox cannot be created the manifest pins are used instead and a
/// [`ScanWarning::SandboxUnavailable`] is recorded.
pub async fn resolve_installed(manifest: &Manifest, python: &str, timeout: Duration) -> InstalledSet {
    let provisioned = match VenvSandbox::provision(python, &manifest.requirements, timeout).await {
        Ok(p) => p,
        Err(e) => {
            warn!("Sandbox unavailable, falling back to manifest pins: {}", e);
            let mut set = InstalledSet::from_pins(manifest);
            set.warnings.push(ScanWarning::SandboxUnavailable {
                reason: e.to_string(),
            });
            return set;
        }
    };

    let mut warnings = provisioned.warnings();
    let installed = match provisioned.sandbox.installed().await {
        Ok(installed) => installed,
        Err(e) => {
            warn!("Could not list sandbox packages: {}", e);
            warnings.push(ScanWarning::SandboxUnavailable {
                reason: e.to_string(),
            });
            return InstalledSet {
                dependencies: manifest.pinned.clone(),
                warnings,
            };
        }
    };

    let mut set = resolve_with(&provisioned.sandbox, &manifest.requirements, &installed).await;
    warnings.append(&mut set.warnings);
    set.warnings = warnings;
    set.add_missing_pins(&manifest.pinned);
    set
}

/// Resolves `roots` through `source` and pairs graph nodes with `installed`.
pub async fn resolve_with<S: RequirementSource>(
    source: S,
    roots: &[String],
    installed: &[Dependency],
) -> InstalledSet {
    let resolution = DependencyResolver::new(source).resolve(roots).await;
    let flattened = resolution.graph.flatten(installed);

    info!(
        "{} of {} graph nodes have an installed version",
        flattened.dependencies.len(),
        resolution.graph.len()
    );

    // Unresolved packages are already reported; the rest were reached but
    // never installed.
    let unresolved: HashSet<String> = resolution
        .unresolved
        .iter()
        .map(|(package, _)| canonical_name(package))
        .collect();
    let mut warnings = resolution.warnings();
    warnings.extend(
        flattened
            .missing
            .into_iter()
            .filter(|package| !unresolved.contains(&canonical_name(package)))
            .map(|package| ScanWarning::NotInstalled { package }),
    );

    InstalledSet {
        dependencies: flattened.dependencies,
        warnings,
    }
}

/// Scans the installed set and assembles the report, minus ignored findings.
pub async fn build_report(
    installed: InstalledSet,
    source: &VulnerabilitySource,
    scanner: &VulnerabilityScanner,
    ignore: &IgnoreConfig,
) -> ScanReport {
    let mode = match source {
        VulnerabilitySource::Local(_) => ScanMode::Local,
        VulnerabilitySource::Remote(_) => ScanMode::Remote,
    };

    let outcome = scanner.scan(&installed.dependencies, source).await;

    let mut report = ScanReport::new(mode, installed.dependencies);
    report.findings = outcome.findings;
    report.warnings = installed.warnings;
    report.warnings.extend(outcome.warnings);

    let ignored = report.apply_ignore(ignore);
    if ignored > 0 {
        info!("Suppressed {} ignored findings", ignored);
    }

    report
}
