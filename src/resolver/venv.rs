//! Throw-away virtual environment used to discover installed metadata.
//!
//! The manifest is installed one requirement at a time so a single broken
//! requirement does not prevent the rest from being installed. Requirement
//! lookups then ask the sandbox interpreter for `importlib.metadata.requires`.

use super::RequirementSource;
use crate::error::{ResolutionError, SandboxError};
use crate::manifest::parse_pinned;
use crate::model::{Dependency, ScanWarning};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

const INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Exit code the lookup script uses for "package not installed".
const NOT_FOUND_EXIT: i32 = 3;

const REQUIRES_SCRIPT: &str = "\
import json, sys
from importlib.metadata import requires, PackageNotFoundError
try:
    print(json.dumps(requires(sys.argv[1]) or []))
except PackageNotFoundError:
    sys.exit(3)
";

pub struct VenvSandbox {
    // Removed on drop.
    _dir: TempDir,
    python: PathBuf,
    lookup_timeout: Duration,
}

/// A sandbox plus the requirements that failed to install into it.
pub struct Provisioned {
    pub sandbox: VenvSandbox,
    pub failed: Vec<String>,
}

impl Provisioned {
    pub fn warnings(&self) -> Vec<ScanWarning> {
        self.failed
            .iter()
            .map(|requirement| ScanWarning::InstallFailed {
                requirement: requirement.clone(),
            })
            .collect()
    }
}

impl VenvSandbox {
    /// Creates a venv with `interpreter` and installs each requirement.
    ///
    /// # Errors
    ///
    /// Fails only if the venv itself cannot be created. Individual install
    /// failures are collected in [`Provisioned::failed`].
    pub async fn provision(
        interpreter: &str,
        requirements: &[String],
        lookup_timeout: Duration,
    ) -> Result<Provisioned, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix("ders-")
            .tempdir()
            .map_err(|source| SandboxError::Spawn {
                command: "mkdtemp".to_string(),
                source,
            })?;
        let venv_dir = dir.path().join("venv");

        info!("Creating sandbox at {}", venv_dir.display());
        run(
            Command::new(interpreter).arg("-m").arg("venv").arg(&venv_dir),
            &format!("{} -m venv", interpreter),
            INSTALL_TIMEOUT,
        )
        .await?;

        let sandbox = Self {
            python: venv_python(&venv_dir),
            _dir: dir,
            lookup_timeout,
        };

        let mut failed = Vec::new();
        for requirement in requirements {
            debug!("Installing {}", requirement);
            let result = run(
                Command::new(&sandbox.python).args([
                    "-m",
                    "pip",
                    "install",
                    "--no-cache-dir",
                    "--disable-pip-version-check",
                    requirement.as_str(),
                ]),
                "pip install",
                INSTALL_TIMEOUT,
            )
            .await;

            if let Err(e) = result {
                warn!("Failed to install {}, skipping: {}", requirement, e);
                failed.push(requirement.clone());
            }
        }

        Ok(Provisioned { sandbox, failed })
    }

    /// Every package installed in the sandbox, from `pip freeze`.
    pub async fn installed(&self) -> Result<Vec<Dependency>, SandboxError> {
        let output = run(
            Command::new(&self.python).args(["-m", "pip", "freeze", "--all"]),
            "pip freeze",
            self.lookup_timeout,
        )
        .await?;

        Ok(parse_pinned(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl RequirementSource for VenvSandbox {
    async fn requirements_of(&self, package: &str) -> Result<Vec<String>, ResolutionError> {
        let mut command = Command::new(&self.python);
        command
            .args(["-c", REQUIRES_SCRIPT, package])
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.lookup_timeout, command.output())
            .await
            .map_err(|_| ResolutionError::Timeout {
                package: package.to_string(),
                timeout: self.lookup_timeout,
            })?
            .map_err(|e| ResolutionError::Lookup {
                package: package.to_string(),
                reason: e.to_string(),
            })?;

        match output.status.code() {
            Some(0) => parse_requires_output(&output.stdout).map_err(|e| ResolutionError::Lookup {
                package: package.to_string(),
                reason: format!("unexpected metadata output: {}", e),
            }),
            Some(NOT_FOUND_EXIT) => Err(ResolutionError::NotFound(package.to_string())),
            _ => Err(ResolutionError::Lookup {
                package: package.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

fn parse_requires_output(stdout: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_slice(stdout)
}

fn venv_python(venv_dir: &Path) -> PathBuf {
    if cfg!(target_os = "windows") {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}

async fn run(command: &mut Command, label: &str, timeout: Duration) -> Result<Output, SandboxError> {
    command.kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| SandboxError::Timeout {
            command: label.to_string(),
            timeout,
        })?
        .map_err(|source| SandboxError::Spawn {
            command: label.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(SandboxError::Failed {
            command: label.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}
