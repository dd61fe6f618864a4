//! Core data types for dependencies, findings, and scan reports.
//!
//! - [`Dependency`] - An installed package and its version
//! - [`DependencyGraph`] - Package name to direct requirement names
//! - [`Finding`] - A dependency matched against a known vulnerability
//! - [`ScanWarning`] - Something that could not be checked
//! - [`ScanReport`] - Complete scan results
//!
//! # Example
//!
//! ```
//! use ders::{Dependency, ScanMode, ScanReport};
//!
//! let dependency = Dependency::new("Requests", "2.19.0");
//! let report = ScanReport::new(ScanMode::Local, vec![dependency]);
//!
//! assert_eq!(report.dependencies[0].name, "requests");
//! assert!(report.findings.is_empty());
//! ```

mod dependency;
mod finding;

pub use dependency::*;
pub use finding::*;
