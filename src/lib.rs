pub mod cache;
pub mod checker;
pub mod config;
pub mod error;
pub mod manifest;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod version;

pub use cache::Cache;
pub use config::Config;
pub use manifest::Manifest;
pub use model::{Dependency, DependencyGraph, Finding, ScanMode, ScanReport, ScanWarning};
pub use version::Version;
