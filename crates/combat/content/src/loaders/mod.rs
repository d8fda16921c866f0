//! Content loaders for reading combat data from files.
//!
//! Catalogs are RON, tuning is TOML. Each loader has an embedded default and
//! a `from_path` variant for hosts that ship their own data.

pub mod abilities;
pub mod conditions;
pub mod config;

pub use abilities::AbilityCatalog;
pub use conditions::ConditionCatalog;
pub use config::ConfigLoader;

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

/// Error returned by every loader. Carries the file and definition context.
pub type LoadError = anyhow::Error;

/// Common result type for loaders.
pub type LoadResult<T> = anyhow::Result<T>;

/// Helper function to read file contents.
pub(crate) fn read_file(path: &Path) -> LoadResult<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file {}", path.display()))
}

/// Parses RON text, naming `origin` in the error.
pub(crate) fn parse_ron<T: DeserializeOwned>(source: &str, origin: &str) -> LoadResult<T> {
    ron::from_str(source).with_context(|| format!("Failed to parse {origin}"))
}
