//! Data-driven combat content.
//!
//! This crate ships the stock definitions and the loaders that read them:
//! - Condition catalog (RON)
//! - Ability catalog (RON)
//! - Combat tuning table (TOML)
//!
//! Every file is embedded at compile time so hosts get working content with
//! no I/O, and each loader can also read a replacement from disk.

#[cfg(feature = "loaders")]
pub mod loaders;

#[cfg(feature = "loaders")]
pub use loaders::{AbilityCatalog, ConditionCatalog, ConfigLoader, LoadError, LoadResult};
