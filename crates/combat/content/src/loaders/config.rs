//! Combat tuning loader.

use std::path::Path;

use anyhow::Context;
use combat_core::CombatConfig;

use crate::loaders::{LoadResult, read_file};

const EMBEDDED: &str = include_str!("../../data/combat.toml");

/// Loader for [`CombatConfig`] from TOML files.
///
/// Missing tables and keys fall back to the engine defaults, so a file only
/// needs the values it changes.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config data from a TOML file.
    pub fn load(path: &Path) -> LoadResult<CombatConfig> {
        let content = read_file(path)?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    /// The tuning table shipped with the crate.
    pub fn embedded() -> LoadResult<CombatConfig> {
        Self::parse(EMBEDDED).context("in embedded combat.toml")
    }

    pub fn parse(content: &str) -> LoadResult<CombatConfig> {
        let config: CombatConfig = toml::from_str(content).context("Failed to parse combat config TOML")?;
        if config.damage.mitigation_cap >= 1.0 {
            anyhow::bail!(
                "damage.mitigation_cap must be below 1.0, got {}",
                config.damage.mitigation_cap
            );
        }
        if config.damage.armor_base <= 0.0 {
            anyhow::bail!("damage.armor_base must be positive, got {}", config.damage.armor_base);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn embedded_matches_engine_defaults() {
        let config = ConfigLoader::embedded().unwrap();
        assert_eq!(config, CombatConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[abilities]\ninterrupt_cooldown_ms = 1500\n\n[world]\nseed = 7").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.abilities.interrupt_cooldown_ms, 1_500);
        assert_eq!(config.abilities.cast_progress_interval_ms, 250);
        assert_eq!(config.world.seed, 7);
        assert_eq!(config.damage, CombatConfig::default().damage);
    }

    #[test]
    fn rejects_full_mitigation() {
        let err = ConfigLoader::parse("[damage]\nmitigation_cap = 1.0").unwrap_err();
        assert!(err.to_string().contains("mitigation_cap"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = ConfigLoader::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"));
    }
}
