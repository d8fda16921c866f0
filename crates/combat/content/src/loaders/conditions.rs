//! Condition catalog loader.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use combat_core::{CombatWorld, ConditionDefinition, ConditionId};
use serde::Deserialize;
use tracing::debug;

use crate::loaders::{LoadResult, parse_ron, read_file};

const EMBEDDED: &str = include_str!("../../data/conditions.ron");

/// On-disk shape of a condition catalog.
#[derive(Debug, Deserialize)]
struct ConditionFile {
    conditions: Vec<ConditionDefinition>,
}

/// Validated set of condition definitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ConditionCatalog {
    definitions: BTreeMap<ConditionId, ConditionDefinition>,
}

impl ConditionCatalog {
    /// Loads the conditions shipped with the crate.
    pub fn load() -> LoadResult<Self> {
        Self::parse(EMBEDDED, "embedded conditions.ron")
    }

    /// Loads a catalog from a RON file.
    pub fn from_path(path: &Path) -> LoadResult<Self> {
        let content = read_file(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parses and validates catalog text.
    ///
    /// Every definition must pass the engine's own checks, ids must be
    /// unique, and every id named by a transform, `prevents` or `removes`
    /// must be defined in the same catalog.
    pub fn parse(source: &str, origin: &str) -> LoadResult<Self> {
        let file: ConditionFile = parse_ron(source, origin)?;

        let mut definitions = BTreeMap::new();
        for def in file.conditions {
            def.validate().with_context(|| format!("in {origin}"))?;
            let id = def.id.clone();
            if definitions.insert(id.clone(), def).is_some() {
                anyhow::bail!("duplicate condition {id} in {origin}");
            }
        }

        for def in definitions.values() {
            let referenced = def
                .transform
                .iter()
                .map(|t| &t.into)
                .chain(&def.prevents)
                .chain(&def.removes);
            for other in referenced {
                if !definitions.contains_key(other) {
                    anyhow::bail!("condition {} references unknown condition {other} in {origin}", def.id);
                }
            }
        }

        debug!(target: "combat::content", origin, count = definitions.len(), "conditions loaded");
        Ok(Self { definitions })
    }

    pub fn get(&self, id: &str) -> Option<&ConditionDefinition> {
        self.definitions.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ConditionId> {
        self.definitions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConditionDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Registers every definition with `world`.
    pub fn install(&self, world: &mut CombatWorld) -> LoadResult<()> {
        for def in self.definitions.values() {
            world
                .register_condition(def.clone())
                .with_context(|| format!("registering condition {}", def.id))?;
        }
        Ok(())
    }
}

impl IntoIterator for ConditionCatalog {
    type Item = ConditionDefinition;
    type IntoIter = std::collections::btree_map::IntoValues<ConditionId, ConditionDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.definitions.into_values()
    }
}
