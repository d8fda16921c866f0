//! Ability catalog loader.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use combat_core::{AbilityDefinition, AbilityId, CombatWorld, EffectKind};
use serde::Deserialize;
use tracing::debug;

use crate::loaders::{ConditionCatalog, LoadResult, parse_ron, read_file};

const EMBEDDED: &str = include_str!("../../data/abilities.ron");

/// On-disk shape of an ability catalog.
#[derive(Debug, Deserialize)]
struct AbilityFile {
    abilities: Vec<AbilityDefinition>,
}

/// Validated set of ability definitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct AbilityCatalog {
    definitions: BTreeMap<AbilityId, AbilityDefinition>,
}

impl AbilityCatalog {
    /// Loads the abilities shipped with the crate.
    pub fn load() -> LoadResult<Self> {
        Self::parse(EMBEDDED, "embedded abilities.ron")
    }

    /// Loads a catalog from a RON file.
    pub fn from_path(path: &Path) -> LoadResult<Self> {
        let content = read_file(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parses and validates catalog text. Chain links must point at
    /// abilities in the same catalog.
    pub fn parse(source: &str, origin: &str) -> LoadResult<Self> {
        let file: AbilityFile = parse_ron(source, origin)?;

        let mut definitions = BTreeMap::new();
        for def in file.abilities {
            def.validate().with_context(|| format!("in {origin}"))?;
            let id = def.id.clone();
            if definitions.insert(id.clone(), def).is_some() {
                anyhow::bail!("duplicate ability {id} in {origin}");
            }
        }

        for def in definitions.values() {
            let Some(next) = def.chain.as_ref().and_then(|c| c.next.as_ref()) else {
                continue;
            };
            if !definitions.contains_key(next) {
                anyhow::bail!("ability {} chains into unknown ability {next} in {origin}", def.id);
            }
        }

        debug!(target: "combat::content", origin, count = definitions.len(), "abilities loaded");
        Ok(Self { definitions })
    }

    /// Fails if any effect names a condition `conditions` does not define.
    pub fn check_conditions(&self, conditions: &ConditionCatalog) -> LoadResult<()> {
        for def in self.definitions.values() {
            let named = def
                .effects
                .iter()
                .filter(|e| matches!(e.kind, EffectKind::ApplyCondition | EffectKind::RemoveCondition))
                .filter_map(|e| e.params.condition.as_ref());
            for condition in named {
                if conditions.get(condition.as_str()).is_none() {
                    anyhow::bail!("ability {} uses unknown condition {condition}", def.id);
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&AbilityDefinition> {
        self.definitions.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &AbilityId> {
        self.definitions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbilityDefinition> {
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
                .register_ability(def.clone())
                .with_context(|| format!("registering ability {}", def.id))?;
        }
        Ok(())
    }
}

impl IntoIterator for AbilityCatalog {
    type Item = AbilityDefinition;
    type IntoIter = std::collections::btree_map::IntoValues<AbilityId, AbilityDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.definitions.into_values()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use combat_core::{Shape, TargetOrigin};

    use super::*;

    #[test]
    fn test_load_stock_abilities() {
        let catalog = AbilityCatalog::load().expect("Failed to load abilities");
        assert!(catalog.len() >= 12);

        let bolt = catalog.get("fire_bolt").unwrap();
        assert_eq!(bolt.cast_time, Duration::from_millis(1_500));
        assert_eq!(bolt.cost, 20.0);
        assert!(bolt.interruptible);
        assert!(matches!(bolt.targeting.shape, Shape::Ray { .. }));

        let meteor = catalog.get("meteor").unwrap();
        assert!(!meteor.interruptible);
        assert_eq!(meteor.targeting.origin, TargetOrigin::Point);

        let barrier = catalog.get("barrier").unwrap();
        let rally = catalog.get("rally").unwrap();
        assert!(barrier.cooldown_category.is_some());
        assert_eq!(barrier.cooldown_category, rally.cooldown_category);
        assert!(barrier.is_instant());
    }

    #[test]
    fn stock_chain_is_linked() {
        let catalog = AbilityCatalog::load().unwrap();
        let positions: Vec<u32> = ["strike_1", "strike_2", "strike_3"]
            .iter()
            .map(|id| catalog.get(id).and_then(|d| d.chain.as_ref()).unwrap().position)
            .collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert!(catalog.get("strike_3").unwrap().chain.as_ref().unwrap().next.is_none());
    }

    #[test]
    fn stock_abilities_only_use_stock_conditions() {
        let abilities = AbilityCatalog::load().unwrap();
        let conditions = ConditionCatalog::load().unwrap();
        abilities.check_conditions(&conditions).unwrap();
    }

    #[test]
    fn dangling_chain_link_is_rejected() {
        let source = r#"(abilities: [(
            id: "a",
            effects: [(kind: Heal, params: (amount: Some(1.0)))],
            chain: Some((chain: "c", position: 1, next: Some("b"), timeout: 1000)),
        )])"#;
        let err = AbilityCatalog::parse(source, "test").unwrap_err();
        assert!(err.to_string().contains("unknown ability b"));
    }

    #[test]
    fn ability_without_effects_is_rejected() {
        let source = r#"(abilities: [(id: "a", effects: [])])"#;
        assert!(AbilityCatalog::parse(source, "test").is_err());
    }
}
