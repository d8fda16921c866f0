//! Plain data exchanged across the runtime boundary.

use std::collections::BTreeMap;

use combat_core::{AbilityId, CombatWorld, ConditionId, EntityId, EntityKind, Stat, Timestamp, WorldRef};
use serde::{Deserialize, Serialize};

/// Everything needed to put a combatant into the world.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnSpec {
    pub kind: EntityKind,
    pub world: WorldRef,
    pub base_stats: Vec<(Stat, f64)>,
    pub attributes: Vec<(Stat, f64)>,
    /// Abilities granted right after spawning.
    pub abilities: Vec<AbilityId>,
}

impl SpawnSpec {
    pub fn new(kind: EntityKind, world: WorldRef) -> Self {
        Self {
            kind,
            world,
            base_stats: Vec::new(),
            attributes: vec![(Stat::Level, 1.0)],
            abilities: Vec::new(),
        }
    }

    pub fn stat(mut self, stat: Stat, value: f64) -> Self {
        self.base_stats.push((stat, value));
        self
    }

    /// Sets an initial attribute, replacing an earlier value for the same stat.
    pub fn attribute(mut self, stat: Stat, value: f64) -> Self {
        self.attributes.retain(|(s, _)| *s != stat);
        self.attributes.push((stat, value));
        self
    }

    pub fn level(self, level: u32) -> Self {
        self.attribute(Stat::Level, f64::from(level))
    }

    pub fn ability(mut self, ability: impl Into<AbilityId>) -> Self {
        self.abilities.push(ability.into());
        self
    }
}

/// Active condition as seen from outside the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSnapshot {
    pub condition: ConditionId,
    pub stacks: u32,
    pub remaining_ms: u64,
}

/// Cast in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastSnapshot {
    pub ability: AbilityId,
    pub progress: f32,
    pub ends_at: Timestamp,
}

/// Read-only copy of one entity's combat state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub world: WorldRef,
    pub alive: bool,
    pub attributes: BTreeMap<Stat, f64>,
    pub conditions: Vec<ConditionSnapshot>,
    pub casting: Option<CastSnapshot>,
    pub incapacitated: bool,
}

impl EntitySnapshot {
    /// Captures `id` from `world`, or `None` if it is not registered.
    pub fn capture(world: &CombatWorld, id: EntityId) -> Option<Self> {
        let entity = world.registry().get(id)?;
        let now = world.now();

        let conditions = world
            .conditions()
            .instances(id)
            .map(|instance| ConditionSnapshot {
                condition: instance.condition.clone(),
                stacks: instance.stacks,
                remaining_ms: u64::try_from(instance.remaining.as_millis()).unwrap_or(u64::MAX),
            })
            .collect();

        let casting = world.abilities().active_cast(id).map(|cast| CastSnapshot {
            ability: cast.ability.clone(),
            progress: cast.progress(now),
            ends_at: cast.ends_at,
        });

        Some(Self {
            id,
            kind: entity.kind,
            world: entity.world,
            alive: entity.is_alive(),
            attributes: entity.attributes().collect(),
            conditions,
            casting,
            incapacitated: world.conditions().is_incapacitated(id),
        })
    }

    pub fn attribute(&self, stat: Stat) -> Option<f64> {
        self.attributes.get(&stat).copied()
    }

    pub fn stacks(&self, condition: &str) -> u32 {
        self.conditions
            .iter()
            .find(|c| c.condition.as_str() == condition)
            .map_or(0, |c| c.stacks)
    }
}
