//! Entity registry: identity, attribute bag and team relationships.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use thiserror::Error;
use tracing::debug;

use super::{EntityId, EntityKind, Relationship, TeamId, WorldRef};
use crate::error::{CombatError, ErrorSeverity};
use crate::events::{CombatEvent, EventBus};
use crate::stats::Stat;

/// Errors from registry lookups and writes.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    #[error("entity {entity} has no {stat} attribute")]
    AttributeNotSet { entity: EntityId, stat: Stat },
}

impl CombatError for RegistryError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            Self::AttributeNotSet { .. } => "ENTITY_ATTRIBUTE_NOT_SET",
        }
    }
}

/// A registered combat participant.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub world: WorldRef,
    attributes: BTreeMap<Stat, f64>,
}

impl Entity {
    pub fn attribute(&self, stat: Stat) -> Option<f64> {
        self.attributes.get(&stat).copied()
    }

    pub fn attributes(&self) -> impl Iterator<Item = (Stat, f64)> + '_ {
        self.attributes.iter().map(|(s, v)| (*s, *v))
    }

    /// Present in the world and, if health is tracked, above zero.
    pub fn is_alive(&self) -> bool {
        self.world.present && self.attribute(Stat::Health).is_none_or(|hp| hp > 0.0)
    }
}

/// Owns every entity record.
///
/// Attribute writes publish [`CombatEvent::AttributeChanged`]; health
/// dropping from above zero to zero or below also publishes
/// [`CombatEvent::EntityDied`].
#[derive(Debug)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, Entity>,
    next_id: u32,
    relations: HashMap<(TeamId, TeamId), Relationship>,
    bus: EventBus,
}

impl EntityRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 0,
            relations: HashMap::new(),
            bus,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Registers a world actor and returns its new id.
    pub fn register(&mut self, kind: EntityKind, world: WorldRef) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.entities.insert(
            id,
            Entity {
                id,
                kind,
                world,
                attributes: BTreeMap::new(),
            },
        );
        debug!(target: "combat::entities", entity = %id, ?kind, "registered");
        self.bus.publish(CombatEvent::EntityRegistered { entity: id, kind });
        id
    }

    /// Removes an entity. Its id is never handed out again.
    pub fn unregister(&mut self, id: EntityId) -> Result<Entity, RegistryError> {
        let entity = self
            .entities
            .remove(&id)
            .ok_or(RegistryError::EntityNotFound(id))?;
        debug!(target: "combat::entities", entity = %id, "unregistered");
        self.bus.publish(CombatEvent::EntityUnregistered { entity: id });
        Ok(entity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Snapshot of registered ids in ascending order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Reads an attribute. Unknown ids and unset attributes are errors,
    /// never a default value.
    pub fn get_attribute(&self, id: EntityId, stat: Stat) -> Result<f64, RegistryError> {
        let entity = self.get(id).ok_or(RegistryError::EntityNotFound(id))?;
        entity
            .attribute(stat)
            .ok_or(RegistryError::AttributeNotSet { entity: id, stat })
    }

    /// Writes an attribute and returns the previous value.
    ///
    /// Writing to an unregistered id changes nothing and fails.
    pub fn set_attribute(
        &mut self,
        id: EntityId,
        stat: Stat,
        value: f64,
    ) -> Result<Option<f64>, RegistryError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(RegistryError::EntityNotFound(id))?;
        let old = entity.attributes.insert(stat, value);

        if old == Some(value) {
            return Ok(old);
        }

        self.bus.publish(CombatEvent::AttributeChanged {
            entity: id,
            stat,
            old,
            new: value,
        });

        if stat == Stat::Health && old.is_some_and(|hp| hp > 0.0) && value <= 0.0 {
            debug!(target: "combat::entities", entity = %id, "died");
            self.bus.publish(CombatEvent::EntityDied { entity: id });
        }

        Ok(old)
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.get(id).is_some_and(Entity::is_alive)
    }

    /// Level attribute, defaulting to 1 when unset or unknown.
    pub fn level(&self, id: EntityId) -> f64 {
        self.get(id)
            .and_then(|e| e.attribute(Stat::Level))
            .unwrap_or(1.0)
            .max(1.0)
    }

    // ========================================================================
    // World sync
    // ========================================================================

    fn world_mut(&mut self, id: EntityId) -> Result<&mut WorldRef, RegistryError> {
        self.entities
            .get_mut(&id)
            .map(|e| &mut e.world)
            .ok_or(RegistryError::EntityNotFound(id))
    }

    pub fn set_position(&mut self, id: EntityId, position: Vec3) -> Result<(), RegistryError> {
        self.world_mut(id)?.position = position;
        Ok(())
    }

    pub fn set_facing(&mut self, id: EntityId, facing: Vec3) -> Result<(), RegistryError> {
        self.world_mut(id)?.facing = facing;
        Ok(())
    }

    pub fn set_team(&mut self, id: EntityId, team: TeamId) -> Result<(), RegistryError> {
        self.world_mut(id)?.team = team;
        Ok(())
    }

    /// Marks the world actor as present or gone without unregistering it.
    pub fn set_present(&mut self, id: EntityId, present: bool) -> Result<(), RegistryError> {
        self.world_mut(id)?.present = present;
        Ok(())
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Overrides how two teams regard each other (symmetric).
    pub fn set_team_relation(&mut self, a: TeamId, b: TeamId, relationship: Relationship) {
        self.relations.insert((a, b), relationship);
        self.relations.insert((b, a), relationship);
    }

    /// Relationship of `b` as seen from `a`.
    ///
    /// Same entity or same team is friendly; explicit team overrides come
    /// next; the neutral team is neutral to everyone else; any other pair is
    /// hostile. Unknown ids are neutral.
    pub fn relationship(&self, a: EntityId, b: EntityId) -> Relationship {
        if a == b {
            return Relationship::Friendly;
        }
        let (Some(ea), Some(eb)) = (self.get(a), self.get(b)) else {
            return Relationship::Neutral;
        };
        let (ta, tb) = (ea.world.team, eb.world.team);
        if ta == tb {
            return Relationship::Friendly;
        }
        if let Some(rel) = self.relations.get(&(ta, tb)) {
            return *rel;
        }
        if ta.is_neutral() || tb.is_neutral() {
            return Relationship::Neutral;
        }
        Relationship::Hostile
    }
}
