use std::time::Duration;

use glam::Vec3;

use crate::combat::{DamageError, DamageRequest, HealRequest};
use crate::condition::{Applied, ConditionCategory, ConditionData, ConditionError, ConditionId};
use crate::entity::{EntityId, RegistryError};
use crate::events::{DamageEvent, HealEvent};
use crate::stats::{ModifierId, ModifierSpec, StatError};

/// Systems reachable from effect handlers.
///
/// Implemented by the combat world over its owned subsystems. Handlers see
/// only this surface, so a handler can never hold a subsystem across calls.
pub trait EffectServices {
    fn is_alive(&self, entity: EntityId) -> bool;

    fn position(&self, entity: EntityId) -> Result<Vec3, RegistryError>;

    fn set_position(&mut self, entity: EntityId, position: Vec3) -> Result<(), RegistryError>;

    fn deal_damage(&mut self, request: DamageRequest) -> Result<DamageEvent, DamageError>;

    fn heal(&mut self, request: HealRequest) -> Result<HealEvent, DamageError>;

    fn apply_condition(
        &mut self,
        target: EntityId,
        condition: &ConditionId,
        stacks: u32,
        duration: Option<Duration>,
        data: ConditionData,
    ) -> Result<Applied, ConditionError>;

    /// Returns the stacks left after removal.
    fn remove_condition(
        &mut self,
        target: EntityId,
        condition: &ConditionId,
        all_stacks: bool,
    ) -> Result<u32, ConditionError>;

    fn cleanse(
        &mut self,
        target: EntityId,
        category: Option<ConditionCategory>,
    ) -> Result<Vec<ConditionId>, ConditionError>;

    fn apply_modifier(&mut self, target: EntityId, spec: ModifierSpec) -> Result<ModifierId, StatError>;

    fn remove_modifier(&mut self, target: EntityId, modifier: ModifierId) -> Result<(), StatError>;

    fn remove_modifiers_by_source(&mut self, target: EntityId, source: &str) -> Vec<ModifierId>;

    /// Adds to the resource pool, capped at the maximum. Returns the gain.
    fn restore_resource(&mut self, target: EntityId, amount: f64) -> Result<f64, RegistryError>;
}
