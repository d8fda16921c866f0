//! Composition root.
//!
//! [`CombatWorld`] owns every subsystem and is the only type hosts drive.
//! Subsystems never hold references to each other: each operation borrows
//! exactly the parts it needs from [`Systems`] for the duration of the call.
//!
//! # Update order
//!
//! 1. Condition heartbeat with the time elapsed since the last update
//! 2. Due timers in deadline order (casts, chains, expiries)
//! 3. Deferred follow-ups (hook effects, interrupts, shield removal)

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use tracing::{debug, trace, warn};

use crate::ability::{AbilityDefinition, AbilityError, AbilityId, AbilityOrchestrator, AbilityTarget, RequestOutcome};
use crate::combat::{DamageContext, DamageEngine, DamageError, DamageRequest, HealRequest};
use crate::condition::{
    Applied, ConditionCategory, ConditionData, ConditionDefinition, ConditionError, ConditionId, ConditionManager,
    Deferred, HookContext,
};
use crate::config::CombatConfig;
use crate::effect::{EffectError, EffectKind, EffectOutcome, EffectParams, EffectPipeline, EffectServices};
use crate::entity::{Entity, EntityId, EntityKind, EntityRegistry, RegistryError, TeamId, WorldRef};
use crate::events::{DamageEvent, EventBus, HealEvent};
use crate::rng::RngOracle;
use crate::scheduler::{TimerQueue, TimerTask};
use crate::stats::{ModifierId, ModifierSpec, Stat, StatEngine, StatError};
use crate::time::{Clock, Timestamp};

/// Every subsystem except the pipeline and orchestrator, which operate on it.
pub struct Systems {
    pub bus: EventBus,
    pub clock: Arc<dyn Clock>,
    pub config: CombatConfig,
    pub registry: EntityRegistry,
    pub stats: StatEngine,
    pub conditions: ConditionManager,
    pub damage: DamageEngine,
    pub timers: TimerQueue,
    /// Follow-ups queued by hooks, drained by the world.
    pub deferred: VecDeque<Deferred>,
}

impl Systems {
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Splits out the condition manager and the context it operates on.
    pub fn condition_context(&mut self) -> (&mut ConditionManager, HookContext<'_>) {
        let now = self.clock.now();
        let Systems {
            registry,
            stats,
            conditions,
            timers,
            deferred,
            ..
        } = self;
        (
            conditions,
            HookContext {
                now,
                registry,
                stats,
                timers,
                deferred,
            },
        )
    }

    /// Splits out the damage engine and the context it operates on.
    pub fn damage_context(&mut self) -> (&mut DamageEngine, DamageContext<'_>) {
        let Systems {
            registry,
            stats,
            conditions,
            damage,
            deferred,
            ..
        } = self;
        (
            damage,
            DamageContext {
                registry,
                stats,
                conditions,
                deferred,
            },
        )
    }

    /// Positive stat value, else the registry attribute, else unbounded.
    fn pool_max(&mut self, entity: EntityId, max: Stat) -> f64 {
        self.stats
            .value(entity, max)
            .ok()
            .filter(|v| *v > 0.0)
            .or_else(|| self.registry.get_attribute(entity, max).ok())
            .unwrap_or(f64::INFINITY)
    }
}

impl std::fmt::Debug for Systems {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Systems")
            .field("now", &self.now())
            .field("entities", &self.registry.len())
            .field("timers", &self.timers.len())
            .field("deferred", &self.deferred.len())
            .finish_non_exhaustive()
    }
}

impl EffectServices for Systems {
    fn is_alive(&self, entity: EntityId) -> bool {
        self.registry.is_alive(entity)
    }

    fn position(&self, entity: EntityId) -> Result<Vec3, RegistryError> {
        self.registry
            .get(entity)
            .map(|e| e.world.position)
            .ok_or(RegistryError::EntityNotFound(entity))
    }

    fn set_position(&mut self, entity: EntityId, position: Vec3) -> Result<(), RegistryError> {
        self.registry.set_position(entity, position)
    }

    fn deal_damage(&mut self, request: DamageRequest) -> Result<DamageEvent, DamageError> {
        let (engine, mut ctx) = self.damage_context();
        engine.apply_damage(&mut ctx, request)
    }

    fn heal(&mut self, request: HealRequest) -> Result<HealEvent, DamageError> {
        let (engine, mut ctx) = self.damage_context();
        engine.apply_heal(&mut ctx, request)
    }

    fn apply_condition(
        &mut self,
        target: EntityId,
        condition: &ConditionId,
        stacks: u32,
        duration: Option<Duration>,
        data: ConditionData,
    ) -> Result<Applied, ConditionError> {
        let (conditions, mut ctx) = self.condition_context();
        conditions.apply(&mut ctx, target, condition, stacks, duration, data)
    }

    fn remove_condition(
        &mut self,
        target: EntityId,
        condition: &ConditionId,
        all_stacks: bool,
    ) -> Result<u32, ConditionError> {
        let (conditions, mut ctx) = self.condition_context();
        conditions.remove(&mut ctx, target, condition, all_stacks)
    }

    fn cleanse(
        &mut self,
        target: EntityId,
        category: Option<ConditionCategory>,
    ) -> Result<Vec<ConditionId>, ConditionError> {
        if !self.registry.contains(target) {
            return Err(ConditionError::TargetNotFound(target));
        }
        let (conditions, mut ctx) = self.condition_context();
        Ok(conditions.cleanse(&mut ctx, target, category))
    }

    fn apply_modifier(&mut self, target: EntityId, spec: ModifierSpec) -> Result<ModifierId, StatError> {
        let now = self.now();
        self.stats.apply_modifier(target, spec, now, &mut self.timers)
    }

    fn remove_modifier(&mut self, target: EntityId, modifier: ModifierId) -> Result<(), StatError> {
        self.stats.remove_modifier(target, modifier).map(|_| ())
    }

    fn remove_modifiers_by_source(&mut self, target: EntityId, source: &str) -> Vec<ModifierId> {
        self.stats.remove_modifiers_by_source(target, source)
    }

    fn restore_resource(&mut self, target: EntityId, amount: f64) -> Result<f64, RegistryError> {
        let current = match self.registry.get_attribute(target, Stat::Resource) {
            Ok(value) => value,
            Err(RegistryError::AttributeNotSet { .. }) => 0.0,
            Err(e) => return Err(e),
        };
        let max = self.pool_max(target, Stat::MaxResource);
        let new = (current + amount).min(max).max(current);
        self.registry.set_attribute(target, Stat::Resource, new)?;
        Ok(new - current)
    }
}

/// What one [`CombatWorld::update`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub elapsed: Duration,
    pub timers_fired: usize,
    pub deferred_run: usize,
}

/// The combat simulation.
#[derive(Debug)]
pub struct CombatWorld {
    systems: Systems,
    pipeline: EffectPipeline,
    abilities: AbilityOrchestrator,
    last_update: Timestamp,
}

impl CombatWorld {
    /// Builds every subsystem in dependency order around one shared bus.
    pub fn new(config: CombatConfig, clock: Arc<dyn Clock>) -> Self {
        let bus = EventBus::new();
        let damage = DamageEngine::new(&config, bus.clone());
        Self::assemble(config, clock, bus, damage)
    }

    /// Like [`CombatWorld::new`] with a custom critical-strike RNG.
    pub fn with_rng(config: CombatConfig, clock: Arc<dyn Clock>, rng: Box<dyn RngOracle>) -> Self {
        let bus = EventBus::new();
        let damage = DamageEngine::with_rng(&config, bus.clone(), rng);
        Self::assemble(config, clock, bus, damage)
    }

    fn assemble(config: CombatConfig, clock: Arc<dyn Clock>, bus: EventBus, damage: DamageEngine) -> Self {
        let registry = EntityRegistry::new(bus.clone());
        let stats = StatEngine::new(&config, bus.clone());
        let conditions = ConditionManager::new(&config, bus.clone());
        let pipeline = EffectPipeline::with_builtins(bus.clone());
        let abilities = AbilityOrchestrator::new(&config, bus.clone());
        let last_update = clock.now();

        Self {
            systems: Systems {
                bus,
                clock,
                config,
                registry,
                stats,
                conditions,
                damage,
                timers: TimerQueue::new(),
                deferred: VecDeque::new(),
            },
            pipeline,
            abilities,
            last_update,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn bus(&self) -> &EventBus {
        &self.systems.bus
    }

    pub fn now(&self) -> Timestamp {
        self.systems.now()
    }

    pub fn config(&self) -> &CombatConfig {
        &self.systems.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.systems.registry
    }

    pub fn stats(&self) -> &StatEngine {
        &self.systems.stats
    }

    /// Stat values are computed lazily, so reading them needs `&mut`.
    pub fn stat(&mut self, entity: EntityId, stat: Stat) -> Result<f64, StatError> {
        self.systems.stats.value(entity, stat)
    }

    pub fn conditions(&self) -> &ConditionManager {
        &self.systems.conditions
    }

    pub fn abilities(&self) -> &AbilityOrchestrator {
        &self.abilities
    }

    pub fn pipeline(&self) -> &EffectPipeline {
        &self.pipeline
    }

    pub fn systems(&self) -> &Systems {
        &self.systems
    }

    // ========================================================================
    // Content
    // ========================================================================

    pub fn register_condition(&mut self, definition: ConditionDefinition) -> Result<(), ConditionError> {
        self.systems.conditions.register(definition)
    }

    pub fn register_ability(&mut self, definition: AbilityDefinition) -> Result<(), AbilityError> {
        self.abilities.register(definition)
    }

    pub fn grant(&mut self, entity: EntityId, ability: &AbilityId) -> Result<(), AbilityError> {
        self.abilities.grant(entity, ability)
    }

    pub fn revoke(&mut self, entity: EntityId, ability: &AbilityId) -> bool {
        self.abilities.revoke(entity, ability)
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Registers an entity with base stats and initial attributes.
    ///
    /// A `Level` attribute also sets the stat level. Health and resource
    /// start full when no initial value is given.
    pub fn spawn(
        &mut self,
        kind: EntityKind,
        world: WorldRef,
        base_stats: impl IntoIterator<Item = (Stat, f64)>,
        attributes: impl IntoIterator<Item = (Stat, f64)>,
    ) -> EntityId {
        let systems = &mut self.systems;
        let id = systems.registry.register(kind, world);
        systems.stats.register_base_stats(id, base_stats);

        for (stat, value) in attributes {
            if let Err(e) = self.set_attribute(id, stat, value) {
                warn!(target: "combat::world", entity = %id, %stat, error = %e, "initial attribute rejected");
            }
        }

        for (current, max) in [(Stat::Health, Stat::MaxHealth), (Stat::Resource, Stat::MaxResource)] {
            if self.systems.registry.get_attribute(id, current).is_ok() {
                continue;
            }
            let full = self.systems.pool_max(id, max);
            if full.is_finite() {
                let _ = self.systems.registry.set_attribute(id, current, full);
            }
        }

        self.abilities.add_caster(id);
        debug!(target: "combat::world", entity = %id, ?kind, "spawned");
        id
    }

    /// Removes an entity and everything attached to it.
    pub fn despawn(&mut self, id: EntityId) -> Result<Entity, RegistryError> {
        if !self.systems.registry.contains(id) {
            return Err(RegistryError::EntityNotFound(id));
        }
        let (conditions, mut ctx) = self.systems.condition_context();
        conditions.remove_all(&mut ctx, id);
        self.abilities.remove_caster(id);
        self.systems.stats.unregister(id);
        debug!(target: "combat::world", entity = %id, "despawned");
        self.systems.registry.unregister(id)
    }

    /// Writes an entity attribute. `Level` is mirrored into the stat engine.
    pub fn set_attribute(&mut self, id: EntityId, stat: Stat, value: f64) -> Result<Option<f64>, RegistryError> {
        let old = self.systems.registry.set_attribute(id, stat, value)?;
        if stat == Stat::Level && self.systems.stats.is_registered(id) {
            if let Err(e) = self.systems.stats.set_level(id, value) {
                warn!(target: "combat::world", entity = %id, level = value, error = %e, "level not mirrored");
            }
        }
        Ok(old)
    }

    pub fn set_position(&mut self, id: EntityId, position: Vec3) -> Result<(), RegistryError> {
        self.systems.registry.set_position(id, position)
    }

    pub fn set_facing(&mut self, id: EntityId, facing: Vec3) -> Result<(), RegistryError> {
        self.systems.registry.set_facing(id, facing)
    }

    pub fn set_team(&mut self, id: EntityId, team: TeamId) -> Result<(), RegistryError> {
        self.systems.registry.set_team(id, team)
    }

    pub fn set_present(&mut self, id: EntityId, present: bool) -> Result<(), RegistryError> {
        self.systems.registry.set_present(id, present)
    }

    // ========================================================================
    // Actions
    // ========================================================================

    pub fn request_ability(
        &mut self,
        entity: EntityId,
        ability: &AbilityId,
        target: AbilityTarget,
    ) -> Result<RequestOutcome, AbilityError> {
        let outcome = self
            .abilities
            .request(&self.pipeline, &mut self.systems, entity, ability, target);
        self.drain_deferred();
        outcome
    }

    /// Runs one effect outside any ability.
    pub fn execute_effect(&mut self, kind: EffectKind, params: EffectParams) -> Result<EffectOutcome, EffectError> {
        let outcome = self.pipeline.execute(kind, params, &mut self.systems);
        self.drain_deferred();
        outcome
    }

    pub fn interrupt(&mut self, entity: EntityId) -> Result<AbilityId, AbilityError> {
        self.abilities.interrupt(&self.systems, entity)
    }

    // ========================================================================
    // Time
    // ========================================================================

    /// Advances the simulation to the clock's current time.
    pub fn update(&mut self) -> UpdateSummary {
        let now = self.systems.now();
        let elapsed = now.saturating_since(self.last_update);
        self.last_update = now;

        if !elapsed.is_zero() {
            let (conditions, mut ctx) = self.systems.condition_context();
            conditions.heartbeat(&mut ctx, elapsed);
        }

        let mut timers_fired = 0;
        while let Some((deadline, task)) = self.systems.timers.pop_due(now) {
            trace!(target: "combat::world", %deadline, ?task, "timer");
            self.dispatch(task);
            timers_fired += 1;
        }

        UpdateSummary {
            elapsed,
            timers_fired,
            deferred_run: self.drain_deferred(),
        }
    }

    fn dispatch(&mut self, task: TimerTask) {
        match task {
            TimerTask::ExpireModifier { entity, modifier } => {
                self.systems.stats.expire_modifier(entity, modifier);
            }
            TimerTask::ExpireCondition {
                entity,
                condition,
                generation,
            } => {
                let (conditions, mut ctx) = self.systems.condition_context();
                conditions.expire(&mut ctx, entity, &condition, generation);
            }
            TimerTask::CastProgress { entity, generation } => {
                self.abilities.on_cast_progress(&mut self.systems, entity, generation);
            }
            TimerTask::CastComplete { entity, generation } => {
                self.abilities
                    .on_cast_complete(&self.pipeline, &mut self.systems, entity, generation);
            }
            TimerTask::ChainTimeout {
                entity,
                chain,
                generation,
            } => {
                self.abilities.on_chain_timeout(entity, &chain, generation);
            }
        }
    }

    /// Runs queued follow-ups in order, at most `max_deferred` per call.
    /// Follow-ups queued while draining run in the same call.
    fn drain_deferred(&mut self) -> usize {
        let limit = self.systems.config.world.max_deferred;
        let mut ran = 0;
        while ran < limit {
            let Some(next) = self.systems.deferred.pop_front() else {
                break;
            };
            ran += 1;
            match next {
                Deferred::Effect { kind, params } => {
                    // Failures are already logged and published by the pipeline.
                    let _ = self.pipeline.execute(kind, params, &mut self.systems);
                }
                Deferred::Interrupt(entity) => {
                    if let Err(e) = self.abilities.interrupt(&self.systems, entity) {
                        trace!(target: "combat::world", entity = %entity, error = %e, "interrupt skipped");
                    }
                }
                Deferred::RemoveCondition {
                    target,
                    condition,
                    all_stacks,
                } => {
                    let (conditions, mut ctx) = self.systems.condition_context();
                    if let Err(e) = conditions.remove(&mut ctx, target, &condition, all_stacks) {
                        trace!(target: "combat::world", entity = %target, error = %e, "removal skipped");
                    }
                }
            }
        }

        if !self.systems.deferred.is_empty() {
            warn!(
                target: "combat::world",
                left = self.systems.deferred.len(),
                limit,
                "deferred follow-up limit reached"
            );
        }
        ran
    }
}
