//! Ability request flow.
//!
//! ```text
//! request ─► validate ─► resolve cast conflict ─► reserve resource
//!              │                                       │
//!              ▼                                       ├─ cast time 0 ─► execute
//!            Err(reason)                               └─ cast time > 0 ─► Casting
//!                                                            │ CastComplete timer
//!                                                            ▼
//!                                   execute ─► cooldown ─► chain ─► AbilityExecuted
//! ```
//!
//! Casts, cooldowns and chain windows are deadlines. Every timer carries the
//! generation it was scheduled for and is ignored once that generation is
//! gone.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use tracing::{debug, trace};

use super::{
    AbilityDefinition, AbilityError, AbilityId, AbilityPhase, AbilityTarget, ActiveCast, CasterState, ChainId,
    ChainInfo, ChainProgress, TargetOrigin, TargetingSpec,
};
use crate::config::{AbilityConfig, CombatConfig};
use crate::effect::EffectPipeline;
use crate::entity::{EntityId, EntityRegistry};
use crate::events::{AbilityExecution, ChainStep, CombatEvent, EventBus, TargetOutcome};
use crate::scheduler::TimerTask;
use crate::stats::Stat;
use crate::targeting::{self, Shape, TargetQuery};
use crate::time::Timestamp;
use crate::world::Systems;

/// Result of an accepted request.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestOutcome {
    /// Cast started; the ability executes at `ends_at` unless interrupted.
    CastStarted { ends_at: Timestamp },
    /// Instant ability, already executed.
    Executed(Box<AbilityExecution>),
}

/// Owns ability definitions and per-caster state.
#[derive(Debug)]
pub struct AbilityOrchestrator {
    definitions: BTreeMap<AbilityId, Arc<AbilityDefinition>>,
    casters: BTreeMap<EntityId, CasterState>,
    config: AbilityConfig,
    next_generation: u64,
    bus: EventBus,
}

impl AbilityOrchestrator {
    pub fn new(config: &CombatConfig, bus: EventBus) -> Self {
        Self {
            definitions: BTreeMap::new(),
            casters: BTreeMap::new(),
            config: config.abilities.clone(),
            next_generation: 0,
            bus,
        }
    }

    // ========================================================================
    // Definitions and casters
    // ========================================================================

    pub fn register(&mut self, definition: AbilityDefinition) -> Result<(), AbilityError> {
        definition.validate()?;
        if self.definitions.contains_key(&definition.id) {
            return Err(AbilityError::DuplicateDefinition(definition.id));
        }
        self.definitions.insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn definition(&self, id: &AbilityId) -> Option<&AbilityDefinition> {
        self.definitions.get(id).map(Arc::as_ref)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &AbilityDefinition> {
        self.definitions.values().map(Arc::as_ref)
    }

    pub fn add_caster(&mut self, entity: EntityId) {
        self.casters.entry(entity).or_default();
    }

    pub fn remove_caster(&mut self, entity: EntityId) -> Option<CasterState> {
        self.casters.remove(&entity)
    }

    pub fn caster(&self, entity: EntityId) -> Option<&CasterState> {
        self.casters.get(&entity)
    }

    pub fn grant(&mut self, entity: EntityId, ability: &AbilityId) -> Result<(), AbilityError> {
        if !self.definitions.contains_key(ability) {
            return Err(AbilityError::UnknownAbility(ability.clone()));
        }
        let state = self
            .casters
            .get_mut(&entity)
            .ok_or(AbilityError::CasterNotFound(entity))?;
        state.granted.insert(ability.clone());
        Ok(())
    }

    pub fn revoke(&mut self, entity: EntityId, ability: &AbilityId) -> bool {
        self.casters
            .get_mut(&entity)
            .is_some_and(|s| s.granted.remove(ability))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn phase(&self, entity: EntityId, ability: &AbilityId, now: Timestamp) -> AbilityPhase {
        self.casters
            .get(&entity)
            .map_or(AbilityPhase::Idle, |s| s.phase(ability, now))
    }

    pub fn cooldown_remaining(&self, entity: EntityId, ability: &AbilityId, now: Timestamp) -> Duration {
        self.casters
            .get(&entity)
            .map_or(Duration::ZERO, |s| s.cooldown_remaining(ability, now))
    }

    pub fn active_cast(&self, entity: EntityId) -> Option<&ActiveCast> {
        self.casters.get(&entity)?.cast.as_ref()
    }

    pub fn chain_progress(&self, entity: EntityId, chain: &ChainId) -> Option<&ChainProgress> {
        self.casters.get(&entity)?.chains.get(chain)
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    // ========================================================================
    // Request
    // ========================================================================

    /// Validates and starts (or instantly executes) an ability.
    ///
    /// Nothing is reserved or changed when validation fails.
    pub fn request(
        &mut self,
        pipeline: &EffectPipeline,
        systems: &mut Systems,
        entity: EntityId,
        ability: &AbilityId,
        target: AbilityTarget,
    ) -> Result<RequestOutcome, AbilityError> {
        let now = systems.now();
        let def = self
            .validate(systems, entity, ability, now)
            .inspect_err(|e| debug!(target: "combat::abilities", entity = %entity, %ability, error = %e, "rejected"))?;

        self.resolve_conflict(entity, ability, now)?;

        if def.cost > 0.0 {
            let available = systems.registry.get_attribute(entity, Stat::Resource).unwrap_or(0.0);
            systems
                .registry
                .set_attribute(entity, Stat::Resource, available - def.cost)
                .map_err(|_| AbilityError::CasterNotFound(entity))?;
        }

        if def.is_instant() {
            let execution = self.execute(pipeline, systems, entity, &def, target.point, target.direction, now);
            return Ok(RequestOutcome::Executed(Box::new(execution)));
        }

        let generation = self.bump_generation();
        let ends_at = now + def.cast_time;
        let state = self
            .casters
            .get_mut(&entity)
            .ok_or(AbilityError::CasterNotFound(entity))?;
        state.cast = Some(ActiveCast {
            ability: def.id.clone(),
            point: target.point,
            direction: target.direction,
            started_at: now,
            ends_at,
            interruptible: def.interruptible,
            generation,
        });

        let interval = self.config.cast_progress_interval();
        if !interval.is_zero() && now + interval < ends_at {
            systems
                .timers
                .schedule(now + interval, TimerTask::CastProgress { entity, generation });
        }
        systems
            .timers
            .schedule(ends_at, TimerTask::CastComplete { entity, generation });

        trace!(target: "combat::abilities", entity = %entity, %ability, %ends_at, "cast started");
        self.bus.publish(CombatEvent::CastStarted {
            entity,
            ability: def.id.clone(),
            started_at: now,
            ends_at,
        });
        Ok(RequestOutcome::CastStarted { ends_at })
    }

    fn validate(
        &mut self,
        systems: &Systems,
        entity: EntityId,
        ability: &AbilityId,
        now: Timestamp,
    ) -> Result<Arc<AbilityDefinition>, AbilityError> {
        let def = self
            .definitions
            .get(ability)
            .cloned()
            .ok_or_else(|| AbilityError::UnknownAbility(ability.clone()))?;
        if !systems.registry.contains(entity) {
            return Err(AbilityError::CasterNotFound(entity));
        }
        if !systems.registry.is_alive(entity) {
            return Err(AbilityError::CasterDead(entity));
        }
        let state = self
            .casters
            .get_mut(&entity)
            .ok_or(AbilityError::CasterNotFound(entity))?;
        if !state.granted.contains(ability) {
            return Err(AbilityError::NotGranted {
                entity,
                ability: ability.clone(),
            });
        }
        if systems.conditions.is_incapacitated(entity) {
            return Err(AbilityError::Incapacitated(entity));
        }

        let remaining = state.cooldown_remaining(ability, now);
        if !remaining.is_zero() {
            return Err(AbilityError::OnCooldown {
                ability: ability.clone(),
                remaining,
            });
        }

        if def.cost > 0.0 {
            let available = systems.registry.get_attribute(entity, Stat::Resource).unwrap_or(0.0);
            if available < def.cost {
                return Err(AbilityError::InsufficientResource {
                    required: def.cost,
                    available,
                });
            }
        }

        if let Some(chain) = def.chain.as_ref().filter(|c| c.position > 1) {
            check_chain(state, chain, ability, now)?;
        }
        Ok(def)
    }

    /// Interrupts an interruptible cast in the way of a new request.
    fn resolve_conflict(&mut self, entity: EntityId, ability: &AbilityId, now: Timestamp) -> Result<(), AbilityError> {
        let Some(cast) = self.casters.get(&entity).and_then(|s| s.cast.as_ref()) else {
            return Ok(());
        };
        if !cast.interruptible || &cast.ability == ability {
            return Err(AbilityError::CastInProgress {
                entity,
                ability: cast.ability.clone(),
            });
        }
        self.cancel_cast(entity, now);
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &mut self,
        pipeline: &EffectPipeline,
        systems: &mut Systems,
        entity: EntityId,
        def: &AbilityDefinition,
        point: Option<Vec3>,
        direction: Option<Vec3>,
        now: Timestamp,
    ) -> AbilityExecution {
        let targets = resolve_targets(&systems.registry, entity, &def.targeting, point, direction);
        let scaling = 1.0 + (systems.stats.level(entity) - 1.0) * systems.config.stats.level_scaling;

        let mut outcomes = Vec::with_capacity(targets.len() * def.effects.len());
        for &target in &targets {
            for descriptor in &def.effects {
                let mut params = descriptor.params.clone();
                params.source = Some(entity);
                params.target = target;
                params.ability = Some(def.id.clone());
                if descriptor.scale_with_level {
                    params.amount = params.amount.map(|a| a * scaling);
                }
                let result = pipeline
                    .execute(descriptor.kind, params, &mut *systems)
                    .map_err(|e| e.to_string());
                outcomes.push(TargetOutcome {
                    target,
                    kind: descriptor.kind,
                    result,
                });
            }
        }

        self.start_cooldowns(entity, def, now);
        let chain = self.advance_chain(systems, entity, def, now);

        let execution = AbilityExecution {
            entity,
            ability: def.id.clone(),
            target_point: point,
            targets,
            outcomes,
            chain,
        };
        debug!(
            target: "combat::abilities",
            entity = %entity,
            ability = %def.id,
            targets = execution.targets.len(),
            "executed"
        );
        self.bus
            .publish(CombatEvent::AbilityExecuted(Box::new(execution.clone())));
        execution
    }

    /// Starts the listed cooldown on the ability and every granted ability
    /// sharing its category.
    fn start_cooldowns(&mut self, entity: EntityId, def: &AbilityDefinition, now: Timestamp) {
        if def.cooldown.is_zero() {
            return;
        }
        let ends_at = now + def.cooldown;
        let Some(state) = self.casters.get_mut(&entity) else {
            return;
        };

        let mut affected = vec![def.id.clone()];
        if let Some(category) = &def.cooldown_category {
            affected.extend(
                self.definitions
                    .values()
                    .filter(|d| d.id != def.id && d.cooldown_category.as_ref() == Some(category))
                    .filter(|d| state.granted.contains(&d.id))
                    .map(|d| d.id.clone()),
            );
        }

        for ability in affected {
            let ends_at = state.start_cooldown(ability.clone(), ends_at);
            self.bus.publish(CombatEvent::CooldownStarted {
                entity,
                ability,
                ends_at,
            });
        }
    }

    fn advance_chain(
        &mut self,
        systems: &mut Systems,
        entity: EntityId,
        def: &AbilityDefinition,
        now: Timestamp,
    ) -> Option<ChainStep> {
        let info = def.chain.as_ref()?;
        let state = self.casters.get_mut(&entity)?;
        let step = ChainStep {
            chain: info.chain.clone(),
            position: info.position,
            next: info.next.clone(),
        };

        let Some(next) = &info.next else {
            state.chains.remove(&info.chain);
            trace!(target: "combat::abilities", entity = %entity, chain = %info.chain, "chain finished");
            return Some(step);
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        state.chains.insert(
            info.chain.clone(),
            ChainProgress {
                position: info.position,
                next: next.clone(),
                expires_at: now + info.timeout,
                generation,
            },
        );
        systems.timers.schedule(
            now + info.timeout,
            TimerTask::ChainTimeout {
                entity,
                chain: info.chain.clone(),
                generation,
            },
        );
        self.bus.publish(CombatEvent::NextAbilityReady {
            entity,
            chain: info.chain.clone(),
            next: next.clone(),
            timeout: info.timeout,
        });
        Some(step)
    }

    // ========================================================================
    // Interruption
    // ========================================================================

    /// Interrupts the entity's cast, applying the interrupt cooldown.
    pub fn interrupt(&mut self, systems: &Systems, entity: EntityId) -> Result<AbilityId, AbilityError> {
        let state = self
            .casters
            .get(&entity)
            .ok_or(AbilityError::CasterNotFound(entity))?;
        let cast = state.cast.as_ref().ok_or(AbilityError::NoActiveCast(entity))?;
        if !cast.interruptible {
            return Err(AbilityError::NotInterruptible {
                ability: cast.ability.clone(),
            });
        }
        self.cancel_cast(entity, systems.now())
            .ok_or(AbilityError::NoActiveCast(entity))
    }

    /// Clears the cast and applies `min(interrupt cooldown, listed cooldown)`.
    fn cancel_cast(&mut self, entity: EntityId, now: Timestamp) -> Option<AbilityId> {
        let state = self.casters.get_mut(&entity)?;
        let cast = state.cast.take()?;
        let listed = self
            .definitions
            .get(&cast.ability)
            .map_or(Duration::ZERO, |d| d.cooldown);
        let cooldown = self.config.interrupt_cooldown().min(listed);

        if !cooldown.is_zero() {
            let ends_at = state.start_cooldown(cast.ability.clone(), now + cooldown);
            state.interrupted = Some((cast.ability.clone(), ends_at));
        }

        debug!(target: "combat::abilities", entity = %entity, ability = %cast.ability, ?cooldown, "cast interrupted");
        self.bus.publish(CombatEvent::CastInterrupted {
            entity,
            ability: cast.ability.clone(),
            cooldown,
        });
        Some(cast.ability)
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Publishes cast progress and re-arms the next progress timer.
    pub fn on_cast_progress(&mut self, systems: &mut Systems, entity: EntityId, generation: u64) -> bool {
        let now = systems.now();
        let Some(cast) = self
            .casters
            .get(&entity)
            .and_then(|s| s.cast.as_ref())
            .filter(|c| c.generation == generation)
        else {
            trace!(target: "combat::abilities", entity = %entity, generation, "stale cast progress");
            return false;
        };

        self.bus.publish(CombatEvent::CastProgress {
            entity,
            ability: cast.ability.clone(),
            progress: cast.progress(now),
        });
        let interval = self.config.cast_progress_interval();
        if !interval.is_zero() && now + interval < cast.ends_at {
            systems
                .timers
                .schedule(now + interval, TimerTask::CastProgress { entity, generation });
        }
        true
    }

    /// Finishes a cast whose generation is still current and executes it.
    pub fn on_cast_complete(
        &mut self,
        pipeline: &EffectPipeline,
        systems: &mut Systems,
        entity: EntityId,
        generation: u64,
    ) -> Option<AbilityExecution> {
        let now = systems.now();
        let state = self.casters.get_mut(&entity)?;
        if state.cast.as_ref().is_none_or(|c| c.generation != generation) {
            trace!(target: "combat::abilities", entity = %entity, generation, "stale cast completion");
            return None;
        }
        let cast = state.cast.take()?;
        if !systems.registry.is_alive(entity) {
            debug!(target: "combat::abilities", entity = %entity, ability = %cast.ability, "caster died while casting");
            self.bus.publish(CombatEvent::CastInterrupted {
                entity,
                ability: cast.ability,
                cooldown: Duration::ZERO,
            });
            return None;
        }
        let def = self.definitions.get(&cast.ability).cloned()?;

        self.bus.publish(CombatEvent::CastCompleted {
            entity,
            ability: cast.ability.clone(),
        });
        Some(self.execute(pipeline, systems, entity, &def, cast.point, cast.direction, now))
    }

    /// Clears chain progress whose window closed without a follow-up.
    pub fn on_chain_timeout(&mut self, entity: EntityId, chain: &ChainId, generation: u64) -> bool {
        let Some(state) = self.casters.get_mut(&entity) else {
            return false;
        };
        if state.chains.get(chain).is_none_or(|p| p.generation != generation) {
            trace!(target: "combat::abilities", entity = %entity, %chain, generation, "stale chain timeout");
            return false;
        }
        state.chains.remove(chain);
        self.bus.publish(CombatEvent::ChainExpired {
            entity,
            chain: chain.clone(),
        });
        true
    }
}

/// Chain step `n > 1` needs step `n - 1` completed, naming this ability as
/// next, inside its window. An expired window is cleared.
fn check_chain(state: &mut CasterState, info: &ChainInfo, ability: &AbilityId, now: Timestamp) -> Result<(), AbilityError> {
    let Some(progress) = state.chains.get(&info.chain) else {
        return Err(AbilityError::ChainNotStarted {
            chain: info.chain.clone(),
        });
    };
    if progress.expires_at <= now {
        state.chains.remove(&info.chain);
        return Err(AbilityError::ChainExpired {
            chain: info.chain.clone(),
        });
    }
    if progress.position + 1 != info.position || &progress.next != ability {
        return Err(AbilityError::ChainOutOfOrder {
            chain: info.chain.clone(),
            ability: ability.clone(),
        });
    }
    Ok(())
}

fn resolve_targets(
    registry: &EntityRegistry,
    entity: EntityId,
    spec: &TargetingSpec,
    point: Option<Vec3>,
    direction: Option<Vec3>,
) -> Vec<EntityId> {
    if spec.shape == Shape::SelfOnly {
        return if registry.is_alive(entity) { vec![entity] } else { Vec::new() };
    }
    let Some(caster) = registry.get(entity) else {
        return Vec::new();
    };
    let position = caster.world.position;
    let origin = match spec.origin {
        TargetOrigin::Caster => position,
        TargetOrigin::Point => point.unwrap_or(position),
    };
    let direction = direction
        .or_else(|| point.map(|p| p - position))
        .unwrap_or(Vec3::ZERO);

    let mut query = TargetQuery::around(entity, origin, spec.range)
        .shape(spec.shape)
        .direction(direction)
        .filter(spec.filter)
        .include_self(spec.include_self);
    query.max_count = spec.max_count;
    targeting::query(registry, &query)
}
