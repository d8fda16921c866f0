use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{
    Applied, ConditionCategory, ConditionData, ConditionDefinition, ConditionError, ConditionHook, ConditionId,
    ConditionInstance, Deferred, ExpiryBehavior, StackPolicy, TransformWhen,
};
use crate::combat::{DamagePacket, HealPacket};
use crate::config::{CombatConfig, ConditionConfig};
use crate::entity::{EntityId, EntityRegistry};
use crate::events::{CombatEvent, EventBus};
use crate::scheduler::{TimerQueue, TimerTask};
use crate::stats::StatEngine;
use crate::time::Timestamp;

/// Transformations chained deeper than this are dropped.
const MAX_TRANSFORM_DEPTH: u32 = 8;

/// Borrowed systems condition operations touch.
pub struct HookContext<'a> {
    pub now: Timestamp,
    pub registry: &'a EntityRegistry,
    pub stats: &'a mut StatEngine,
    pub timers: &'a mut TimerQueue,
    pub deferred: &'a mut VecDeque<Deferred>,
}

/// Owns condition definitions and every active instance.
#[derive(Debug)]
pub struct ConditionManager {
    definitions: BTreeMap<ConditionId, Arc<ConditionDefinition>>,
    active: BTreeMap<EntityId, BTreeMap<ConditionId, ConditionInstance>>,
    config: ConditionConfig,
    next_generation: u64,
    bus: EventBus,
}

impl ConditionManager {
    pub fn new(config: &CombatConfig, bus: EventBus) -> Self {
        Self {
            definitions: BTreeMap::new(),
            active: BTreeMap::new(),
            config: config.conditions.clone(),
            next_generation: 0,
            bus,
        }
    }

    // ========================================================================
    // Definitions
    // ========================================================================

    pub fn register(&mut self, definition: ConditionDefinition) -> Result<(), ConditionError> {
        definition.validate()?;
        if self.definitions.contains_key(&definition.id) {
            return Err(ConditionError::DuplicateDefinition(definition.id));
        }
        self.definitions.insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn definition(&self, id: &ConditionId) -> Option<&ConditionDefinition> {
        self.definitions.get(id).map(Arc::as_ref)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ConditionDefinition> {
        self.definitions.values().map(Arc::as_ref)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn instance(&self, target: EntityId, id: &ConditionId) -> Option<&ConditionInstance> {
        self.active.get(&target)?.get(id)
    }

    fn instance_mut(&mut self, target: EntityId, id: &ConditionId) -> Option<&mut ConditionInstance> {
        self.active.get_mut(&target)?.get_mut(id)
    }

    /// Active instances on `target` in condition-id order.
    pub fn instances(&self, target: EntityId) -> impl Iterator<Item = &ConditionInstance> {
        self.active.get(&target).into_iter().flat_map(|m| m.values())
    }

    pub fn has(&self, target: EntityId, id: &ConditionId) -> bool {
        self.instance(target, id).is_some()
    }

    /// Current stacks; 0 when absent.
    pub fn stacks(&self, target: EntityId, id: &ConditionId) -> u32 {
        self.instance(target, id).map_or(0, |i| i.stacks)
    }

    pub fn remaining(&self, target: EntityId, id: &ConditionId) -> Option<Duration> {
        self.instance(target, id).map(|i| i.remaining)
    }

    /// True while any active condition carries [`ConditionHook::Incapacitate`].
    pub fn is_incapacitated(&self, target: EntityId) -> bool {
        self.instances(target).any(|i| {
            self.definitions
                .get(&i.condition)
                .is_some_and(|d| d.incapacitates())
        })
    }

    fn preventing(&self, target: EntityId, id: &ConditionId) -> Option<ConditionId> {
        self.instances(target)
            .find(|i| {
                self.definitions
                    .get(&i.condition)
                    .is_some_and(|d| d.prevents.contains(id))
            })
            .map(|i| i.condition.clone())
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    // ========================================================================
    // Apply / Remove
    // ========================================================================

    /// Applies `stacks` of a condition, or merges into the active instance.
    ///
    /// `duration` defaults to the definition's. Every successful call re-arms
    /// the expiry timer and then evaluates the definition's transformation.
    pub fn apply(
        &mut self,
        ctx: &mut HookContext<'_>,
        target: EntityId,
        id: &ConditionId,
        stacks: u32,
        duration: Option<Duration>,
        data: ConditionData,
    ) -> Result<Applied, ConditionError> {
        self.apply_at_depth(ctx, target, id, stacks, duration, data, 0)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_at_depth(
        &mut self,
        ctx: &mut HookContext<'_>,
        target: EntityId,
        id: &ConditionId,
        stacks: u32,
        duration: Option<Duration>,
        data: ConditionData,
        depth: u32,
    ) -> Result<Applied, ConditionError> {
        let def = self
            .definitions
            .get(id)
            .cloned()
            .ok_or_else(|| ConditionError::UnknownCondition(id.clone()))?;
        if !ctx.registry.contains(target) {
            return Err(ConditionError::TargetNotFound(target));
        }
        if !ctx.registry.is_alive(target) {
            return Err(ConditionError::TargetDead(target));
        }
        if let Some(by) = self.preventing(target, id) {
            debug!(target: "combat::conditions", entity = %target, condition = %id, %by, "prevented");
            return Err(ConditionError::Prevented {
                condition: id.clone(),
                by,
            });
        }

        let duration = duration.unwrap_or(def.duration);
        let stacks = stacks.max(1);
        let generation = self.bump_generation();
        let tick_in = def
            .tick_interval
            .map(|i| i.as_secs_f64() * 1_000.0 / ctx.stats.tick_rate(target));

        let slot = self.active.entry(target).or_default();
        let (current, remaining, first) = match slot.get_mut(id) {
            None => {
                let stacks = stacks.min(def.max_stacks);
                slot.insert(
                    id.clone(),
                    ConditionInstance {
                        condition: id.clone(),
                        stacks,
                        remaining: duration,
                        tick_in,
                        data,
                        generation,
                        applied_at: ctx.now,
                        settled_at: ctx.now,
                    },
                );
                (stacks, duration, true)
            }
            Some(instance) => {
                instance.settle(ctx.now, Duration::MAX, true);
                match def.stacking {
                    StackPolicy::Refresh => instance.remaining = duration,
                    StackPolicy::Add | StackPolicy::Independent => {
                        instance.remaining = instance.remaining.max(duration);
                        instance.stacks = instance.stacks.saturating_add(stacks).min(def.max_stacks);
                    }
                }
                instance.data.merge(data, &def.inheritance);
                instance.generation = generation;
                (instance.stacks, instance.remaining, false)
            }
        };

        ctx.timers.schedule(
            ctx.now + remaining,
            TimerTask::ExpireCondition {
                entity: target,
                condition: id.clone(),
                generation,
            },
        );

        if first {
            for removed in def.removes.iter().filter(|r| *r != id) {
                if self.has(target, removed) {
                    // Present a moment ago, so removal cannot fail.
                    let _ = self.remove(ctx, target, removed, true);
                }
            }
            Self::sync_modifiers(ctx, target, &def, current);
            if def.incapacitates() {
                ctx.deferred.push_back(Deferred::Interrupt(target));
            }
            trace!(target: "combat::conditions", entity = %target, condition = %id, stacks = current, "applied");
            self.bus.publish(CombatEvent::ConditionApplied {
                target,
                condition: id.clone(),
                stacks: current,
                duration: remaining,
            });
        } else {
            Self::sync_modifiers(ctx, target, &def, current);
            trace!(target: "combat::conditions", entity = %target, condition = %id, stacks = current, "reapplied");
            self.bus.publish(CombatEvent::ConditionStacksChanged {
                target,
                condition: id.clone(),
                stacks: current,
                duration: remaining,
            });
        }

        let transformed_into = self.check_transform(ctx, target, &def, depth);
        Ok(Applied {
            stacks: current,
            transformed_into,
        })
    }

    /// Removes one stack, or every stack with `all_stacks`. Returns the
    /// stacks left.
    pub fn remove(
        &mut self,
        ctx: &mut HookContext<'_>,
        target: EntityId,
        id: &ConditionId,
        all_stacks: bool,
    ) -> Result<u32, ConditionError> {
        let instance = self
            .instance_mut(target, id)
            .ok_or_else(|| ConditionError::NotActive {
                target,
                condition: id.clone(),
            })?;
        let taken = if all_stacks { instance.stacks } else { 1 };
        self.drop_stacks(ctx, target, id, taken);
        Ok(self.stacks(target, id))
    }

    /// Removes every condition of `category` (all of them for `None`).
    pub fn cleanse(
        &mut self,
        ctx: &mut HookContext<'_>,
        target: EntityId,
        category: Option<ConditionCategory>,
    ) -> Vec<ConditionId> {
        let matching: Vec<ConditionId> = self
            .instances(target)
            .filter(|i| {
                category.is_none_or(|c| self.definitions.get(&i.condition).is_some_and(|d| d.category == c))
            })
            .map(|i| i.condition.clone())
            .collect();

        matching
            .into_iter()
            .filter(|id| self.remove(ctx, target, id, true).is_ok())
            .collect()
    }

    /// Strips every condition from `target`, e.g. on despawn.
    pub fn remove_all(&mut self, ctx: &mut HookContext<'_>, target: EntityId) -> Vec<ConditionId> {
        self.cleanse(ctx, target, None)
    }

    /// Takes `count` stacks off an instance, deleting it at zero.
    fn drop_stacks(&mut self, ctx: &mut HookContext<'_>, target: EntityId, id: &ConditionId, count: u32) {
        let def = self.definitions.get(id).cloned();
        let Some(instance) = self.instance_mut(target, id) else {
            return;
        };
        instance.stacks = instance.stacks.saturating_sub(count);
        let (stacks, remaining) = (instance.stacks, instance.remaining);

        if stacks > 0 {
            if let Some(def) = &def {
                Self::sync_modifiers(ctx, target, def, stacks);
            }
            self.bus.publish(CombatEvent::ConditionStacksChanged {
                target,
                condition: id.clone(),
                stacks,
                duration: remaining,
            });
            return;
        }

        if let Some(slot) = self.active.get_mut(&target) {
            slot.remove(id);
            if slot.is_empty() {
                self.active.remove(&target);
            }
        }
        if let Some(def) = &def {
            Self::sync_modifiers(ctx, target, def, 0);
        }
        trace!(target: "combat::conditions", entity = %target, condition = %id, "removed");
        self.bus.publish(CombatEvent::ConditionRemoved {
            target,
            condition: id.clone(),
        });
    }

    /// Re-establishes the stat modifiers a definition's hooks hold at
    /// `stacks`. Zero stacks removes them.
    fn sync_modifiers(ctx: &mut HookContext<'_>, target: EntityId, def: &ConditionDefinition, stacks: u32) {
        if !def.hooks.iter().any(|h| matches!(h, ConditionHook::StatModifier { .. })) {
            return;
        }
        let source = def.modifier_source();
        ctx.stats.remove_modifiers_by_source(target, &source);
        if stacks == 0 {
            return;
        }
        for spec in def.hooks.iter().filter_map(|h| h.modifier_spec(&source, stacks)) {
            if let Err(e) = ctx.stats.apply_modifier(target, spec, ctx.now, ctx.timers) {
                debug!(target: "combat::conditions", entity = %target, condition = %def.id, error = %e, "modifier skipped");
            }
        }
    }

    fn check_transform(
        &mut self,
        ctx: &mut HookContext<'_>,
        target: EntityId,
        def: &ConditionDefinition,
        depth: u32,
    ) -> Option<ConditionId> {
        let transformation = def.transform.as_ref()?;
        let instance = self.instance(target, &def.id)?;

        let triggered = match &transformation.when {
            TransformWhen::StacksAtLeast(n) => instance.stacks >= *n,
            TransformWhen::DataAtLeast { key, value } => instance.data.get(key).is_some_and(|v| v >= *value),
        };
        if !triggered {
            return None;
        }
        if depth >= MAX_TRANSFORM_DEPTH {
            warn!(target: "combat::conditions", condition = %def.id, "transformation chain too deep");
            return None;
        }
        if !self.definitions.contains_key(&transformation.into) {
            warn!(target: "combat::conditions", condition = %def.id, into = %transformation.into, "unknown transformation target");
            return None;
        }

        let stacks = if transformation.preserve_stacks { instance.stacks } else { 1 };
        let data = if transformation.merge_data {
            instance.data.clone()
        } else {
            ConditionData::from_source(instance.data.source)
        };

        self.drop_stacks(ctx, target, &def.id, u32::MAX);
        match self.apply_at_depth(ctx, target, &transformation.into, stacks, None, data, depth + 1) {
            Ok(applied) => {
                self.bus.publish(CombatEvent::ConditionTransformed {
                    target,
                    from: def.id.clone(),
                    into: transformation.into.clone(),
                    stacks: applied.stacks,
                });
                Some(transformation.into.clone())
            }
            Err(e) => {
                warn!(target: "combat::conditions", condition = %def.id, error = %e, "transformation failed");
                None
            }
        }
    }

    // ========================================================================
    // Time
    // ========================================================================

    /// Advances every instance by `dt`: periodic ticks first, then duration.
    ///
    /// Works over a snapshot of keys and re-checks each instance before
    /// touching it.
    pub fn heartbeat(&mut self, ctx: &mut HookContext<'_>, dt: Duration) {
        let keys: Vec<(EntityId, ConditionId)> = self
            .active
            .iter()
            .flat_map(|(entity, slot)| slot.keys().map(move |id| (*entity, id.clone())))
            .collect();
        let cap = self.config.max_tick_catchup.max(1);

        for (entity, id) in keys {
            let Some(def) = self.definitions.get(&id).cloned() else {
                continue;
            };

            // Dead holders keep their conditions but stop ticking.
            let period = def
                .tick_interval
                .filter(|_| ctx.registry.is_alive(entity))
                .map(|interval| interval.as_secs_f64() * 1_000.0 / ctx.stats.tick_rate(entity));

            let Some(instance) = self.instance_mut(entity, &id) else {
                continue;
            };
            // Time before the instance was applied or last settled is not charged.
            instance.settle(ctx.now, dt, period.is_some());

            if let Some(period) = period {
                let countdown = instance.tick_in.get_or_insert(period);
                let mut due = 0;
                while *countdown <= 0.0 && due < cap {
                    *countdown += period;
                    due += 1;
                }
                if *countdown <= 0.0 {
                    *countdown = period;
                }
                let (stacks, data) = (instance.stacks, instance.data.clone());

                for _ in 0..due {
                    for hook in &def.hooks {
                        if let Some(follow_up) = hook.on_tick(entity, stacks, &data) {
                            ctx.deferred.push_back(follow_up);
                        }
                    }
                    self.bus.publish(CombatEvent::ConditionTick {
                        target: entity,
                        condition: id.clone(),
                        stacks,
                    });
                }
            }

            if self.instance(entity, &id).is_some_and(|i| i.remaining.is_zero()) {
                self.expire_now(ctx, entity, &def);
            }
        }
    }

    /// Timer backstop. Acts only if `generation` is still current.
    pub fn expire(&mut self, ctx: &mut HookContext<'_>, target: EntityId, id: &ConditionId, generation: u64) -> bool {
        let current = self.instance(target, id).map(|i| i.generation);
        if current != Some(generation) {
            trace!(target: "combat::conditions", entity = %target, condition = %id, generation, "stale expiry");
            return false;
        }
        let Some(def) = self.definitions.get(id).cloned() else {
            return false;
        };
        self.expire_now(ctx, target, &def);
        true
    }

    fn expire_now(&mut self, ctx: &mut HookContext<'_>, target: EntityId, def: &ConditionDefinition) {
        let Some(stacks) = self.instance(target, &def.id).map(|i| i.stacks) else {
            return;
        };
        let count = match def.expiry {
            ExpiryBehavior::RemoveStacks(n) => n.max(1),
            ExpiryBehavior::RemoveAll => stacks,
        };
        if count >= stacks {
            self.drop_stacks(ctx, target, &def.id, stacks);
            return;
        }

        let generation = self.bump_generation();
        if let Some(instance) = self.instance_mut(target, &def.id) {
            instance.settle(ctx.now, Duration::MAX, true);
            instance.remaining = def.duration;
            instance.generation = generation;
        }
        ctx.timers.schedule(
            ctx.now + def.duration,
            TimerTask::ExpireCondition {
                entity: target,
                condition: def.id.clone(),
                generation,
            },
        );
        self.drop_stacks(ctx, target, &def.id, count);
    }

    // ========================================================================
    // Interception
    // ========================================================================

    /// Runs the source's deal-damage hooks, then the target's damaged hooks,
    /// each in condition-id order. Depleted absorb pools queue a removal.
    pub fn intercept_damage(&mut self, packet: &mut DamagePacket, deferred: &mut VecDeque<Deferred>) {
        if let Some(slot) = packet.source.and_then(|source| self.active.get(&source)) {
            for instance in slot.values() {
                if let Some(def) = self.definitions.get(&instance.condition) {
                    for hook in &def.hooks {
                        hook.on_deal_damage(instance.stacks, packet);
                    }
                }
            }
        }

        if let Some(slot) = self.active.get_mut(&packet.target) {
            for (id, instance) in slot.iter_mut() {
                let Some(def) = self.definitions.get(id) else {
                    continue;
                };
                let mut depleted = false;
                for hook in &def.hooks {
                    depleted |= hook.on_damaged(instance.stacks, &mut instance.data, packet);
                }
                if depleted {
                    deferred.push_back(Deferred::RemoveCondition {
                        target: packet.target,
                        condition: id.clone(),
                        all_stacks: true,
                    });
                }
            }
        }
    }

    /// Runs the target's healed hooks in condition-id order.
    pub fn intercept_heal(&self, packet: &mut HealPacket) {
        for instance in self.instances(packet.target) {
            if let Some(def) = self.definitions.get(&instance.condition) {
                for hook in &def.hooks {
                    hook.on_healed(instance.stacks, packet);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::DamageType;
    use crate::condition::{InheritPolicy, Transformation};
    use crate::entity::{EntityKind, TeamId, WorldRef};
    use crate::stats::Stat;
    use glam::Vec3;

    const SECOND: Duration = Duration::from_secs(1);

    struct Fixture {
        conditions: ConditionManager,
        registry: EntityRegistry,
        stats: StatEngine,
        timers: TimerQueue,
        deferred: VecDeque<Deferred>,
        now: Timestamp,
        target: EntityId,
    }

    impl Fixture {
        fn new(definitions: Vec<ConditionDefinition>) -> Self {
            let config = CombatConfig::default();
            let bus = EventBus::new();
            let mut registry = EntityRegistry::new(bus.clone());
            let mut stats = StatEngine::new(&config, bus.clone());
            let target = registry.register(EntityKind::Npc, WorldRef::new(Vec3::ZERO, TeamId(2)));
            registry.set_attribute(target, Stat::Health, 100.0).unwrap();
            stats.register_base_stats(target, [(Stat::Power, 10.0)]);

            let mut conditions = ConditionManager::new(&config, bus);
            for def in definitions {
                conditions.register(def).unwrap();
            }
            Self {
                conditions,
                registry,
                stats,
                timers: TimerQueue::new(),
                deferred: VecDeque::new(),
                now: Timestamp::ZERO,
                target,
            }
        }

        fn with<R>(&mut self, f: impl FnOnce(&mut ConditionManager, &mut HookContext<'_>) -> R) -> R {
            let mut ctx = HookContext {
                now: self.now,
                registry: &self.registry,
                stats: &mut self.stats,
                timers: &mut self.timers,
                deferred: &mut self.deferred,
            };
            f(&mut self.conditions, &mut ctx)
        }

        fn apply(&mut self, id: &str, stacks: u32) -> Result<Applied, ConditionError> {
            let target = self.target;
            self.with(|c, ctx| c.apply(ctx, target, &id.into(), stacks, None, ConditionData::default()))
        }

        fn advance(&mut self, dt: Duration) {
            self.now = self.now + dt;
            self.with(|c, ctx| c.heartbeat(ctx, dt));
        }

        fn stacks(&self, id: &str) -> u32 {
            self.conditions.stacks(self.target, &id.into())
        }
    }

    fn burning() -> ConditionDefinition {
        ConditionDefinition::new("BURNING", 4 * SECOND)
            .max_stacks(5)
            .ticking(SECOND)
            .hook(ConditionHook::PeriodicDamage {
                amount: 5.0,
                damage_type: DamageType::Fire,
                per_stack: true,
            })
    }

    fn chilled() -> ConditionDefinition {
        ConditionDefinition::new("CHILLED", 6 * SECOND)
            .max_stacks(5)
            .stacking(StackPolicy::Add)
            .transform(Transformation {
                when: TransformWhen::StacksAtLeast(5),
                into: "FROZEN".into(),
                preserve_stacks: false,
                merge_data: false,
            })
    }

    fn frozen() -> ConditionDefinition {
        ConditionDefinition::new("FROZEN", 3 * SECOND)
            .hook(ConditionHook::Incapacitate)
            .hook(ConditionHook::DamageTaken {
                percent: 50.0,
                per_stack: false,
            })
            .removes("CHILLED")
    }

    #[test]
    fn refresh_keeps_stacks_and_resets_duration() {
        let mut fx = Fixture::new(vec![burning()]);
        fx.apply("BURNING", 1).unwrap();
        fx.advance(2 * SECOND);
        fx.apply("BURNING", 1).unwrap();

        assert_eq!(fx.stacks("BURNING"), 1);
        assert_eq!(fx.conditions.remaining(fx.target, &"BURNING".into()), Some(4 * SECOND));
    }

    #[test]
    fn add_caps_stacks_and_never_shortens() {
        let mut fx = Fixture::new(vec![
            ConditionDefinition::new("POISONED", 5 * SECOND)
                .max_stacks(3)
                .stacking(StackPolicy::Independent),
        ]);
        fx.apply("POISONED", 2).unwrap();
        let target = fx.target;
        fx.with(|c, ctx| {
            c.apply(ctx, target, &"POISONED".into(), 5, Some(SECOND), ConditionData::default())
        })
        .unwrap();

        assert_eq!(fx.stacks("POISONED"), 3);
        assert_eq!(fx.conditions.remaining(target, &"POISONED".into()), Some(5 * SECOND));
    }

    #[test]
    fn late_application_is_not_charged_for_earlier_time() {
        let mut fx = Fixture::new(vec![burning()]);
        fx.now = Timestamp(900);
        fx.apply("BURNING", 1).unwrap();

        // One heartbeat covering the whole second since the previous one.
        fx.now = Timestamp(1_000);
        fx.with(|c, ctx| c.heartbeat(ctx, SECOND));

        let instance = fx.conditions.instance(fx.target, &"BURNING".into()).unwrap();
        assert_eq!(instance.remaining, Duration::from_millis(3_900));
        assert_eq!(instance.tick_in, Some(900.0));
        assert!(fx.deferred.is_empty());
    }

    #[test]
    fn refresh_charges_the_time_since_the_last_heartbeat() {
        let mut fx = Fixture::new(vec![burning()]);
        fx.apply("BURNING", 1).unwrap();
        fx.now = Timestamp(600);
        fx.apply("BURNING", 1).unwrap();

        fx.now = Timestamp(1_000);
        fx.with(|c, ctx| c.heartbeat(ctx, SECOND));

        let instance = fx.conditions.instance(fx.target, &"BURNING".into()).unwrap();
        assert_eq!(instance.remaining, Duration::from_millis(3_600));
        assert_eq!(fx.deferred.len(), 1);
    }

    #[test]
    fn dot_ticks_four_times_over_four_seconds() {
        let mut fx = Fixture::new(vec![burning()]);
        fx.apply("BURNING", 1).unwrap();
        for _ in 0..40 {
            fx.advance(Duration::from_millis(100));
        }

        let ticks = fx
            .deferred
            .iter()
            .filter(|d| matches!(d, Deferred::Effect { .. }))
            .count();
        assert_eq!(ticks, 4);
        assert!(!fx.conditions.has(fx.target, &"BURNING".into()));
    }

    #[test]
    fn expiry_removes_one_stack_then_restarts() {
        let mut fx = Fixture::new(vec![
            ConditionDefinition::new("STACKED", 2 * SECOND)
                .max_stacks(3)
                .stacking(StackPolicy::Add),
        ]);
        fx.apply("STACKED", 3).unwrap();
        fx.advance(2 * SECOND);
        assert_eq!(fx.stacks("STACKED"), 2);
        assert_eq!(fx.conditions.remaining(fx.target, &"STACKED".into()), Some(2 * SECOND));

        fx.advance(2 * SECOND);
        fx.advance(2 * SECOND);
        assert_eq!(fx.stacks("STACKED"), 0);
    }

    #[test]
    fn stale_expiry_timer_is_ignored() {
        let mut fx = Fixture::new(vec![burning()]);
        fx.apply("BURNING", 1).unwrap();
        let (_, first) = fx.timers.pop_due(Timestamp(4_000)).unwrap();
        fx.apply("BURNING", 1).unwrap();

        let TimerTask::ExpireCondition { generation, .. } = first else {
            panic!("expected expiry timer");
        };
        let target = fx.target;
        assert!(!fx.with(|c, ctx| c.expire(ctx, target, &"BURNING".into(), generation)));
        assert_eq!(fx.stacks("BURNING"), 1);
    }

    #[test]
    fn chilled_five_times_becomes_frozen() {
        let mut fx = Fixture::new(vec![chilled(), frozen()]);
        for _ in 0..4 {
            fx.apply("CHILLED", 1).unwrap();
        }
        assert_eq!(fx.stacks("CHILLED"), 4);

        let applied = fx.apply("CHILLED", 1).unwrap();
        assert_eq!(applied.stacks, 5);
        assert_eq!(applied.transformed_into, Some("FROZEN".into()));
        assert!(!fx.conditions.has(fx.target, &"CHILLED".into()));
        assert!(fx.conditions.is_incapacitated(fx.target));
        assert!(fx.deferred.contains(&Deferred::Interrupt(fx.target)));
    }

    #[test]
    fn prevented_conditions_are_rejected() {
        let mut fx = Fixture::new(vec![
            ConditionDefinition::new("IMMUNE", 5 * SECOND).prevents("BURNING"),
            burning(),
        ]);
        fx.apply("IMMUNE", 1).unwrap();
        assert_eq!(
            fx.apply("BURNING", 1),
            Err(ConditionError::Prevented {
                condition: "BURNING".into(),
                by: "IMMUNE".into()
            })
        );
    }

    #[test]
    fn stat_modifier_follows_stacks() {
        let mut fx = Fixture::new(vec![
            ConditionDefinition::new("EMPOWERED", 5 * SECOND)
                .category(ConditionCategory::Buff)
                .max_stacks(3)
                .stacking(StackPolicy::Add)
                .hook(ConditionHook::StatModifier {
                    flat: [(Stat::Power, 5.0)].into(),
                    percent: BTreeMap::new(),
                    per_stack: true,
                }),
        ]);
        let target = fx.target;
        fx.apply("EMPOWERED", 2).unwrap();
        assert_eq!(fx.stats.value(target, Stat::Power), Ok(20.0));

        fx.with(|c, ctx| c.remove(ctx, target, &"EMPOWERED".into(), false)).unwrap();
        assert_eq!(fx.stats.value(target, Stat::Power), Ok(15.0));

        fx.with(|c, ctx| c.cleanse(ctx, target, Some(ConditionCategory::Buff)));
        assert_eq!(fx.stats.value(target, Stat::Power), Ok(10.0));
    }

    #[test]
    fn absorb_depletion_queues_removal() {
        let mut fx = Fixture::new(vec![
            ConditionDefinition::new("SHIELDED", 10 * SECOND)
                .category(ConditionCategory::Buff)
                .inherit("shield", InheritPolicy::Sum)
                .hook(ConditionHook::Absorb { key: "shield".into() }),
        ]);
        let target = fx.target;
        fx.with(|c, ctx| {
            c.apply(
                ctx,
                target,
                &"SHIELDED".into(),
                1,
                None,
                ConditionData::default().with("shield", 20.0),
            )
        })
        .unwrap();

        let mut packet = DamagePacket {
            source: None,
            target,
            amount: 30.0,
            damage_type: DamageType::Physical,
            critical: false,
            periodic: false,
            absorbed: 0.0,
        };
        fx.conditions.intercept_damage(&mut packet, &mut fx.deferred);
        assert_eq!(packet.amount, 10.0);
        assert!(fx.deferred.iter().any(|d| matches!(
            d,
            Deferred::RemoveCondition { condition, .. } if condition.as_str() == "SHIELDED"
        )));
    }

    #[test]
    fn dead_or_missing_targets_are_rejected() {
        let mut fx = Fixture::new(vec![burning()]);
        let target = fx.target;
        fx.registry.set_attribute(target, Stat::Health, 0.0).unwrap();
        assert_eq!(fx.apply("BURNING", 1), Err(ConditionError::TargetDead(target)));

        let result = fx.with(|c, ctx| {
            c.apply(ctx, EntityId(99), &"BURNING".into(), 1, None, ConditionData::default())
        });
        assert_eq!(result, Err(ConditionError::TargetNotFound(EntityId(99))));
        assert_eq!(
            fx.apply("MISSING", 1),
            Err(ConditionError::UnknownCondition("MISSING".into()))
        );
    }
}
