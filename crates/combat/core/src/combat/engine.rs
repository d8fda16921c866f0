use std::collections::VecDeque;

use tracing::trace;

use super::{
    DamageBreakdown, DamageError, DamageOptions, DamagePacket, DamageRequest, HealBreakdown, HealPacket,
    HealRequest,
};
use crate::condition::{ConditionManager, Deferred};
use crate::config::{CombatConfig, DamageConfig};
use crate::entity::{EntityId, EntityRegistry};
use crate::events::{CombatEvent, DamageEvent, EventBus, HealEvent};
use crate::rng::{PcgRng, RngOracle, compute_seed};
use crate::stats::{Stat, StatEngine};

/// Level difference multiplier, clamped to `1 ± level_max`.
pub fn level_factor(source_level: f64, target_level: f64, coefficient: f64, level_max: f64) -> f64 {
    (1.0 + (source_level - target_level) * coefficient).clamp(1.0 - level_max, 1.0 + level_max)
}

/// Fraction of damage removed by `defense`.
///
/// Defense is boosted when the target outlevels the source; the result
/// never exceeds the configured cap.
///
/// ```
/// # use combat_core::combat::mitigation;
/// # use combat_core::config::DamageConfig;
/// let config = DamageConfig::default();
/// assert_eq!(mitigation(150.0, 1.0, 1.0, &config), 0.75);
/// ```
pub fn mitigation(defense: f64, source_level: f64, target_level: f64, config: &DamageConfig) -> f64 {
    if defense <= 0.0 {
        return 0.0;
    }
    let mut defense = defense;
    if target_level > source_level {
        defense *= 1.0 + (target_level - source_level) * config.outlevel_defense_bonus;
    }
    let raw = defense / (defense + config.armor_base * target_level.max(1.0));
    raw.min(config.mitigation_cap)
}

fn finish(raw: f64, ignorable: bool) -> f64 {
    let rounded = raw.max(0.0).round();
    if ignorable { rounded } else { rounded.max(1.0) }
}

/// Borrowed systems a damage or heal application touches.
pub struct DamageContext<'a> {
    pub registry: &'a mut EntityRegistry,
    pub stats: &'a mut StatEngine,
    pub conditions: &'a mut ConditionManager,
    pub deferred: &'a mut VecDeque<Deferred>,
}

/// Resolves damage and healing numbers and applies them to health.
pub struct DamageEngine {
    config: DamageConfig,
    world_seed: u64,
    nonce: u64,
    rng: Box<dyn RngOracle>,
    bus: EventBus,
}

impl DamageEngine {
    pub fn new(config: &CombatConfig, bus: EventBus) -> Self {
        Self::with_rng(config, bus, Box::new(PcgRng))
    }

    pub fn with_rng(config: &CombatConfig, bus: EventBus, rng: Box<dyn RngOracle>) -> Self {
        Self {
            config: config.damage.clone(),
            world_seed: config.world.seed,
            nonce: 0,
            rng,
            bus,
        }
    }

    pub fn config(&self) -> &DamageConfig {
        &self.config
    }

    fn roll_crit(
        &mut self,
        stats: &mut StatEngine,
        source: Option<EntityId>,
        target: EntityId,
        options: &DamageOptions,
    ) -> (bool, f64) {
        let Some(source) = source else {
            return (options.force_crit.unwrap_or(false), self.config.base_crit_multiplier);
        };
        let multiplier = stats.crit_multiplier(source);

        if let Some(forced) = options.force_crit {
            return (forced, multiplier);
        }
        if options.periodic {
            return (false, multiplier);
        }

        let chance = stats.crit_chance(source);
        self.nonce += 1;
        let seed = compute_seed(self.world_seed, self.nonce, source.as_u32(), target.as_u32());
        (self.rng.roll_percent(seed, chance), multiplier)
    }

    fn power_multiplier(&self, stats: &mut StatEngine, source: Option<EntityId>) -> f64 {
        let power = source
            .and_then(|s| stats.value(s, Stat::Power).ok())
            .unwrap_or(0.0);
        1.0 + power * self.config.power_coefficient
    }

    /// Damage breakdown for `base` from `source` against `target`.
    ///
    /// Without a source the level factor is neutral and power is zero.
    pub fn calculate(
        &mut self,
        stats: &mut StatEngine,
        source: Option<EntityId>,
        target: EntityId,
        base: f64,
        options: DamageOptions,
    ) -> DamageBreakdown {
        let target_level = stats.level(target);
        let source_level = source.map_or(target_level, |s| stats.level(s));

        let power_multiplier = self.power_multiplier(stats, source);
        let level_factor = level_factor(
            source_level,
            target_level,
            self.config.level_coefficient,
            self.config.level_max,
        );
        let (critical, crit) = self.roll_crit(stats, source, target, &options);
        let crit_multiplier = if critical { crit } else { 1.0 };

        let mitigation = if options.damage_type.bypasses_mitigation() {
            0.0
        } else {
            let defense = stats.value(target, Stat::Defense).unwrap_or(0.0);
            mitigation(defense, source_level, target_level, &self.config)
        };

        let raw = base * power_multiplier * level_factor * crit_multiplier * (1.0 - mitigation);
        DamageBreakdown {
            base,
            power_multiplier,
            level_factor,
            critical,
            crit_multiplier,
            mitigation,
            damage_type: options.damage_type,
            amount: finish(raw, options.ignorable),
        }
    }

    /// Heal breakdown: half the level coefficient, no mitigation.
    pub fn calculate_heal(
        &mut self,
        stats: &mut StatEngine,
        source: Option<EntityId>,
        target: EntityId,
        base: f64,
        options: DamageOptions,
    ) -> HealBreakdown {
        let target_level = stats.level(target);
        let source_level = source.map_or(target_level, |s| stats.level(s));

        let power_multiplier = self.power_multiplier(stats, source);
        let level_factor = level_factor(
            source_level,
            target_level,
            self.config.level_coefficient * 0.5,
            self.config.level_max,
        );
        let (critical, crit) = self.roll_crit(stats, source, target, &options);
        let crit_multiplier = if critical { crit } else { 1.0 };

        let raw = base * power_multiplier * level_factor * crit_multiplier;
        HealBreakdown {
            base,
            power_multiplier,
            level_factor,
            critical,
            crit_multiplier,
            amount: finish(raw, options.ignorable),
        }
    }

    fn check_target(registry: &EntityRegistry, target: EntityId) -> Result<(), DamageError> {
        if !registry.contains(target) {
            return Err(DamageError::TargetNotFound(target));
        }
        if !registry.is_alive(target) {
            return Err(DamageError::TargetDead(target));
        }
        Ok(())
    }

    fn max_health(ctx: &mut DamageContext<'_>, target: EntityId) -> f64 {
        ctx.stats
            .value(target, Stat::MaxHealth)
            .ok()
            .filter(|v| *v > 0.0)
            .or_else(|| ctx.registry.get_attribute(target, Stat::MaxHealth).ok())
            .unwrap_or(f64::INFINITY)
    }

    /// Applies damage: breakdown, interception, health clamp, event.
    ///
    /// A killing blow is reported on the event; the registry signals death.
    pub fn apply_damage(
        &mut self,
        ctx: &mut DamageContext<'_>,
        request: DamageRequest,
    ) -> Result<DamageEvent, DamageError> {
        Self::check_target(ctx.registry, request.target)?;
        let health = ctx.registry.get_attribute(request.target, Stat::Health)?;

        let breakdown = match request.breakdown {
            Some(breakdown) => breakdown,
            None => self.calculate(ctx.stats, request.source, request.target, request.base, request.options),
        };

        let mut packet = DamagePacket {
            source: request.source,
            target: request.target,
            amount: breakdown.amount,
            damage_type: breakdown.damage_type,
            critical: breakdown.critical,
            periodic: request.options.periodic,
            absorbed: 0.0,
        };
        ctx.conditions.intercept_damage(&mut packet, ctx.deferred);
        let amount = packet.amount.max(0.0).round();

        let max = Self::max_health(ctx, request.target);
        let new = (health - amount).clamp(0.0, max.max(0.0));
        ctx.registry.set_attribute(request.target, Stat::Health, new)?;

        let event = DamageEvent {
            source: request.source,
            target: request.target,
            amount,
            absorbed: packet.absorbed,
            damage_type: packet.damage_type,
            critical: packet.critical,
            killing_blow: health > 0.0 && new <= 0.0,
            periodic: packet.periodic,
        };
        trace!(
            target: "combat::damage",
            target_entity = %event.target,
            amount = event.amount,
            critical = event.critical,
            "damage applied"
        );
        self.bus.publish(CombatEvent::DamageDealt(event.clone()));
        Ok(event)
    }

    /// Applies healing: breakdown, interception, clamp to max, event.
    pub fn apply_heal(&mut self, ctx: &mut DamageContext<'_>, request: HealRequest) -> Result<HealEvent, DamageError> {
        Self::check_target(ctx.registry, request.target)?;
        let health = ctx.registry.get_attribute(request.target, Stat::Health)?;

        let breakdown = match request.breakdown {
            Some(breakdown) => breakdown,
            None => self.calculate_heal(ctx.stats, request.source, request.target, request.base, request.options),
        };

        let mut packet = HealPacket {
            source: request.source,
            target: request.target,
            amount: breakdown.amount,
            critical: breakdown.critical,
            periodic: request.options.periodic,
        };
        ctx.conditions.intercept_heal(&mut packet);
        let amount = packet.amount.max(0.0).round();

        let max = Self::max_health(ctx, request.target);
        let new = (health + amount).min(max).max(health.min(max));
        ctx.registry.set_attribute(request.target, Stat::Health, new)?;

        let gained = (new - health).max(0.0);
        let event = HealEvent {
            source: request.source,
            target: request.target,
            amount: gained,
            overheal: (amount - gained).max(0.0),
            critical: packet.critical,
            periodic: packet.periodic,
        };
        trace!(target: "combat::damage", target_entity = %event.target, amount = event.amount, "heal applied");
        self.bus.publish(CombatEvent::HealingApplied(event.clone()));
        Ok(event)
    }
}

impl std::fmt::Debug for DamageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DamageEngine")
            .field("config", &self.config)
            .field("world_seed", &self.world_seed)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}
