use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, trace};

use super::{ModifierId, ModifierSpec, RatingCurve, Stat, StatModifier};
use crate::config::CombatConfig;
use crate::config::StatConfig;
use crate::entity::EntityId;
use crate::error::{CombatError, ErrorSeverity};
use crate::events::{CombatEvent, EventBus};
use crate::scheduler::{TimerQueue, TimerTask};
use crate::time::Timestamp;

/// Errors from stat lookups and modifier bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StatError {
    #[error("entity {0} has no registered stats")]
    NotRegistered(EntityId),

    #[error("modifier {modifier} not found on entity {entity}")]
    ModifierNotFound {
        entity: EntityId,
        modifier: ModifierId,
    },

    #[error("modifier from '{0}' changes no stats")]
    EmptyModifier(String),
}

impl CombatError for StatError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotRegistered(_) | Self::EmptyModifier(_) => ErrorSeverity::Validation,
            Self::ModifierNotFound { .. } => ErrorSeverity::Recoverable,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotRegistered(_) => "STAT_NOT_REGISTERED",
            Self::ModifierNotFound { .. } => "STAT_MODIFIER_NOT_FOUND",
            Self::EmptyModifier(_) => "STAT_EMPTY_MODIFIER",
        }
    }
}

#[derive(Debug)]
struct StatSheet {
    base: BTreeMap<Stat, f64>,
    level: f64,
    modifiers: BTreeMap<ModifierId, StatModifier>,
    /// Computed values. A missing entry is a dirty stat.
    cache: BTreeMap<Stat, f64>,
}

impl StatSheet {
    fn new() -> Self {
        Self {
            base: BTreeMap::new(),
            level: 1.0,
            modifiers: BTreeMap::new(),
            cache: BTreeMap::new(),
        }
    }

    fn invalidate(&mut self, stat: Stat) {
        self.cache.remove(&stat);
    }

    fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    fn compute(&self, stat: Stat, config: &StatConfig) -> f64 {
        let mut base = self.base.get(&stat).copied().unwrap_or(0.0);
        if config.scales_with_level(stat) {
            base *= 1.0 + (self.level - 1.0) * config.level_scaling;
        }

        let (flat, percent) = self
            .modifiers
            .values()
            .filter(|m| m.touches(stat))
            .fold((0.0, 0.0), |(f, p), m| (f + m.flat_for(stat), p + m.percent_for(stat)));

        (base + flat) * (1.0 + percent / 100.0)
    }
}

/// Per-entity base stats, modifiers and lazily cached final values.
///
/// Each (entity, stat) value is recomputed only after something marked it
/// dirty: a base change, a modifier touching it, or a level change (which
/// dirties every stat of the entity).
#[derive(Debug)]
pub struct StatEngine {
    config: StatConfig,
    base_crit_chance: f64,
    base_crit_multiplier: f64,
    sheets: BTreeMap<EntityId, StatSheet>,
    next_modifier: u64,
    bus: EventBus,
}

impl StatEngine {
    pub fn new(config: &CombatConfig, bus: EventBus) -> Self {
        Self {
            config: config.stats.clone(),
            base_crit_chance: config.damage.base_crit_chance,
            base_crit_multiplier: config.damage.base_crit_multiplier,
            sheets: BTreeMap::new(),
            next_modifier: 0,
            bus,
        }
    }

    fn sheet(&self, id: EntityId) -> Result<&StatSheet, StatError> {
        self.sheets.get(&id).ok_or(StatError::NotRegistered(id))
    }

    fn sheet_mut(&mut self, id: EntityId) -> Result<&mut StatSheet, StatError> {
        self.sheets.get_mut(&id).ok_or(StatError::NotRegistered(id))
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Sets base values, creating the entity's sheet on first use.
    pub fn register_base_stats(&mut self, id: EntityId, stats: impl IntoIterator<Item = (Stat, f64)>) {
        let sheet = self.sheets.entry(id).or_insert_with(StatSheet::new);
        for (stat, value) in stats {
            sheet.base.insert(stat, value);
            sheet.invalidate(stat);
        }
    }

    pub fn is_registered(&self, id: EntityId) -> bool {
        self.sheets.contains_key(&id)
    }

    /// Drops the entity's sheet. Pending expiry timers become no-ops.
    pub fn unregister(&mut self, id: EntityId) -> bool {
        self.sheets.remove(&id).is_some()
    }

    pub fn set_base(&mut self, id: EntityId, stat: Stat, value: f64) -> Result<(), StatError> {
        let sheet = self.sheet_mut(id)?;
        sheet.base.insert(stat, value);
        sheet.invalidate(stat);
        Ok(())
    }

    pub fn base(&self, id: EntityId, stat: Stat) -> Option<f64> {
        self.sheets.get(&id)?.base.get(&stat).copied()
    }

    /// Changes the level used for scaling. Every stat becomes dirty.
    pub fn set_level(&mut self, id: EntityId, level: f64) -> Result<(), StatError> {
        let sheet = self.sheet_mut(id)?;
        sheet.level = level.max(1.0);
        sheet.invalidate_all();
        Ok(())
    }

    pub fn level(&self, id: EntityId) -> f64 {
        self.sheets.get(&id).map_or(1.0, |s| s.level)
    }

    // ========================================================================
    // Modifiers
    // ========================================================================

    /// Applies a modifier and returns its id.
    ///
    /// A modifier with a duration schedules its own removal on `timers`.
    pub fn apply_modifier(
        &mut self,
        id: EntityId,
        spec: ModifierSpec,
        now: Timestamp,
        timers: &mut TimerQueue,
    ) -> Result<ModifierId, StatError> {
        if spec.is_empty() {
            return Err(StatError::EmptyModifier(spec.source));
        }
        if !self.sheets.contains_key(&id) {
            return Err(StatError::NotRegistered(id));
        }

        self.next_modifier += 1;
        let modifier = ModifierId(self.next_modifier);
        let source = spec.source.clone();

        if let Some(duration) = spec.duration {
            timers.schedule(now + duration, TimerTask::ExpireModifier { entity: id, modifier });
        }

        let sheet = self.sheet_mut(id)?;
        for stat in spec.touched() {
            sheet.invalidate(stat);
        }
        sheet.modifiers.insert(modifier, StatModifier { id: modifier, spec });

        trace!(target: "combat::stats", entity = %id, %modifier, %source, "modifier applied");
        self.bus.publish(CombatEvent::ModifierAdded {
            entity: id,
            modifier,
            source,
        });
        Ok(modifier)
    }

    /// Removes a modifier, dirtying every stat it touched.
    pub fn remove_modifier(&mut self, id: EntityId, modifier: ModifierId) -> Result<StatModifier, StatError> {
        let sheet = self.sheet_mut(id)?;
        let removed = sheet
            .modifiers
            .remove(&modifier)
            .ok_or(StatError::ModifierNotFound { entity: id, modifier })?;
        for stat in removed.spec.touched() {
            sheet.invalidate(stat);
        }

        trace!(target: "combat::stats", entity = %id, %modifier, "modifier removed");
        self.bus.publish(CombatEvent::ModifierRemoved {
            entity: id,
            modifier,
            source: removed.spec.source.clone(),
        });
        Ok(removed)
    }

    /// Removes every modifier tagged with `source`. Returns the removed ids.
    pub fn remove_modifiers_by_source(&mut self, id: EntityId, source: &str) -> Vec<ModifierId> {
        let matching: Vec<ModifierId> = self
            .sheets
            .get(&id)
            .map(|s| {
                s.modifiers
                    .values()
                    .filter(|m| m.spec.source == source)
                    .map(|m| m.id)
                    .collect()
            })
            .unwrap_or_default();

        matching
            .into_iter()
            .filter(|m| self.remove_modifier(id, *m).is_ok())
            .collect()
    }

    /// Timer entry point. Already-removed modifiers are ignored.
    pub fn expire_modifier(&mut self, id: EntityId, modifier: ModifierId) -> bool {
        match self.remove_modifier(id, modifier) {
            Ok(_) => true,
            Err(e) => {
                debug!(target: "combat::stats", entity = %id, %modifier, error = %e, "stale modifier expiry");
                false
            }
        }
    }

    pub fn modifiers(&self, id: EntityId) -> impl Iterator<Item = &StatModifier> {
        self.sheets
            .get(&id)
            .into_iter()
            .flat_map(|s| s.modifiers.values())
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Final value of `stat`, recomputed only when dirty.
    pub fn value(&mut self, id: EntityId, stat: Stat) -> Result<f64, StatError> {
        let config = &self.config;
        let sheet = self.sheets.get_mut(&id).ok_or(StatError::NotRegistered(id))?;
        if let Some(cached) = sheet.cache.get(&stat) {
            return Ok(*cached);
        }
        let value = sheet.compute(stat, config);
        sheet.cache.insert(stat, value);
        Ok(value)
    }

    /// Final value without touching the cache.
    pub fn peek(&self, id: EntityId, stat: Stat) -> Result<f64, StatError> {
        let sheet = self.sheet(id)?;
        Ok(sheet
            .cache
            .get(&stat)
            .copied()
            .unwrap_or_else(|| sheet.compute(stat, &self.config)))
    }

    /// Returns true if the value is cached (not dirty).
    pub fn is_cached(&self, id: EntityId, stat: Stat) -> bool {
        self.sheets
            .get(&id)
            .is_some_and(|s| s.cache.contains_key(&stat))
    }

    fn curve(&self, stat: Stat) -> Option<&RatingCurve> {
        match stat {
            Stat::CritRating => Some(&self.config.crit_chance),
            Stat::CritPowerRating => Some(&self.config.crit_power),
            Stat::HasteRating => Some(&self.config.haste),
            _ => None,
        }
    }

    /// Converts a rating stat into a percentage. Non-rating stats yield 0.
    pub fn rating_percent(&mut self, id: EntityId, stat: Stat) -> Result<f64, StatError> {
        let rating = self.value(id, stat)?;
        let level = self.level(id);
        Ok(self.curve(stat).map_or(0.0, |c| c.percent(rating, level)))
    }

    /// Critical chance percent: base chance plus critical rating.
    pub fn crit_chance(&mut self, id: EntityId) -> f64 {
        let bonus = self.rating_percent(id, Stat::CritRating).unwrap_or(0.0);
        self.base_crit_chance + bonus
    }

    /// Critical multiplier: base multiplier plus critical power.
    pub fn crit_multiplier(&mut self, id: EntityId) -> f64 {
        let bonus = self.rating_percent(id, Stat::CritPowerRating).unwrap_or(0.0);
        self.base_crit_multiplier + bonus / 100.0
    }

    /// Periodic tick speed multiplier. Never below 1.
    pub fn tick_rate(&mut self, id: EntityId) -> f64 {
        let haste = self.rating_percent(id, Stat::HasteRating).unwrap_or(0.0);
        (1.0 + haste / 100.0).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const EPS: f64 = 1e-9;

    fn engine() -> (StatEngine, TimerQueue, EntityId) {
        let mut engine = StatEngine::new(&CombatConfig::default(), EventBus::new());
        let id = EntityId(1);
        engine.register_base_stats(id, [(Stat::Power, 100.0), (Stat::MoveSpeed, 5.0)]);
        (engine, TimerQueue::new(), id)
    }

    #[test]
    fn flat_then_percent() {
        let (mut engine, mut timers, id) = engine();
        let spec = ModifierSpec::new("test")
            .flat(Stat::Power, 20.0)
            .percent(Stat::Power, 50.0);
        engine.apply_modifier(id, spec, Timestamp::ZERO, &mut timers).unwrap();

        // (100 + 20) × 1.5
        assert!((engine.value(id, Stat::Power).unwrap() - 180.0).abs() < EPS);
    }

    #[test]
    fn level_scaling_only_hits_whitelisted_stats() {
        let (mut engine, _, id) = engine();
        engine.set_level(id, 11.0).unwrap();

        // 100 × (1 + 10 × 0.1)
        assert!((engine.value(id, Stat::Power).unwrap() - 200.0).abs() < EPS);
        assert!((engine.value(id, Stat::MoveSpeed).unwrap() - 5.0).abs() < EPS);
    }

    #[test]
    fn removal_restores_value_and_dirties_cache() {
        let (mut engine, mut timers, id) = engine();
        let before = engine.value(id, Stat::Power).unwrap();
        assert!(engine.is_cached(id, Stat::Power));

        let modifier = engine
            .apply_modifier(id, ModifierSpec::new("buff").flat(Stat::Power, 7.0), Timestamp::ZERO, &mut timers)
            .unwrap();
        assert!(!engine.is_cached(id, Stat::Power));

        engine.remove_modifier(id, modifier).unwrap();
        assert!((engine.value(id, Stat::Power).unwrap() - before).abs() < EPS);
    }

    #[test]
    fn timed_modifier_schedules_expiry() {
        let (mut engine, mut timers, id) = engine();
        let spec = ModifierSpec::new("potion")
            .flat(Stat::Power, 10.0)
            .lasting(Duration::from_secs(5));
        let modifier = engine.apply_modifier(id, spec, Timestamp(1_000), &mut timers).unwrap();

        assert_eq!(timers.next_deadline(), Some(Timestamp(6_000)));
        let (_, task) = timers.pop_due(Timestamp(6_000)).unwrap();
        assert_eq!(task, TimerTask::ExpireModifier { entity: id, modifier });

        assert!(engine.expire_modifier(id, modifier));
        // Second firing is stale.
        assert!(!engine.expire_modifier(id, modifier));
    }

    #[test]
    fn remove_by_source_only_hits_that_source() {
        let (mut engine, mut timers, id) = engine();
        for source in ["a", "a", "b"] {
            engine
                .apply_modifier(id, ModifierSpec::new(source).flat(Stat::Power, 1.0), Timestamp::ZERO, &mut timers)
                .unwrap();
        }
        assert_eq!(engine.remove_modifiers_by_source(id, "a").len(), 2);
        assert_eq!(engine.modifiers(id).count(), 1);
    }

    #[test]
    fn empty_modifier_is_rejected() {
        let (mut engine, mut timers, id) = engine();
        let err = engine
            .apply_modifier(id, ModifierSpec::new("noop"), Timestamp::ZERO, &mut timers)
            .unwrap_err();
        assert_eq!(err, StatError::EmptyModifier("noop".into()));
    }

    #[test]
    fn tick_rate_never_below_one() {
        let (mut engine, _, id) = engine();
        engine.set_base(id, Stat::HasteRating, -500.0).unwrap();
        assert_eq!(engine.tick_rate(id), 1.0);

        engine.set_base(id, Stat::HasteRating, 100.0).unwrap();
        // 100 rating / 10 per percent = 10% haste
        assert!((engine.tick_rate(id) - 1.1).abs() < EPS);
    }

    #[test]
    fn crit_helpers_add_to_base() {
        let (mut engine, _, id) = engine();
        assert!((engine.crit_chance(id) - 5.0).abs() < EPS);
        assert!((engine.crit_multiplier(id) - 1.5).abs() < EPS);

        engine.set_base(id, Stat::CritRating, 140.0).unwrap();
        engine.set_base(id, Stat::CritPowerRating, 80.0).unwrap();
        assert!((engine.crit_chance(id) - 15.0).abs() < EPS);
        assert!((engine.crit_multiplier(id) - 1.6).abs() < EPS);
    }

    #[test]
    fn unregistered_entity_is_an_error() {
        let (mut engine, _, _) = engine();
        assert_eq!(
            engine.value(EntityId(42), Stat::Power),
            Err(StatError::NotRegistered(EntityId(42)))
        );
    }
}
