//! Property checks for the numeric core.

use std::sync::Arc;
use std::time::Duration;

use combat_core::combat::mitigation;
use combat_core::config::DamageConfig;
use combat_core::scheduler::TimerQueue;
use combat_core::{
    CombatConfig, CombatWorld, ConditionDefinition, DamageEngine, DamageOptions, EffectKind, EffectParams, EntityId,
    EntityKind, EventBus, ManualClock, ModifierSpec, Stat, StatEngine, StackPolicy, Timestamp, WorldRef,
};
use proptest::prelude::*;

fn stat() -> impl Strategy<Value = Stat> {
    prop_oneof![
        Just(Stat::Power),
        Just(Stat::Defense),
        Just(Stat::MaxHealth),
        Just(Stat::HasteRating),
    ]
}

proptest! {
    #[test]
    fn removing_modifiers_restores_values(
        base in 1.0f64..500.0,
        mods in prop::collection::vec((stat(), -50.0f64..50.0, -40.0f64..40.0), 1..8),
    ) {
        let config = CombatConfig::default();
        let mut stats = StatEngine::new(&config, EventBus::new());
        let mut timers = TimerQueue::new();
        let id = EntityId(1);
        stats.register_base_stats(id, [(Stat::Power, base), (Stat::Defense, base), (Stat::MaxHealth, base), (Stat::HasteRating, base)]);

        let before: Vec<f64> = [Stat::Power, Stat::Defense, Stat::MaxHealth, Stat::HasteRating]
            .into_iter()
            .map(|s| stats.value(id, s).unwrap())
            .collect();

        let mut applied = Vec::new();
        for (i, (stat, flat, percent)) in mods.into_iter().enumerate() {
            let spec = ModifierSpec::new(format!("prop:{i}")).flat(stat, flat).percent(stat, percent);
            applied.push(stats.apply_modifier(id, spec, Timestamp(0), &mut timers).unwrap());
        }
        for modifier in applied.into_iter().rev() {
            stats.remove_modifier(id, modifier).unwrap();
        }

        let after: Vec<f64> = [Stat::Power, Stat::Defense, Stat::MaxHealth, Stat::HasteRating]
            .into_iter()
            .map(|s| stats.value(id, s).unwrap())
            .collect();
        for (b, a) in before.iter().zip(&after) {
            prop_assert!((b - a).abs() < 1e-9, "{b} != {a}");
        }
    }

    #[test]
    fn stacks_stay_within_bounds(applications in prop::collection::vec(1u32..10, 1..20)) {
        let clock = Arc::new(ManualClock::new());
        let mut world = CombatWorld::new(CombatConfig::default(), clock);
        world
            .register_condition(
                ConditionDefinition::new("SUNDERED", Duration::from_secs(10))
                    .max_stacks(4)
                    .stacking(StackPolicy::Add),
            )
            .unwrap();
        let target = world.spawn(EntityKind::Npc, WorldRef::default(), [(Stat::MaxHealth, 100.0)], [(Stat::Level, 1.0)]);

        for stacks in applications {
            let params = EffectParams::new(target).condition("SUNDERED").stacks(stacks);
            world.execute_effect(EffectKind::ApplyCondition, params).unwrap();
            let held = world.conditions().stacks(target, &"SUNDERED".into());
            prop_assert!((1..=4).contains(&held));
        }
    }

    #[test]
    fn mitigation_is_monotone_and_capped(a in 0.0f64..10_000.0, b in 0.0f64..10_000.0, level in 1.0f64..60.0) {
        let config = DamageConfig::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let m_low = mitigation(low, level, level, &config);
        let m_high = mitigation(high, level, level, &config);
        prop_assert!(m_low <= m_high);
        prop_assert!((0.0..=config.mitigation_cap).contains(&m_high));
    }

    #[test]
    fn damage_is_at_least_one_unless_ignorable(
        base in 0.01f64..1_000.0,
        defense in 0.0f64..5_000.0,
        power in 0.0f64..200.0,
        ignorable in any::<bool>(),
    ) {
        let config = CombatConfig::default();
        let bus = EventBus::new();
        let mut stats = StatEngine::new(&config, bus.clone());
        let mut engine = DamageEngine::new(&config, bus);
        let (source, target) = (EntityId(1), EntityId(2));
        stats.register_base_stats(source, [(Stat::Power, power)]);
        stats.register_base_stats(target, [(Stat::Defense, defense)]);

        let options = DamageOptions {
            force_crit: Some(false),
            ignorable,
            ..DamageOptions::default()
        };
        let breakdown = engine.calculate(&mut stats, Some(source), target, base, options);
        prop_assert!(breakdown.amount >= 0.0);
        prop_assert_eq!(breakdown.amount, breakdown.amount.round());
        if !ignorable {
            prop_assert!(breakdown.amount >= 1.0);
        }
    }
}
