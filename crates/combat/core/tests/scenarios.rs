//! End-to-end combat scenarios driven through `CombatWorld` with a manual
//! clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use combat_core::ability::{AbilityTarget, ChainInfo};
use combat_core::condition::{ConditionHook, InheritPolicy, StackPolicy, TransformWhen, Transformation};
use combat_core::{
    AbilityDefinition, AbilityError, AbilityId, AbilityPhase, CombatConfig, CombatEvent, CombatWorld, ConditionData,
    ConditionDefinition, DamageType, EffectDescriptor, EffectKind, EffectOutcome, EffectParams, EntityId, EntityKind,
    ManualClock, RequestOutcome, RngOracle, Shape, Stat, TargetingSpec, TeamId, Timestamp, WorldRef,
};
use glam::Vec3;

const SECOND: Duration = Duration::from_secs(1);

/// Rolls that never land a critical strike.
struct NeverCrit;

impl RngOracle for NeverCrit {
    fn next_u32(&self, _seed: u64) -> u32 {
        u32::MAX
    }
}

fn conditions() -> Vec<ConditionDefinition> {
    vec![
        ConditionDefinition::new("BURNING", 4 * SECOND)
            .max_stacks(5)
            .ticking(SECOND)
            .hook(ConditionHook::PeriodicDamage {
                amount: 5.0,
                damage_type: DamageType::Fire,
                per_stack: true,
            }),
        ConditionDefinition::new("CHILLED", 6 * SECOND)
            .max_stacks(5)
            .stacking(StackPolicy::Add)
            .transform(Transformation {
                when: TransformWhen::StacksAtLeast(5),
                into: "FROZEN".into(),
                preserve_stacks: false,
                merge_data: false,
            }),
        ConditionDefinition::new("FROZEN", 3 * SECOND)
            .hook(ConditionHook::Incapacitate)
            .hook(ConditionHook::DamageTaken {
                percent: 50.0,
                per_stack: false,
            }),
        ConditionDefinition::new("SHIELDED", 10 * SECOND)
            .inherit("shield", InheritPolicy::Sum)
            .hook(ConditionHook::Absorb { key: "shield".into() }),
    ]
}

fn damage(amount: f64) -> EffectDescriptor {
    EffectDescriptor::new(
        EffectKind::Damage,
        EffectParams::default().amount(amount).force_crit(false),
    )
}

fn abilities() -> Vec<AbilityDefinition> {
    let strike = |n: u32, next: Option<&str>| {
        AbilityDefinition::new(format!("strike_{n}"))
            .targeting(TargetingSpec::area(Shape::Sphere, 6.0))
            .effect(damage(5.0))
            .chain(ChainInfo {
                chain: "combo".into(),
                position: n,
                next: next.map(AbilityId::from),
                timeout: 2 * SECOND,
            })
    };

    vec![
        AbilityDefinition::new("fire_bolt")
            .cast_time(Duration::from_millis(1_500))
            .cooldown(5 * SECOND)
            .cost(20.0)
            .targeting(TargetingSpec::area(Shape::Ray { radius: 1.0 }, 30.0))
            .effect(damage(50.0)),
        AbilityDefinition::new("meteor")
            .cast_time(3 * SECOND)
            .cooldown(20 * SECOND)
            .uninterruptible()
            .targeting(TargetingSpec::area(Shape::Sphere, 4.0).from_point())
            .effect(damage(40.0)),
        AbilityDefinition::new("cleave")
            .cooldown(3 * SECOND)
            .cooldown_category("melee")
            .targeting(TargetingSpec::area(Shape::Cone { half_angle: 60.0 }, 8.0))
            .effect(damage(10.0)),
        AbilityDefinition::new("bash")
            .cooldown(2 * SECOND)
            .cooldown_category("melee")
            .targeting(TargetingSpec::area(Shape::Sphere, 6.0))
            .effect(damage(5.0)),
        AbilityDefinition::new("mend")
            .cast_time(2 * SECOND)
            .cooldown(8 * SECOND)
            .effect(EffectDescriptor::new(EffectKind::Heal, EffectParams::default().amount(30.0))),
        strike(1, Some("strike_2")),
        strike(2, Some("strike_3")),
        strike(3, None),
    ]
}

struct Arena {
    clock: Arc<ManualClock>,
    world: CombatWorld,
    events: Arc<Mutex<Vec<CombatEvent>>>,
    hero: EntityId,
    ogre: EntityId,
    imp: EntityId,
}

impl Arena {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let mut world = CombatWorld::with_rng(CombatConfig::default(), clock.clone(), Box::new(NeverCrit));
        for def in conditions() {
            world.register_condition(def).unwrap();
        }
        for def in abilities() {
            world.register_ability(def).unwrap();
        }

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        world.bus().subscribe_all(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });

        let hero = world.spawn(
            EntityKind::Player,
            WorldRef::new(Vec3::ZERO, TeamId(1)),
            [(Stat::Power, 20.0), (Stat::MaxHealth, 300.0), (Stat::MaxResource, 100.0)],
            [(Stat::Level, 1.0)],
        );
        let ogre = world.spawn(
            EntityKind::Npc,
            WorldRef::new(Vec3::new(0.0, 0.0, 5.0), TeamId(2)),
            [(Stat::Defense, 10.0), (Stat::MaxHealth, 200.0)],
            [(Stat::Level, 1.0)],
        );
        let imp = world.spawn(
            EntityKind::Npc,
            WorldRef::new(Vec3::new(0.0, 0.0, -5.0), TeamId(2)),
            [(Stat::MaxHealth, 50.0)],
            [(Stat::Level, 1.0)],
        );

        for ability in ["fire_bolt", "meteor", "cleave", "bash", "strike_1", "strike_2", "strike_3"] {
            world.grant(hero, &ability.into()).unwrap();
        }
        world.grant(ogre, &"mend".into()).unwrap();

        Self {
            clock,
            world,
            events,
            hero,
            ogre,
            imp,
        }
    }

    /// Advances the clock in `step_ms` slices, updating after each.
    fn run(&mut self, total_ms: u64, step_ms: u64) {
        let mut elapsed = 0;
        while elapsed < total_ms {
            self.clock.advance(Duration::from_millis(step_ms));
            self.world.update();
            elapsed += step_ms;
        }
    }

    fn health(&self, id: EntityId) -> f64 {
        self.world.registry().get_attribute(id, Stat::Health).unwrap()
    }

    fn count(&self, pred: impl Fn(&CombatEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn apply(&mut self, condition: &str, target: EntityId) -> EffectOutcome {
        let params = EffectParams::new(target).source(self.hero).condition(condition);
        self.world.execute_effect(EffectKind::ApplyCondition, params).unwrap()
    }

    fn request(&mut self, entity: EntityId, ability: &str, target: AbilityTarget) -> Result<RequestOutcome, AbilityError> {
        self.world.request_ability(entity, &ability.into(), target)
    }
}

#[test]
fn reference_hit_deals_fifty() {
    let mut arena = Arena::new();
    let params = EffectParams::new(arena.ogre)
        .source(arena.hero)
        .amount(50.0)
        .force_crit(false);
    let outcome = arena.world.execute_effect(EffectKind::Damage, params).unwrap();

    assert_eq!(
        outcome,
        EffectOutcome::Damage {
            amount: 50.0,
            absorbed: 0.0,
            critical: false,
            killing_blow: false,
        }
    );
    assert_eq!(arena.health(arena.ogre), 150.0);
}

#[test]
fn spawn_fills_pools_from_maxima() {
    let arena = Arena::new();
    assert_eq!(arena.health(arena.hero), 300.0);
    assert_eq!(
        arena.world.registry().get_attribute(arena.hero, Stat::Resource),
        Ok(100.0)
    );
}

#[test]
fn burning_twice_refreshes_to_one_stack() {
    let mut arena = Arena::new();
    let ogre = arena.ogre;
    arena.apply("BURNING", ogre);
    arena.run(2_000, 100);
    arena.apply("BURNING", ogre);

    let conditions = arena.world.conditions();
    assert_eq!(conditions.stacks(ogre, &"BURNING".into()), 1);
    assert_eq!(conditions.remaining(ogre, &"BURNING".into()), Some(4 * SECOND));
}

#[test]
fn burning_ticks_four_times_then_expires() {
    let mut arena = Arena::new();
    let ogre = arena.ogre;
    arena.apply("BURNING", ogre);
    arena.run(4_000, 100);

    let ticks = arena.count(|e| matches!(e, CombatEvent::DamageDealt(d) if d.periodic));
    assert_eq!(ticks, 4);
    assert_eq!(arena.health(ogre), 180.0);
    assert!(!arena.world.conditions().has(ogre, &"BURNING".into()));
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::ConditionRemoved { .. })), 1);
}

#[test]
fn chilled_five_times_freezes_and_interrupts() {
    let mut arena = Arena::new();
    let ogre = arena.ogre;
    assert!(matches!(
        arena.request(ogre, "mend", AbilityTarget::default()),
        Ok(RequestOutcome::CastStarted { .. })
    ));

    for _ in 0..4 {
        arena.apply("CHILLED", ogre);
    }
    assert_eq!(arena.world.conditions().stacks(ogre, &"CHILLED".into()), 4);

    let outcome = arena.apply("CHILLED", ogre);
    assert_eq!(
        outcome,
        EffectOutcome::ConditionApplied {
            condition: "CHILLED".into(),
            stacks: 5,
            transformed_into: Some("FROZEN".into()),
        }
    );
    assert!(arena.world.conditions().has(ogre, &"FROZEN".into()));
    assert!(!arena.world.conditions().has(ogre, &"CHILLED".into()));
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::ConditionTransformed { .. })), 1);

    // Frozen interrupts the cast with the shorter interrupt cooldown.
    let mend = AbilityId::from("mend");
    let now = arena.world.now();
    assert!(arena.world.abilities().active_cast(ogre).is_none());
    assert_eq!(arena.world.abilities().phase(ogre, &mend, now), AbilityPhase::Interrupted);
    assert_eq!(arena.world.abilities().cooldown_remaining(ogre, &mend, now), SECOND);

    arena.run(1_000, 100);
    assert_eq!(
        arena.request(ogre, "mend", AbilityTarget::default()),
        Err(AbilityError::Incapacitated(ogre))
    );
}

#[test]
fn frozen_targets_take_more_damage() {
    let mut arena = Arena::new();
    let ogre = arena.ogre;
    arena.apply("FROZEN", ogre);

    let params = EffectParams::new(ogre)
        .source(arena.hero)
        .amount(50.0)
        .force_crit(false);
    let outcome = arena.world.execute_effect(EffectKind::Damage, params).unwrap();
    assert!(matches!(outcome, EffectOutcome::Damage { amount, .. } if amount == 75.0));
}

#[test]
fn cast_completes_on_its_timer() {
    let mut arena = Arena::new();
    let (hero, ogre) = (arena.hero, arena.ogre);

    let outcome = arena.request(hero, "fire_bolt", AbilityTarget::direction(Vec3::Z)).unwrap();
    assert_eq!(
        outcome,
        RequestOutcome::CastStarted {
            ends_at: Timestamp(1_500)
        }
    );
    assert_eq!(arena.world.registry().get_attribute(hero, Stat::Resource), Ok(80.0));
    assert_eq!(arena.health(ogre), 200.0);

    arena.run(1_500, 250);

    assert_eq!(arena.count(|e| matches!(e, CombatEvent::CastProgress { .. })), 5);
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::CastCompleted { .. })), 1);
    let executed: Vec<Vec<EntityId>> = arena
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            CombatEvent::AbilityExecuted(x) => Some(x.targets.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(executed, vec![vec![ogre]]);
    assert_eq!(arena.health(ogre), 150.0);

    let now = arena.world.now();
    assert_eq!(
        arena.world.abilities().cooldown_remaining(hero, &"fire_bolt".into(), now),
        5 * SECOND
    );
    assert!(matches!(
        arena.request(hero, "fire_bolt", AbilityTarget::direction(Vec3::Z)),
        Err(AbilityError::OnCooldown { .. })
    ));
}

#[test]
fn new_request_interrupts_interruptible_cast() {
    let mut arena = Arena::new();
    let hero = arena.hero;
    arena.request(hero, "fire_bolt", AbilityTarget::direction(Vec3::Z)).unwrap();
    arena.run(500, 250);

    let outcome = arena.request(hero, "cleave", AbilityTarget::direction(Vec3::Z)).unwrap();
    assert!(matches!(outcome, RequestOutcome::Executed(_)));

    let bolt = AbilityId::from("fire_bolt");
    let now = arena.world.now();
    assert_eq!(arena.world.abilities().phase(hero, &bolt, now), AbilityPhase::Interrupted);
    assert!(arena.world.abilities().cooldown_remaining(hero, &bolt, now) < 5 * SECOND);

    // The stale completion timer does nothing.
    arena.run(2_000, 250);
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::CastCompleted { .. })), 0);
}

#[test]
fn uninterruptible_cast_rejects_requests() {
    let mut arena = Arena::new();
    let (hero, ogre) = (arena.hero, arena.ogre);
    let point = Vec3::new(0.0, 0.0, 5.0);
    arena.request(hero, "meteor", AbilityTarget::point(point)).unwrap();

    assert_eq!(
        arena.request(hero, "cleave", AbilityTarget::default()),
        Err(AbilityError::CastInProgress {
            entity: hero,
            ability: "meteor".into()
        })
    );
    assert_eq!(
        arena.world.interrupt(hero),
        Err(AbilityError::NotInterruptible {
            ability: "meteor".into()
        })
    );

    arena.run(3_000, 100);
    // Meteor lands around the point: only the ogre is within 4 units.
    assert_eq!(arena.health(ogre), 160.0);
    assert_eq!(arena.health(arena.imp), 50.0);
}

#[test]
fn cone_hits_only_what_is_in_front() {
    let mut arena = Arena::new();
    let (hero, ogre) = (arena.hero, arena.ogre);
    let RequestOutcome::Executed(execution) = arena
        .request(hero, "cleave", AbilityTarget::direction(Vec3::Z))
        .unwrap()
    else {
        panic!("cleave is instant");
    };
    assert_eq!(execution.targets, vec![ogre]);
    assert_eq!(arena.health(arena.imp), 50.0);
}

#[test]
fn cooldown_category_is_shared() {
    let mut arena = Arena::new();
    let hero = arena.hero;
    arena.request(hero, "cleave", AbilityTarget::default()).unwrap();

    let err = arena.request(hero, "bash", AbilityTarget::default()).unwrap_err();
    assert_eq!(
        err,
        AbilityError::OnCooldown {
            ability: "bash".into(),
            remaining: 3 * SECOND
        }
    );
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::CooldownStarted { .. })), 2);
}

#[test]
fn insufficient_resource_reserves_nothing() {
    let mut arena = Arena::new();
    let hero = arena.hero;
    arena.world.set_attribute(hero, Stat::Resource, 10.0).unwrap();

    assert_eq!(
        arena.request(hero, "fire_bolt", AbilityTarget::direction(Vec3::Z)),
        Err(AbilityError::InsufficientResource {
            required: 20.0,
            available: 10.0
        })
    );
    assert_eq!(arena.world.registry().get_attribute(hero, Stat::Resource), Ok(10.0));
    assert!(arena.world.abilities().active_cast(hero).is_none());
}

#[test]
fn chain_steps_must_follow_in_order() {
    let mut arena = Arena::new();
    let hero = arena.hero;
    arena.request(hero, "strike_1", AbilityTarget::default()).unwrap();
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::NextAbilityReady { .. })), 1);

    assert_eq!(
        arena.request(hero, "strike_3", AbilityTarget::default()),
        Err(AbilityError::ChainOutOfOrder {
            chain: "combo".into(),
            ability: "strike_3".into()
        })
    );

    let RequestOutcome::Executed(second) = arena.request(hero, "strike_2", AbilityTarget::default()).unwrap() else {
        panic!("strike_2 is instant");
    };
    assert_eq!(second.chain.as_ref().map(|c| c.position), Some(2));

    arena.run(2_500, 100);
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::ChainExpired { .. })), 1);
    assert_eq!(
        arena.request(hero, "strike_3", AbilityTarget::default()),
        Err(AbilityError::ChainNotStarted { chain: "combo".into() })
    );
}

#[test]
fn chain_window_is_checked_against_the_clock() {
    let mut arena = Arena::new();
    let hero = arena.hero;
    arena.request(hero, "strike_1", AbilityTarget::default()).unwrap();

    // No update: the timeout timer has not fired yet.
    arena.clock.advance(3 * SECOND);
    assert_eq!(
        arena.request(hero, "strike_2", AbilityTarget::default()),
        Err(AbilityError::ChainExpired { chain: "combo".into() })
    );
}

#[test]
fn shield_absorbs_then_breaks() {
    let mut arena = Arena::new();
    let hero = arena.hero;
    let params = EffectParams::new(hero)
        .condition("SHIELDED")
        .data(ConditionData::default().with("shield", 30.0));
    arena.world.execute_effect(EffectKind::ApplyCondition, params).unwrap();

    let hit = EffectParams::new(hero).amount(50.0).damage_type(DamageType::True);
    let outcome = arena.world.execute_effect(EffectKind::Damage, hit).unwrap();

    assert_eq!(
        outcome,
        EffectOutcome::Damage {
            amount: 20.0,
            absorbed: 30.0,
            critical: false,
            killing_blow: false,
        }
    );
    assert_eq!(arena.health(hero), 280.0);
    assert!(!arena.world.conditions().has(hero, &"SHIELDED".into()));
}

#[test]
fn killing_blow_and_death() {
    let mut arena = Arena::new();
    let imp = arena.imp;
    let hit = EffectParams::new(imp)
        .source(arena.hero)
        .amount(500.0)
        .force_crit(false);
    let outcome = arena.world.execute_effect(EffectKind::Damage, hit.clone()).unwrap();

    assert!(matches!(outcome, EffectOutcome::Damage { killing_blow: true, .. }));
    assert_eq!(arena.health(imp), 0.0);
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::EntityDied { entity } if *entity == imp)), 1);
    assert!(arena.world.execute_effect(EffectKind::Damage, hit).is_err());
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::EffectFailed { .. })), 1);
}

#[test]
fn despawn_strips_conditions() {
    let mut arena = Arena::new();
    let ogre = arena.ogre;
    arena.apply("BURNING", ogre);
    arena.world.despawn(ogre).unwrap();

    assert!(!arena.world.registry().contains(ogre));
    assert!(!arena.world.conditions().has(ogre, &"BURNING".into()));
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::ConditionRemoved { .. })), 1);
    // The expiry timer for the removed instance is stale.
    arena.run(5_000, 500);
}

#[test]
fn condition_applied_between_updates_keeps_its_full_duration() {
    let mut arena = Arena::new();
    let ogre = arena.ogre;
    arena.world.update();
    arena.clock.advance(Duration::from_millis(900));
    arena.apply("BURNING", ogre);
    arena.clock.advance(Duration::from_millis(100));
    arena.world.update();

    assert_eq!(arena.health(ogre), 200.0);
    assert_eq!(
        arena.world.conditions().remaining(ogre, &"BURNING".into()),
        Some(Duration::from_millis(3_900))
    );

    arena.run(4_000, 100);
    assert_eq!(arena.health(ogre), 180.0);
    assert!(!arena.world.conditions().has(ogre, &"BURNING".into()));
}

#[test]
fn panicking_subscriber_does_not_break_resolution() {
    let mut arena = Arena::new();
    arena.world.bus().subscribe_all(|_| panic!("listener bug"));

    let params = EffectParams::new(arena.ogre)
        .source(arena.hero)
        .amount(50.0)
        .force_crit(false);
    arena.world.execute_effect(EffectKind::Damage, params).unwrap();

    assert_eq!(arena.health(arena.ogre), 150.0);
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::DamageDealt(_))), 1);
}

#[test]
fn caster_death_ends_the_cast() {
    let mut arena = Arena::new();
    let (hero, ogre) = (arena.hero, arena.ogre);
    arena.request(hero, "fire_bolt", AbilityTarget::direction(Vec3::Z)).unwrap();

    let lethal = EffectParams::new(hero).source(ogre).amount(1_000.0).force_crit(false);
    arena.world.execute_effect(EffectKind::Damage, lethal).unwrap();
    arena.run(1_500, 250);

    assert_eq!(
        arena.count(|e| matches!(
            e,
            CombatEvent::CastInterrupted { entity, cooldown, .. } if *entity == hero && cooldown.is_zero()
        )),
        1
    );
    assert_eq!(arena.count(|e| matches!(e, CombatEvent::CastCompleted { .. })), 0);
    assert_eq!(arena.health(ogre), 200.0);
}

#[test]
fn level_attribute_is_mirrored_into_stats() {
    let mut arena = Arena::new();
    let hero = arena.hero;
    arena.world.set_attribute(hero, Stat::Level, 5.0).unwrap();
    assert_eq!(arena.world.stats().level(hero), 5.0);

    let imp = arena.imp;
    arena.world.despawn(imp).unwrap();
    assert!(arena.world.set_attribute(imp, Stat::Level, 3.0).is_err());
    assert_eq!(arena.world.stats().level(imp), 1.0);
}
