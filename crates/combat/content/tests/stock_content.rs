//! Stock content installed into a live world.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use combat_content::{AbilityCatalog, ConditionCatalog, ConfigLoader};
use combat_core::{
    AbilityError, AbilityTarget, CombatWorld, EntityId, EntityKind, ManualClock, RequestOutcome, Stat, TeamId, WorldRef,
};
use glam::Vec3;

struct Encounter {
    clock: Arc<ManualClock>,
    world: CombatWorld,
    mage: EntityId,
    golem: EntityId,
}

impl Encounter {
    fn new() -> Self {
        let config = ConfigLoader::embedded().unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut world = CombatWorld::new(config, clock.clone());

        ConditionCatalog::load().unwrap().install(&mut world).unwrap();
        let abilities = AbilityCatalog::load().unwrap();
        abilities.install(&mut world).unwrap();

        let mage = world.spawn(
            EntityKind::Player,
            WorldRef::new(Vec3::ZERO, TeamId(1)),
            [(Stat::MaxHealth, 200.0), (Stat::MaxResource, 100.0)],
            [(Stat::Level, 1.0)],
        );
        let golem = world.spawn(
            EntityKind::Npc,
            WorldRef::new(Vec3::new(0.0, 0.0, 10.0), TeamId(2)),
            [(Stat::MaxHealth, 1_000.0)],
            [(Stat::Level, 1.0)],
        );
        for id in abilities.ids() {
            world.grant(mage, id).unwrap();
        }

        Self {
            clock,
            world,
            mage,
            golem,
        }
    }

    fn run(&mut self, total_ms: u64) {
        for _ in 0..total_ms / 100 {
            self.clock.advance(Duration::from_millis(100));
            self.world.update();
        }
    }

    fn request(&mut self, ability: &str) -> Result<RequestOutcome, AbilityError> {
        self.world
            .request_ability(self.mage, &ability.into(), AbilityTarget::direction(Vec3::Z))
    }
}

#[test]
fn five_frost_bolts_freeze_the_target() {
    let mut encounter = Encounter::new();

    for cast in 0..5 {
        let outcome = encounter.request("frost_bolt").unwrap();
        assert!(matches!(outcome, RequestOutcome::CastStarted { .. }), "cast {cast}");
        encounter.run(1_000);
        if cast < 4 {
            assert_eq!(
                encounter.world.conditions().stacks(encounter.golem, &"CHILLED".into()),
                cast + 1
            );
            encounter.run(3_000);
        }
    }

    let conditions = encounter.world.conditions();
    assert!(conditions.has(encounter.golem, &"FROZEN".into()));
    assert!(!conditions.has(encounter.golem, &"CHILLED".into()));
    assert!(conditions.is_incapacitated(encounter.golem));
    assert_eq!(
        encounter.world.registry().get_attribute(encounter.mage, Stat::Resource),
        Ok(25.0)
    );
}

#[test]
fn defensive_abilities_share_a_cooldown() {
    let mut encounter = Encounter::new();
    encounter.request("barrier").unwrap();

    assert!(encounter.world.conditions().has(encounter.mage, &"SHIELDED".into()));
    assert!(matches!(
        encounter.request("rally"),
        Err(AbilityError::OnCooldown { .. })
    ));
}

#[test]
fn catalogs_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();

    let conditions = dir.path().join("conditions.ron");
    std::fs::File::create(&conditions)
        .unwrap()
        .write_all(br#"(conditions: [(id: "MARKED", duration: 5000, category: Debuff)])"#)
        .unwrap();

    let abilities = dir.path().join("abilities.ron");
    std::fs::File::create(&abilities)
        .unwrap()
        .write_all(
            br#"(abilities: [(
                id: "hunters_mark",
                cooldown: 10000,
                targeting: (shape: Sphere, range: 20.0, filter: "HOSTILE", include_self: false, max_count: Some(1)),
                effects: [(kind: ApplyCondition, params: (condition: Some("MARKED")))],
            )])"#,
        )
        .unwrap();

    let conditions = ConditionCatalog::from_path(&conditions).unwrap();
    let abilities = AbilityCatalog::from_path(&abilities).unwrap();
    abilities.check_conditions(&conditions).unwrap();

    let mark = abilities.get("hunters_mark").unwrap();
    assert_eq!(mark.targeting.max_count, Some(1));
    assert_eq!(mark.cooldown, Duration::from_secs(10));
    assert_eq!(conditions.len(), 1);
}

#[test]
fn unknown_condition_reference_is_reported() {
    let abilities = AbilityCatalog::parse(
        r#"(abilities: [(id: "hex", effects: [(kind: ApplyCondition, params: (condition: Some("HEXED")))])])"#,
        "inline",
    )
    .unwrap();
    let err = abilities
        .check_conditions(&ConditionCatalog::load().unwrap())
        .unwrap_err();
    assert!(err.to_string().contains("HEXED"));
}
