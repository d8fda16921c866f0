//! Scripted duel between a caster and a training golem.
use std::time::Duration;

use anyhow::{Context, Result};
use combat_core::{AbilityId, AbilityTarget, EntityId, EntityKind, Stat, TeamId, WorldRef};
use combat_runtime::{EntitySnapshot, RuntimeHandle, SpawnSpec};
use glam::Vec3;
use tokio::time::Instant;
use tracing::{info, warn};

/// One scripted action, relative to the encounter start.
#[derive(Clone, Debug)]
enum Step {
    Use { ability: &'static str, target: Aim },
    MoveGolem(Vec3),
}

#[derive(Clone, Copy, Debug)]
enum Aim {
    Golem,
    Caster,
}

const SCRIPT: &[(u64, Step)] = &[
    (0, Step::Use { ability: "barrier", target: Aim::Caster }),
    (100, Step::Use { ability: "frost_bolt", target: Aim::Golem }),
    (1_200, Step::Use { ability: "fire_bolt", target: Aim::Golem }),
    (2_800, Step::MoveGolem(Vec3::new(0.0, 0.0, 3.0))),
    (2_900, Step::Use { ability: "strike_1", target: Aim::Golem }),
    (3_400, Step::Use { ability: "strike_2", target: Aim::Golem }),
    (3_900, Step::Use { ability: "strike_3", target: Aim::Golem }),
    (4_500, Step::Use { ability: "meteor", target: Aim::Golem }),
    (7_600, Step::Use { ability: "mend", target: Aim::Caster }),
];

pub struct Encounter {
    handle: RuntimeHandle,
    caster: EntityId,
    golem: EntityId,
}

impl Encounter {
    /// Spawns both combatants. The caster knows every stock ability.
    pub async fn setup(handle: RuntimeHandle, abilities: impl IntoIterator<Item = AbilityId>) -> Result<Self> {
        let caster_spec = abilities.into_iter().fold(
            SpawnSpec::new(EntityKind::Player, WorldRef::new(Vec3::ZERO, TeamId(1)))
                .stat(Stat::MaxHealth, 400.0)
                .stat(Stat::MaxResource, 200.0)
                .stat(Stat::Power, 15.0)
                .level(5),
            |spec, ability| spec.ability(ability),
        );
        let caster = handle.spawn(caster_spec).await.context("spawning caster")?;

        let golem = handle
            .spawn(
                SpawnSpec::new(EntityKind::Npc, WorldRef::new(Vec3::new(0.0, 0.0, 10.0), TeamId(2)))
                    .stat(Stat::MaxHealth, 2_000.0)
                    .stat(Stat::Defense, 40.0)
                    .level(5),
            )
            .await
            .context("spawning golem")?;

        info!(%caster, %golem, "encounter ready");
        Ok(Self { handle, caster, golem })
    }

    /// Plays the script, then waits out the rest of `duration`.
    pub async fn run(&self, duration: Duration) -> Result<()> {
        let start = Instant::now();

        for (at, step) in SCRIPT {
            let at = Duration::from_millis(*at);
            if at > duration {
                break;
            }
            tokio::time::sleep_until(start + at).await;
            self.perform(step).await?;
        }

        tokio::time::sleep_until(start + duration).await;
        Ok(())
    }

    async fn perform(&self, step: &Step) -> Result<()> {
        match step {
            Step::Use { ability, target } => {
                let target = self.aim(*target).await?;
                match self.handle.request_ability(self.caster, *ability, target).await {
                    Ok(outcome) => info!(ability, ?outcome, "ability used"),
                    // Rejections are part of the fight; keep going.
                    Err(e) => warn!(ability, error = %e, severity = ?e.severity(), "ability rejected"),
                }
            }
            Step::MoveGolem(position) => {
                self.handle
                    .move_entity(self.golem, *position, Some(Vec3::NEG_Z))
                    .await
                    .context("moving golem")?;
            }
        }
        Ok(())
    }

    async fn aim(&self, aim: Aim) -> Result<AbilityTarget> {
        Ok(match aim {
            Aim::Caster => AbilityTarget::default(),
            Aim::Golem => {
                let golem = self.handle.query_entity(self.golem).await?;
                AbilityTarget {
                    point: Some(golem.world.position),
                    direction: Some(golem.world.position.normalize_or_zero()),
                }
            }
        })
    }

    pub async fn snapshots(&self) -> Result<Vec<EntitySnapshot>> {
        Ok(vec![
            self.handle.query_entity(self.caster).await?,
            self.handle.query_entity(self.golem).await?,
        ])
    }
}
