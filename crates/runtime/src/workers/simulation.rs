//! Simulation worker that owns the authoritative [`CombatWorld`].
//!
//! Receives commands from [`RuntimeHandle`](crate::RuntimeHandle), drives the
//! world heartbeat on a fixed interval, and forwards every combat event to
//! the runtime [`EventBus`].

use std::time::Duration;

use glam::Vec3;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use combat_core::{
    AbilityId, AbilityTarget, CombatWorld, EffectKind, EffectOutcome, EffectParams, EntityId, RequestOutcome,
    Subscription, UpdateSummary,
};

use crate::api::{EntitySnapshot, Result, RuntimeError, SpawnSpec};
use crate::events::{Event, EventBus, RuntimeEvent};

/// Commands that can be sent to the simulation worker
pub enum Command {
    Spawn {
        spec: SpawnSpec,
        reply: oneshot::Sender<Result<EntityId>>,
    },
    Despawn {
        entity: EntityId,
        reply: oneshot::Sender<Result<()>>,
    },
    Grant {
        entity: EntityId,
        ability: AbilityId,
        reply: oneshot::Sender<Result<()>>,
    },
    RequestAbility {
        entity: EntityId,
        ability: AbilityId,
        target: AbilityTarget,
        reply: oneshot::Sender<Result<RequestOutcome>>,
    },
    Interrupt {
        entity: EntityId,
        reply: oneshot::Sender<Result<AbilityId>>,
    },
    /// Moves an entity and optionally turns it.
    Move {
        entity: EntityId,
        position: Vec3,
        facing: Option<Vec3>,
        reply: oneshot::Sender<Result<()>>,
    },
    ExecuteEffect {
        kind: EffectKind,
        params: Box<EffectParams>,
        reply: oneshot::Sender<Result<EffectOutcome>>,
    },
    QueryEntity {
        entity: EntityId,
        reply: oneshot::Sender<Option<EntitySnapshot>>,
    },
    /// Runs one update outside the heartbeat.
    Update { reply: oneshot::Sender<UpdateSummary> },
    /// Stops the loop after the commands queued before it.
    Shutdown,
}

/// Background task that processes combat commands.
pub struct SimulationWorker {
    world: CombatWorld,
    command_rx: mpsc::Receiver<Command>,
    event_bus: EventBus,
    heartbeat: Duration,
    seed: u64,
    updates: u64,
    _bridge: Subscription,
}

impl SimulationWorker {
    pub fn new(
        world: CombatWorld,
        command_rx: mpsc::Receiver<Command>,
        event_bus: EventBus,
        heartbeat: Duration,
        seed: u64,
    ) -> Self {
        let forward = event_bus.clone();
        let bridge = world.bus().subscribe_all(move |event| {
            forward.publish(Event::Combat(event.clone()));
            Ok(())
        });

        info!(
            target: "runtime::worker",
            heartbeat_ms = heartbeat.as_millis() as u64,
            seed,
            "simulation worker initialized"
        );

        Self {
            world,
            command_rx,
            event_bus,
            heartbeat: heartbeat.max(Duration::from_millis(1)),
            seed,
            updates: 0,
            _bridge: bridge,
        }
    }

    /// Main worker loop.
    pub async fn run(mut self) {
        self.event_bus.publish(Event::Runtime(RuntimeEvent::Started {
            at: self.world.now(),
            seed: self.seed,
        }));

        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => {
                            self.update();
                            self.handle_command(cmd);
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    self.update();
                }
            }
        }

        // Settle anything that came due before stopping.
        self.update();
        self.event_bus.publish(Event::Runtime(RuntimeEvent::Stopped {
            at: self.world.now(),
            updates: self.updates,
        }));
        info!(target: "runtime::worker", updates = self.updates, "simulation worker stopped");
    }

    fn update(&mut self) -> UpdateSummary {
        let summary = self.world.update();
        self.updates += 1;
        if summary.timers_fired > 0 || summary.deferred_run > 0 {
            trace!(
                target: "runtime::worker",
                timers = summary.timers_fired,
                deferred = summary.deferred_run,
                "update"
            );
        }
        summary
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Spawn { spec, reply } => {
                let result = self.spawn(spec);
                respond(reply, result, "Spawn");
            }
            Command::Despawn { entity, reply } => {
                let result = self.world.despawn(entity).map(|_| ()).map_err(RuntimeError::from);
                respond(reply, result, "Despawn");
            }
            Command::Grant { entity, ability, reply } => {
                let result = self.world.grant(entity, &ability).map_err(RuntimeError::from);
                respond(reply, result, "Grant");
            }
            Command::RequestAbility {
                entity,
                ability,
                target,
                reply,
            } => {
                let result = self
                    .world
                    .request_ability(entity, &ability, target)
                    .map_err(RuntimeError::from);
                if let Err(e) = &result {
                    debug!(target: "runtime::worker", %entity, %ability, error = %e, "request rejected");
                }
                respond(reply, result, "RequestAbility");
            }
            Command::Interrupt { entity, reply } => {
                let result = self.world.interrupt(entity).map_err(RuntimeError::from);
                respond(reply, result, "Interrupt");
            }
            Command::Move {
                entity,
                position,
                facing,
                reply,
            } => {
                let result = self.move_entity(entity, position, facing);
                respond(reply, result, "Move");
            }
            Command::ExecuteEffect { kind, params, reply } => {
                let result = self.world.execute_effect(kind, *params).map_err(RuntimeError::from);
                respond(reply, result, "ExecuteEffect");
            }
            Command::QueryEntity { entity, reply } => {
                let snapshot = EntitySnapshot::capture(&self.world, entity);
                respond(reply, snapshot, "QueryEntity");
            }
            Command::Update { reply } => {
                let summary = self.update();
                respond(reply, summary, "Update");
            }
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    /// Spawns the entity, then grants its abilities. A failed grant removes
    /// the entity again so callers never see a half-built combatant.
    fn spawn(&mut self, spec: SpawnSpec) -> Result<EntityId> {
        let SpawnSpec {
            kind,
            world,
            base_stats,
            attributes,
            abilities,
        } = spec;

        let id = self.world.spawn(kind, world, base_stats, attributes);
        for ability in &abilities {
            if let Err(e) = self.world.grant(id, ability) {
                let _ = self.world.despawn(id);
                return Err(e.into());
            }
        }
        Ok(id)
    }

    fn move_entity(&mut self, entity: EntityId, position: Vec3, facing: Option<Vec3>) -> Result<()> {
        self.world.set_position(entity, position)?;
        if let Some(facing) = facing {
            self.world.set_facing(entity, facing)?;
        }
        Ok(())
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T, command: &'static str) {
    if reply.send(value).is_err() {
        debug!(target: "runtime::worker", command, "reply channel closed (caller dropped)");
    }
}
