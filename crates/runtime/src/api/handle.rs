//! Cloneable façade for issuing commands to the runtime.
//!
//! [`RuntimeHandle`] hides channel plumbing and offers async helpers for
//! driving combatants or streaming events from specific topics.
use std::collections::HashMap;

use glam::Vec3;
use tokio::sync::{broadcast, mpsc, oneshot};

use combat_core::{
    AbilityId, AbilityTarget, EffectKind, EffectOutcome, EffectParams, EntityId, RequestOutcome, UpdateSummary,
};

use super::errors::{Result, RuntimeError};
use super::types::{EntitySnapshot, SpawnSpec};
use crate::events::{Event, EventBus, Topic};
use crate::workers::Command;

/// Client-facing handle to interact with the runtime
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: mpsc::Sender<Command>,
    event_bus: EventBus,
}

impl RuntimeHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<Command>, event_bus: EventBus) -> Self {
        Self {
            command_tx,
            event_bus,
        }
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Spawn a combatant and grant its abilities
    pub async fn spawn(&self, spec: SpawnSpec) -> Result<EntityId> {
        self.call(|reply| Command::Spawn { spec, reply }).await?
    }

    pub async fn despawn(&self, entity: EntityId) -> Result<()> {
        self.call(|reply| Command::Despawn { entity, reply }).await?
    }

    pub async fn grant(&self, entity: EntityId, ability: impl Into<AbilityId>) -> Result<()> {
        let ability = ability.into();
        self.call(|reply| Command::Grant { entity, ability, reply }).await?
    }

    /// Ask `entity` to use `ability`
    ///
    /// Instant abilities resolve before this returns; cast abilities report
    /// when they will finish.
    pub async fn request_ability(
        &self,
        entity: EntityId,
        ability: impl Into<AbilityId>,
        target: AbilityTarget,
    ) -> Result<RequestOutcome> {
        let ability = ability.into();
        self.call(|reply| Command::RequestAbility {
            entity,
            ability,
            target,
            reply,
        })
        .await?
    }

    /// Interrupt the current cast, returning the interrupted ability
    pub async fn interrupt(&self, entity: EntityId) -> Result<AbilityId> {
        self.call(|reply| Command::Interrupt { entity, reply }).await?
    }

    pub async fn move_entity(&self, entity: EntityId, position: Vec3, facing: Option<Vec3>) -> Result<()> {
        self.call(|reply| Command::Move {
            entity,
            position,
            facing,
            reply,
        })
        .await?
    }

    /// Run a single effect outside any ability
    pub async fn execute_effect(&self, kind: EffectKind, params: EffectParams) -> Result<EffectOutcome> {
        let params = Box::new(params);
        self.call(|reply| Command::ExecuteEffect { kind, params, reply })
            .await?
    }

    /// Query one entity (read-only snapshot)
    pub async fn query_entity(&self, entity: EntityId) -> Result<EntitySnapshot> {
        self.call(|reply| Command::QueryEntity { entity, reply })
            .await?
            .ok_or(RuntimeError::EntityNotFound(entity))
    }

    /// Force an update without waiting for the next heartbeat
    pub async fn update(&self) -> Result<UpdateSummary> {
        self.call(|reply| Command::Update { reply }).await
    }

    /// Subscribe to events from a specific topic
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use combat_runtime::Topic;
    ///
    /// let mut combat_rx = handle.subscribe(Topic::Combat);
    /// while let Ok(event) = combat_rx.recv().await {
    ///     println!("{}", event.name());
    /// }
    /// ```
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Subscribe to multiple topics at once
    pub fn subscribe_multiple(&self, topics: &[Topic]) -> HashMap<Topic, broadcast::Receiver<Event>> {
        self.event_bus.subscribe_multiple(topics)
    }

    /// Get a reference to the event bus for advanced usage
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub(crate) async fn request_shutdown(&self) -> Result<()> {
        self.command_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)
    }
}
