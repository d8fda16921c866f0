//! High-level runtime orchestrator.
//!
//! The runtime owns the simulation worker, wires up command/event channels,
//! and exposes a builder-based API for clients to drive combat.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use combat_content::{AbilityCatalog, ConditionCatalog};
use combat_core::{Clock, CombatConfig, CombatWorld, RngOracle};

use crate::api::{Result, RuntimeError, RuntimeHandle};
use crate::clock::TokioClock;
use crate::events::{Event, EventBus, Topic};
use crate::workers::{Command, SimulationWorker};

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub combat: CombatConfig,
    /// Capacity of each event topic channel.
    pub event_buffer_size: usize,
    pub command_buffer_size: usize,
    /// Overrides `combat.conditions.heartbeat_interval_ms`.
    pub heartbeat: Option<Duration>,
    /// Critical strike seed. A random seed is drawn when unset.
    pub seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            combat: CombatConfig::default(),
            event_buffer_size: 256,
            command_buffer_size: 32,
            heartbeat: None,
            seed: None,
        }
    }
}

impl RuntimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat
            .unwrap_or_else(|| self.combat.conditions.heartbeat_interval())
    }
}

/// Main runtime that owns the combat simulation
///
/// [`RuntimeHandle`] provides a cloneable façade for clients.
pub struct Runtime {
    handle: RuntimeHandle,
    sim_worker_handle: JoinHandle<()>,
    seed: u64,
}

impl Runtime {
    /// Create a new runtime builder
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Get a cloneable handle to this runtime
    ///
    /// The handle can be shared across clients and async tasks.
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Subscribe to events from a specific topic
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.handle.subscribe(topic)
    }

    /// Seed the world resolves critical strikes with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Shutdown the runtime gracefully
    ///
    /// Commands queued before this call still run. Handles cloned from this
    /// runtime fail with [`RuntimeError::CommandChannelClosed`] afterwards.
    pub async fn shutdown(self) -> Result<()> {
        if let Err(e) = self.handle.request_shutdown().await {
            warn!(target: "runtime::worker", error = %e, "worker already stopped");
        }
        drop(self.handle);

        self.sim_worker_handle
            .await
            .map_err(RuntimeError::WorkerJoin)
    }
}

/// Builder for [`Runtime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    abilities: Option<AbilityCatalog>,
    conditions: Option<ConditionCatalog>,
    clock: Option<Arc<dyn Clock>>,
    rng: Option<Box<dyn RngOracle>>,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            abilities: None,
            conditions: None,
            clock: None,
            rng: None,
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Override only the combat tuning
    pub fn combat_config(mut self, combat: CombatConfig) -> Self {
        self.config.combat = combat;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn abilities(mut self, abilities: AbilityCatalog) -> Self {
        self.abilities = Some(abilities);
        self
    }

    pub fn conditions(mut self, conditions: ConditionCatalog) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Install the abilities and conditions shipped with `combat-content`
    pub fn stock_content(mut self) -> Result<Self> {
        let content_err = |e: combat_content::LoadError| RuntimeError::Content(format!("{e:#}"));
        self.conditions = Some(ConditionCatalog::load().map_err(content_err)?);
        self.abilities = Some(AbilityCatalog::load().map_err(content_err)?);
        Ok(self)
    }

    /// Replace the tokio-backed clock, e.g. with a [`combat_core::ManualClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the critical strike oracle
    pub fn rng(mut self, rng: impl RngOracle + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Build the runtime
    pub async fn build(self) -> Result<Runtime> {
        let mut config = self.config;
        let seed = config.seed.unwrap_or_else(rand::random);
        config.combat.world.seed = seed;
        let heartbeat = config.heartbeat_interval();

        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock::new()));
        let mut world = match self.rng {
            Some(rng) => CombatWorld::with_rng(config.combat.clone(), clock, rng),
            None => CombatWorld::new(config.combat.clone(), clock),
        };

        install_content(&mut world, self.conditions.as_ref(), self.abilities.as_ref())?;

        let (command_tx, command_rx) = mpsc::channel::<Command>(config.command_buffer_size.max(1));
        let event_bus = EventBus::with_capacity(config.event_buffer_size);
        let handle = RuntimeHandle::new(command_tx, event_bus.clone());

        let sim_worker = SimulationWorker::new(world, command_rx, event_bus, heartbeat, seed);
        let sim_worker_handle = tokio::spawn(async move {
            sim_worker.run().await;
        });

        info!(target: "runtime::worker", seed, "runtime started");

        Ok(Runtime {
            handle,
            sim_worker_handle,
            seed,
        })
    }
}

fn install_content(
    world: &mut CombatWorld,
    conditions: Option<&ConditionCatalog>,
    abilities: Option<&AbilityCatalog>,
) -> Result<()> {
    let content_err = |e: combat_content::LoadError| RuntimeError::Content(format!("{e:#}"));

    if let Some(conditions) = conditions {
        conditions.install(world).map_err(content_err)?;
        debug!(target: "runtime::worker", count = conditions.len(), "conditions installed");
    }
    if let Some(abilities) = abilities {
        if let Some(conditions) = conditions {
            abilities.check_conditions(conditions).map_err(content_err)?;
        }
        abilities.install(world).map_err(content_err)?;
        debug!(target: "runtime::worker", count = abilities.len(), "abilities installed");
    }
    Ok(())
}
