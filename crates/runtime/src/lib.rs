//! Async host for the combat simulation.
//!
//! This crate runs a [`combat_core::CombatWorld`] on a dedicated tokio task,
//! drives its heartbeat, and exposes it through a cloneable
//! [`RuntimeHandle`]. Every core event is re-published on a topic-based
//! broadcast [`EventBus`] so clients can stream only what they need.
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`events`] provides topic-based event bus for flexible event routing
//! - [`clock`] adapts tokio time to the core [`combat_core::Clock`]
//! - `workers` keeps background tasks internal to the crate
pub mod api;
pub mod clock;
pub mod events;
pub mod runtime;

mod workers;

pub use api::{
    CastSnapshot, ConditionSnapshot, EntitySnapshot, Result, RuntimeError, RuntimeHandle, SpawnSpec,
};
pub use clock::TokioClock;
pub use events::{Event, EventBus, RuntimeEvent, Topic};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
