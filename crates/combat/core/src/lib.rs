//! Real-time combat resolution.
//!
//! `combat-core` tracks combatant state, resolves ability casts into damage,
//! healing and condition effects, keeps stacking buffs and debuffs ticking,
//! and computes final numbers from layered stat formulas. It is synchronous
//! and performs no I/O; hosts drive it through [`CombatWorld`] and observe
//! it through the [`EventBus`].
//!
//! # Modules
//!
//! - [`entity`]: identities, attributes, relationships
//! - [`stats`]: base stats, modifiers, level scaling, rating curves
//! - [`effect`]: the effect pipeline every consequence runs through
//! - [`condition`]: stacking timed conditions and their hooks
//! - [`combat`]: damage and healing formulas
//! - [`targeting`]: spatial target queries
//! - [`ability`]: casting, cooldowns and combo chains
//! - [`world`]: the composition root that wires everything together
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use combat_core::{
//!     CombatConfig, CombatWorld, EffectKind, EffectParams, EntityKind, ManualClock, Stat, WorldRef,
//! };
//!
//! let clock = Arc::new(ManualClock::new());
//! let mut world = CombatWorld::new(CombatConfig::default(), clock);
//!
//! let dummy = world.spawn(EntityKind::Npc, WorldRef::default(), [(Stat::MaxHealth, 100.0)], [(Stat::Level, 1.0)]);
//! world
//!     .execute_effect(EffectKind::Damage, EffectParams::new(dummy).amount(30.0))
//!     .unwrap();
//!
//! assert_eq!(world.registry().get_attribute(dummy, Stat::Health), Ok(70.0));
//! ```

#[macro_use]
mod macros;

pub mod ability;
pub mod combat;
pub mod condition;
pub mod config;
pub mod effect;
pub mod entity;
pub mod error;
pub mod events;
pub mod rng;
pub mod scheduler;
pub mod stats;
pub mod targeting;
pub mod time;
pub mod world;

pub use ability::{
    AbilityDefinition, AbilityError, AbilityId, AbilityOrchestrator, AbilityPhase, AbilityTarget, ChainId, ChainInfo,
    CooldownCategory, EffectDescriptor, RequestOutcome, TargetOrigin, TargetingSpec,
};
pub use combat::{DamageEngine, DamageError, DamageOptions, DamageType};
pub use condition::{
    ConditionCategory, ConditionData, ConditionDefinition, ConditionError, ConditionHook, ConditionId,
    ConditionManager, StackPolicy,
};
pub use config::CombatConfig;
pub use effect::{EffectError, EffectKind, EffectOutcome, EffectParams, EffectPipeline, EffectServices};
pub use entity::{EntityId, EntityKind, EntityRegistry, RegistryError, Relationship, TeamId, WorldRef};
pub use error::{CombatError, ErrorSeverity};
pub use events::{BusError, CombatEvent, EventBus, Subscription, Topic};
pub use rng::{PcgRng, RngOracle};
pub use stats::{ModifierId, ModifierSpec, Stat, StatEngine, StatError};
pub use targeting::{Shape, TargetQuery, TeamFilter};
pub use time::{Clock, ManualClock, MonotonicClock, Timestamp};
pub use world::{CombatWorld, Systems, UpdateSummary};
