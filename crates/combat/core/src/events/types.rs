//! Event payloads published by the combat systems.
//!
//! These variants are the entire outward contract of the engine: the
//! transport and presentation layers consume them and nothing else.

use std::time::Duration;

use glam::Vec3;
use strum::{Display, EnumIter};

use crate::ability::{AbilityId, ChainId};
use crate::combat::DamageType;
use crate::condition::ConditionId;
use crate::effect::{EffectKind, EffectOutcome, EffectParams};
use crate::entity::{EntityId, EntityKind};
use crate::stats::{ModifierId, Stat};
use crate::time::Timestamp;

/// Topics for event routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Topic {
    /// Registration, attribute changes, deaths.
    Entity,
    /// Modifier added/removed.
    Stat,
    /// Effect executed/failed.
    Effect,
    /// Condition lifecycle and ticks.
    Condition,
    /// Damage dealt and healing applied.
    Combat,
    /// Casts, executions, cooldowns, chains.
    Ability,
}

/// Damage resolved against a target.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DamageEvent {
    pub source: Option<EntityId>,
    pub target: EntityId,
    /// Damage dealt after interception and shields.
    pub amount: f64,
    /// Portion soaked by shields before reaching health.
    pub absorbed: f64,
    pub damage_type: DamageType,
    pub critical: bool,
    pub killing_blow: bool,
    pub periodic: bool,
}

/// Healing resolved on a target.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealEvent {
    pub source: Option<EntityId>,
    pub target: EntityId,
    pub amount: f64,
    /// Portion of the heal that exceeded maximum health.
    pub overheal: f64,
    pub critical: bool,
    pub periodic: bool,
}

/// Result of one effect descriptor applied to one target.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetOutcome {
    pub target: EntityId,
    pub kind: EffectKind,
    /// `Ok` outcome or the failure reason.
    pub result: Result<EffectOutcome, String>,
}

/// Chain position reported with an execution.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainStep {
    pub chain: ChainId,
    pub position: u32,
    pub next: Option<AbilityId>,
}

/// Terminal record of an ability execution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilityExecution {
    pub entity: EntityId,
    pub ability: AbilityId,
    pub target_point: Option<Vec3>,
    pub targets: Vec<EntityId>,
    pub outcomes: Vec<TargetOutcome>,
    pub chain: Option<ChainStep>,
}

/// Every event the engine publishes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CombatEvent {
    // ========================================================================
    // Entity
    // ========================================================================
    EntityRegistered {
        entity: EntityId,
        kind: EntityKind,
    },
    EntityUnregistered {
        entity: EntityId,
    },
    AttributeChanged {
        entity: EntityId,
        stat: Stat,
        old: Option<f64>,
        new: f64,
    },
    EntityDied {
        entity: EntityId,
    },

    // ========================================================================
    // Stat
    // ========================================================================
    ModifierAdded {
        entity: EntityId,
        modifier: ModifierId,
        source: String,
    },
    ModifierRemoved {
        entity: EntityId,
        modifier: ModifierId,
        source: String,
    },

    // ========================================================================
    // Effect
    // ========================================================================
    EffectExecuted {
        kind: EffectKind,
        params: Box<EffectParams>,
        outcome: EffectOutcome,
    },
    EffectFailed {
        kind: EffectKind,
        params: Box<EffectParams>,
        reason: String,
    },

    // ========================================================================
    // Condition
    // ========================================================================
    ConditionApplied {
        target: EntityId,
        condition: ConditionId,
        stacks: u32,
        duration: Duration,
    },
    ConditionStacksChanged {
        target: EntityId,
        condition: ConditionId,
        stacks: u32,
        duration: Duration,
    },
    ConditionRemoved {
        target: EntityId,
        condition: ConditionId,
    },
    ConditionTick {
        target: EntityId,
        condition: ConditionId,
        stacks: u32,
    },
    ConditionTransformed {
        target: EntityId,
        from: ConditionId,
        into: ConditionId,
        stacks: u32,
    },

    // ========================================================================
    // Combat
    // ========================================================================
    DamageDealt(DamageEvent),
    HealingApplied(HealEvent),

    // ========================================================================
    // Ability
    // ========================================================================
    CastStarted {
        entity: EntityId,
        ability: AbilityId,
        started_at: Timestamp,
        ends_at: Timestamp,
    },
    CastProgress {
        entity: EntityId,
        ability: AbilityId,
        /// Fraction of the cast completed, in `[0, 1]`.
        progress: f32,
    },
    CastCompleted {
        entity: EntityId,
        ability: AbilityId,
    },
    CastInterrupted {
        entity: EntityId,
        ability: AbilityId,
        cooldown: Duration,
    },
    AbilityExecuted(Box<AbilityExecution>),
    CooldownStarted {
        entity: EntityId,
        ability: AbilityId,
        ends_at: Timestamp,
    },
    NextAbilityReady {
        entity: EntityId,
        chain: ChainId,
        next: AbilityId,
        timeout: Duration,
    },
    ChainExpired {
        entity: EntityId,
        chain: ChainId,
    },
}

impl CombatEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::EntityRegistered { .. }
            | Self::EntityUnregistered { .. }
            | Self::AttributeChanged { .. }
            | Self::EntityDied { .. } => Topic::Entity,

            Self::ModifierAdded { .. } | Self::ModifierRemoved { .. } => Topic::Stat,

            Self::EffectExecuted { .. } | Self::EffectFailed { .. } => Topic::Effect,

            Self::ConditionApplied { .. }
            | Self::ConditionStacksChanged { .. }
            | Self::ConditionRemoved { .. }
            | Self::ConditionTick { .. }
            | Self::ConditionTransformed { .. } => Topic::Condition,

            Self::DamageDealt(_) | Self::HealingApplied(_) => Topic::Combat,

            Self::CastStarted { .. }
            | Self::CastProgress { .. }
            | Self::CastCompleted { .. }
            | Self::CastInterrupted { .. }
            | Self::AbilityExecuted(_)
            | Self::CooldownStarted { .. }
            | Self::NextAbilityReady { .. }
            | Self::ChainExpired { .. } => Topic::Ability,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EntityRegistered { .. } => "entity_registered",
            Self::EntityUnregistered { .. } => "entity_unregistered",
            Self::AttributeChanged { .. } => "attribute_changed",
            Self::EntityDied { .. } => "entity_died",
            Self::ModifierAdded { .. } => "modifier_added",
            Self::ModifierRemoved { .. } => "modifier_removed",
            Self::EffectExecuted { .. } => "effect_executed",
            Self::EffectFailed { .. } => "effect_failed",
            Self::ConditionApplied { .. } => "condition_applied",
            Self::ConditionStacksChanged { .. } => "condition_stacks_changed",
            Self::ConditionRemoved { .. } => "condition_removed",
            Self::ConditionTick { .. } => "condition_tick",
            Self::ConditionTransformed { .. } => "condition_transformed",
            Self::DamageDealt(_) => "damage_dealt",
            Self::HealingApplied(_) => "healing_applied",
            Self::CastStarted { .. } => "cast_started",
            Self::CastProgress { .. } => "cast_progress",
            Self::CastCompleted { .. } => "cast_completed",
            Self::CastInterrupted { .. } => "cast_interrupted",
            Self::AbilityExecuted(_) => "ability_executed",
            Self::CooldownStarted { .. } => "cooldown_started",
            Self::NextAbilityReady { .. } => "next_ability_ready",
            Self::ChainExpired { .. } => "chain_expired",
        }
    }
}
