//! Damage and healing resolution.
//!
//! ```text
//! damage = base × (1 + power × powerCoef) × levelFactor × crit × (1 - mitigation)
//! heal   = base × (1 + power × powerCoef) × levelFactor½ × crit
//! ```
//!
//! Results are rounded to whole units with a floor of 1 unless the request
//! is marked ignorable. Before health changes, the amount passes through the
//! condition interception chain (source, then target).

mod engine;

pub use engine::{DamageContext, DamageEngine, level_factor, mitigation};

use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::entity::{EntityId, RegistryError};
use crate::error::{CombatError, ErrorSeverity};

/// School of damage. `True` bypasses mitigation.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DamageType {
    #[default]
    Physical,
    Fire,
    Frost,
    Arcane,
    Nature,
    Shadow,
    Holy,
    True,
}

impl DamageType {
    pub const fn bypasses_mitigation(self) -> bool {
        matches!(self, Self::True)
    }
}

/// Knobs of a single damage or heal calculation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DamageOptions {
    pub damage_type: DamageType,
    /// `Some` decides the crit outright instead of rolling.
    pub force_crit: Option<bool>,
    /// Condition tick. Never critical.
    pub periodic: bool,
    /// Lets the result round down to zero.
    pub ignorable: bool,
}

/// Every factor that went into a damage number.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DamageBreakdown {
    pub base: f64,
    pub power_multiplier: f64,
    pub level_factor: f64,
    pub critical: bool,
    /// Multiplier applied for the crit; 1 when not critical.
    pub crit_multiplier: f64,
    pub mitigation: f64,
    pub damage_type: DamageType,
    /// Final rounded amount before interception.
    pub amount: f64,
}

/// Every factor that went into a heal number.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealBreakdown {
    pub base: f64,
    pub power_multiplier: f64,
    pub level_factor: f64,
    pub critical: bool,
    pub crit_multiplier: f64,
    pub amount: f64,
}

/// Request to damage a target.
#[derive(Clone, Debug, PartialEq)]
pub struct DamageRequest {
    /// `None` for sourceless damage (environment, orphaned ticks).
    pub source: Option<EntityId>,
    pub target: EntityId,
    pub base: f64,
    pub options: DamageOptions,
    /// Precomputed breakdown; derived from `base` when absent.
    pub breakdown: Option<DamageBreakdown>,
}

impl DamageRequest {
    pub fn new(source: Option<EntityId>, target: EntityId, base: f64, options: DamageOptions) -> Self {
        Self {
            source,
            target,
            base,
            options,
            breakdown: None,
        }
    }

    pub fn with_breakdown(mut self, breakdown: DamageBreakdown) -> Self {
        self.breakdown = Some(breakdown);
        self
    }
}

/// Request to heal a target.
#[derive(Clone, Debug, PartialEq)]
pub struct HealRequest {
    pub source: Option<EntityId>,
    pub target: EntityId,
    pub base: f64,
    pub options: DamageOptions,
    pub breakdown: Option<HealBreakdown>,
}

impl HealRequest {
    pub fn new(source: Option<EntityId>, target: EntityId, base: f64, options: DamageOptions) -> Self {
        Self {
            source,
            target,
            base,
            options,
            breakdown: None,
        }
    }
}

/// Damage in flight through the interception chain.
#[derive(Clone, Debug, PartialEq)]
pub struct DamagePacket {
    pub source: Option<EntityId>,
    pub target: EntityId,
    pub amount: f64,
    pub damage_type: DamageType,
    pub critical: bool,
    pub periodic: bool,
    /// Amount soaked by shields so far.
    pub absorbed: f64,
}

/// Healing in flight through the interception chain.
#[derive(Clone, Debug, PartialEq)]
pub struct HealPacket {
    pub source: Option<EntityId>,
    pub target: EntityId,
    pub amount: f64,
    pub critical: bool,
    pub periodic: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DamageError {
    #[error("target {0} not found")]
    TargetNotFound(EntityId),

    #[error("target {0} is dead")]
    TargetDead(EntityId),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl CombatError for DamageError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::TargetNotFound(_) | Self::TargetDead(_) => ErrorSeverity::Validation,
            Self::Registry(e) => e.severity(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::TargetNotFound(_) => "DAMAGE_TARGET_NOT_FOUND",
            Self::TargetDead(_) => "DAMAGE_TARGET_DEAD",
            Self::Registry(e) => e.error_code(),
        }
    }
}
