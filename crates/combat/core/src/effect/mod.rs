//! Effect pipeline: every gameplay consequence runs through one registry.
//!
//! An effect is a typed request ([`EffectKind`] + [`EffectParams`]) that the
//! [`EffectPipeline`] validates, fills with category defaults and hands to
//! the function registered for the kind. Handlers reach the damage engine,
//! condition manager and stat engine through [`EffectServices`], which the
//! combat world implements and passes in per call.

mod builtin;
mod pipeline;
mod services;

pub use pipeline::{EffectFn, EffectPipeline};
pub use services::EffectServices;

use std::time::Duration;

use glam::Vec3;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::ability::AbilityId;
use crate::combat::{DamageError, DamageType};
use crate::condition::{ConditionCategory, ConditionData, ConditionError, ConditionId};
use crate::entity::{EntityId, RegistryError};
use crate::error::{CombatError, ErrorSeverity};
use crate::stats::{ModifierId, ModifierSpec, StatError};

/// Every effect the pipeline knows how to execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EffectKind {
    Damage,
    Heal,
    ApplyCondition,
    RemoveCondition,
    Cleanse,
    ApplyModifier,
    RemoveModifier,
    RestoreResource,
    Knockback,
    Pull,
}

/// Grouping of effect kinds, for introspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EffectCategory {
    Damage,
    Healing,
    Condition,
    StatUtility,
    Movement,
}

/// Parameters of one effect execution.
///
/// The base fields apply to every kind; the rest are read only by the kinds
/// that need them and are validated before dispatch.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EffectParams {
    pub source: Option<EntityId>,
    pub target: EntityId,
    pub ability: Option<AbilityId>,

    pub amount: Option<f64>,
    pub damage_type: Option<DamageType>,
    pub force_crit: Option<bool>,
    /// Tick damage or healing from a condition. Never critical.
    pub periodic: bool,
    /// Allows the result to round down to zero.
    pub ignorable: bool,

    pub condition: Option<ConditionId>,
    pub stacks: Option<u32>,
    #[cfg_attr(feature = "serde", serde(with = "crate::time::opt_millis"))]
    pub duration: Option<Duration>,
    pub data: Option<ConditionData>,
    pub all_stacks: bool,
    /// Cleanse only this category; `None` cleanses everything.
    pub category: Option<ConditionCategory>,

    pub modifier: Option<ModifierSpec>,
    pub modifier_id: Option<ModifierId>,
    pub modifier_source: Option<String>,

    pub distance: Option<f32>,
    /// Point movement effects push away from or pull toward.
    pub origin: Option<Vec3>,
}

impl EffectParams {
    pub fn new(target: EntityId) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    pub fn source(mut self, source: impl Into<Option<EntityId>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn ability(mut self, ability: AbilityId) -> Self {
        self.ability = Some(ability);
        self
    }

    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn damage_type(mut self, damage_type: DamageType) -> Self {
        self.damage_type = Some(damage_type);
        self
    }

    pub fn force_crit(mut self, crit: bool) -> Self {
        self.force_crit = Some(crit);
        self
    }

    pub fn periodic(mut self) -> Self {
        self.periodic = true;
        self
    }

    pub fn ignorable(mut self) -> Self {
        self.ignorable = true;
        self
    }

    pub fn condition(mut self, condition: impl Into<ConditionId>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn stacks(mut self, stacks: u32) -> Self {
        self.stacks = Some(stacks);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn data(mut self, data: ConditionData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn all_stacks(mut self) -> Self {
        self.all_stacks = true;
        self
    }

    pub fn category(mut self, category: ConditionCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn modifier(mut self, spec: ModifierSpec) -> Self {
        self.modifier = Some(spec);
        self
    }

    pub fn modifier_id(mut self, id: ModifierId) -> Self {
        self.modifier_id = Some(id);
        self
    }

    pub fn modifier_source(mut self, source: impl Into<String>) -> Self {
        self.modifier_source = Some(source.into());
        self
    }

    pub fn distance(mut self, distance: f32) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn origin(mut self, origin: Vec3) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// What an executed effect did.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EffectOutcome {
    Damage {
        amount: f64,
        absorbed: f64,
        critical: bool,
        killing_blow: bool,
    },
    Heal {
        amount: f64,
        overheal: f64,
        critical: bool,
    },
    ConditionApplied {
        condition: ConditionId,
        stacks: u32,
        transformed_into: Option<ConditionId>,
    },
    ConditionRemoved {
        condition: ConditionId,
        remaining_stacks: u32,
    },
    Cleansed {
        removed: Vec<ConditionId>,
    },
    ModifierApplied(ModifierId),
    ModifiersRemoved(Vec<ModifierId>),
    ResourceRestored {
        amount: f64,
    },
    Displaced {
        from: Vec3,
        to: Vec3,
    },
}

/// Effect validation and execution errors.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EffectError {
    #[error("no handler registered for effect {0}")]
    UnknownKind(EffectKind),

    #[error("effect {0} is already registered")]
    DuplicateKind(EffectKind),

    #[error("effect {kind} requires {field}")]
    MissingField { kind: EffectKind, field: &'static str },

    #[error("effect {kind} requires {field} > 0")]
    NonPositive { kind: EffectKind, field: &'static str },

    #[error("target {0} is not alive")]
    TargetNotAlive(EntityId),

    #[error(transparent)]
    Damage(#[from] DamageError),

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    Stat(#[from] StatError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl CombatError for EffectError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::DuplicateKind(_) => ErrorSeverity::Internal,
            Self::Damage(e) => e.severity(),
            Self::Condition(e) => e.severity(),
            Self::Stat(e) => e.severity(),
            Self::Registry(e) => e.severity(),
            _ => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownKind(_) => "EFFECT_UNKNOWN_KIND",
            Self::DuplicateKind(_) => "EFFECT_DUPLICATE_KIND",
            Self::MissingField { .. } => "EFFECT_MISSING_FIELD",
            Self::NonPositive { .. } => "EFFECT_NON_POSITIVE",
            Self::TargetNotAlive(_) => "EFFECT_TARGET_NOT_ALIVE",
            Self::Damage(e) => e.error_code(),
            Self::Condition(e) => e.error_code(),
            Self::Stat(e) => e.error_code(),
            Self::Registry(e) => e.error_code(),
        }
    }
}

/// Checks kind-specific required fields and fills category defaults.
pub fn prepare(kind: EffectKind, mut params: EffectParams) -> Result<EffectParams, EffectError> {
    fn positive(kind: EffectKind, field: &'static str, value: Option<f64>) -> Result<(), EffectError> {
        match value {
            None => Err(EffectError::MissingField { kind, field }),
            Some(v) if v <= 0.0 || v.is_nan() => Err(EffectError::NonPositive { kind, field }),
            Some(_) => Ok(()),
        }
    }

    match kind {
        EffectKind::Damage => {
            positive(kind, "amount", params.amount)?;
            params.damage_type.get_or_insert(DamageType::Physical);
        }
        EffectKind::Heal | EffectKind::RestoreResource => {
            positive(kind, "amount", params.amount)?;
        }
        EffectKind::ApplyCondition => {
            if params.condition.is_none() {
                return Err(EffectError::MissingField { kind, field: "condition" });
            }
            if params.stacks.is_none_or(|s| s == 0) {
                params.stacks = Some(1);
            }
        }
        EffectKind::RemoveCondition => {
            if params.condition.is_none() {
                return Err(EffectError::MissingField { kind, field: "condition" });
            }
        }
        EffectKind::Cleanse => {}
        EffectKind::ApplyModifier => {
            if params.modifier.is_none() {
                return Err(EffectError::MissingField { kind, field: "modifier" });
            }
        }
        EffectKind::RemoveModifier => {
            if params.modifier_id.is_none() && params.modifier_source.is_none() {
                return Err(EffectError::MissingField {
                    kind,
                    field: "modifier_id or modifier_source",
                });
            }
        }
        EffectKind::Knockback | EffectKind::Pull => {
            positive(kind, "distance", params.distance.map(f64::from))?;
        }
    }
    Ok(params)
}
