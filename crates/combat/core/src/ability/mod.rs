//! Abilities: definitions, per-caster state and the orchestrator that
//! drives a request through validation, casting, execution and cooldown.

mod orchestrator;
mod state;

pub use orchestrator::{AbilityOrchestrator, RequestOutcome};
pub use state::{AbilityPhase, ActiveCast, CasterState, ChainProgress};

use std::time::Duration;

use glam::Vec3;
use thiserror::Error;

use crate::effect::{EffectKind, EffectParams};
use crate::entity::EntityId;
use crate::error::{CombatError, ErrorSeverity};
use crate::targeting::{Shape, TeamFilter};

string_id! {
    /// Ability identifier, e.g. `fire_bolt`.
    AbilityId
}

string_id! {
    /// Identifier shared by every step of a combo chain.
    ChainId
}

string_id! {
    /// Abilities in one category go on cooldown together.
    CooldownCategory
}

/// Where a targeting query is centred.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TargetOrigin {
    #[default]
    Caster,
    /// The requested target point, or the caster when none is given.
    Point,
}

/// How an ability selects its targets.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TargetingSpec {
    pub shape: Shape,
    pub range: f32,
    pub filter: TeamFilter,
    pub max_count: Option<usize>,
    pub include_self: bool,
    pub origin: TargetOrigin,
}

impl TargetingSpec {
    /// Targets the caster alone.
    pub fn self_only() -> Self {
        Self {
            shape: Shape::SelfOnly,
            range: 0.0,
            filter: TeamFilter::FRIENDLY,
            max_count: None,
            include_self: true,
            origin: TargetOrigin::Caster,
        }
    }

    /// Hostile targets inside `shape` up to `range` away.
    pub fn area(shape: Shape, range: f32) -> Self {
        Self {
            shape,
            range,
            filter: TeamFilter::HOSTILE,
            max_count: None,
            include_self: false,
            origin: TargetOrigin::Caster,
        }
    }

    pub fn filter(mut self, filter: TeamFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn max_count(mut self, max: usize) -> Self {
        self.max_count = Some(max);
        self
    }

    pub fn from_point(mut self) -> Self {
        self.origin = TargetOrigin::Point;
        self
    }
}

impl Default for TargetingSpec {
    fn default() -> Self {
        Self::self_only()
    }
}

/// One effect an ability applies to each of its targets.
///
/// `params` is a template; source, target and ability are filled in per
/// target at execution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectDescriptor {
    pub kind: EffectKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub params: EffectParams,
    /// Multiplies the amount by the caster's level scaling.
    #[cfg_attr(feature = "serde", serde(default))]
    pub scale_with_level: bool,
}

impl EffectDescriptor {
    pub fn new(kind: EffectKind, params: EffectParams) -> Self {
        Self {
            kind,
            params,
            scale_with_level: false,
        }
    }

    pub fn scaled(mut self) -> Self {
        self.scale_with_level = true;
        self
    }
}

/// Position of an ability inside a combo chain.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainInfo {
    pub chain: ChainId,
    /// 1-based step number.
    pub position: u32,
    /// Ability that continues the chain; `None` on the final step.
    #[cfg_attr(feature = "serde", serde(default))]
    pub next: Option<AbilityId>,
    /// Window for the next step after this one executes.
    #[cfg_attr(feature = "serde", serde(with = "crate::time::millis"))]
    pub timeout: Duration,
}

#[cfg(feature = "serde")]
fn interruptible_default() -> bool {
    true
}

/// Immutable description of an ability.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilityDefinition {
    pub id: AbilityId,
    #[cfg_attr(feature = "serde", serde(default, with = "crate::time::millis"))]
    pub cast_time: Duration,
    #[cfg_attr(feature = "serde", serde(default, with = "crate::time::millis"))]
    pub cooldown: Duration,
    #[cfg_attr(feature = "serde", serde(default))]
    pub cooldown_category: Option<CooldownCategory>,
    /// Resource reserved when the request is accepted.
    #[cfg_attr(feature = "serde", serde(default))]
    pub cost: f64,
    #[cfg_attr(feature = "serde", serde(default = "interruptible_default"))]
    pub interruptible: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub targeting: TargetingSpec,
    pub effects: Vec<EffectDescriptor>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub chain: Option<ChainInfo>,
}

impl AbilityDefinition {
    /// Instant, free, self-targeted ability without effects.
    pub fn new(id: impl Into<AbilityId>) -> Self {
        Self {
            id: id.into(),
            cast_time: Duration::ZERO,
            cooldown: Duration::ZERO,
            cooldown_category: None,
            cost: 0.0,
            interruptible: true,
            targeting: TargetingSpec::default(),
            effects: Vec::new(),
            chain: None,
        }
    }

    pub fn cast_time(mut self, cast_time: Duration) -> Self {
        self.cast_time = cast_time;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn cooldown_category(mut self, category: impl Into<CooldownCategory>) -> Self {
        self.cooldown_category = Some(category.into());
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn uninterruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }

    pub fn targeting(mut self, targeting: TargetingSpec) -> Self {
        self.targeting = targeting;
        self
    }

    pub fn effect(mut self, descriptor: EffectDescriptor) -> Self {
        self.effects.push(descriptor);
        self
    }

    pub fn chain(mut self, chain: ChainInfo) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn is_instant(&self) -> bool {
        self.cast_time.is_zero()
    }

    /// Rejects definitions registration would refuse.
    pub fn validate(&self) -> Result<(), AbilityError> {
        let invalid = |reason: &str| AbilityError::InvalidDefinition {
            ability: self.id.clone(),
            reason: reason.to_owned(),
        };
        if self.effects.is_empty() {
            return Err(invalid("at least one effect is required"));
        }
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(invalid("cost must be a non-negative number"));
        }
        if !self.targeting.range.is_finite() || self.targeting.range < 0.0 {
            return Err(invalid("range must be a non-negative number"));
        }
        if let Some(chain) = &self.chain {
            if chain.position == 0 {
                return Err(invalid("chain positions start at 1"));
            }
            if chain.next.as_ref() == Some(&self.id) {
                return Err(invalid("chain cannot continue into itself"));
            }
        }
        Ok(())
    }
}

/// Target information supplied with a request.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AbilityTarget {
    pub point: Option<Vec3>,
    pub direction: Option<Vec3>,
}

impl AbilityTarget {
    pub fn point(point: Vec3) -> Self {
        Self {
            point: Some(point),
            direction: None,
        }
    }

    pub fn direction(direction: Vec3) -> Self {
        Self {
            point: None,
            direction: Some(direction),
        }
    }
}

/// Rejections from ability requests and caster management.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AbilityError {
    #[error("unknown ability {0}")]
    UnknownAbility(AbilityId),

    #[error("ability {0} is already defined")]
    DuplicateDefinition(AbilityId),

    #[error("ability {ability} is invalid: {reason}")]
    InvalidDefinition { ability: AbilityId, reason: String },

    #[error("caster {0} not found")]
    CasterNotFound(EntityId),

    #[error("caster {0} is dead")]
    CasterDead(EntityId),

    #[error("caster {0} is incapacitated")]
    Incapacitated(EntityId),

    #[error("{entity} does not know {ability}")]
    NotGranted { entity: EntityId, ability: AbilityId },

    #[error("{ability} is on cooldown for {}ms", remaining.as_millis())]
    OnCooldown { ability: AbilityId, remaining: Duration },

    #[error("not enough resource: need {required}, have {available}")]
    InsufficientResource { required: f64, available: f64 },

    #[error("{entity} is casting {ability}")]
    CastInProgress { entity: EntityId, ability: AbilityId },

    #[error("{0} has no active cast")]
    NoActiveCast(EntityId),

    #[error("{ability} cannot be interrupted")]
    NotInterruptible { ability: AbilityId },

    #[error("chain {chain} has not been started")]
    ChainNotStarted { chain: ChainId },

    #[error("chain {chain} window has closed")]
    ChainExpired { chain: ChainId },

    #[error("{ability} is out of order in chain {chain}")]
    ChainOutOfOrder { chain: ChainId, ability: AbilityId },
}

impl CombatError for AbilityError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::DuplicateDefinition(_) | Self::InvalidDefinition { .. } => ErrorSeverity::Internal,
            Self::OnCooldown { .. }
            | Self::InsufficientResource { .. }
            | Self::CastInProgress { .. }
            | Self::Incapacitated(_) => ErrorSeverity::Recoverable,
            _ => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownAbility(_) => "ABILITY_UNKNOWN",
            Self::DuplicateDefinition(_) => "ABILITY_DUPLICATE",
            Self::InvalidDefinition { .. } => "ABILITY_INVALID_DEFINITION",
            Self::CasterNotFound(_) => "ABILITY_CASTER_NOT_FOUND",
            Self::CasterDead(_) => "ABILITY_CASTER_DEAD",
            Self::Incapacitated(_) => "ABILITY_INCAPACITATED",
            Self::NotGranted { .. } => "ABILITY_NOT_GRANTED",
            Self::OnCooldown { .. } => "ABILITY_ON_COOLDOWN",
            Self::InsufficientResource { .. } => "ABILITY_INSUFFICIENT_RESOURCE",
            Self::CastInProgress { .. } => "ABILITY_CAST_IN_PROGRESS",
            Self::NoActiveCast(_) => "ABILITY_NO_ACTIVE_CAST",
            Self::NotInterruptible { .. } => "ABILITY_NOT_INTERRUPTIBLE",
            Self::ChainNotStarted { .. } => "ABILITY_CHAIN_NOT_STARTED",
            Self::ChainExpired { .. } => "ABILITY_CHAIN_EXPIRED",
            Self::ChainOutOfOrder { .. } => "ABILITY_CHAIN_OUT_OF_ORDER",
        }
    }
}
