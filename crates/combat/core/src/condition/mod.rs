//! Conditions: stacking, timed buffs and debuffs.
//!
//! Each (entity, condition) pair is either absent or holds one
//! [`ConditionInstance`]. Definitions declare how reapplication merges
//! stacks and duration, what happens at expiry, how instance data is
//! inherited, and which [`ConditionHook`]s run over the lifecycle.

mod hooks;
mod manager;

pub use hooks::{ConditionHook, Deferred};
pub use manager::{ConditionManager, HookContext};

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::entity::EntityId;
use crate::error::{CombatError, ErrorSeverity};
use crate::time::Timestamp;

string_id! {
    /// Condition identifier, conventionally upper case (`BURNING`).
    ConditionId
}

/// Buff or debuff, used by cleanses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConditionCategory {
    Buff,
    #[default]
    Debuff,
}

/// How reapplying an active condition merges with it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StackPolicy {
    /// Reset duration, keep the stack count.
    #[default]
    Refresh,
    /// Add stacks up to the cap; duration becomes the longer of old and new.
    Add,
    /// Separate instances per application.
    ///
    /// Currently merged exactly like [`StackPolicy::Add`]: an entity holds at
    /// most one instance per condition id.
    Independent,
}

/// What expiry does to an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExpiryBehavior {
    /// Drop this many stacks; if any remain, the duration restarts.
    RemoveStacks(u32),
    RemoveAll,
}

impl Default for ExpiryBehavior {
    fn default() -> Self {
        Self::RemoveStacks(1)
    }
}

/// Merge rule for one data key on reapplication.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InheritPolicy {
    /// Keep the existing value.
    Preserve,
    /// Take the incoming value.
    #[default]
    Replace,
    Sum,
    Max,
    Min,
}

impl InheritPolicy {
    pub fn merge(self, old: f64, new: f64) -> f64 {
        match self {
            Self::Preserve => old,
            Self::Replace => new,
            Self::Sum => old + new,
            Self::Max => old.max(new),
            Self::Min => old.min(new),
        }
    }
}

/// Default merge rule plus per-key overrides.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DataInheritance {
    pub default: InheritPolicy,
    pub overrides: BTreeMap<String, InheritPolicy>,
}

impl DataInheritance {
    pub fn policy_for(&self, key: &str) -> InheritPolicy {
        self.overrides.get(key).copied().unwrap_or(self.default)
    }
}

/// Data carried by an instance: who applied it plus named numbers
/// (shield pools, charge counters, ...).
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConditionData {
    pub source: Option<EntityId>,
    pub values: BTreeMap<String, f64>,
}

impl ConditionData {
    pub fn from_source(source: impl Into<Option<EntityId>>) -> Self {
        Self {
            source: source.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    /// Folds `incoming` into `self` key by key.
    ///
    /// Keys only present on one side are kept. A new source replaces the
    /// old one, so periodic effects follow the latest applier.
    pub fn merge(&mut self, incoming: ConditionData, inheritance: &DataInheritance) {
        if incoming.source.is_some() {
            self.source = incoming.source;
        }
        for (key, new) in incoming.values {
            let policy = inheritance.policy_for(&key);
            match self.values.get_mut(&key) {
                Some(old) => *old = policy.merge(*old, new),
                None => {
                    self.values.insert(key, new);
                }
            }
        }
    }
}

/// Predicate that turns one condition into another.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransformWhen {
    StacksAtLeast(u32),
    DataAtLeast { key: String, value: f64 },
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transformation {
    pub when: TransformWhen,
    pub into: ConditionId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub preserve_stacks: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub merge_data: bool,
}

#[cfg(feature = "serde")]
fn one() -> u32 {
    1
}

/// Immutable description of a condition.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConditionDefinition {
    pub id: ConditionId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub category: ConditionCategory,
    #[cfg_attr(feature = "serde", serde(default = "one"))]
    pub max_stacks: u32,
    #[cfg_attr(feature = "serde", serde(with = "crate::time::millis"))]
    pub duration: Duration,
    #[cfg_attr(feature = "serde", serde(default, with = "crate::time::opt_millis"))]
    pub tick_interval: Option<Duration>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub stacking: StackPolicy,
    #[cfg_attr(feature = "serde", serde(default))]
    pub expiry: ExpiryBehavior,
    #[cfg_attr(feature = "serde", serde(default))]
    pub inheritance: DataInheritance,
    /// Conditions that cannot be applied while this one is active.
    #[cfg_attr(feature = "serde", serde(default))]
    pub prevents: Vec<ConditionId>,
    /// Conditions stripped when this one is first applied.
    #[cfg_attr(feature = "serde", serde(default))]
    pub removes: Vec<ConditionId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub hooks: Vec<ConditionHook>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub transform: Option<Transformation>,
}

impl ConditionDefinition {
    pub fn new(id: impl Into<ConditionId>, duration: Duration) -> Self {
        Self {
            id: id.into(),
            category: ConditionCategory::default(),
            max_stacks: 1,
            duration,
            tick_interval: None,
            stacking: StackPolicy::default(),
            expiry: ExpiryBehavior::default(),
            inheritance: DataInheritance::default(),
            prevents: Vec::new(),
            removes: Vec::new(),
            hooks: Vec::new(),
            transform: None,
        }
    }

    pub fn category(mut self, category: ConditionCategory) -> Self {
        self.category = category;
        self
    }

    pub fn max_stacks(mut self, max: u32) -> Self {
        self.max_stacks = max;
        self
    }

    pub fn ticking(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn stacking(mut self, policy: StackPolicy) -> Self {
        self.stacking = policy;
        self
    }

    pub fn expiry(mut self, expiry: ExpiryBehavior) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn inherit(mut self, key: impl Into<String>, policy: InheritPolicy) -> Self {
        self.inheritance.overrides.insert(key.into(), policy);
        self
    }

    pub fn prevents(mut self, id: impl Into<ConditionId>) -> Self {
        self.prevents.push(id.into());
        self
    }

    pub fn removes(mut self, id: impl Into<ConditionId>) -> Self {
        self.removes.push(id.into());
        self
    }

    pub fn hook(mut self, hook: ConditionHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn transform(mut self, transformation: Transformation) -> Self {
        self.transform = Some(transformation);
        self
    }

    /// Modifier source tag used by stat-modifier hooks.
    pub fn modifier_source(&self) -> String {
        format!("condition:{}", self.id)
    }

    pub fn incapacitates(&self) -> bool {
        self.hooks.iter().any(|h| matches!(h, ConditionHook::Incapacitate))
    }

    pub fn validate(&self) -> Result<(), ConditionError> {
        let invalid = |reason: &str| ConditionError::InvalidDefinition {
            condition: self.id.clone(),
            reason: reason.to_owned(),
        };
        if self.max_stacks == 0 {
            return Err(invalid("max_stacks must be at least 1"));
        }
        if self.duration.is_zero() {
            return Err(invalid("duration must be positive"));
        }
        if self.tick_interval.is_some_and(|i| i.is_zero()) {
            return Err(invalid("tick_interval must be positive"));
        }
        if self.transform.as_ref().is_some_and(|t| t.into == self.id) {
            return Err(invalid("cannot transform into itself"));
        }
        Ok(())
    }
}

/// Live state of a condition on one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionInstance {
    pub condition: ConditionId,
    /// Always in `[1, max_stacks]` while the instance exists.
    pub stacks: u32,
    pub remaining: Duration,
    /// Milliseconds until the next periodic tick.
    pub tick_in: Option<f64>,
    pub data: ConditionData,
    /// Identity of the currently armed expiry timer.
    pub generation: u64,
    pub applied_at: Timestamp,
    /// Time up to which `remaining` and `tick_in` have been charged.
    pub settled_at: Timestamp,
}

impl ConditionInstance {
    /// Charges the time since the last settlement, at most `cap`, against
    /// the remaining duration and, when `ticking`, the tick countdown.
    pub(crate) fn settle(&mut self, now: Timestamp, cap: Duration, ticking: bool) -> Duration {
        let charged = now.saturating_since(self.settled_at).min(cap);
        self.settled_at = self.settled_at.max(now);
        self.remaining = self.remaining.saturating_sub(charged);
        if ticking {
            if let Some(countdown) = self.tick_in.as_mut() {
                *countdown -= charged.as_secs_f64() * 1_000.0;
            }
        }
        charged
    }
}

/// Result of a successful application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    /// Stacks on the applied condition right after the merge.
    pub stacks: u32,
    /// Set when the application triggered a transformation.
    pub transformed_into: Option<ConditionId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("unknown condition {0}")]
    UnknownCondition(ConditionId),

    #[error("condition {0} is already defined")]
    DuplicateDefinition(ConditionId),

    #[error("condition {condition} is invalid: {reason}")]
    InvalidDefinition { condition: ConditionId, reason: String },

    #[error("target {0} not found")]
    TargetNotFound(EntityId),

    #[error("target {0} is dead")]
    TargetDead(EntityId),

    #[error("{condition} is prevented by {by}")]
    Prevented { condition: ConditionId, by: ConditionId },

    #[error("{condition} is not active on {target}")]
    NotActive { target: EntityId, condition: ConditionId },
}

impl CombatError for ConditionError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::DuplicateDefinition(_) | Self::InvalidDefinition { .. } => ErrorSeverity::Internal,
            Self::Prevented { .. } => ErrorSeverity::Recoverable,
            _ => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownCondition(_) => "CONDITION_UNKNOWN",
            Self::DuplicateDefinition(_) => "CONDITION_DUPLICATE",
            Self::InvalidDefinition { .. } => "CONDITION_INVALID_DEFINITION",
            Self::TargetNotFound(_) => "CONDITION_TARGET_NOT_FOUND",
            Self::TargetDead(_) => "CONDITION_TARGET_DEAD",
            Self::Prevented { .. } => "CONDITION_PREVENTED",
            Self::NotActive { .. } => "CONDITION_NOT_ACTIVE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_follows_per_key_policy() {
        let inheritance = DataInheritance {
            default: InheritPolicy::Replace,
            overrides: [
                ("shield".to_owned(), InheritPolicy::Sum),
                ("charges".to_owned(), InheritPolicy::Max),
                ("origin".to_owned(), InheritPolicy::Preserve),
            ]
            .into(),
        };
        let mut data = ConditionData::from_source(EntityId(1))
            .with("shield", 30.0)
            .with("charges", 4.0)
            .with("origin", 1.0)
            .with("power", 10.0);
        let incoming = ConditionData::from_source(EntityId(2))
            .with("shield", 20.0)
            .with("charges", 2.0)
            .with("origin", 9.0)
            .with("power", 12.0)
            .with("fresh", 1.0);

        data.merge(incoming, &inheritance);

        assert_eq!(data.source, Some(EntityId(2)));
        assert_eq!(data.get("shield"), Some(50.0));
        assert_eq!(data.get("charges"), Some(4.0));
        assert_eq!(data.get("origin"), Some(1.0));
        assert_eq!(data.get("power"), Some(12.0));
        assert_eq!(data.get("fresh"), Some(1.0));
    }

    #[test]
    fn sourceless_reapply_keeps_source() {
        let mut data = ConditionData::from_source(EntityId(5));
        data.merge(ConditionData::default(), &DataInheritance::default());
        assert_eq!(data.source, Some(EntityId(5)));
    }

    #[test]
    fn definitions_are_validated() {
        let zero = ConditionDefinition::new("X", Duration::from_secs(1)).max_stacks(0);
        assert!(matches!(zero.validate(), Err(ConditionError::InvalidDefinition { .. })));

        let selfie = ConditionDefinition::new("X", Duration::from_secs(1)).transform(Transformation {
            when: TransformWhen::StacksAtLeast(2),
            into: "X".into(),
            preserve_stacks: false,
            merge_data: false,
        });
        assert!(selfie.validate().is_err());

        assert!(ConditionDefinition::new("X", Duration::from_secs(1)).validate().is_ok());
    }

    #[test]
    fn inherit_policies() {
        assert_eq!(InheritPolicy::Min.merge(3.0, 2.0), 2.0);
        assert_eq!(InheritPolicy::Sum.merge(3.0, 2.0), 5.0);
        assert_eq!(InheritPolicy::Preserve.merge(3.0, 2.0), 3.0);
    }
}
