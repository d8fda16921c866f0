use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use glam::Vec3;
use strum::Display;

use super::{AbilityId, ChainId};
use crate::time::Timestamp;

/// Lifecycle phase of one ability for one caster.
///
/// `Validating` and `Executing` only exist inside a request; stored state
/// never reports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AbilityPhase {
    Idle,
    Validating,
    Casting,
    Executing,
    Cooldown,
    Interrupted,
}

/// Cast in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveCast {
    pub ability: AbilityId,
    pub point: Option<Vec3>,
    pub direction: Option<Vec3>,
    pub started_at: Timestamp,
    pub ends_at: Timestamp,
    pub interruptible: bool,
    pub generation: u64,
}

impl ActiveCast {
    /// Completed fraction at `now`, in `[0, 1]`.
    pub fn progress(&self, now: Timestamp) -> f32 {
        let total = self.ends_at.saturating_since(self.started_at).as_secs_f32();
        if total <= 0.0 {
            return 1.0;
        }
        (now.saturating_since(self.started_at).as_secs_f32() / total).clamp(0.0, 1.0)
    }
}

/// Progress through one combo chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainProgress {
    /// Last completed step.
    pub position: u32,
    pub next: AbilityId,
    pub expires_at: Timestamp,
    pub generation: u64,
}

/// Everything the orchestrator tracks for one caster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CasterState {
    pub granted: BTreeSet<AbilityId>,
    /// Cooldown end per ability. Never decremented; compared against now.
    pub cooldowns: BTreeMap<AbilityId, Timestamp>,
    pub cast: Option<ActiveCast>,
    pub chains: BTreeMap<ChainId, ChainProgress>,
    /// Ability whose cast was last interrupted, with its penalty end.
    pub interrupted: Option<(AbilityId, Timestamp)>,
}

impl CasterState {
    pub fn cooldown_remaining(&self, ability: &AbilityId, now: Timestamp) -> Duration {
        self.cooldowns
            .get(ability)
            .map_or(Duration::ZERO, |end| end.saturating_since(now))
    }

    /// Pushes the cooldown end out to `ends_at`; an existing later end wins.
    pub fn start_cooldown(&mut self, ability: AbilityId, ends_at: Timestamp) -> Timestamp {
        let end = self.cooldowns.entry(ability).or_insert(ends_at);
        *end = (*end).max(ends_at);
        *end
    }

    pub fn phase(&self, ability: &AbilityId, now: Timestamp) -> AbilityPhase {
        if self.cast.as_ref().is_some_and(|c| &c.ability == ability) {
            return AbilityPhase::Casting;
        }
        if self.cooldown_remaining(ability, now).is_zero() {
            return AbilityPhase::Idle;
        }
        match &self.interrupted {
            Some((id, until)) if id == ability && *until > now => AbilityPhase::Interrupted,
            _ => AbilityPhase::Cooldown,
        }
    }
}
