//! Condition lifecycle hooks.
//!
//! Hooks never reach into other systems directly. Interception hooks mutate
//! the packet they are handed; tick and apply hooks return [`Deferred`]
//! follow-ups that the world drains through the effect pipeline.

use std::collections::BTreeMap;

use super::{ConditionData, ConditionId};
use crate::combat::{DamagePacket, DamageType, HealPacket};
use crate::effect::{EffectKind, EffectParams};
use crate::entity::EntityId;
use crate::stats::{ModifierSpec, Stat};

/// Work queued by condition hooks for the world to run after the current
/// operation finishes.
#[derive(Clone, Debug, PartialEq)]
pub enum Deferred {
    /// Execute an effect through the pipeline.
    Effect { kind: EffectKind, params: EffectParams },
    /// Interrupt the entity's active cast.
    Interrupt(EntityId),
    /// Remove a condition (e.g. a depleted shield).
    RemoveCondition {
        target: EntityId,
        condition: ConditionId,
        all_stacks: bool,
    },
}

/// Behavior attached to a condition definition.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConditionHook {
    /// Damage on every tick, from the instance's source.
    PeriodicDamage {
        amount: f64,
        #[cfg_attr(feature = "serde", serde(default))]
        damage_type: DamageType,
        #[cfg_attr(feature = "serde", serde(default))]
        per_stack: bool,
    },
    /// Healing on every tick.
    PeriodicHeal {
        amount: f64,
        #[cfg_attr(feature = "serde", serde(default))]
        per_stack: bool,
    },
    /// Stat modifier held for as long as the condition is active.
    StatModifier {
        #[cfg_attr(feature = "serde", serde(default))]
        flat: BTreeMap<Stat, f64>,
        #[cfg_attr(feature = "serde", serde(default))]
        percent: BTreeMap<Stat, f64>,
        #[cfg_attr(feature = "serde", serde(default))]
        per_stack: bool,
    },
    /// Scales damage the holder takes.
    DamageTaken {
        percent: f64,
        #[cfg_attr(feature = "serde", serde(default))]
        per_stack: bool,
    },
    /// Scales damage the holder deals.
    DamageDealt {
        percent: f64,
        #[cfg_attr(feature = "serde", serde(default))]
        per_stack: bool,
    },
    /// Scales healing the holder receives.
    HealingReceived {
        percent: f64,
        #[cfg_attr(feature = "serde", serde(default))]
        per_stack: bool,
    },
    /// Soaks damage from the pool stored under `key` in the instance data.
    Absorb { key: String },
    /// Blocks ability use and interrupts casting.
    Incapacitate,
}

fn stack_factor(per_stack: bool, stacks: u32) -> f64 {
    if per_stack { f64::from(stacks) } else { 1.0 }
}

fn percent_multiplier(percent: f64, per_stack: bool, stacks: u32) -> f64 {
    (1.0 + percent * stack_factor(per_stack, stacks) / 100.0).max(0.0)
}

impl ConditionHook {
    /// Follow-up for one periodic tick.
    pub fn on_tick(&self, holder: EntityId, stacks: u32, data: &ConditionData) -> Option<Deferred> {
        match self {
            Self::PeriodicDamage {
                amount,
                damage_type,
                per_stack,
            } => Some(Deferred::Effect {
                kind: EffectKind::Damage,
                params: EffectParams::new(holder)
                    .source(data.source)
                    .amount(amount * stack_factor(*per_stack, stacks))
                    .damage_type(*damage_type)
                    .periodic(),
            }),
            Self::PeriodicHeal { amount, per_stack } => Some(Deferred::Effect {
                kind: EffectKind::Heal,
                params: EffectParams::new(holder)
                    .source(data.source)
                    .amount(amount * stack_factor(*per_stack, stacks))
                    .periodic(),
            }),
            _ => None,
        }
    }

    /// Modifier this hook holds at `stacks`, tagged with `source`.
    pub fn modifier_spec(&self, source: &str, stacks: u32) -> Option<ModifierSpec> {
        let Self::StatModifier {
            flat,
            percent,
            per_stack,
        } = self
        else {
            return None;
        };
        let spec = ModifierSpec {
            source: source.to_owned(),
            flat: flat.clone(),
            percent: percent.clone(),
            duration: None,
        };
        Some(spec.scaled(stack_factor(*per_stack, stacks)))
    }

    /// Interception on damage the holder deals.
    pub fn on_deal_damage(&self, stacks: u32, packet: &mut DamagePacket) {
        if let Self::DamageDealt { percent, per_stack } = self {
            packet.amount *= percent_multiplier(*percent, *per_stack, stacks);
        }
    }

    /// Interception on damage the holder takes. Returns true when an absorb
    /// pool is used up.
    pub fn on_damaged(&self, stacks: u32, data: &mut ConditionData, packet: &mut DamagePacket) -> bool {
        match self {
            Self::DamageTaken { percent, per_stack } => {
                packet.amount *= percent_multiplier(*percent, *per_stack, stacks);
                false
            }
            Self::Absorb { key } => {
                let pool = data.get(key).unwrap_or(0.0).max(0.0);
                let soaked = pool.min(packet.amount.max(0.0));
                packet.amount -= soaked;
                packet.absorbed += soaked;
                let left = pool - soaked;
                data.set(key.clone(), left);
                left <= 0.0
            }
            _ => false,
        }
    }

    /// Interception on healing the holder receives.
    pub fn on_healed(&self, stacks: u32, packet: &mut HealPacket) {
        if let Self::HealingReceived { percent, per_stack } = self {
            packet.amount *= percent_multiplier(*percent, *per_stack, stacks);
        }
    }
}
