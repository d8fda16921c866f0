//! Built-in effect handlers.
//!
//! Handlers receive parameters that already passed [`super::prepare`], so
//! required fields are present; the `MissingField` fallbacks below only
//! guard direct calls.

use glam::Vec3;

use super::{EffectCategory, EffectError, EffectFn, EffectKind, EffectOutcome, EffectParams, EffectServices};
use crate::combat::{DamageOptions, DamageRequest, DamageType, HealRequest};

pub(super) fn all() -> [(EffectKind, EffectCategory, EffectFn); 10] {
    [
        (EffectKind::Damage, EffectCategory::Damage, damage),
        (EffectKind::Heal, EffectCategory::Healing, heal),
        (EffectKind::ApplyCondition, EffectCategory::Condition, apply_condition),
        (EffectKind::RemoveCondition, EffectCategory::Condition, remove_condition),
        (EffectKind::Cleanse, EffectCategory::Condition, cleanse),
        (EffectKind::ApplyModifier, EffectCategory::StatUtility, apply_modifier),
        (EffectKind::RemoveModifier, EffectCategory::StatUtility, remove_modifier),
        (EffectKind::RestoreResource, EffectCategory::StatUtility, restore_resource),
        (EffectKind::Knockback, EffectCategory::Movement, knockback),
        (EffectKind::Pull, EffectCategory::Movement, pull),
    ]
}

fn require<T: Clone>(kind: EffectKind, field: &'static str, value: &Option<T>) -> Result<T, EffectError> {
    value.clone().ok_or(EffectError::MissingField { kind, field })
}

fn options(params: &EffectParams) -> DamageOptions {
    DamageOptions {
        damage_type: params.damage_type.unwrap_or(DamageType::Physical),
        force_crit: params.force_crit,
        periodic: params.periodic,
        ignorable: params.ignorable,
    }
}

// ============================================================================
// Damage / Healing
// ============================================================================

fn damage(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    let base = require(EffectKind::Damage, "amount", &params.amount)?;
    let event = services.deal_damage(DamageRequest::new(params.source, params.target, base, options(params)))?;
    Ok(EffectOutcome::Damage {
        amount: event.amount,
        absorbed: event.absorbed,
        critical: event.critical,
        killing_blow: event.killing_blow,
    })
}

fn heal(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    let base = require(EffectKind::Heal, "amount", &params.amount)?;
    let event = services.heal(HealRequest::new(params.source, params.target, base, options(params)))?;
    Ok(EffectOutcome::Heal {
        amount: event.amount,
        overheal: event.overheal,
        critical: event.critical,
    })
}

// ============================================================================
// Conditions
// ============================================================================

fn apply_condition(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    let condition = require(EffectKind::ApplyCondition, "condition", &params.condition)?;
    let mut data = params.data.clone().unwrap_or_default();
    if data.source.is_none() {
        data.source = params.source;
    }

    let applied = services.apply_condition(
        params.target,
        &condition,
        params.stacks.unwrap_or(1),
        params.duration,
        data,
    )?;
    Ok(EffectOutcome::ConditionApplied {
        condition,
        stacks: applied.stacks,
        transformed_into: applied.transformed_into,
    })
}

fn remove_condition(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    let condition = require(EffectKind::RemoveCondition, "condition", &params.condition)?;
    let remaining_stacks = services.remove_condition(params.target, &condition, params.all_stacks)?;
    Ok(EffectOutcome::ConditionRemoved {
        condition,
        remaining_stacks,
    })
}

fn cleanse(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    let removed = services.cleanse(params.target, params.category)?;
    Ok(EffectOutcome::Cleansed { removed })
}

// ============================================================================
// Stats / Resources
// ============================================================================

fn apply_modifier(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    let spec = require(EffectKind::ApplyModifier, "modifier", &params.modifier)?;
    let id = services.apply_modifier(params.target, spec)?;
    Ok(EffectOutcome::ModifierApplied(id))
}

fn remove_modifier(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    if let Some(id) = params.modifier_id {
        services.remove_modifier(params.target, id)?;
        return Ok(EffectOutcome::ModifiersRemoved(vec![id]));
    }
    let source = require(EffectKind::RemoveModifier, "modifier_id or modifier_source", &params.modifier_source)?;
    Ok(EffectOutcome::ModifiersRemoved(
        services.remove_modifiers_by_source(params.target, &source),
    ))
}

fn restore_resource(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    let amount = require(EffectKind::RestoreResource, "amount", &params.amount)?;
    if !services.is_alive(params.target) {
        return Err(EffectError::TargetNotAlive(params.target));
    }
    let gained = services.restore_resource(params.target, amount)?;
    Ok(EffectOutcome::ResourceRestored { amount: gained })
}

// ============================================================================
// Movement
// ============================================================================

/// Point the target is displaced relative to: explicit origin, else the
/// source's position.
fn anchor(kind: EffectKind, params: &EffectParams, services: &dyn EffectServices) -> Result<Vec3, EffectError> {
    if let Some(origin) = params.origin {
        return Ok(origin);
    }
    let source = require(kind, "origin or source", &params.source)?;
    Ok(services.position(source)?)
}

fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

fn knockback(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    let distance = require(EffectKind::Knockback, "distance", &params.distance)?;
    if !services.is_alive(params.target) {
        return Err(EffectError::TargetNotAlive(params.target));
    }
    let anchor = anchor(EffectKind::Knockback, params, services)?;
    let from = services.position(params.target)?;
    // Targets standing on the anchor are pushed along +Z.
    let away = horizontal(from - anchor).try_normalize().unwrap_or(Vec3::Z);
    let to = from + away * distance;
    services.set_position(params.target, to)?;
    Ok(EffectOutcome::Displaced { from, to })
}

fn pull(params: &EffectParams, services: &mut dyn EffectServices) -> Result<EffectOutcome, EffectError> {
    let distance = require(EffectKind::Pull, "distance", &params.distance)?;
    if !services.is_alive(params.target) {
        return Err(EffectError::TargetNotAlive(params.target));
    }
    let anchor = anchor(EffectKind::Pull, params, services)?;
    let from = services.position(params.target)?;
    let offset = horizontal(anchor - from);
    // Never pulled past the anchor.
    let step = offset.length().min(distance);
    let to = from + offset.normalize_or_zero() * step;
    services.set_position(params.target, to)?;
    Ok(EffectOutcome::Displaced { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_table_is_complete() {
        use strum::IntoEnumIterator;
        let table = all();
        for kind in EffectKind::iter() {
            assert!(table.iter().any(|(k, _, _)| *k == kind), "{kind} missing");
        }
    }

    #[test]
    fn damage_options_carry_flags() {
        let params = EffectParams::new(crate::entity::EntityId(1))
            .amount(3.0)
            .damage_type(DamageType::Fire)
            .periodic();
        let opts = options(&params);
        assert_eq!(opts.damage_type, DamageType::Fire);
        assert!(opts.periodic);
        assert_eq!(opts.force_crit, None);
    }
}
