//! Effect dispatch table.
//!
//! Execution flow for [`EffectPipeline::execute`]:
//! 1. Look up the handler registered for the kind
//! 2. Validate required fields and merge category defaults
//! 3. Invoke the handler with the caller's [`EffectServices`]
//! 4. Publish `EffectExecuted` on success, `EffectFailed` on a handler error
//!
//! Handler errors never propagate past this boundary as anything but an
//! `Err` value.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use super::{EffectCategory, EffectError, EffectKind, EffectOutcome, EffectParams, EffectServices, builtin, prepare};
use crate::error::CombatError;
use crate::events::{CombatEvent, EventBus};

/// Signature of an effect handler.
pub type EffectFn = fn(&EffectParams, &mut dyn EffectServices) -> Result<EffectOutcome, EffectError>;

#[derive(Clone, Copy)]
struct Registration {
    category: EffectCategory,
    handler: EffectFn,
}

/// Registry mapping each effect kind to its category and handler.
pub struct EffectPipeline {
    handlers: BTreeMap<EffectKind, Registration>,
    bus: EventBus,
}

impl EffectPipeline {
    /// Creates an empty pipeline.
    pub fn new(bus: EventBus) -> Self {
        Self {
            handlers: BTreeMap::new(),
            bus,
        }
    }

    /// Creates a pipeline with every built-in effect registered.
    pub fn with_builtins(bus: EventBus) -> Self {
        let handlers = builtin::all()
            .into_iter()
            .map(|(kind, category, handler)| (kind, Registration { category, handler }))
            .collect();
        Self { handlers, bus }
    }

    /// Registers a handler. Each kind may be registered once.
    pub fn register(
        &mut self,
        kind: EffectKind,
        category: EffectCategory,
        handler: EffectFn,
    ) -> Result<(), EffectError> {
        if self.handlers.contains_key(&kind) {
            return Err(EffectError::DuplicateKind(kind));
        }
        self.handlers.insert(kind, Registration { category, handler });
        Ok(())
    }

    pub fn is_registered(&self, kind: EffectKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn category_of(&self, kind: EffectKind) -> Option<EffectCategory> {
        self.handlers.get(&kind).map(|r| r.category)
    }

    /// Kinds registered under `category`, in kind order.
    pub fn kinds_in(&self, category: EffectCategory) -> Vec<EffectKind> {
        self.handlers
            .iter()
            .filter(|(_, r)| r.category == category)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Validates and executes one effect.
    pub fn execute(
        &self,
        kind: EffectKind,
        params: EffectParams,
        services: &mut dyn EffectServices,
    ) -> Result<EffectOutcome, EffectError> {
        let registration = self
            .handlers
            .get(&kind)
            .copied()
            .ok_or(EffectError::UnknownKind(kind))
            .inspect_err(|e| debug!(target: "combat::effects", %kind, error = %e, "rejected"))?;

        let params = prepare(kind, params)
            .inspect_err(|e| debug!(target: "combat::effects", %kind, error = %e, "rejected"))?;

        match (registration.handler)(&params, services) {
            Ok(outcome) => {
                trace!(target: "combat::effects", %kind, target = %params.target, "executed");
                self.bus.publish(CombatEvent::EffectExecuted {
                    kind,
                    params: Box::new(params),
                    outcome: outcome.clone(),
                });
                Ok(outcome)
            }
            Err(error) => {
                warn!(
                    target: "combat::effects",
                    %kind,
                    target = %params.target,
                    code = error.error_code(),
                    error = %error,
                    "effect failed"
                );
                self.bus.publish(CombatEvent::EffectFailed {
                    kind,
                    params: Box::new(params),
                    reason: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for EffectPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectPipeline")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use glam::Vec3;

    use super::*;
    use crate::combat::{DamageError, DamageRequest, HealRequest};
    use crate::condition::{Applied, ConditionCategory, ConditionData, ConditionError, ConditionId};
    use crate::entity::{EntityId, RegistryError};
    use crate::events::{DamageEvent, HealEvent, Topic};
    use crate::stats::{ModifierId, ModifierSpec, StatError};

    /// Services stub that records damage requests and fails everything else.
    #[derive(Default)]
    struct Recorder {
        damage: Vec<DamageRequest>,
    }

    impl EffectServices for Recorder {
        fn is_alive(&self, _: EntityId) -> bool {
            true
        }
        fn position(&self, _: EntityId) -> Result<Vec3, RegistryError> {
            Ok(Vec3::ZERO)
        }
        fn set_position(&mut self, _: EntityId, _: Vec3) -> Result<(), RegistryError> {
            Ok(())
        }
        fn deal_damage(&mut self, request: DamageRequest) -> Result<DamageEvent, DamageError> {
            let event = DamageEvent {
                source: request.source,
                target: request.target,
                amount: request.base,
                absorbed: 0.0,
                damage_type: request.options.damage_type,
                critical: false,
                killing_blow: false,
                periodic: request.options.periodic,
            };
            self.damage.push(request);
            Ok(event)
        }
        fn heal(&mut self, request: HealRequest) -> Result<HealEvent, DamageError> {
            Err(DamageError::TargetNotFound(request.target))
        }
        fn apply_condition(
            &mut self,
            target: EntityId,
            _: &ConditionId,
            _: u32,
            _: Option<Duration>,
            _: ConditionData,
        ) -> Result<Applied, ConditionError> {
            Err(ConditionError::TargetNotFound(target))
        }
        fn remove_condition(&mut self, target: EntityId, _: &ConditionId, _: bool) -> Result<u32, ConditionError> {
            Err(ConditionError::TargetNotFound(target))
        }
        fn cleanse(&mut self, _: EntityId, _: Option<ConditionCategory>) -> Result<Vec<ConditionId>, ConditionError> {
            Ok(Vec::new())
        }
        fn apply_modifier(&mut self, target: EntityId, _: ModifierSpec) -> Result<ModifierId, StatError> {
            Err(StatError::NotRegistered(target))
        }
        fn remove_modifier(&mut self, target: EntityId, _: ModifierId) -> Result<(), StatError> {
            Err(StatError::NotRegistered(target))
        }
        fn remove_modifiers_by_source(&mut self, _: EntityId, _: &str) -> Vec<ModifierId> {
            Vec::new()
        }
        fn restore_resource(&mut self, _: EntityId, amount: f64) -> Result<f64, RegistryError> {
            Ok(amount)
        }
    }

    fn capture(bus: &EventBus) -> Arc<Mutex<Vec<CombatEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        bus.subscribe(Topic::Effect, move |e| {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        });
        log
    }

    #[test]
    fn builtins_cover_every_category() {
        let pipeline = EffectPipeline::with_builtins(EventBus::new());
        assert_eq!(pipeline.kinds_in(EffectCategory::Damage), vec![EffectKind::Damage]);
        assert_eq!(
            pipeline.kinds_in(EffectCategory::Condition),
            vec![
                EffectKind::ApplyCondition,
                EffectKind::RemoveCondition,
                EffectKind::Cleanse
            ]
        );
        assert_eq!(
            pipeline.kinds_in(EffectCategory::Movement),
            vec![EffectKind::Knockback, EffectKind::Pull]
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut pipeline = EffectPipeline::with_builtins(EventBus::new());
        let err = pipeline
            .register(EffectKind::Damage, EffectCategory::Damage, |_, _| {
                Ok(EffectOutcome::ModifiersRemoved(Vec::new()))
            })
            .unwrap_err();
        assert_eq!(err, EffectError::DuplicateKind(EffectKind::Damage));
    }

    #[test]
    fn unknown_kind_fails_fast() {
        let pipeline = EffectPipeline::new(EventBus::new());
        let err = pipeline
            .execute(EffectKind::Pull, EffectParams::new(EntityId(1)), &mut Recorder::default())
            .unwrap_err();
        assert_eq!(err, EffectError::UnknownKind(EffectKind::Pull));
    }

    #[test]
    fn success_publishes_executed_with_defaults() {
        let bus = EventBus::new();
        let log = capture(&bus);
        let pipeline = EffectPipeline::with_builtins(bus);
        let mut services = Recorder::default();

        pipeline
            .execute(
                EffectKind::Damage,
                EffectParams::new(EntityId(2)).source(EntityId(1)).amount(12.0),
                &mut services,
            )
            .unwrap();

        assert_eq!(services.damage.len(), 1);
        let events = log.lock().unwrap();
        assert!(matches!(
            &events[0],
            CombatEvent::EffectExecuted { kind: EffectKind::Damage, params, .. }
                if params.damage_type == Some(crate::combat::DamageType::Physical)
        ));
    }

    #[test]
    fn handler_error_becomes_failure_event() {
        let bus = EventBus::new();
        let log = capture(&bus);
        let pipeline = EffectPipeline::with_builtins(bus);

        let result = pipeline.execute(
            EffectKind::Heal,
            EffectParams::new(EntityId(3)).amount(5.0),
            &mut Recorder::default(),
        );

        assert!(result.is_err());
        let events = log.lock().unwrap();
        assert!(matches!(
            &events[0],
            CombatEvent::EffectFailed { kind: EffectKind::Heal, reason, .. } if reason.contains("#3")
        ));
    }

    #[test]
    fn validation_failure_publishes_nothing() {
        let bus = EventBus::new();
        let log = capture(&bus);
        let pipeline = EffectPipeline::with_builtins(bus);

        let result = pipeline.execute(EffectKind::Damage, EffectParams::new(EntityId(3)), &mut Recorder::default());
        assert!(matches!(result, Err(EffectError::MissingField { .. })));
        assert!(log.lock().unwrap().is_empty());
    }
}
