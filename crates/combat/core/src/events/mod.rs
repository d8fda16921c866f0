//! Event bus and the events published through it.

mod bus;
mod types;

pub use bus::{BusError, EventBus, HandlerError, Response, Subscription};
pub use types::{
    AbilityExecution, ChainStep, CombatEvent, DamageEvent, HealEvent, TargetOutcome, Topic,
};
