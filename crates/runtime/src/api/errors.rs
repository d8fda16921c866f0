//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from worker coordination and from the combat core so
//! clients can bubble them up with consistent context.
use thiserror::Error;
use tokio::sync::oneshot;

use combat_core::{AbilityError, CombatError, ConditionError, EffectError, EntityId, ErrorSeverity, RegistryError};

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("simulation worker command channel closed")]
    CommandChannelClosed,

    #[error("simulation worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("simulation worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    #[error("failed to install content: {0}")]
    Content(String),

    #[error(transparent)]
    Ability(#[from] AbilityError),

    #[error(transparent)]
    Effect(#[from] EffectError),

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RuntimeError {
    /// Severity of the underlying failure. Channel failures are fatal: the
    /// worker is gone.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CommandChannelClosed | Self::ReplyChannelClosed(_) | Self::WorkerJoin(_) => ErrorSeverity::Fatal,
            Self::EntityNotFound(_) => ErrorSeverity::Validation,
            Self::Content(_) => ErrorSeverity::Fatal,
            Self::Ability(e) => e.severity(),
            Self::Effect(e) => e.severity(),
            Self::Condition(e) => e.severity(),
            Self::Registry(e) => e.severity(),
        }
    }
}
