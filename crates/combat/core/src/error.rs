//! Common error infrastructure for combat-core.
//!
//! Each subsystem defines its own error enum next to the operations it
//! validates (`AbilityError`, `ConditionError`, ...). They all implement
//! [`CombatError`] so hosts can pick a log level and a stable code without
//! matching on every variant.
//!
//! Validation failures are ordinary `Err` values whose `Display` text is the
//! human-readable reason relayed to clients. No operation in this crate
//! panics on bad input.

/// Severity level of an error, used for categorization and log levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Temporary condition; the same request may succeed later.
    ///
    /// Examples: ability on cooldown, not enough resource.
    Recoverable,

    /// Invalid input; should not be retried unchanged.
    ///
    /// Examples: unknown ability, dead target, missing effect field.
    Validation,

    /// Unexpected state inconsistency. Indicates a bug.
    Internal,

    /// Engine state can no longer be trusted.
    Fatal,
}

impl ErrorSeverity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Validation => "validation",
            Self::Internal => "internal",
            Self::Fatal => "fatal",
        }
    }

    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal | Self::Fatal)
    }
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait implemented by every error type in combat-core.
pub trait CombatError: std::error::Error {
    /// Severity classification for this error.
    fn severity(&self) -> ErrorSeverity;

    /// Stable identifier, formatted as `DOMAIN_ERROR_NAME`.
    fn error_code(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        assert!(ErrorSeverity::Recoverable.is_recoverable());
        assert!(!ErrorSeverity::Validation.is_recoverable());
        assert!(ErrorSeverity::Internal.is_internal());
        assert!(ErrorSeverity::Fatal.is_internal());
        assert_eq!(ErrorSeverity::Validation.to_string(), "validation");
    }
}
