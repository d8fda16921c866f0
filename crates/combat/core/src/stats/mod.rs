//! Stat engine - base stats, modifiers, level scaling and rating curves.
//!
//! Final value of a stat:
//!
//! ```text
//! final = (base × levelScaling + Σflat) × (1 + Σpercent / 100)
//! levelScaling = 1 + (level - 1) × K      (whitelisted stats only)
//! ```
//!
//! Rating stats (critical rating, critical power, haste) are additionally
//! converted into percentages through a [`RatingCurve`].

mod engine;
mod modifier;
mod rating;

pub use engine::{StatEngine, StatError};
pub use modifier::{ModifierId, ModifierSpec, StatModifier};
pub use rating::RatingCurve;

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Named numeric attribute of an entity.
///
/// The same names key the entity registry's attribute bag (mutable state
/// like current health) and the stat engine's computed values (maximum
/// health, power, defense, ratings).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stat {
    // ========================================================================
    // Pools (current values live in the entity registry)
    // ========================================================================
    Health,
    MaxHealth,
    Resource,
    MaxResource,
    Level,

    // ========================================================================
    // Offense / defense
    // ========================================================================
    Power,
    Defense,
    MoveSpeed,

    // ========================================================================
    // Ratings (converted through rating curves)
    // ========================================================================
    /// Converted into critical chance percent.
    CritRating,
    /// Converted into bonus critical multiplier.
    CritPowerRating,
    /// Converted into condition tick-rate multiplier.
    HasteRating,
}

impl Stat {
    /// Returns true for rating-style stats that go through a rating curve.
    pub const fn is_rating(self) -> bool {
        matches!(self, Self::CritRating | Self::CritPowerRating | Self::HasteRating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn stat_names_round_trip_through_strings() {
        assert_eq!(Stat::MaxHealth.to_string(), "max_health");
        assert_eq!(Stat::from_str("crit_rating").unwrap(), Stat::CritRating);
    }

    #[test]
    fn ratings_are_flagged() {
        assert!(Stat::HasteRating.is_rating());
        assert!(!Stat::Power.is_rating());
    }
}
