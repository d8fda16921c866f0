//! Combat tuning constants.
//!
//! Every number the formulas depend on lives here so content can retune the
//! engine from a TOML table without touching code. Durations are stored as
//! milliseconds and exposed as [`Duration`] through accessors.

use std::time::Duration;

use crate::stats::{RatingCurve, Stat};

/// Top-level combat configuration.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CombatConfig {
    pub stats: StatConfig,
    pub damage: DamageConfig,
    pub abilities: AbilityConfig,
    pub conditions: ConditionConfig,
    pub world: WorldConfig,
}

/// Stat engine tuning.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StatConfig {
    /// Per-level growth `K` in `1 + (level - 1) × K`.
    pub level_scaling: f64,
    /// Stats whose base value is multiplied by the level scaling.
    pub level_scaled: Vec<Stat>,
    /// Critical strike rating → critical chance percent.
    pub crit_chance: RatingCurve,
    /// Critical power rating → bonus critical multiplier percent.
    pub crit_power: RatingCurve,
    /// Haste rating → condition tick-rate bonus percent.
    pub haste: RatingCurve,
}

impl StatConfig {
    pub const DEFAULT_LEVEL_SCALING: f64 = 0.1;

    /// Returns true if `stat` scales with level.
    pub fn scales_with_level(&self, stat: Stat) -> bool {
        self.level_scaled.contains(&stat)
    }
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            level_scaling: Self::DEFAULT_LEVEL_SCALING,
            level_scaled: vec![Stat::MaxHealth, Stat::MaxResource, Stat::Power, Stat::Defense],
            crit_chance: RatingCurve::new(14.0, 0.1, 50.0, Some(75.0)),
            crit_power: RatingCurve::new(8.0, 0.1, 100.0, None),
            haste: RatingCurve::new(10.0, 0.1, 30.0, Some(50.0)),
        }
    }
}

/// Damage and healing formula tuning.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DamageConfig {
    /// Multiplier per point of power: `1 + power × coefficient`.
    pub power_coefficient: f64,
    /// Damage change per level of difference (`K_dmg`). Healing uses half.
    pub level_coefficient: f64,
    /// Largest deviation of the level factor from 1 (`Kmax`).
    pub level_max: f64,
    /// Defense needed per target level for 50% mitigation (`Kbase`).
    pub armor_base: f64,
    /// Mitigation ceiling (`Kcap`).
    pub mitigation_cap: f64,
    /// Defense bonus per level the target has over the source.
    pub outlevel_defense_bonus: f64,
    /// Critical chance percent before rating.
    pub base_crit_chance: f64,
    /// Critical multiplier before rating.
    pub base_crit_multiplier: f64,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            power_coefficient: 0.01,
            level_coefficient: 0.05,
            level_max: 0.5,
            armor_base: 50.0,
            mitigation_cap: 0.75,
            outlevel_defense_bonus: 0.1,
            base_crit_chance: 5.0,
            base_crit_multiplier: 1.5,
        }
    }
}

/// Ability orchestration tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AbilityConfig {
    /// Punitive cooldown applied when an interruptible cast is cut short.
    pub interrupt_cooldown_ms: u64,
    /// Spacing of cast progress notifications.
    pub cast_progress_interval_ms: u64,
}

impl AbilityConfig {
    pub fn interrupt_cooldown(&self) -> Duration {
        Duration::from_millis(self.interrupt_cooldown_ms)
    }

    pub fn cast_progress_interval(&self) -> Duration {
        Duration::from_millis(self.cast_progress_interval_ms)
    }
}

impl Default for AbilityConfig {
    fn default() -> Self {
        Self {
            interrupt_cooldown_ms: 1_000,
            cast_progress_interval_ms: 250,
        }
    }
}

/// Condition heartbeat tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConditionConfig {
    /// Interval at which hosts should drive [`crate::CombatWorld::update`].
    pub heartbeat_interval_ms: u64,
    /// Most periodic ticks one instance may fire in a single heartbeat.
    pub max_tick_catchup: u32,
}

impl ConditionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for ConditionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 100,
            max_tick_catchup: 8,
        }
    }
}

/// World-level settings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorldConfig {
    /// Seed for critical strike rolls.
    pub seed: u64,
    /// Most deferred follow-ups (hook effects, interrupts) drained per call.
    pub max_deferred: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_deferred: 256,
        }
    }
}
