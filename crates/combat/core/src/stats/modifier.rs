//! Stat modifiers: flat and percent deltas from a tagged source.

use std::collections::BTreeMap;
use std::time::Duration;

use super::Stat;

/// Identifier of an applied modifier. Never reused within an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModifierId(pub u64);

impl std::fmt::Display for ModifierId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mod#{}", self.0)
    }
}

/// Description of a modifier before it is applied.
///
/// # Example
/// ```
/// # use std::time::Duration;
/// # use combat_core::stats::{ModifierSpec, Stat};
/// let spec = ModifierSpec::new("potion")
///     .flat(Stat::Power, 10.0)
///     .percent(Stat::Defense, 20.0)
///     .lasting(Duration::from_secs(30));
/// assert_eq!(spec.touched().count(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModifierSpec {
    /// Free-form tag naming what granted the modifier.
    pub source: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub flat: BTreeMap<Stat, f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub percent: BTreeMap<Stat, f64>,
    /// Modifier expires on its own after this long.
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "crate::time::opt_millis")
    )]
    pub duration: Option<Duration>,
}

impl ModifierSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Adds a flat delta (summed with other flat deltas for the stat).
    pub fn flat(mut self, stat: Stat, value: f64) -> Self {
        *self.flat.entry(stat).or_insert(0.0) += value;
        self
    }

    /// Adds a percent delta (20.0 = +20%).
    pub fn percent(mut self, stat: Stat, value: f64) -> Self {
        *self.percent.entry(stat).or_insert(0.0) += value;
        self
    }

    pub fn lasting(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Every stat this modifier contributes to.
    pub fn touched(&self) -> impl Iterator<Item = Stat> + '_ {
        let mut stats: Vec<Stat> = self.flat.keys().chain(self.percent.keys()).copied().collect();
        stats.sort_unstable();
        stats.dedup();
        stats.into_iter()
    }

    /// Returns a copy with every delta multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            source: self.source.clone(),
            flat: self.flat.iter().map(|(s, v)| (*s, v * factor)).collect(),
            percent: self.percent.iter().map(|(s, v)| (*s, v * factor)).collect(),
            duration: self.duration,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty() && self.percent.is_empty()
    }
}

/// An applied modifier.
#[derive(Clone, Debug, PartialEq)]
pub struct StatModifier {
    pub id: ModifierId,
    pub spec: ModifierSpec,
}

impl StatModifier {
    pub fn flat_for(&self, stat: Stat) -> f64 {
        self.spec.flat.get(&stat).copied().unwrap_or(0.0)
    }

    pub fn percent_for(&self, stat: Stat) -> f64 {
        self.spec.percent.get(&stat).copied().unwrap_or(0.0)
    }

    pub fn touches(&self, stat: Stat) -> bool {
        self.spec.flat.contains_key(&stat) || self.spec.percent.contains_key(&stat)
    }
}
