//! Entity identity and the world back-reference.
//!
//! Player-controlled and AI-controlled actors share one identity space and
//! one attribute bag. The world-binding layer owns the actors themselves and
//! keeps each entity's [`WorldRef`] (position, facing, team, presence) in
//! sync through the registry.

mod registry;

pub use registry::{Entity, EntityRegistry, RegistryError};

use glam::Vec3;

/// Opaque entity identifier. Allocated monotonically and never reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId(pub u32);

impl EntityId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which kind of actor backs an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntityKind {
    /// Player-controlled actor.
    Player,
    /// AI-controlled actor.
    Npc,
}

/// Team membership. Team 0 is neutral toward everyone but itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TeamId(pub u16);

impl TeamId {
    pub const NEUTRAL: Self = Self(0);

    pub const fn is_neutral(self) -> bool {
        self.0 == Self::NEUTRAL.0
    }
}

/// How two entities regard each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Relationship {
    Friendly,
    Hostile,
    Neutral,
}

/// Back-reference to an entity's representation in the world.
///
/// Positions use a y-up frame; targeting only looks at the x/z plane.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldRef {
    pub position: Vec3,
    /// Direction the actor faces. Need not be normalized.
    pub facing: Vec3,
    pub team: TeamId,
    /// False once the world actor is gone but the entity is still registered.
    pub present: bool,
}

impl WorldRef {
    pub fn new(position: Vec3, team: TeamId) -> Self {
        Self {
            position,
            facing: Vec3::Z,
            team,
            present: true,
        }
    }

    pub fn facing(mut self, facing: Vec3) -> Self {
        self.facing = facing;
        self
    }
}

impl Default for WorldRef {
    fn default() -> Self {
        Self::new(Vec3::ZERO, TeamId::NEUTRAL)
    }
}
