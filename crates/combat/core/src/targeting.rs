//! Spatial target selection.
//!
//! Queries work on the horizontal (x/z) plane only: vertical displacement is
//! ignored for every shape. Results are sorted nearest-first with ties broken
//! by entity id, then truncated to the requested count.

use bitflags::bitflags;
use glam::Vec3;

use crate::entity::{EntityId, EntityRegistry, Relationship};

bitflags! {
    /// Which relationships a query accepts, as seen from the source.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct TeamFilter: u8 {
        const FRIENDLY = 1 << 0;
        const HOSTILE  = 1 << 1;
        const NEUTRAL  = 1 << 2;
    }
}

impl TeamFilter {
    pub fn allows(self, relationship: Relationship) -> bool {
        let flag = match relationship {
            Relationship::Friendly => Self::FRIENDLY,
            Relationship::Hostile => Self::HOSTILE,
            Relationship::Neutral => Self::NEUTRAL,
        };
        self.contains(flag)
    }
}

impl Default for TeamFilter {
    fn default() -> Self {
        Self::HOSTILE
    }
}

/// Area a query covers. `range` on the query bounds every shape.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Shape {
    /// The source alone; no spatial test.
    SelfOnly,
    /// Horizontal disc of radius `range`.
    Sphere,
    /// Wedge around the direction. `half_angle` is in degrees.
    Cone { half_angle: f32 },
    /// Box extending `range` forward from the origin.
    Rectangle { width: f32 },
    /// Thick line; only the first hit along it is returned.
    Ray { radius: f32 },
}

/// Parameters of one target query.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetQuery {
    pub source: EntityId,
    pub origin: Vec3,
    /// Aim direction. Zero falls back to the source's facing, then +Z.
    pub direction: Vec3,
    pub shape: Shape,
    pub range: f32,
    pub filter: TeamFilter,
    pub max_count: Option<usize>,
    pub include_self: bool,
}

impl TargetQuery {
    /// Sphere query around `origin` with hostile filtering.
    pub fn around(source: EntityId, origin: Vec3, range: f32) -> Self {
        Self {
            source,
            origin,
            direction: Vec3::ZERO,
            shape: Shape::Sphere,
            range,
            filter: TeamFilter::HOSTILE,
            max_count: None,
            include_self: false,
        }
    }

    pub fn shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn direction(mut self, direction: Vec3) -> Self {
        self.direction = direction;
        self
    }

    pub fn filter(mut self, filter: TeamFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn max_count(mut self, max: usize) -> Self {
        self.max_count = Some(max);
        self
    }

    pub fn include_self(mut self, include: bool) -> Self {
        self.include_self = include;
        self
    }
}

#[inline]
fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Horizontal unit aim vector for the query.
fn aim(registry: &EntityRegistry, query: &TargetQuery) -> Vec3 {
    let facing = registry.get(query.source).map_or(Vec3::ZERO, |e| e.world.facing);
    flatten(query.direction)
        .try_normalize()
        .or_else(|| flatten(facing).try_normalize())
        .unwrap_or(Vec3::Z)
}

/// Sort key of a candidate inside the shape, or `None` when outside.
fn hit(shape: Shape, offset: Vec3, aim: Vec3, range: f32) -> Option<f32> {
    let distance = offset.length();
    match shape {
        Shape::SelfOnly => None,
        Shape::Sphere => (distance <= range).then_some(distance),
        Shape::Cone { half_angle } => {
            if distance > range {
                return None;
            }
            if distance <= f32::EPSILON {
                return Some(0.0);
            }
            let cos = (offset.dot(aim) / distance).clamp(-1.0, 1.0);
            (cos.acos().to_degrees() <= half_angle).then_some(distance)
        }
        Shape::Rectangle { width } => {
            let forward = offset.dot(aim);
            let lateral = (offset - aim * forward).length();
            ((0.0..=range).contains(&forward) && lateral <= width * 0.5).then_some(distance)
        }
        Shape::Ray { radius } => {
            let forward = offset.dot(aim);
            let lateral = (offset - aim * forward).length();
            ((0.0..=range).contains(&forward) && lateral <= radius).then_some(forward)
        }
    }
}

/// Resolves the entities a query selects.
///
/// Only living, present entities are candidates, and each must pass the team
/// filter against `relationship(source, candidate)`.
pub fn query(registry: &EntityRegistry, query: &TargetQuery) -> Vec<EntityId> {
    if query.shape == Shape::SelfOnly {
        return if registry.is_alive(query.source) {
            vec![query.source]
        } else {
            Vec::new()
        };
    }

    let aim = aim(registry, query);
    let origin = flatten(query.origin);

    let mut hits: Vec<(f32, EntityId)> = registry
        .iter()
        .filter(|e| e.is_alive())
        .filter(|e| query.include_self || e.id != query.source)
        .filter(|e| query.filter.allows(registry.relationship(query.source, e.id)))
        .filter_map(|e| {
            hit(query.shape, flatten(e.world.position) - origin, aim, query.range).map(|d| (d, e.id))
        })
        .collect();

    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let limit = match query.shape {
        Shape::Ray { .. } => Some(query.max_count.map_or(1, |m| m.min(1))),
        _ => query.max_count,
    };
    if let Some(limit) = limit {
        hits.truncate(limit);
    }

    hits.into_iter().map(|(_, id)| id).collect()
}
