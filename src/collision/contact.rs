//! Contact manifolds, feature ids and the persistent per-pair contact record.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::distance::SimplexCache;
use crate::{
    config::MAX_MANIFOLD_POINTS,
    core::types::Transform,
    utils::allocator::{BodyId, ShapeId},
};

/// Whether a feature index names a vertex or a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FeatureType {
    #[default]
    Vertex,
    Face,
}

/// Pair of features that produced a manifold point; stable while the
/// geometry keeps touching the same way, so it drives warm-start matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContactFeature {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactFeature {
    pub fn new(index_a: usize, type_a: FeatureType, index_b: usize, type_b: FeatureType) -> Self {
        Self {
            index_a: index_a as u8,
            index_b: index_b as u8,
            type_a,
            type_b,
        }
    }

    /// The same feature pair seen from the other shape.
    pub fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ManifoldKind {
    /// No contact points.
    #[default]
    Unset,
    /// Point to point; `local_point` is the center on A.
    Circles,
    /// Reference face on A; `local_point`/`local_normal` are in A's frame.
    FaceA,
    /// Reference face on B; `local_point`/`local_normal` are in B's frame.
    FaceB,
}

/// One contact point of a manifold.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ManifoldPoint {
    /// Point on the incident shape, in that shape's frame (B for `Circles`/`FaceA`, A for `FaceB`).
    pub local_point: Vec2,
    /// Accumulated impulse along the normal, carried across steps for warm starting.
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    /// Signed skin-to-skin separation when the manifold was computed. Negative means penetration.
    pub separation: f32,
    pub id: ContactFeature,
}

/// Local-space description of how two convex children touch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifold {
    pub kind: ManifoldKind,
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    pub point_count: usize,
}

impl Manifold {
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    pub(crate) fn push(&mut self, point: ManifoldPoint) {
        self.points[self.point_count] = point;
        self.point_count += 1;
    }

    /// Swaps the roles of A and B.
    pub(crate) fn flipped(mut self) -> Self {
        self.kind = match self.kind {
            ManifoldKind::FaceA => ManifoldKind::FaceB,
            ManifoldKind::FaceB => ManifoldKind::FaceA,
            other => other,
        };
        if self.kind == ManifoldKind::Circles && self.point_count > 0 {
            std::mem::swap(&mut self.local_point, &mut self.points[0].local_point);
        }
        for p in self.points_mut() {
            p.id = p.id.swapped();
        }
        self
    }

    /// Smallest recorded separation, or `f32::MAX` for an empty manifold.
    pub fn min_separation(&self) -> f32 {
        self.points()
            .iter()
            .map(|p| p.separation)
            .fold(f32::MAX, f32::min)
    }
}

/// World-space view of a manifold.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldManifold {
    /// Points from A to B.
    pub normal: Vec2,
    /// Midpoints between the two skins.
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    pub separations: [f32; MAX_MANIFOLD_POINTS],
    pub point_count: usize,
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f32,
        xf_b: &Transform,
        radius_b: f32,
    ) -> Self {
        let mut out = WorldManifold {
            point_count: manifold.point_count,
            ..Default::default()
        };
        if manifold.point_count == 0 {
            return out;
        }

        match manifold.kind {
            ManifoldKind::Unset => {}
            ManifoldKind::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                let mut normal = Vec2::X;
                if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + normal * radius_a;
                let c_b = point_b - normal * radius_b;
                out.normal = normal;
                out.points[0] = 0.5 * (c_a + c_b);
                out.separations[0] = (c_b - c_a).dot(normal);
            }
            ManifoldKind::FaceA => {
                let normal = xf_a.rotation.rotate(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_b.apply(mp.local_point);
                    let c_a = clip_point
                        + normal * (radius_a - (clip_point - plane_point).dot(normal));
                    let c_b = clip_point - normal * radius_b;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_b - c_a).dot(normal);
                }
                out.normal = normal;
            }
            ManifoldKind::FaceB => {
                let normal = xf_b.rotation.rotate(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_a.apply(mp.local_point);
                    let c_b = clip_point
                        + normal * (radius_b - (clip_point - plane_point).dot(normal));
                    let c_a = clip_point - normal * radius_a;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_a - c_b).dot(normal);
                }
                // Keep the A-to-B convention.
                out.normal = -normal;
            }
        }
        out
    }
}

/// How a manifold point changed between two updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointState {
    /// Point does not exist.
    #[default]
    Null,
    /// Point was added in the update.
    Add,
    /// Point persisted across the update.
    Persist,
    /// Point was removed in the update.
    Remove,
}

/// Classifies the points of `old` and `new` by feature id.
///
/// Returns the states of the old points (`Persist` or `Remove`) and of the new
/// points (`Persist` or `Add`).
pub fn get_point_states(
    old: &Manifold,
    new: &Manifold,
) -> (
    [PointState; MAX_MANIFOLD_POINTS],
    [PointState; MAX_MANIFOLD_POINTS],
) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p) in old.points().iter().enumerate() {
        state1[i] = if new.points().iter().any(|q| q.id == p.id) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }
    for (i, p) in new.points().iter().enumerate() {
        state2[i] = if old.points().iter().any(|q| q.id == p.id) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }
    (state1, state2)
}

/// Narrow-phase verdict for one contact, computed without mutating it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ContactEvaluation {
    Sensor { overlapping: bool },
    Solid { manifold: Manifold, cache: SimplexCache },
}

/// Touching transition produced by [`Contact::apply_evaluation`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContactUpdate {
    pub was_touching: bool,
    pub touching: bool,
    pub old_manifold: Manifold,
}

/// Persistent record of one overlapping proxy pair.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) body_a: BodyId,
    pub(crate) shape_a: ShapeId,
    pub(crate) child_a: usize,
    pub(crate) proxy_a: usize,
    pub(crate) body_b: BodyId,
    pub(crate) shape_b: ShapeId,
    pub(crate) child_b: usize,
    pub(crate) proxy_b: usize,

    pub(crate) manifold: Manifold,
    pub(crate) cache: SimplexCache,

    pub(crate) friction: f32,
    pub(crate) restitution: f32,

    pub(crate) touching: bool,
    pub(crate) enabled: bool,
    pub(crate) sensor: bool,
    /// Set when a shape filter changed; the pair is re-checked on the next collide pass.
    pub(crate) needs_filtering: bool,
    pub(crate) in_island: bool,

    pub(crate) toi: Option<f32>,
    pub(crate) toi_count: u32,
}

impl Contact {
    pub(crate) fn new(
        (body_a, shape_a, child_a, proxy_a): (BodyId, ShapeId, usize, usize),
        (body_b, shape_b, child_b, proxy_b): (BodyId, ShapeId, usize, usize),
        friction: f32,
        restitution: f32,
        sensor: bool,
    ) -> Self {
        Self {
            body_a,
            shape_a,
            child_a,
            proxy_a,
            body_b,
            shape_b,
            child_b,
            proxy_b,
            manifold: Manifold::default(),
            cache: SimplexCache::default(),
            friction,
            restitution,
            touching: false,
            enabled: true,
            sensor,
            needs_filtering: false,
            in_island: false,
            toi: None,
            toi_count: 0,
        }
    }

    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    pub fn shape_a(&self) -> ShapeId {
        self.shape_a
    }

    pub fn shape_b(&self) -> ShapeId {
        self.shape_b
    }

    pub fn child_a(&self) -> usize {
        self.child_a
    }

    pub fn child_b(&self) -> usize {
        self.child_b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabled contacts keep being tracked but are skipped by the solver.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    /// Number of time-of-impact sub-steps this contact took part in during the current step.
    pub fn toi_count(&self) -> u32 {
        self.toi_count
    }

    /// Installs a new narrow-phase result, carrying impulses over to points
    /// with matching feature ids.
    pub(crate) fn apply_evaluation(&mut self, evaluation: ContactEvaluation) -> ContactUpdate {
        let old_manifold = self.manifold;
        let was_touching = self.touching;

        let touching = match evaluation {
            ContactEvaluation::Sensor { overlapping } => {
                self.manifold = Manifold::default();
                overlapping
            }
            ContactEvaluation::Solid { mut manifold, cache } => {
                for point in manifold.points_mut() {
                    point.normal_impulse = 0.0;
                    point.tangent_impulse = 0.0;
                    if let Some(old) = old_manifold.points().iter().find(|o| o.id == point.id) {
                        point.normal_impulse = old.normal_impulse;
                        point.tangent_impulse = old.tangent_impulse;
                    }
                }
                self.cache = cache;
                self.manifold = manifold;
                manifold.point_count > 0
            }
        };

        self.touching = touching;
        ContactUpdate {
            was_touching,
            touching,
            old_manifold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: ContactFeature, impulse: f32) -> ManifoldPoint {
        ManifoldPoint {
            normal_impulse: impulse,
            id,
            ..Default::default()
        }
    }

    fn two_point_manifold(ids: [ContactFeature; 2], impulses: [f32; 2]) -> Manifold {
        let mut m = Manifold {
            kind: ManifoldKind::FaceA,
            local_normal: Vec2::Y,
            ..Default::default()
        };
        m.push(point(ids[0], impulses[0]));
        m.push(point(ids[1], impulses[1]));
        m
    }

    fn face_vertex(a: usize, b: usize) -> ContactFeature {
        ContactFeature::new(a, FeatureType::Face, b, FeatureType::Vertex)
    }

    #[test]
    fn point_states_classify_by_feature() {
        let old = two_point_manifold([face_vertex(0, 1), face_vertex(0, 2)], [1.0, 1.0]);
        let new = two_point_manifold([face_vertex(0, 2), face_vertex(0, 3)], [0.0, 0.0]);
        let (s1, s2) = get_point_states(&old, &new);
        assert_eq!(s1, [PointState::Remove, PointState::Persist]);
        assert_eq!(s2, [PointState::Persist, PointState::Add]);
    }

    #[test]
    fn evaluation_carries_matching_impulses() {
        let body = BodyId::from_index(0);
        let shape = ShapeId::from_index(0);
        let mut contact = Contact::new((body, shape, 0, 0), (body, shape, 0, 1), 0.5, 0.0, false);
        contact.manifold = two_point_manifold([face_vertex(0, 1), face_vertex(0, 2)], [3.0, 4.0]);
        contact.touching = true;

        let next = two_point_manifold([face_vertex(0, 2), face_vertex(1, 0)], [9.0, 9.0]);
        let update = contact.apply_evaluation(ContactEvaluation::Solid {
            manifold: next,
            cache: SimplexCache::default(),
        });
        assert!(update.was_touching && update.touching);
        assert_eq!(contact.manifold.points[0].normal_impulse, 4.0);
        assert_eq!(contact.manifold.points[1].normal_impulse, 0.0);

        let update = contact.apply_evaluation(ContactEvaluation::Sensor { overlapping: false });
        assert!(update.was_touching && !update.touching);
        assert!(contact.manifold.is_empty());
    }

    #[test]
    fn face_b_world_manifold_points_from_a_to_b() {
        let mut m = Manifold {
            kind: ManifoldKind::FaceB,
            local_normal: Vec2::new(0.0, -1.0),
            local_point: Vec2::new(0.0, -0.5),
            ..Default::default()
        };
        m.push(ManifoldPoint {
            local_point: Vec2::new(0.0, 0.45),
            ..Default::default()
        });
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::from_position(Vec2::new(0.0, 0.9));
        let wm = WorldManifold::new(&m, &xf_a, 0.0, &xf_b, 0.0);
        assert_eq!(wm.normal, Vec2::new(0.0, 1.0));
        assert!((wm.separations[0] + 0.05).abs() < 1e-5);
    }
}
