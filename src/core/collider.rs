use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::types::{Filter, MassData, Transform};
use crate::{
    collision::{
        aabb::Aabb,
        queries::{ray_cast_proxy, RayCastInput, RayCastOutput},
        shapes::DistanceProxy,
    },
    config::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS},
    error::{PhysicsError, PhysicsResult},
    utils::{allocator::BodyId, math},
};

/// Enumeration of supported shape geometries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeGeometry {
    Disk {
        center: Vec2,
        radius: f32,
    },
    /// Convex polygon. Input vertices may be in any order; the hull is computed on creation.
    Polygon {
        vertices: Vec<Vec2>,
    },
    Edge {
        v1: Vec2,
        v2: Vec2,
    },
    /// Polyline whose children are its edges; `looped` closes the last vertex back to the first.
    Chain {
        vertices: Vec<Vec2>,
        looped: bool,
    },
    /// Union of convex polygons, one child per part.
    Multi {
        parts: Vec<Vec<Vec2>>,
    },
}

/// Shape definition used to create a [`Shape`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDef {
    pub geometry: ShapeGeometry,
    /// Skin radius; `None` picks the default for the geometry kind. Disks always use their radius.
    pub vertex_radius: Option<f32>,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub filter: Filter,
    pub is_sensor: bool,
}

impl ShapeDef {
    pub fn new(geometry: ShapeGeometry) -> Self {
        Self {
            geometry,
            vertex_radius: None,
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
            filter: Filter::default(),
            is_sensor: false,
        }
    }

    pub fn disk(radius: f32) -> Self {
        Self::new(ShapeGeometry::Disk {
            center: Vec2::ZERO,
            radius,
        })
    }

    pub fn polygon(vertices: Vec<Vec2>) -> Self {
        Self::new(ShapeGeometry::Polygon { vertices })
    }

    /// Axis-aligned box centered on the body origin.
    pub fn box_shape(half_width: f32, half_height: f32) -> Self {
        Self::oriented_box(half_width, half_height, Vec2::ZERO, 0.0)
    }

    pub fn oriented_box(half_width: f32, half_height: f32, center: Vec2, angle: f32) -> Self {
        let xf = Transform::new(center, angle);
        let vertices = [
            Vec2::new(-half_width, -half_height),
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
        ]
        .iter()
        .map(|v| xf.apply(*v))
        .collect();
        Self::polygon(vertices)
    }

    pub fn edge(v1: Vec2, v2: Vec2) -> Self {
        Self::new(ShapeGeometry::Edge { v1, v2 })
    }

    pub fn chain(vertices: Vec<Vec2>, looped: bool) -> Self {
        Self::new(ShapeGeometry::Chain { vertices, looped })
    }

    pub fn multi(parts: Vec<Vec<Vec2>>) -> Self {
        Self::new(ShapeGeometry::Multi { parts })
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_vertex_radius(mut self, radius: f32) -> Self {
        self.vertex_radius = Some(radius);
        self
    }

    pub fn sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }
}

/// Immutable geometric and material descriptor, shareable between bodies.
#[derive(Debug, Clone)]
pub struct Shape {
    geometry: ShapeGeometry,
    vertex_radius: f32,
    pub(crate) density: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) filter: Filter,
    pub(crate) is_sensor: bool,
    proxies: Vec<DistanceProxy>,
    /// Bodies this shape is attached to, in attachment order.
    pub(crate) bodies: Vec<BodyId>,
}

impl Shape {
    /// Validates the definition and builds the per-child distance proxies.
    pub fn new(def: ShapeDef) -> PhysicsResult<Self> {
        let scalars = [def.density, def.friction, def.restitution];
        if scalars.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(PhysicsError::InvalidArgument(
                "density, friction and restitution must be finite and non-negative".into(),
            ));
        }

        let default_radius = match &def.geometry {
            ShapeGeometry::Disk { radius, .. } => *radius,
            _ => POLYGON_RADIUS,
        };
        let vertex_radius = match (&def.geometry, def.vertex_radius) {
            (ShapeGeometry::Disk { .. }, _) | (_, None) => default_radius,
            (_, Some(r)) => r,
        };
        if !vertex_radius.is_finite() || vertex_radius < 0.0 {
            return Err(PhysicsError::InvalidArgument(format!(
                "vertex radius {vertex_radius} must be finite and non-negative"
            )));
        }

        let proxies = build_proxies(&def.geometry, vertex_radius)?;
        let geometry = match def.geometry {
            ShapeGeometry::Polygon { .. } => ShapeGeometry::Polygon {
                vertices: proxies[0].vertices().to_vec(),
            },
            ShapeGeometry::Multi { .. } => ShapeGeometry::Multi {
                parts: proxies.iter().map(|p| p.vertices().to_vec()).collect(),
            },
            other => other,
        };

        Ok(Self {
            geometry,
            vertex_radius,
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            filter: def.filter,
            is_sensor: def.is_sensor,
            proxies,
            bodies: Vec::new(),
        })
    }

    pub fn geometry(&self) -> &ShapeGeometry {
        &self.geometry
    }

    pub fn vertex_radius(&self) -> f32 {
        self.vertex_radius
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn bodies(&self) -> &[BodyId] {
        &self.bodies
    }

    /// Number of independently collidable children.
    pub fn child_count(&self) -> usize {
        self.proxies.len()
    }

    pub fn distance_proxy(&self, child: usize) -> &DistanceProxy {
        &self.proxies[child]
    }

    pub fn compute_aabb(&self, child: usize, xf: &Transform) -> Aabb {
        self.proxies[child].compute_aabb(xf)
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child: usize,
    ) -> Option<RayCastOutput> {
        ray_cast_proxy(&self.proxies[child], input, xf)
    }

    /// Mass properties about the shape origin. Edges and chains are massless.
    pub fn compute_mass(&self) -> MassData {
        match &self.geometry {
            ShapeGeometry::Disk { center, radius } => {
                let mass = self.density * std::f32::consts::PI * radius * radius;
                MassData {
                    mass,
                    center: *center,
                    inertia: mass * (0.5 * radius * radius + center.length_squared()),
                }
            }
            ShapeGeometry::Polygon { vertices } => polygon_mass(vertices, self.density),
            ShapeGeometry::Multi { parts } => {
                let mut total = MassData::default();
                for part in parts {
                    let md = polygon_mass(part, self.density);
                    total.mass += md.mass;
                    total.center += md.center * md.mass;
                    total.inertia += md.inertia;
                }
                if total.mass > 0.0 {
                    total.center /= total.mass;
                }
                total
            }
            ShapeGeometry::Edge { .. } | ShapeGeometry::Chain { .. } => MassData::default(),
        }
    }
}

fn build_proxies(geometry: &ShapeGeometry, radius: f32) -> PhysicsResult<Vec<DistanceProxy>> {
    match geometry {
        ShapeGeometry::Disk { center, radius } => {
            if !math::is_finite(*center) || !radius.is_finite() || *radius <= 0.0 {
                return Err(PhysicsError::InvalidArgument(
                    "disk needs a finite center and positive radius".into(),
                ));
            }
            Ok(vec![DistanceProxy::point(*center, *radius)])
        }
        ShapeGeometry::Polygon { vertices } => {
            Ok(vec![DistanceProxy::polygon(convex_hull(vertices)?, radius)])
        }
        ShapeGeometry::Edge { v1, v2 } => {
            validate_segment(*v1, *v2)?;
            Ok(vec![DistanceProxy::segment(*v1, *v2, radius)])
        }
        ShapeGeometry::Chain { vertices, looped } => {
            let min = if *looped { 3 } else { 2 };
            if vertices.len() < min {
                return Err(PhysicsError::InvalidArgument(format!(
                    "chain needs at least {min} vertices"
                )));
            }
            let count = if *looped {
                vertices.len()
            } else {
                vertices.len() - 1
            };
            (0..count)
                .map(|i| {
                    let v1 = vertices[i];
                    let v2 = vertices[(i + 1) % vertices.len()];
                    validate_segment(v1, v2)?;
                    Ok(DistanceProxy::segment(v1, v2, radius))
                })
                .collect()
        }
        ShapeGeometry::Multi { parts } => {
            if parts.is_empty() {
                return Err(PhysicsError::InvalidArgument(
                    "multi-shape needs at least one part".into(),
                ));
            }
            parts
                .iter()
                .map(|part| Ok(DistanceProxy::polygon(convex_hull(part)?, radius)))
                .collect()
        }
    }
}

fn validate_segment(v1: Vec2, v2: Vec2) -> PhysicsResult<()> {
    if !math::is_finite(v1) || !math::is_finite(v2) {
        return Err(PhysicsError::InvalidArgument(
            "edge vertices must be finite".into(),
        ));
    }
    if v1.distance_squared(v2) <= LINEAR_SLOP * LINEAR_SLOP {
        return Err(PhysicsError::InvalidArgument(
            "edge vertices are too close together".into(),
        ));
    }
    Ok(())
}

/// Gift-wrapping hull returning counter-clockwise vertices.
fn convex_hull(points: &[Vec2]) -> PhysicsResult<Vec<Vec2>> {
    if points.len() < 3 || points.len() > MAX_POLYGON_VERTICES {
        return Err(PhysicsError::InvalidArgument(format!(
            "polygon needs 3..={MAX_POLYGON_VERTICES} vertices, got {}",
            points.len()
        )));
    }
    if points.iter().any(|p| !math::is_finite(*p)) {
        return Err(PhysicsError::InvalidArgument(
            "polygon vertices must be finite".into(),
        ));
    }

    let weld = 0.5 * LINEAR_SLOP;
    let mut ps: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points {
        if ps.iter().all(|q| q.distance_squared(*p) >= weld * weld) {
            ps.push(*p);
        }
    }
    if ps.len() < 3 {
        return Err(PhysicsError::InvalidArgument(
            "polygon is degenerate after welding".into(),
        ));
    }

    let mut i0 = 0;
    for (i, p) in ps.iter().enumerate().skip(1) {
        if p.x > ps[i0].x || (p.x == ps[i0].x && p.y < ps[i0].y) {
            i0 = i;
        }
    }

    let mut hull = Vec::with_capacity(ps.len());
    let mut ih = i0;
    loop {
        hull.push(ih);
        let mut ie = 0;
        for j in 1..ps.len() {
            if ie == ih {
                ie = j;
                continue;
            }
            let origin = ps[ih];
            let r = ps[ie] - origin;
            let v = ps[j] - origin;
            let c = math::cross(r, v);
            if c < 0.0 || (c == 0.0 && v.length_squared() > r.length_squared()) {
                ie = j;
            }
        }
        ih = ie;
        if ie == i0 || hull.len() > ps.len() {
            break;
        }
    }

    if hull.len() < 3 {
        return Err(PhysicsError::InvalidArgument(
            "polygon vertices are collinear".into(),
        ));
    }

    let vertices: Vec<Vec2> = hull.into_iter().map(|i| ps[i]).collect();
    let doubled_area: f32 = (0..vertices.len())
        .map(|i| math::cross(vertices[i], vertices[(i + 1) % vertices.len()]))
        .sum();
    if doubled_area <= f32::EPSILON {
        return Err(PhysicsError::InvalidArgument(
            "polygon has no area".into(),
        ));
    }
    Ok(vertices)
}

fn polygon_mass(vertices: &[Vec2], density: f32) -> MassData {
    let count = vertices.len();
    let reference = vertices[0];
    let inv3 = 1.0 / 3.0;

    let mut area = 0.0;
    let mut center = Vec2::ZERO;
    let mut inertia = 0.0;

    for i in 0..count {
        let e1 = vertices[i] - reference;
        let e2 = vertices[(i + 1) % count] - reference;
        let d = math::cross(e1, e2);

        let triangle_area = 0.5 * d;
        area += triangle_area;
        center += (e1 + e2) * (triangle_area * inv3);

        let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
        let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
        inertia += (0.25 * inv3 * d) * (int_x2 + int_y2);
    }

    let mass = density * area;
    let local_center = if area > f32::EPSILON {
        center / area
    } else {
        Vec2::ZERO
    };
    let world_center = local_center + reference;
    let inertia = density * inertia
        + mass * (world_center.length_squared() - local_center.length_squared());

    MassData {
        mass,
        center: world_center,
        inertia,
    }
}
