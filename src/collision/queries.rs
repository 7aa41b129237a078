use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::shapes::DistanceProxy;
use crate::{
    core::types::Transform,
    utils::allocator::{BodyId, ShapeId},
};

/// Segment `p1 -> p1 + max_fraction * (p2 - p1)` to cast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

impl RayCastInput {
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }
}

/// Fraction along the input segment and surface normal at the hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}

/// Broad-phase proxy reported by an AABB query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyHit {
    pub body: BodyId,
    pub shape: ShapeId,
    pub child: usize,
}

/// Exact shape hit reported by a world ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyId,
    pub shape: ShapeId,
    pub child: usize,
    pub point: Vec2,
    pub normal: Vec2,
    pub fraction: f32,
}

/// What a ray-cast callback wants to happen after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayCastAction {
    /// Stop the query immediately.
    Terminate,
    /// Pretend this proxy was not hit and keep the current ray length.
    Ignore,
    /// Shorten the ray to this hit, so only closer hits are reported afterwards.
    Clip,
    /// Keep going with the current ray length.
    Continue,
}

/// Casts a ray against one shape child.
///
/// Disks honour their radius; polygon and edge skins are ignored so a ray
/// reports the core geometry surface.
pub fn ray_cast_proxy(
    proxy: &DistanceProxy,
    input: &RayCastInput,
    xf: &Transform,
) -> Option<RayCastOutput> {
    match proxy.vertex_count() {
        1 => ray_cast_disk(xf.apply(proxy.vertex(0)), proxy.radius(), input),
        2 => ray_cast_segment(proxy.vertex(0), proxy.vertex(1), input, xf),
        _ => ray_cast_polygon(proxy, input, xf),
    }
}

fn ray_cast_disk(center: Vec2, radius: f32, input: &RayCastInput) -> Option<RayCastOutput> {
    let s = input.p1 - center;
    let b = s.length_squared() - radius * radius;

    let r = input.p2 - input.p1;
    let c = s.dot(r);
    let rr = r.length_squared();
    let sigma = c * c - rr * b;

    if sigma < 0.0 || rr < f32::EPSILON {
        return None;
    }

    let a = -(c + sigma.sqrt());
    if (0.0..=input.max_fraction * rr).contains(&a) {
        let fraction = a / rr;
        return Some(RayCastOutput {
            normal: (s + r * fraction).normalize_or_zero(),
            fraction,
        });
    }
    None
}

fn ray_cast_segment(
    v1: Vec2,
    v2: Vec2,
    input: &RayCastInput,
    xf: &Transform,
) -> Option<RayCastOutput> {
    let p1 = xf.apply_inverse(input.p1);
    let p2 = xf.apply_inverse(input.p2);
    let d = p2 - p1;

    let e = v2 - v1;
    let normal = Vec2::new(e.y, -e.x).normalize_or_zero();

    let numerator = normal.dot(v1 - p1);
    let denominator = normal.dot(d);
    if denominator == 0.0 {
        return None;
    }

    let t = numerator / denominator;
    if t < 0.0 || input.max_fraction < t {
        return None;
    }

    let q = p1 + d * t;
    let rr = e.length_squared();
    if rr == 0.0 {
        return None;
    }
    let s = (q - v1).dot(e) / rr;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }

    let world_normal = xf.rotation.rotate(normal);
    Some(RayCastOutput {
        normal: if numerator > 0.0 {
            -world_normal
        } else {
            world_normal
        },
        fraction: t,
    })
}

fn ray_cast_polygon(
    proxy: &DistanceProxy,
    input: &RayCastInput,
    xf: &Transform,
) -> Option<RayCastOutput> {
    let p1 = xf.apply_inverse(input.p1);
    let p2 = xf.apply_inverse(input.p2);
    let d = p2 - p1;

    let mut lower = 0.0;
    let mut upper = input.max_fraction;
    let mut index = None;

    for i in 0..proxy.vertex_count() {
        let normal = proxy.normal(i);
        let numerator = normal.dot(proxy.vertex(i) - p1);
        let denominator = normal.dot(d);

        if denominator == 0.0 {
            if numerator < 0.0 {
                return None;
            }
        } else if denominator < 0.0 && numerator < lower * denominator {
            // Entering this half-space.
            lower = numerator / denominator;
            index = Some(i);
        } else if denominator > 0.0 && numerator < upper * denominator {
            upper = numerator / denominator;
        }

        if upper < lower {
            return None;
        }
    }

    index.map(|i| RayCastOutput {
        normal: xf.rotation.rotate(proxy.normal(i)),
        fraction: lower,
    })
}
