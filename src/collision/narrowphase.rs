//! Manifold generation for pairs of convex proxies.
//!
//! Dispatch is on vertex counts: one vertex is a disk, two an edge, more a
//! polygon. Edges are handled as two-sided degenerate polygons.

use glam::Vec2;

use super::{
    clipping::{clip_segment_to_line, ClipVertex},
    contact::{ContactFeature, FeatureType, Manifold, ManifoldKind, ManifoldPoint},
    distance::{distance, SimplexCache},
    shapes::DistanceProxy,
};
use crate::{
    config::LINEAR_SLOP,
    core::types::Transform,
    utils::math,
};

/// Computes the contact manifold of two proxies.
///
/// `cache` warm starts the distance query used by disk-vs-polygon pairs and
/// receives its final simplex, always indexed in (A, B) order.
pub fn collide_shapes(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
    cache: &mut SimplexCache,
    max_iterations: u32,
) -> Manifold {
    match (proxy_a.vertex_count(), proxy_b.vertex_count()) {
        (1, 1) => collide_circles(proxy_a, xf_a, proxy_b, xf_b),
        (_, 1) => collide_polygon_circle(proxy_a, xf_a, proxy_b, xf_b, cache, max_iterations),
        (1, _) => {
            let mut swapped = cache.swapped();
            let manifold =
                collide_polygon_circle(proxy_b, xf_b, proxy_a, xf_a, &mut swapped, max_iterations);
            *cache = swapped.swapped();
            manifold.flipped()
        }
        _ => collide_polygons(proxy_a, xf_a, proxy_b, xf_b),
    }
}

/// Disk vs disk.
pub fn collide_circles(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let local_a = proxy_a.vertex(0);
    let local_b = proxy_b.vertex(0);
    let p_a = xf_a.apply(local_a);
    let p_b = xf_b.apply(local_b);

    let total_radius = proxy_a.radius() + proxy_b.radius();
    let distance_sq = p_a.distance_squared(p_b);
    if distance_sq > total_radius * total_radius {
        return manifold;
    }

    manifold.kind = ManifoldKind::Circles;
    manifold.local_point = local_a;
    manifold.local_normal = Vec2::ZERO;
    manifold.push(ManifoldPoint {
        local_point: local_b,
        separation: distance_sq.sqrt() - total_radius,
        ..Default::default()
    });
    manifold
}

/// Polygon or edge (A) vs disk (B), driven by the GJK closest features.
pub fn collide_polygon_circle(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
    cache: &mut SimplexCache,
    max_iterations: u32,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Work in A's frame.
    let xf = xf_a.relative(xf_b);
    let center_local_b = proxy_b.vertex(0);
    let c = xf.apply(center_local_b);
    let total_radius = proxy_a.radius() + proxy_b.radius();

    let output = distance(
        proxy_a,
        &Transform::IDENTITY,
        proxy_b,
        &xf,
        cache,
        max_iterations,
    );
    if output.distance > total_radius {
        return manifold;
    }

    let count = proxy_a.vertex_count();
    let face_separation = |face: usize| proxy_a.normal(face).dot(c - proxy_a.vertex(face));

    let (face, vertex_region) = if output.distance > f32::EPSILON {
        match output.simplex.count {
            1 => (output.simplex.vertices[0].index_a, true),
            _ => {
                let i0 = output.simplex.vertices[0].index_a;
                let i1 = output.simplex.vertices[1].index_a;
                let (lo, hi) = (i0.min(i1), i0.max(i1));
                let face = if count == 2 {
                    // Pick the side of the edge the disk is on.
                    if face_separation(0) >= face_separation(1) {
                        0
                    } else {
                        1
                    }
                } else if hi == lo + 1 {
                    lo
                } else {
                    count - 1
                };
                (face, false)
            }
        }
    } else {
        // Center inside the core: use the face of least penetration.
        let mut best = 0;
        let mut best_separation = face_separation(0);
        for face in 1..count {
            let s = face_separation(face);
            if s > best_separation {
                best = face;
                best_separation = s;
            }
        }
        (best, false)
    };

    manifold.kind = ManifoldKind::FaceA;
    if vertex_region {
        let v = proxy_a.vertex(face);
        let offset = c - v;
        manifold.local_normal = offset.normalize_or_zero();
        manifold.local_point = v;
        manifold.push(ManifoldPoint {
            local_point: center_local_b,
            separation: offset.length() - total_radius,
            id: ContactFeature::new(face, FeatureType::Vertex, 0, FeatureType::Vertex),
            ..Default::default()
        });
    } else {
        let v1 = proxy_a.vertex(face);
        let v2 = proxy_a.vertex((face + 1) % count);
        manifold.local_normal = proxy_a.normal(face);
        manifold.local_point = 0.5 * (v1 + v2);
        manifold.push(ManifoldPoint {
            local_point: center_local_b,
            separation: face_separation(face) - total_radius,
            id: ContactFeature::new(face, FeatureType::Face, 0, FeatureType::Vertex),
            ..Default::default()
        });
    }
    manifold
}

/// Face of `poly1` with the largest separation from `poly2`.
///
/// Ties keep the lowest face index.
fn find_max_separation(
    poly1: &DistanceProxy,
    xf1: &Transform,
    poly2: &DistanceProxy,
    xf2: &Transform,
) -> (usize, f32) {
    let xf = xf2.relative(xf1);

    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for i in 0..poly1.vertex_count() {
        let n = xf.rotation.rotate(poly1.normal(i));
        let v1 = xf.apply(poly1.vertex(i));

        let si = poly2
            .vertices()
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Edge of `poly2` most anti-parallel to reference face `edge1` of `poly1`.
fn find_incident_edge(
    poly1: &DistanceProxy,
    xf1: &Transform,
    edge1: usize,
    poly2: &DistanceProxy,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    let normal1 = xf2
        .rotation
        .inv_rotate(xf1.rotation.rotate(poly1.normal(edge1)));

    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.vertex_count();
    [
        ClipVertex {
            v: xf2.apply(poly2.vertex(i1)),
            id: ContactFeature::new(edge1, FeatureType::Face, i1, FeatureType::Vertex),
        },
        ClipVertex {
            v: xf2.apply(poly2.vertex(i2)),
            id: ContactFeature::new(edge1, FeatureType::Face, i2, FeatureType::Vertex),
        },
    ]
}

/// Polygon/edge vs polygon/edge via separating axes and incident-edge clipping.
///
/// Face A is preferred as reference unless face B separates by more than a
/// small tolerance, which keeps the reference face stable frame to frame.
pub fn collide_polygons(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = proxy_a.radius() + proxy_b.radius();

    let (edge_a, separation_a) = find_max_separation(proxy_a, xf_a, proxy_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(proxy_b, xf_b, proxy_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    let tolerance = 0.1 * LINEAR_SLOP;
    let (poly1, xf1, edge1, poly2, xf2, flip) = if separation_b > separation_a + tolerance {
        manifold.kind = ManifoldKind::FaceB;
        (proxy_b, xf_b, edge_b, proxy_a, xf_a, true)
    } else {
        manifold.kind = ManifoldKind::FaceA;
        (proxy_a, xf_a, edge_a, proxy_b, xf_b, false)
    };

    let incident = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.vertex_count();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;
    let mut v11 = poly1.vertex(iv1);
    let mut v12 = poly1.vertex(iv2);

    let local_tangent = (v12 - v11).normalize_or_zero();
    let local_normal = math::cross_vs(local_tangent, 1.0);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = xf1.rotation.rotate(local_tangent);
    let normal = math::cross_vs(tangent, 1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    let front_offset = normal.dot(v11);
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let Some(clip1) = clip_segment_to_line(incident, -tangent, side_offset1, iv1) else {
        return manifold;
    };
    let Some(clip2) = clip_segment_to_line(clip1, tangent, side_offset2, iv2) else {
        return manifold;
    };

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    for cv in clip2 {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= total_radius {
            manifold.push(ManifoldPoint {
                local_point: xf2.apply_inverse(cv.v),
                separation: separation - total_radius,
                id: if flip { cv.id.swapped() } else { cv.id },
                ..Default::default()
            });
        }
    }

    if manifold.point_count == 0 {
        manifold.kind = ManifoldKind::Unset;
    }
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collision::contact::WorldManifold, config::MAX_DISTANCE_ITERATIONS};
    use approx::assert_relative_eq;

    fn square(half: f32) -> DistanceProxy {
        DistanceProxy::polygon(
            vec![
                Vec2::new(-half, -half),
                Vec2::new(half, -half),
                Vec2::new(half, half),
                Vec2::new(-half, half),
            ],
            0.0,
        )
    }

    #[test]
    fn overlapping_squares_produce_two_points() {
        let a = square(0.5);
        let b = square(0.5);
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::from_position(Vec2::new(0.0, 0.9));
        let mut cache = SimplexCache::default();

        let first = collide_shapes(&a, &xf_a, &b, &xf_b, &mut cache, MAX_DISTANCE_ITERATIONS);
        assert_eq!(first.point_count, 2);
        assert_eq!(first.kind, ManifoldKind::FaceA);
        for p in first.points() {
            assert_eq!(p.normal_impulse, 0.0);
            assert_eq!(p.tangent_impulse, 0.0);
            assert_relative_eq!(p.separation, -0.1, epsilon = 1e-5);
        }

        let second = collide_shapes(&a, &xf_a, &b, &xf_b, &mut cache, MAX_DISTANCE_ITERATIONS);
        let ids1: Vec<_> = first.points().iter().map(|p| p.id).collect();
        let ids2: Vec<_> = second.points().iter().map(|p| p.id).collect();
        assert_eq!(ids1, ids2);

        let wm = WorldManifold::new(&first, &xf_a, 0.0, &xf_b, 0.0);
        assert_relative_eq!(wm.normal.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn separated_squares_produce_nothing() {
        let a = square(0.5);
        let xf_b = Transform::from_position(Vec2::new(1.2, 0.0));
        let m = collide_polygons(&a, &Transform::IDENTITY, &a, &xf_b);
        assert!(m.is_empty());
    }

    #[test]
    fn circles_touching_within_radii() {
        let a = DistanceProxy::point(Vec2::ZERO, 0.5);
        let b = DistanceProxy::point(Vec2::ZERO, 0.5);
        let xf_b = Transform::from_position(Vec2::new(0.8, 0.0));
        let m = collide_circles(&a, &Transform::IDENTITY, &b, &xf_b);
        assert_eq!(m.kind, ManifoldKind::Circles);
        assert_relative_eq!(m.points[0].separation, -0.2, epsilon = 1e-6);

        let far = Transform::from_position(Vec2::new(1.1, 0.0));
        assert!(collide_circles(&a, &Transform::IDENTITY, &b, &far).is_empty());
    }

    #[test]
    fn disk_resting_on_box_face() {
        let ground = square(1.0);
        let disk = DistanceProxy::point(Vec2::ZERO, 0.5);
        let xf_disk = Transform::from_position(Vec2::new(0.2, 1.4));
        let mut cache = SimplexCache::default();
        let m = collide_shapes(
            &ground,
            &Transform::IDENTITY,
            &disk,
            &xf_disk,
            &mut cache,
            MAX_DISTANCE_ITERATIONS,
        );
        assert_eq!(m.kind, ManifoldKind::FaceA);
        assert_eq!(m.point_count, 1);
        assert_relative_eq!(m.local_normal.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(m.points[0].separation, -0.1, epsilon = 1e-5);
    }

    #[test]
    fn disk_near_box_corner_uses_vertex_normal() {
        let ground = square(1.0);
        let disk = DistanceProxy::point(Vec2::ZERO, 0.5);
        let xf_disk = Transform::from_position(Vec2::new(1.3, 1.3));
        let mut cache = SimplexCache::default();
        let m = collide_shapes(
            &ground,
            &Transform::IDENTITY,
            &disk,
            &xf_disk,
            &mut cache,
            MAX_DISTANCE_ITERATIONS,
        );
        assert_eq!(m.point_count, 1);
        let expected = Vec2::new(1.0, 1.0).normalize();
        assert_relative_eq!(m.local_normal.x, expected.x, epsilon = 1e-5);
        assert_relative_eq!(m.local_normal.y, expected.y, epsilon = 1e-5);
    }

    #[test]
    fn distance_iteration_cap_is_honoured() {
        let ground = square(1.0);
        let disk = DistanceProxy::point(Vec2::ZERO, 0.5);
        let xf_disk = Transform::from_position(Vec2::new(0.0, 1.4));

        // With no iterations GJK only sees the first vertex pair, far from the disk.
        let mut cache = SimplexCache::default();
        let capped = collide_shapes(&ground, &Transform::IDENTITY, &disk, &xf_disk, &mut cache, 0);
        assert!(capped.is_empty());

        let mut cache = SimplexCache::default();
        let full = collide_shapes(
            &ground,
            &Transform::IDENTITY,
            &disk,
            &xf_disk,
            &mut cache,
            MAX_DISTANCE_ITERATIONS,
        );
        assert_eq!(full.point_count, 1);
    }

    #[test]
    fn disk_first_pair_is_flipped_to_face_b() {
        let ground = square(1.0);
        let disk = DistanceProxy::point(Vec2::ZERO, 0.5);
        let xf_disk = Transform::from_position(Vec2::new(0.0, 1.4));
        let mut cache = SimplexCache::default();
        let m = collide_shapes(
            &disk,
            &xf_disk,
            &ground,
            &Transform::IDENTITY,
            &mut cache,
            MAX_DISTANCE_ITERATIONS,
        );
        assert_eq!(m.kind, ManifoldKind::FaceB);
        let wm = WorldManifold::new(&m, &xf_disk, 0.5, &Transform::IDENTITY, 0.0);
        assert_relative_eq!(wm.normal.y, -1.0, epsilon = 1e-6);

        // The cache keeps the disk on the A side so the next call warm starts.
        assert!(cache.count > 0);
        assert!(cache.index_a[..cache.count].iter().all(|&i| i == 0));
        let again = collide_shapes(
            &disk,
            &xf_disk,
            &ground,
            &Transform::IDENTITY,
            &mut cache,
            MAX_DISTANCE_ITERATIONS,
        );
        assert_eq!(again.kind, m.kind);
        assert_eq!(again.point_count, m.point_count);
        assert_relative_eq!(again.points[0].separation, m.points[0].separation, epsilon = 1e-6);
        assert!(cache.index_a[..cache.count].iter().all(|&i| i == 0));
    }

    #[test]
    fn box_on_edge_clips_to_edge_span() {
        let edge = DistanceProxy::segment(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0), 0.0);
        let b = square(0.5);
        let xf_b = Transform::from_position(Vec2::new(0.0, 0.45));
        let m = collide_polygons(&edge, &Transform::IDENTITY, &b, &xf_b);
        assert_eq!(m.point_count, 2);
        for p in m.points() {
            assert_relative_eq!(p.separation, -0.05, epsilon = 1e-5);
        }
    }
}
