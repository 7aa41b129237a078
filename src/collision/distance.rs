//! GJK closest-feature search between two convex proxies.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::shapes::DistanceProxy;
use crate::{core::types::Transform, utils::math};

/// Index pairs of the last simplex, reused to warm start the next query.
///
/// `metric` is the simplex length (2 vertices) or signed area (3 vertices);
/// a cached simplex whose metric changed too much is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SimplexCache {
    pub metric: f32,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

impl SimplexCache {
    /// The same simplex seen with A and B exchanged. Both metrics are
    /// invariant under the swap, so only the indices move.
    pub fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            ..self
        }
    }
}

/// One support point of the Minkowski difference `B - A`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimplexVertex {
    /// Support point on A in world space.
    pub w_a: Vec2,
    /// Support point on B in world space.
    pub w_b: Vec2,
    /// `w_b - w_a`.
    pub w: Vec2,
    /// Barycentric weight of the closest point.
    pub a: f32,
    pub index_a: usize,
    pub index_b: usize,
}

impl SimplexVertex {
    fn new(
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        index_a: usize,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
        index_b: usize,
    ) -> Self {
        let w_a = xf_a.apply(proxy_a.vertex(index_a));
        let w_b = xf_b.apply(proxy_b.vertex(index_b));
        Self {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 1.0,
            index_a,
            index_b,
        }
    }
}

/// Up to three support points describing the closest features.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Simplex {
    pub vertices: [SimplexVertex; 3],
    pub count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        let mut simplex = Simplex::default();
        let cached = cache.count.min(3);
        for i in 0..cached {
            let (ia, ib) = (cache.index_a[i], cache.index_b[i]);
            if ia >= proxy_a.vertex_count() || ib >= proxy_b.vertex_count() {
                simplex.count = 0;
                break;
            }
            let mut v = SimplexVertex::new(proxy_a, xf_a, ia, proxy_b, xf_b, ib);
            v.a = 0.0;
            simplex.vertices[i] = v;
            simplex.count = i + 1;
        }

        // Flush the cache if the geometry changed too much since it was written.
        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f32::EPSILON {
                simplex.count = 0;
            }
        }

        if simplex.count == 0 {
            simplex.vertices[0] = SimplexVertex::new(proxy_a, xf_a, 0, proxy_b, xf_b, 0);
            simplex.count = 1;
        }
        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for (i, v) in self.vertices.iter().take(self.count).enumerate() {
            cache.index_a[i] = v.index_a;
            cache.index_b[i] = v.index_b;
        }
    }

    pub fn metric(&self) -> f32 {
        let v = &self.vertices;
        match self.count {
            2 => v[0].w.distance(v[1].w),
            3 => math::cross(v[1].w - v[0].w, v[2].w - v[0].w),
            _ => 0.0,
        }
    }

    fn search_direction(&self) -> Vec2 {
        let v = &self.vertices;
        match self.count {
            1 => -v[0].w,
            2 => {
                let e12 = v[1].w - v[0].w;
                if math::cross(e12, -v[0].w) > 0.0 {
                    // Origin is left of e12.
                    math::cross_sv(1.0, e12)
                } else {
                    math::cross_vs(e12, 1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    /// Closest point of the simplex to the origin.
    pub fn closest_point(&self) -> Vec2 {
        let v = &self.vertices;
        match self.count {
            1 => v[0].w,
            2 => v[0].w * v[0].a + v[1].w * v[1].a,
            _ => Vec2::ZERO,
        }
    }

    /// Witness points on A and B.
    pub fn witness_points(&self) -> (Vec2, Vec2) {
        let v = &self.vertices;
        match self.count {
            1 => (v[0].w_a, v[0].w_b),
            2 => (
                v[0].w_a * v[0].a + v[1].w_a * v[1].a,
                v[0].w_b * v[0].a + v[1].w_b * v[1].a,
            ),
            3 => {
                let p = v[0].w_a * v[0].a + v[1].w_a * v[1].a + v[2].w_a * v[2].a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    // Voronoi regions of a segment.
    fn solve2(&mut self) {
        let w1 = self.vertices[0].w;
        let w2 = self.vertices[1].w;
        let e12 = w2 - w1;

        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.vertices[0].a = 1.0;
            self.count = 1;
            return;
        }

        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.vertices[1].a = 1.0;
            self.vertices[0] = self.vertices[1];
            self.count = 1;
            return;
        }

        let inv = 1.0 / (d12_1 + d12_2);
        self.vertices[0].a = d12_1 * inv;
        self.vertices[1].a = d12_2 * inv;
        self.count = 2;
    }

    // Voronoi regions of a triangle: three vertices, three edges, the interior.
    fn solve3(&mut self) {
        let w1 = self.vertices[0].w;
        let w2 = self.vertices[1].w;
        let w3 = self.vertices[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = math::cross(e12, e13);
        let d123_1 = n123 * math::cross(w2, w3);
        let d123_2 = n123 * math::cross(w3, w1);
        let d123_3 = n123 * math::cross(w1, w2);

        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.vertices[0].a = 1.0;
            self.count = 1;
            return;
        }

        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.vertices[0].a = d12_1 * inv;
            self.vertices[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.vertices[0].a = d13_1 * inv;
            self.vertices[2].a = d13_2 * inv;
            self.vertices[1] = self.vertices[2];
            self.count = 2;
            return;
        }

        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.vertices[1].a = 1.0;
            self.vertices[0] = self.vertices[1];
            self.count = 1;
            return;
        }

        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.vertices[2].a = 1.0;
            self.vertices[0] = self.vertices[2];
            self.count = 1;
            return;
        }

        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.vertices[1].a = d23_1 * inv;
            self.vertices[2].a = d23_2 * inv;
            self.vertices[0] = self.vertices[2];
            self.count = 2;
            return;
        }

        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.vertices[0].a = d123_1 * inv;
        self.vertices[1].a = d123_2 * inv;
        self.vertices[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// Why the GJK loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceState {
    /// The simplex enclosed the origin: the cores overlap.
    MaxPoints,
    /// The search direction collapsed to zero.
    UnfitSearchDirection,
    /// A support pair already in the simplex came back.
    DuplicateIndexPair,
    /// The closest point stopped getting closer.
    NotImproving,
    /// The iteration cap was reached.
    MaxIterations,
}

/// Result of [`distance`]. Witness points and distance ignore the proxies' radii.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceOutput {
    pub point_a: Vec2,
    pub point_b: Vec2,
    pub distance: f32,
    pub simplex: Simplex,
    pub iterations: u32,
    pub state: DistanceState,
}

impl DistanceOutput {
    /// Moves the witness points onto the proxies' skins.
    ///
    /// Returns the distance between the skins; overlapping skins collapse
    /// both points to their midpoint and report zero.
    pub fn apply_radii(&mut self, radius_a: f32, radius_b: f32) -> f32 {
        let total = radius_a + radius_b;
        if self.distance > total && self.distance > f32::EPSILON {
            let normal = (self.point_b - self.point_a).normalize_or_zero();
            self.distance -= total;
            self.point_a += normal * radius_a;
            self.point_b -= normal * radius_b;
        } else {
            let p = 0.5 * (self.point_a + self.point_b);
            self.point_a = p;
            self.point_b = p;
            self.distance = 0.0;
        }
        self.distance
    }
}

/// Computes the closest features of two convex proxies.
///
/// `cache` seeds the initial simplex and receives the final one.
pub fn distance(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
    cache: &mut SimplexCache,
    max_iterations: u32,
) -> DistanceOutput {
    let mut simplex = Simplex::read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];
    let mut best_distance_sq = f32::MAX;
    let mut iterations = 0;

    let state = loop {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.vertices[i].index_a;
            save_b[i] = simplex.vertices[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        if simplex.count == 3 {
            break DistanceState::MaxPoints;
        }

        let distance_sq = simplex.closest_point().length_squared();
        if distance_sq >= best_distance_sq {
            break DistanceState::NotImproving;
        }
        best_distance_sq = distance_sq;

        let d = simplex.search_direction();
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            // The origin is on the segment or at a vertex: overlapping or touching.
            break DistanceState::UnfitSearchDirection;
        }

        if iterations >= max_iterations {
            break DistanceState::MaxIterations;
        }

        let index_a = proxy_a.support(xf_a.rotation.inv_rotate(-d));
        let index_b = proxy_b.support(xf_b.rotation.inv_rotate(d));
        iterations += 1;

        let duplicate = (0..save_count).any(|i| save_a[i] == index_a && save_b[i] == index_b);
        if duplicate {
            break DistanceState::DuplicateIndexPair;
        }

        simplex.vertices[simplex.count] =
            SimplexVertex::new(proxy_a, xf_a, index_a, proxy_b, xf_b, index_b);
        simplex.count += 1;
    };

    if state == DistanceState::MaxIterations {
        log::warn!("GJK distance hit the iteration cap of {max_iterations}");
    }

    let (point_a, point_b) = simplex.witness_points();
    simplex.write_cache(cache);

    DistanceOutput {
        point_a,
        point_b,
        distance: point_a.distance(point_b),
        simplex,
        iterations,
        state,
    }
}

/// True when the skins of two proxies overlap.
pub fn test_overlap(
    proxy_a: &DistanceProxy,
    xf_a: &Transform,
    proxy_b: &DistanceProxy,
    xf_b: &Transform,
    max_iterations: u32,
) -> bool {
    let mut cache = SimplexCache::default();
    let mut output = distance(proxy_a, xf_a, proxy_b, xf_b, &mut cache, max_iterations);
    output.apply_radii(proxy_a.radius(), proxy_b.radius()) < 10.0 * f32::EPSILON
}
