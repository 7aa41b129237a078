use glam::Vec2;

use super::aabb::Aabb;
use crate::core::types::Transform;

/// Convex support geometry of one shape child: the only view of a shape the
/// collision core needs.
///
/// Vertices are in the shape's local frame. Polygons carry one outward face
/// normal per vertex (face `i` runs from vertex `i` to `i + 1`); a single
/// vertex with a radius is a disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceProxy {
    vertices: Vec<Vec2>,
    normals: Vec<Vec2>,
    radius: f32,
}

impl DistanceProxy {
    pub fn new(vertices: Vec<Vec2>, normals: Vec<Vec2>, radius: f32) -> Self {
        debug_assert!(!vertices.is_empty());
        debug_assert!(normals.is_empty() || normals.len() == vertices.len());
        Self {
            vertices,
            normals,
            radius,
        }
    }

    /// Single-vertex proxy, i.e. a disk of the given radius.
    pub fn point(center: Vec2, radius: f32) -> Self {
        Self::new(vec![center], Vec::new(), radius)
    }

    /// Two-vertex proxy with the pair of opposing face normals.
    pub fn segment(v1: Vec2, v2: Vec2, radius: f32) -> Self {
        let edge = v2 - v1;
        let n = Vec2::new(edge.y, -edge.x).normalize_or_zero();
        Self::new(vec![v1, v2], vec![n, -n], radius)
    }

    /// Convex polygon proxy; `vertices` must be counter-clockwise.
    pub fn polygon(vertices: Vec<Vec2>, radius: f32) -> Self {
        let count = vertices.len();
        let normals = (0..count)
            .map(|i| {
                let edge = vertices[(i + 1) % count] - vertices[i];
                Vec2::new(edge.y, -edge.x).normalize_or_zero()
            })
            .collect();
        Self::new(vertices, normals, radius)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    /// Outward normal of face `index`. Disks have no faces.
    pub fn normal(&self, index: usize) -> Vec2 {
        self.normals[index]
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    /// Skin radius surrounding the vertices.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Index of the vertex furthest along `direction`. Ties keep the lowest index.
    pub fn support(&self, direction: Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(direction);
        for (i, v) in self.vertices.iter().enumerate().skip(1) {
            let value = v.dot(direction);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }

    /// Bounding box of the proxy, including its radius, under `xf`.
    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let first = xf.apply(self.vertices[0]);
        let (min, max) = self
            .vertices
            .iter()
            .skip(1)
            .map(|v| xf.apply(*v))
            .fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        let r = Vec2::splat(self.radius);
        Aabb::new(min - r, max + r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> DistanceProxy {
        DistanceProxy::polygon(
            vec![
                Vec2::new(-0.5, -0.5),
                Vec2::new(0.5, -0.5),
                Vec2::new(0.5, 0.5),
                Vec2::new(-0.5, 0.5),
            ],
            0.0,
        )
    }

    #[test]
    fn polygon_normals_point_outward() {
        let square = unit_square();
        assert_eq!(square.normal(0), Vec2::new(0.0, -1.0));
        assert_eq!(square.normal(1), Vec2::new(1.0, 0.0));
        assert_eq!(square.normal(2), Vec2::new(0.0, 1.0));
        assert_eq!(square.normal(3), Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn support_prefers_lowest_index_on_ties() {
        let square = unit_square();
        assert_eq!(square.support(Vec2::new(1.0, 0.0)), 1);
        assert_eq!(square.support(Vec2::new(1.0, 1.0)), 2);
    }

    #[test]
    fn segment_normals_are_opposed() {
        let seg = DistanceProxy::segment(Vec2::ZERO, Vec2::new(2.0, 0.0), 0.0);
        assert_eq!(seg.normal(0), Vec2::new(0.0, -1.0));
        assert_eq!(seg.normal(1), Vec2::new(0.0, 1.0));
    }

    #[test]
    fn aabb_includes_radius() {
        let disk = DistanceProxy::point(Vec2::new(1.0, 0.0), 0.5);
        let aabb = disk.compute_aabb(&Transform::from_position(Vec2::new(0.0, 2.0)));
        assert_eq!(aabb.min, Vec2::new(0.5, 1.5));
        assert_eq!(aabb.max, Vec2::new(1.5, 2.5));
    }
}
