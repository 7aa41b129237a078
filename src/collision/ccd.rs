//! Time of impact by conservative advancement over two sweeps.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{
    distance::{distance, SimplexCache},
    shapes::DistanceProxy,
};
use crate::{
    config::{
        StepConf, LINEAR_SLOP, MAX_DISTANCE_ITERATIONS, MAX_POLYGON_VERTICES,
        MAX_TOI_ITERATIONS, MAX_TOI_ROOT_ITERATIONS,
    },
    core::types::{Sweep, Transform},
    utils::math,
};

/// Limits and tolerances for [`time_of_impact`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToiConf {
    /// Upper bound of the search interval, in sweep fraction.
    pub t_max: f32,
    pub linear_slop: f32,
    pub max_iterations: u32,
    pub max_root_iterations: u32,
    pub max_distance_iterations: u32,
}

impl Default for ToiConf {
    fn default() -> Self {
        Self {
            t_max: 1.0,
            linear_slop: LINEAR_SLOP,
            max_iterations: MAX_TOI_ITERATIONS,
            max_root_iterations: MAX_TOI_ROOT_ITERATIONS,
            max_distance_iterations: MAX_DISTANCE_ITERATIONS,
        }
    }
}

impl ToiConf {
    pub fn from_step(step: &StepConf) -> Self {
        Self {
            t_max: 1.0,
            linear_slop: step.linear_slop,
            max_iterations: step.max_toi_iterations,
            max_root_iterations: step.max_toi_root_iterations,
            max_distance_iterations: step.max_distance_iterations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToiState {
    /// Root finding did not converge; `t` is a conservative lower bound.
    Failed,
    /// Cores already overlap at the start of the interval.
    Overlapped,
    /// Separation reached the target at `t`.
    Touching,
    /// No impact before `t_max`.
    Separated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f32,
    /// Outer advancement iterations.
    pub iterations: u32,
    /// Largest number of root-finder iterations in one search.
    pub max_root_iterations: u32,
    /// Largest number of GJK iterations in one distance query.
    pub max_distance_iterations: u32,
}

#[derive(Debug, Clone, Copy)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

/// Separating axis tracked along the sweeps.
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f32,
    ) -> Self {
        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let p_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            let p_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            f.axis = (p_b - p_a).normalize_or_zero();
        } else if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A.
            f.kind = SeparationKind::FaceB;
            let b1 = proxy_b.vertex(cache.index_b[0]);
            let b2 = proxy_b.vertex(cache.index_b[1]);
            f.axis = math::cross_vs(b2 - b1, 1.0).normalize_or_zero();
            let normal = xf_b.rotation.rotate(f.axis);
            f.local_point = 0.5 * (b1 + b2);
            let p_b = xf_b.apply(f.local_point);
            let p_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            if (p_a - p_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // Two points on A and one or two on B.
            f.kind = SeparationKind::FaceA;
            let a1 = proxy_a.vertex(cache.index_a[0]);
            let a2 = proxy_a.vertex(cache.index_a[1]);
            f.axis = math::cross_vs(a2 - a1, 1.0).normalize_or_zero();
            let normal = xf_a.rotation.rotate(f.axis);
            f.local_point = 0.5 * (a1 + a2);
            let p_a = xf_a.apply(f.local_point);
            let p_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            if (p_b - p_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }
        f
    }

    fn transforms(&self, t: f32) -> (Transform, Transform) {
        (self.sweep_a.transform_at(t), self.sweep_b.transform_at(t))
    }

    /// Deepest points along the axis at time `t`.
    fn find_min_separation(&self, t: f32) -> (f32, usize, usize) {
        let (xf_a, xf_b) = self.transforms(t);
        match self.kind {
            SeparationKind::Points => {
                let index_a = self.proxy_a.support(xf_a.rotation.inv_rotate(self.axis));
                let index_b = self.proxy_b.support(xf_b.rotation.inv_rotate(-self.axis));
                let p_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let p_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((p_b - p_a).dot(self.axis), index_a, index_b)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.rotation.rotate(self.axis);
                let p_a = xf_a.apply(self.local_point);
                let index_b = self.proxy_b.support(xf_b.rotation.inv_rotate(-normal));
                let p_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((p_b - p_a).dot(normal), 0, index_b)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.rotation.rotate(self.axis);
                let p_b = xf_b.apply(self.local_point);
                let index_a = self.proxy_a.support(xf_a.rotation.inv_rotate(-normal));
                let p_a = xf_a.apply(self.proxy_a.vertex(index_a));
                ((p_a - p_b).dot(normal), index_a, 0)
            }
        }
    }

    /// Separation of the given support points at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let (xf_a, xf_b) = self.transforms(t);
        match self.kind {
            SeparationKind::Points => {
                let p_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let p_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (p_b - p_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.rotation.rotate(self.axis);
                let p_a = xf_a.apply(self.local_point);
                let p_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (p_b - p_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.rotation.rotate(self.axis);
                let p_b = xf_b.apply(self.local_point);
                let p_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (p_a - p_b).dot(normal)
            }
        }
    }
}

/// Earliest fraction of the sweeps at which the proxies come within
/// `linear_slop` of touching.
///
/// The target separation leaves a little overlap (`radius - 3 * slop`) so the
/// follow-up solve sees a contact. Non-convergence is reported as
/// [`ToiState::Failed`] with the last safe time, never as an error.
pub fn time_of_impact(
    proxy_a: &DistanceProxy,
    sweep_a: &Sweep,
    proxy_b: &DistanceProxy,
    sweep_b: &Sweep,
    conf: &ToiConf,
) -> ToiOutput {
    let mut sweep_a = *sweep_a;
    let mut sweep_b = *sweep_b;
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = conf.t_max;
    let total_radius = proxy_a.radius() + proxy_b.radius();
    let target = conf.linear_slop.max(total_radius - 3.0 * conf.linear_slop);
    let tolerance = 0.25 * conf.linear_slop;

    let mut output = ToiOutput {
        state: ToiState::Failed,
        t: t_max,
        iterations: 0,
        max_root_iterations: 0,
        max_distance_iterations: 0,
    };

    let mut t1 = 0.0;
    let mut cache = SimplexCache::default();

    loop {
        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        // Distance between the cores; the radii are folded into `target`.
        let dist = distance(
            proxy_a,
            &xf_a,
            proxy_b,
            &xf_b,
            &mut cache,
            conf.max_distance_iterations,
        );
        output.max_distance_iterations = output.max_distance_iterations.max(dist.iterations);

        if dist.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.t = 0.0;
            break;
        }

        if dist.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest points, at most once per vertex.
        let mut done = false;
        let mut t2 = t_max;
        for _ in 0..MAX_POLYGON_VERTICES {
            let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

            if s2 > target + tolerance {
                // Final configuration is still separated.
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            if s2 > target - tolerance {
                // Advance the sweeps.
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // 1D root of f(t) - target = 0, alternating secant and bisection.
            let mut a1 = t1;
            let mut a2 = t2;
            let mut root_iterations = 0;
            loop {
                let t = if root_iterations & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iterations += 1;

                let s = fcn.evaluate(index_a, index_b, t);
                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iterations >= conf.max_root_iterations {
                    break;
                }
            }
            output.max_root_iterations = output.max_root_iterations.max(root_iterations);
        }

        output.iterations += 1;

        if done {
            break;
        }

        if output.iterations >= conf.max_iterations {
            // Root finder got stuck; report the last safe time.
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_sweep(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            c0: from,
            c: to,
            ..Sweep::default()
        }
    }

    fn square(half: f32, radius: f32) -> DistanceProxy {
        DistanceProxy::polygon(
            vec![
                Vec2::new(-half, -half),
                Vec2::new(half, -half),
                Vec2::new(half, half),
                Vec2::new(-half, half),
            ],
            radius,
        )
    }

    #[test]
    fn approaching_disks_touch_at_target_separation() {
        let disk = DistanceProxy::point(Vec2::ZERO, 0.5);
        let still = linear_sweep(Vec2::ZERO, Vec2::ZERO);
        let moving = linear_sweep(Vec2::new(10.0, 0.0), Vec2::new(-10.0, 0.0));
        let out = time_of_impact(&disk, &still, &disk, &moving, &ToiConf::default());
        assert_eq!(out.state, ToiState::Touching);

        let target = 1.0 - 3.0 * LINEAR_SLOP;
        let expected = (10.0 - target) / 20.0;
        assert_relative_eq!(out.t, expected, epsilon = 1e-3);
    }

    #[test]
    fn sweeps_that_never_meet_are_separated() {
        let disk = DistanceProxy::point(Vec2::ZERO, 0.5);
        let a = linear_sweep(Vec2::ZERO, Vec2::new(0.0, 1.0));
        let b = linear_sweep(Vec2::new(5.0, 0.0), Vec2::new(5.0, 1.0));
        let out = time_of_impact(&disk, &a, &disk, &b, &ToiConf::default());
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.t, 1.0);
    }

    #[test]
    fn overlapping_cores_report_zero() {
        let a = square(1.0, 0.0);
        let sweep = linear_sweep(Vec2::ZERO, Vec2::new(1.0, 0.0));
        let out = time_of_impact(&a, &sweep, &a, &sweep, &ToiConf::default());
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.t, 0.0);
    }

    #[test]
    fn fast_box_hits_thin_wall() {
        let wall = square(0.05, LINEAR_SLOP * 2.0);
        let bullet = square(0.1, LINEAR_SLOP * 2.0);
        let still = linear_sweep(Vec2::ZERO, Vec2::ZERO);
        let moving = Sweep {
            c0: Vec2::new(-5.0, 0.0),
            c: Vec2::new(5.0, 0.0),
            a0: 0.0,
            a: 0.3,
            ..Sweep::default()
        };
        let out = time_of_impact(&wall, &still, &bullet, &moving, &ToiConf::default());
        assert_eq!(out.state, ToiState::Touching);
        assert!(out.t > 0.45 && out.t < 0.5, "t = {}", out.t);

        let xf_a = still.transform_at(out.t);
        let xf_b = moving.transform_at(out.t);
        let mut cache = SimplexCache::default();
        let d = distance(&wall, &xf_a, &bullet, &xf_b, &mut cache, MAX_DISTANCE_ITERATIONS);
        assert!(d.distance > 0.0);
    }
}
