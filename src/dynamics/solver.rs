//! Sequential-impulse contact solver.
//!
//! Constraints are built once per island solve from the contact manifolds,
//! then iterated in the order they were handed in, which keeps results
//! reproducible.

use glam::{Mat2, Vec2};

use crate::{
    collision::contact::{Manifold, ManifoldKind, WorldManifold},
    config::{StepConf, MAX_MANIFOLD_POINTS},
    core::types::{Position, Rot, Transform, Velocity},
    utils::math::{self, cross, cross_sv, cross_vs},
};

/// Largest condition number accepted by the two-point block solver.
const MAX_CONDITION_NUMBER: f32 = 1000.0;

/// Island-local view of one body taking part in a contact.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SolverBody {
    pub index: usize,
    pub inv_mass: f32,
    pub inv_i: f32,
    pub local_center: Vec2,
}

/// Everything the solver needs to know about one touching contact.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContactSolverInput {
    pub manifold: Manifold,
    pub friction: f32,
    pub restitution: f32,
    pub radius_a: f32,
    pub radius_b: f32,
    pub body_a: SolverBody,
    pub body_b: SolverBody,
}

/// Impulses applied to one contact during a solve, reported to post-solve listeners.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug, Clone, Copy)]
struct VelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    point_count: usize,
    normal: Vec2,
    /// Block solver matrix and its inverse.
    k: Mat2,
    normal_mass: Mat2,
    body_a: SolverBody,
    body_b: SolverBody,
    friction: f32,
    restitution: f32,
}

#[derive(Debug, Clone, Copy)]
struct PositionConstraint {
    manifold: Manifold,
    body_a: SolverBody,
    body_b: SolverBody,
    radius_a: f32,
    radius_b: f32,
}

/// Contact point geometry evaluated at the solver's current positions.
struct PositionSolverManifold {
    normal: Vec2,
    point: Vec2,
    separation: f32,
}

impl PositionSolverManifold {
    fn new(pc: &PositionConstraint, xf_a: &Transform, xf_b: &Transform, index: usize) -> Self {
        let m = &pc.manifold;
        let total_radius = pc.radius_a + pc.radius_b;
        match m.kind {
            ManifoldKind::Circles => {
                let point_a = xf_a.apply(m.local_point);
                let point_b = xf_b.apply(m.points[0].local_point);
                let normal = (point_b - point_a).normalize_or_zero();
                Self {
                    normal,
                    point: 0.5 * (point_a + point_b),
                    separation: (point_b - point_a).dot(normal) - total_radius,
                }
            }
            ManifoldKind::FaceA => {
                let normal = xf_a.rotation.rotate(m.local_normal);
                let plane_point = xf_a.apply(m.local_point);
                let clip_point = xf_b.apply(m.points[index].local_point);
                Self {
                    normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - total_radius,
                }
            }
            ManifoldKind::FaceB => {
                let normal = xf_b.rotation.rotate(m.local_normal);
                let plane_point = xf_b.apply(m.local_point);
                let clip_point = xf_a.apply(m.points[index].local_point);
                Self {
                    // Keep the A-to-B convention.
                    normal: -normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - total_radius,
                }
            }
            ManifoldKind::Unset => Self {
                normal: Vec2::X,
                point: Vec2::ZERO,
                separation: 0.0,
            },
        }
    }
}

fn body_transform(position: &Position, local_center: Vec2) -> Transform {
    let rotation = Rot::from_angle(position.angle);
    Transform {
        position: position.center - rotation.rotate(local_center),
        rotation,
    }
}

/// Velocity and position constraints for all contacts of one island.
#[derive(Debug, Default)]
pub(crate) struct ContactSolver {
    step: StepConf,
    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
}

impl ContactSolver {
    /// Builds the constraints. Accumulated impulses of the manifolds seed the
    /// warm start, scaled by the step's dt ratio.
    pub(crate) fn new(step: &StepConf, inputs: &[ContactSolverInput]) -> Self {
        let mut velocity_constraints = Vec::with_capacity(inputs.len());
        let mut position_constraints = Vec::with_capacity(inputs.len());

        for input in inputs {
            let manifold = &input.manifold;
            let mut vc = VelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                point_count: manifold.point_count,
                normal: Vec2::ZERO,
                k: Mat2::ZERO,
                normal_mass: Mat2::ZERO,
                body_a: input.body_a,
                body_b: input.body_b,
                friction: input.friction,
                restitution: input.restitution,
            };
            for (vcp, mp) in vc.points.iter_mut().zip(manifold.points()) {
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }
            }
            velocity_constraints.push(vc);
            position_constraints.push(PositionConstraint {
                manifold: *manifold,
                body_a: input.body_a,
                body_b: input.body_b,
                radius_a: input.radius_a,
                radius_b: input.radius_b,
            });
        }

        Self {
            step: *step,
            velocity_constraints,
            position_constraints,
        }
    }

    /// Computes anchors, effective masses and restitution bias from the current state.
    pub(crate) fn initialize_velocity_constraints(
        &mut self,
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        let velocity_threshold = self.step.velocity_threshold;
        for (vc, pc) in self
            .velocity_constraints
            .iter_mut()
            .zip(&self.position_constraints)
        {
            let (a, b) = (vc.body_a, vc.body_b);
            let pos_a = positions[a.index];
            let pos_b = positions[b.index];
            let vel_a = velocities[a.index];
            let vel_b = velocities[b.index];

            let xf_a = body_transform(&pos_a, a.local_center);
            let xf_b = body_transform(&pos_b, b.local_center);
            let world_manifold =
                WorldManifold::new(&pc.manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);

            vc.normal = world_manifold.normal;
            let tangent = cross_vs(vc.normal, 1.0);

            for (j, vcp) in vc.points[..vc.point_count].iter_mut().enumerate() {
                vcp.r_a = world_manifold.points[j] - pos_a.center;
                vcp.r_b = world_manifold.points[j] - pos_b.center;

                let rn_a = cross(vcp.r_a, vc.normal);
                let rn_b = cross(vcp.r_b, vc.normal);
                let k_normal =
                    a.inv_mass + b.inv_mass + a.inv_i * rn_a * rn_a + b.inv_i * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(vcp.r_a, tangent);
                let rt_b = cross(vcp.r_b, tangent);
                let k_tangent =
                    a.inv_mass + b.inv_mass + a.inv_i * rt_a * rt_a + b.inv_i * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                let v_rel = vc.normal.dot(
                    vel_b.linear + cross_sv(vel_b.angular, vcp.r_b)
                        - vel_a.linear
                        - cross_sv(vel_a.angular, vcp.r_a),
                );
                vcp.velocity_bias = if v_rel < -velocity_threshold {
                    -vc.restitution * v_rel
                } else {
                    0.0
                };
            }

            if vc.point_count == 2 {
                let p1 = vc.points[0];
                let p2 = vc.points[1];
                let rn1_a = cross(p1.r_a, vc.normal);
                let rn1_b = cross(p1.r_b, vc.normal);
                let rn2_a = cross(p2.r_a, vc.normal);
                let rn2_b = cross(p2.r_b, vc.normal);

                let m = a.inv_mass + b.inv_mass;
                let k11 = m + a.inv_i * rn1_a * rn1_a + b.inv_i * rn1_b * rn1_b;
                let k22 = m + a.inv_i * rn2_a * rn2_a + b.inv_i * rn2_b * rn2_b;
                let k12 = m + a.inv_i * rn1_a * rn2_a + b.inv_i * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = math::inverse22(vc.k);
                } else {
                    // Nearly redundant points: solve only the first one.
                    vc.point_count = 1;
                }
            }
        }
    }

    pub(crate) fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let (a, b) = (vc.body_a, vc.body_b);
            let mut vel_a = velocities[a.index];
            let mut vel_b = velocities[b.index];
            let tangent = cross_vs(vc.normal, 1.0);

            for vcp in &vc.points[..vc.point_count] {
                let p = vc.normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                vel_a.angular -= a.inv_i * cross(vcp.r_a, p);
                vel_a.linear -= p * a.inv_mass;
                vel_b.angular += b.inv_i * cross(vcp.r_b, p);
                vel_b.linear += p * b.inv_mass;
            }

            velocities[a.index] = vel_a;
            velocities[b.index] = vel_b;
        }
    }

    /// One velocity iteration over every contact. Returns the largest
    /// incremental impulse applied.
    pub(crate) fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) -> f32 {
        let mut max_incremental = 0.0_f32;

        for vc in &mut self.velocity_constraints {
            let (a, b) = (vc.body_a, vc.body_b);
            let Velocity {
                linear: mut v_a,
                angular: mut w_a,
            } = velocities[a.index];
            let Velocity {
                linear: mut v_b,
                angular: mut w_b,
            } = velocities[b.index];

            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);

            // Friction first so the normal impulse has the last word on penetration.
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);
                let vt = dv.dot(tangent);
                let lambda = vcp.tangent_mass * -vt;

                let max_friction = vc.friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;
                max_incremental = max_incremental.max(lambda.abs());

                let p = tangent * lambda;
                v_a -= p * a.inv_mass;
                w_a -= a.inv_i * cross(vcp.r_a, p);
                v_b += p * b.inv_mass;
                w_b += b.inv_i * cross(vcp.r_b, p);
            }

            if vc.point_count == 1 {
                let vcp = &mut vc.points[0];
                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);
                let vn = dv.dot(normal);
                let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;
                max_incremental = max_incremental.max(lambda.abs());

                let p = normal * lambda;
                v_a -= p * a.inv_mass;
                w_a -= a.inv_i * cross(vcp.r_a, p);
                v_b += p * b.inv_mass;
                w_b += b.inv_i * cross(vcp.r_b, p);
            } else if vc.point_count == 2 {
                // Block solver: find x >= 0 with vn = A * x + b >= 0 and x_i * vn_i = 0
                // by enumerating the four complementarity cases.
                let cp1 = vc.points[0];
                let cp2 = vc.points[1];
                let a_old = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);

                let dv1 = v_b + cross_sv(w_b, cp1.r_b) - v_a - cross_sv(w_a, cp1.r_a);
                let dv2 = v_b + cross_sv(w_b, cp2.r_b) - v_a - cross_sv(w_a, cp2.r_a);
                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let mut rhs = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias);
                rhs -= vc.k * a_old;

                let x = block_solve(vc, rhs);
                if let Some(x) = x {
                    let d = x - a_old;
                    let p1 = normal * d.x;
                    let p2 = normal * d.y;
                    v_a -= (p1 + p2) * a.inv_mass;
                    w_a -= a.inv_i * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
                    v_b += (p1 + p2) * b.inv_mass;
                    w_b += b.inv_i * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));

                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                    max_incremental = max_incremental.max(d.x.abs()).max(d.y.abs());
                }
            }

            velocities[a.index] = Velocity {
                linear: v_a,
                angular: w_a,
            };
            velocities[b.index] = Velocity {
                linear: v_b,
                angular: w_b,
            };
        }

        max_incremental
    }

    /// Copies the accumulated impulses of constraint `index` back into its manifold.
    pub(crate) fn store_impulses(&self, index: usize, manifold: &mut Manifold) {
        let vc = &self.velocity_constraints[index];
        for (mp, vcp) in manifold.points_mut().iter_mut().zip(&vc.points) {
            mp.normal_impulse = vcp.normal_impulse;
            mp.tangent_impulse = vcp.tangent_impulse;
        }
    }

    /// Accumulated impulses of constraint `index`.
    pub(crate) fn impulse(&self, index: usize) -> ContactImpulse {
        let vc = &self.velocity_constraints[index];
        let mut out = ContactImpulse {
            count: vc.point_count,
            ..Default::default()
        };
        for (j, vcp) in vc.points[..vc.point_count].iter().enumerate() {
            out.normal_impulses[j] = vcp.normal_impulse;
            out.tangent_impulses[j] = vcp.tangent_impulse;
        }
        out
    }

    /// One position iteration. Returns the smallest separation seen, which is
    /// never above zero.
    pub(crate) fn solve_position_constraints(&self, positions: &mut [Position]) -> f32 {
        self.solve_positions(
            positions,
            self.step.resolution_rate,
            |body: &SolverBody| (body.inv_mass, body.inv_i),
        )
    }

    /// Position iteration for a time-of-impact sub-step: only the two bodies of
    /// the impact move, everything else acts as static.
    pub(crate) fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> f32 {
        self.solve_positions(
            positions,
            self.step.toi_resolution_rate,
            |body: &SolverBody| {
                if body.index == toi_index_a || body.index == toi_index_b {
                    (body.inv_mass, body.inv_i)
                } else {
                    (0.0, 0.0)
                }
            },
        )
    }

    fn solve_positions<F>(&self, positions: &mut [Position], rate: f32, mass_of: F) -> f32
    where
        F: Fn(&SolverBody) -> (f32, f32),
    {
        let mut min_separation = 0.0_f32;
        let slop = self.step.linear_slop;
        let max_correction = self.step.max_linear_correction;

        for pc in &self.position_constraints {
            let (a, b) = (pc.body_a, pc.body_b);
            let (m_a, i_a) = mass_of(&a);
            let (m_b, i_b) = mass_of(&b);

            let mut pos_a = positions[a.index];
            let mut pos_b = positions[b.index];

            for j in 0..pc.manifold.point_count {
                let xf_a = body_transform(&pos_a, a.local_center);
                let xf_b = body_transform(&pos_b, b.local_center);
                let psm = PositionSolverManifold::new(pc, &xf_a, &xf_b, j);

                let r_a = psm.point - pos_a.center;
                let r_b = psm.point - pos_b.center;
                min_separation = min_separation.min(psm.separation);

                // Leave slop behind so contacts stay warm between steps.
                let c = (rate * (psm.separation + slop)).clamp(-max_correction, 0.0);

                let rn_a = cross(r_a, psm.normal);
                let rn_b = cross(r_b, psm.normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = psm.normal * impulse;

                pos_a.center -= p * m_a;
                pos_a.angle -= i_a * cross(r_a, p);
                pos_b.center += p * m_b;
                pos_b.angle += i_b * cross(r_b, p);
            }

            positions[a.index] = pos_a;
            positions[b.index] = pos_b;
        }

        min_separation
    }
}

/// Solves the two-point normal LCP for the total impulse, or `None` when no
/// case applies (the constraint is left untouched this iteration).
fn block_solve(vc: &VelocityConstraint, b: Vec2) -> Option<Vec2> {
    // Both points active.
    let x = -(vc.normal_mass * b);
    if x.x >= 0.0 && x.y >= 0.0 {
        return Some(x);
    }

    // Only the first point active.
    let x = Vec2::new(-vc.points[0].normal_mass * b.x, 0.0);
    let vn2 = vc.k.x_axis.y * x.x + b.y;
    if x.x >= 0.0 && vn2 >= 0.0 {
        return Some(x);
    }

    // Only the second point active.
    let x = Vec2::new(0.0, -vc.points[1].normal_mass * b.y);
    let vn1 = vc.k.y_axis.x * x.y + b.x;
    if x.y >= 0.0 && vn1 >= 0.0 {
        return Some(x);
    }

    // Both separating.
    if b.x >= 0.0 && b.y >= 0.0 {
        return Some(Vec2::ZERO);
    }

    None
}
