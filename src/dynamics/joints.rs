//! Velocity and position solvers for every joint kind.
//!
//! Each kind follows the same three-stage contract driven by the island
//! solver: [`Joint::init_velocity_constraints`] once per solve,
//! [`Joint::solve_velocity_constraints`] per velocity iteration and
//! [`Joint::solve_position_constraints`] per position iteration.

use std::f32::consts::PI;

use glam::{Mat2, Mat3, Vec2, Vec3};

use super::SolverData;
use crate::{
    core::{
        constraints::{
            DistanceJoint, FrictionJoint, Joint, JointBodies, JointKind, LimitState, RevoluteJoint,
            RopeJoint, TargetJoint, WeldJoint,
        },
        types::{Position, Rot, Velocity},
    },
    utils::math::{self, cross, cross_sv},
};

/// Positions and velocities of the two bodies of a joint, copied out of the island arrays.
struct Pair {
    c_a: Vec2,
    a_a: f32,
    c_b: Vec2,
    a_b: f32,
    v_a: Vec2,
    w_a: f32,
    v_b: Vec2,
    w_b: f32,
}

impl Pair {
    fn load(data: &SolverData<'_>, bodies: &JointBodies) -> Self {
        let Position {
            center: c_a,
            angle: a_a,
        } = data.positions[bodies.index_a];
        let Position {
            center: c_b,
            angle: a_b,
        } = data.positions[bodies.index_b];
        let Velocity {
            linear: v_a,
            angular: w_a,
        } = data.velocities[bodies.index_a];
        let Velocity {
            linear: v_b,
            angular: w_b,
        } = data.velocities[bodies.index_b];
        Self {
            c_a,
            a_a,
            c_b,
            a_b,
            v_a,
            w_a,
            v_b,
            w_b,
        }
    }

    fn store_velocities(&self, data: &mut SolverData<'_>, bodies: &JointBodies) {
        data.velocities[bodies.index_a] = Velocity {
            linear: self.v_a,
            angular: self.w_a,
        };
        data.velocities[bodies.index_b] = Velocity {
            linear: self.v_b,
            angular: self.w_b,
        };
    }

    fn store_positions(&self, data: &mut SolverData<'_>, bodies: &JointBodies) {
        data.positions[bodies.index_a] = Position {
            center: self.c_a,
            angle: self.a_a,
        };
        data.positions[bodies.index_b] = Position {
            center: self.c_b,
            angle: self.a_b,
        };
    }

    /// Lever arms from the centers of mass to the anchors.
    fn arms(&self, b: &JointBodies, local_anchor_a: Vec2, local_anchor_b: Vec2) -> (Vec2, Vec2) {
        let q_a = Rot::from_angle(self.a_a);
        let q_b = Rot::from_angle(self.a_b);
        (
            q_a.rotate(local_anchor_a - b.local_center_a),
            q_b.rotate(local_anchor_b - b.local_center_b),
        )
    }

    /// Applies the linear impulse `p` at the anchors, plus an angular impulse `l`.
    fn apply_impulse(&mut self, b: &JointBodies, r_a: Vec2, r_b: Vec2, p: Vec2, l: f32) {
        self.v_a -= p * b.inv_mass_a;
        self.w_a -= b.inv_i_a * (cross(r_a, p) + l);
        self.v_b += p * b.inv_mass_b;
        self.w_b += b.inv_i_b * (cross(r_b, p) + l);
    }

    fn apply_correction(&mut self, b: &JointBodies, r_a: Vec2, r_b: Vec2, p: Vec2, l: f32) {
        self.c_a -= p * b.inv_mass_a;
        self.a_a -= b.inv_i_a * (cross(r_a, p) + l);
        self.c_b += p * b.inv_mass_b;
        self.a_b += b.inv_i_b * (cross(r_b, p) + l);
    }

    fn relative_velocity(&self, r_a: Vec2, r_b: Vec2) -> Vec2 {
        self.v_b + cross_sv(self.w_b, r_b) - self.v_a - cross_sv(self.w_a, r_a)
    }
}

/// Point-to-point effective mass with the angular row appended.
fn point_angle_mass(b: &JointBodies, r_a: Vec2, r_b: Vec2) -> Mat3 {
    let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
    let ex = Vec3::new(
        m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
        -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
        -r_a.y * i_a - r_b.y * i_b,
    );
    let ey = Vec3::new(
        ex.y,
        m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b,
        r_a.x * i_a + r_b.x * i_b,
    );
    let ez = Vec3::new(ex.z, ey.z, i_a + i_b);
    Mat3::from_cols(ex, ey, ez)
}

fn point_mass(b: &JointBodies, r_a: Vec2, r_b: Vec2) -> Mat2 {
    let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
    let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
    let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
    let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
    Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22))
}

/// Soft-constraint coefficients `(gamma, bias_factor)` for a spring of the given
/// frequency and damping ratio acting on effective mass `mass`.
fn soft_coefficients(mass: f32, frequency_hz: f32, damping_ratio: f32, h: f32) -> (f32, f32) {
    let omega = 2.0 * PI * frequency_hz;
    let d = 2.0 * mass * damping_ratio * omega;
    let k = mass * omega * omega;
    let mut gamma = h * (d + h * k);
    if gamma != 0.0 {
        gamma = 1.0 / gamma;
    }
    (gamma, h * k * gamma)
}

fn invert(value: f32) -> f32 {
    if value != 0.0 {
        1.0 / value
    } else {
        0.0
    }
}

impl Joint {
    /// Computes effective masses and applies warm-start impulses.
    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let bodies = self.bodies;
        match &mut self.kind {
            JointKind::Distance(j) => j.init(data, &bodies),
            JointKind::Rope(j) => j.init(data, &bodies),
            JointKind::Revolute(j) => j.init(data, &bodies),
            JointKind::Weld(j) => j.init(data, &bodies),
            JointKind::Target(j) => j.init(data, &bodies),
            JointKind::Friction(j) => j.init(data, &bodies),
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let bodies = self.bodies;
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_velocity(data, &bodies),
            JointKind::Rope(j) => j.solve_velocity(data, &bodies),
            JointKind::Revolute(j) => j.solve_velocity(data, &bodies),
            JointKind::Weld(j) => j.solve_velocity(data, &bodies),
            JointKind::Target(j) => j.solve_velocity(data, &bodies),
            JointKind::Friction(j) => j.solve_velocity(data, &bodies),
        }
    }

    /// Returns true when the joint error is within tolerance.
    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let bodies = self.bodies;
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_position(data, &bodies),
            JointKind::Rope(j) => j.solve_position(data, &bodies),
            JointKind::Revolute(j) => j.solve_position(data, &bodies),
            JointKind::Weld(j) => j.solve_position(data, &bodies),
            // Soft and friction constraints carry no position error.
            JointKind::Target(_) | JointKind::Friction(_) => true,
        }
    }
}

impl DistanceJoint {
    fn init(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);
        let (r_a, r_b) = s.arms(b, self.local_anchor_a, self.local_anchor_b);
        self.r_a = r_a;
        self.r_b = r_b;
        self.u = s.c_b + r_b - s.c_a - r_a;

        let length = self.u.length();
        if length > data.step.linear_slop {
            self.u /= length;
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_a = cross(r_a, self.u);
        let cr_b = cross(r_b, self.u);
        let mut inv_mass =
            b.inv_mass_a + b.inv_i_a * cr_a * cr_a + b.inv_mass_b + b.inv_i_b * cr_b * cr_b;
        self.mass = invert(inv_mass);

        if self.frequency_hz > 0.0 {
            let c = length - self.length;
            let (gamma, bias_factor) =
                soft_coefficients(self.mass, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;
            inv_mass += self.gamma;
            self.mass = invert(inv_mass);
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            s.apply_impulse(b, r_a, r_b, self.u * self.impulse, 0.0);
        } else {
            self.impulse = 0.0;
        }
        s.store_velocities(data, b);
    }

    fn solve_velocity(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);
        let c_dot = self.u.dot(s.relative_velocity(self.r_a, self.r_b));
        let impulse = -self.mass * (c_dot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;
        s.apply_impulse(b, self.r_a, self.r_b, self.u * impulse, 0.0);
        s.store_velocities(data, b);
    }

    fn solve_position(&mut self, data: &mut SolverData<'_>, b: &JointBodies) -> bool {
        if self.frequency_hz > 0.0 {
            return true;
        }

        let mut s = Pair::load(data, b);
        let (r_a, r_b) = s.arms(b, self.local_anchor_a, self.local_anchor_b);
        let d = s.c_b + r_b - s.c_a - r_a;
        let length = d.length();
        let u = d.normalize_or_zero();
        let c = (length - self.length).clamp(
            -data.step.max_linear_correction,
            data.step.max_linear_correction,
        );

        let impulse = -self.mass * c;
        s.apply_correction(b, r_a, r_b, u * impulse, 0.0);
        s.store_positions(data, b);
        c.abs() < data.step.linear_slop
    }
}

impl RopeJoint {
    fn init(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);
        let (r_a, r_b) = s.arms(b, self.local_anchor_a, self.local_anchor_b);
        self.r_a = r_a;
        self.r_b = r_b;
        self.u = s.c_b + r_b - s.c_a - r_a;
        self.length = self.u.length();

        self.state = if self.length - self.max_length > 0.0 {
            LimitState::AtUpper
        } else {
            LimitState::Inactive
        };

        if self.length > data.step.linear_slop {
            self.u /= self.length;
        } else {
            self.u = Vec2::ZERO;
            self.mass = 0.0;
            self.impulse = 0.0;
            return;
        }

        let cr_a = cross(r_a, self.u);
        let cr_b = cross(r_b, self.u);
        let inv_mass =
            b.inv_mass_a + b.inv_i_a * cr_a * cr_a + b.inv_mass_b + b.inv_i_b * cr_b * cr_b;
        self.mass = invert(inv_mass);

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            s.apply_impulse(b, r_a, r_b, self.u * self.impulse, 0.0);
        } else {
            self.impulse = 0.0;
        }
        s.store_velocities(data, b);
    }

    fn solve_velocity(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);
        let c = self.length - self.max_length;
        let mut c_dot = self.u.dot(s.relative_velocity(self.r_a, self.r_b));

        // Predictive: let the rope close the remaining slack this step.
        if c < 0.0 {
            c_dot += data.step.inv_dt() * c;
        }

        let impulse = -self.mass * c_dot;
        let old = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        let impulse = self.impulse - old;

        s.apply_impulse(b, self.r_a, self.r_b, self.u * impulse, 0.0);
        s.store_velocities(data, b);
    }

    fn solve_position(&mut self, data: &mut SolverData<'_>, b: &JointBodies) -> bool {
        let mut s = Pair::load(data, b);
        let (r_a, r_b) = s.arms(b, self.local_anchor_a, self.local_anchor_b);
        let d = s.c_b + r_b - s.c_a - r_a;
        let length = d.length();
        let u = d.normalize_or_zero();
        let c = (length - self.max_length).clamp(0.0, data.step.max_linear_correction);

        let impulse = -self.mass * c;
        s.apply_correction(b, r_a, r_b, u * impulse, 0.0);
        s.store_positions(data, b);
        length - self.max_length < data.step.linear_slop
    }
}

impl RevoluteJoint {
    fn init(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);
        let (r_a, r_b) = s.arms(b, self.local_anchor_a, self.local_anchor_b);
        self.r_a = r_a;
        self.r_b = r_b;

        let fixed_rotation = b.inv_i_a + b.inv_i_b == 0.0;
        self.mass = point_angle_mass(b, r_a, r_b);
        self.motor_mass = invert(b.inv_i_a + b.inv_i_b);

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = s.a_b - s.a_a - self.reference_angle;
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * data.step.angular_slop {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;
            let p = Vec2::new(self.impulse.x, self.impulse.y);
            s.apply_impulse(b, r_a, r_b, p, self.motor_impulse + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
        }
        s.store_velocities(data, b);
    }

    fn solve_velocity(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);
        let fixed_rotation = b.inv_i_a + b.inv_i_b == 0.0;

        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let c_dot = s.w_b - s.w_a - self.motor_speed;
            let impulse = -self.motor_mass * c_dot;
            let old = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old;
            s.w_a -= b.inv_i_a * impulse;
            s.w_b += b.inv_i_b * impulse;
        }

        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let c_dot1 = s.relative_velocity(self.r_a, self.r_b);
            let c_dot2 = s.w_b - s.w_a;
            let c_dot = Vec3::new(c_dot1.x, c_dot1.y, c_dot2);
            let mut impulse = -math::solve33(&self.mass, c_dot);

            match self.limit_state {
                LimitState::AtLower if self.impulse.z + impulse.z < 0.0 => {
                    self.clamp_limit_impulse(c_dot1, &mut impulse);
                }
                LimitState::AtUpper if self.impulse.z + impulse.z > 0.0 => {
                    self.clamp_limit_impulse(c_dot1, &mut impulse);
                }
                _ => self.impulse += impulse,
            }

            let p = Vec2::new(impulse.x, impulse.y);
            s.apply_impulse(b, self.r_a, self.r_b, p, impulse.z);
        } else {
            let c_dot = s.relative_velocity(self.r_a, self.r_b);
            let impulse = math::solve22_of33(&self.mass, -c_dot);
            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;
            s.apply_impulse(b, self.r_a, self.r_b, impulse, 0.0);
        }
        s.store_velocities(data, b);
    }

    /// Drops the limit impulse to zero and solves the point constraint alone.
    fn clamp_limit_impulse(&mut self, c_dot1: Vec2, impulse: &mut Vec3) {
        let rhs = -c_dot1 + Vec2::new(self.mass.z_axis.x, self.mass.z_axis.y) * self.impulse.z;
        let reduced = math::solve22_of33(&self.mass, rhs);
        impulse.x = reduced.x;
        impulse.y = reduced.y;
        impulse.z = -self.impulse.z;
        self.impulse.x += reduced.x;
        self.impulse.y += reduced.y;
        self.impulse.z = 0.0;
    }

    fn solve_position(&mut self, data: &mut SolverData<'_>, b: &JointBodies) -> bool {
        let mut s = Pair::load(data, b);
        let step = data.step;
        let fixed_rotation = b.inv_i_a + b.inv_i_b == 0.0;
        let mut angular_error = 0.0;

        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = s.a_b - s.a_a - self.reference_angle;
            let max_correction = step.max_angular_correction;
            let c = match self.limit_state {
                LimitState::Equal => {
                    let c = (angle - self.lower_angle).clamp(-max_correction, max_correction);
                    angular_error = c.abs();
                    c
                }
                LimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    (c + step.angular_slop).clamp(-max_correction, 0.0)
                }
                LimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    (c - step.angular_slop).clamp(0.0, max_correction)
                }
                LimitState::Inactive => 0.0,
            };
            let limit_impulse = -self.motor_mass * c;
            s.a_a -= b.inv_i_a * limit_impulse;
            s.a_b += b.inv_i_b * limit_impulse;
        }

        let (r_a, r_b) = s.arms(b, self.local_anchor_a, self.local_anchor_b);
        let c = s.c_b + r_b - s.c_a - r_a;
        let position_error = c.length();
        let impulse = -math::solve22(point_mass(b, r_a, r_b), c);
        s.apply_correction(b, r_a, r_b, impulse, 0.0);
        s.store_positions(data, b);

        position_error <= step.linear_slop && angular_error <= step.angular_slop
    }
}

impl WeldJoint {
    fn init(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);
        let (r_a, r_b) = s.arms(b, self.local_anchor_a, self.local_anchor_b);
        self.r_a = r_a;
        self.r_b = r_b;

        let k = point_angle_mass(b, r_a, r_b);
        if self.frequency_hz > 0.0 {
            self.mass = math::inverse22_of33(&k);

            let mut inv_m = b.inv_i_a + b.inv_i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };
            let c = s.a_b - s.a_a - self.reference_angle;
            let (gamma, bias_factor) =
                soft_coefficients(m, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;

            inv_m += self.gamma;
            self.mass.z_axis.z = invert(inv_m);
        } else if k.z_axis.z == 0.0 {
            self.mass = math::inverse22_of33(&k);
            self.gamma = 0.0;
            self.bias = 0.0;
        } else {
            self.mass = math::symmetric_inverse33(&k);
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            let p = Vec2::new(self.impulse.x, self.impulse.y);
            s.apply_impulse(b, r_a, r_b, p, self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
        }
        s.store_velocities(data, b);
    }

    fn solve_velocity(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);

        if self.frequency_hz > 0.0 {
            let c_dot2 = s.w_b - s.w_a;
            let impulse2 = -self.mass.z_axis.z * (c_dot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;
            s.w_a -= b.inv_i_a * impulse2;
            s.w_b += b.inv_i_b * impulse2;

            let c_dot1 = s.relative_velocity(self.r_a, self.r_b);
            let impulse1 = -math::mul22_of33(&self.mass, c_dot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;
            s.apply_impulse(b, self.r_a, self.r_b, impulse1, 0.0);
        } else {
            let c_dot1 = s.relative_velocity(self.r_a, self.r_b);
            let c_dot2 = s.w_b - s.w_a;
            let impulse = -(self.mass * Vec3::new(c_dot1.x, c_dot1.y, c_dot2));
            self.impulse += impulse;
            let p = Vec2::new(impulse.x, impulse.y);
            s.apply_impulse(b, self.r_a, self.r_b, p, impulse.z);
        }
        s.store_velocities(data, b);
    }

    fn solve_position(&mut self, data: &mut SolverData<'_>, b: &JointBodies) -> bool {
        let mut s = Pair::load(data, b);
        let (r_a, r_b) = s.arms(b, self.local_anchor_a, self.local_anchor_b);
        let k = point_angle_mass(b, r_a, r_b);

        let c1 = s.c_b + r_b - s.c_a - r_a;
        let position_error = c1.length();
        let angular_error;

        if self.frequency_hz > 0.0 {
            angular_error = 0.0;
            let p = -math::solve22_of33(&k, c1);
            s.apply_correction(b, r_a, r_b, p, 0.0);
        } else {
            let c2 = s.a_b - s.a_a - self.reference_angle;
            angular_error = c2.abs();
            let impulse = if k.z_axis.z > 0.0 {
                -math::solve33(&k, Vec3::new(c1.x, c1.y, c2))
            } else {
                let i2 = -math::solve22_of33(&k, c1);
                Vec3::new(i2.x, i2.y, 0.0)
            };
            let p = Vec2::new(impulse.x, impulse.y);
            s.apply_correction(b, r_a, r_b, p, impulse.z);
        }
        s.store_positions(data, b);

        position_error <= data.step.linear_slop && angular_error <= data.step.angular_slop
    }
}

impl TargetJoint {
    fn init(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let Position { center: c_b, angle } = data.positions[b.index_b];
        let Velocity {
            linear: mut v_b,
            angular: mut w_b,
        } = data.velocities[b.index_b];

        let mass = invert(b.inv_mass_b);
        let (gamma, beta) =
            soft_coefficients(mass, self.frequency_hz, self.damping_ratio, data.step.dt);
        self.gamma = gamma;
        self.beta = beta;

        let q_b = Rot::from_angle(angle);
        self.r_b = q_b.rotate(self.local_anchor_b - b.local_center_b);
        let r_b = self.r_b;

        let (m_b, i_b) = (b.inv_mass_b, b.inv_i_b);
        let k = Mat2::from_cols(
            Vec2::new(
                m_b + i_b * r_b.y * r_b.y + self.gamma,
                -i_b * r_b.x * r_b.y,
            ),
            Vec2::new(
                -i_b * r_b.x * r_b.y,
                m_b + i_b * r_b.x * r_b.x + self.gamma,
            ),
        );
        self.mass = math::inverse22(k);
        self.c = (c_b + r_b - self.target) * self.beta;

        // Cheap rotational damping so a dragged body does not spin up.
        w_b *= 0.98;

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            v_b += self.impulse * m_b;
            w_b += i_b * cross(r_b, self.impulse);
        } else {
            self.impulse = Vec2::ZERO;
        }

        data.velocities[b.index_b] = Velocity {
            linear: v_b,
            angular: w_b,
        };
    }

    fn solve_velocity(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let Velocity {
            linear: mut v_b,
            angular: mut w_b,
        } = data.velocities[b.index_b];

        let c_dot = v_b + cross_sv(w_b, self.r_b);
        let impulse = self.mass * -(c_dot + self.c + self.impulse * self.gamma);

        let old = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.length();
        }
        let impulse = self.impulse - old;

        v_b += impulse * b.inv_mass_b;
        w_b += b.inv_i_b * cross(self.r_b, impulse);
        data.velocities[b.index_b] = Velocity {
            linear: v_b,
            angular: w_b,
        };
    }
}

impl FrictionJoint {
    fn init(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);
        let (r_a, r_b) = s.arms(b, self.local_anchor_a, self.local_anchor_b);
        self.r_a = r_a;
        self.r_b = r_b;

        self.linear_mass = math::inverse22(point_mass(b, r_a, r_b));
        self.angular_mass = invert(b.inv_i_a + b.inv_i_b);

        if data.step.warm_starting {
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;
            s.apply_impulse(b, r_a, r_b, self.linear_impulse, self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }
        s.store_velocities(data, b);
    }

    fn solve_velocity(&mut self, data: &mut SolverData<'_>, b: &JointBodies) {
        let mut s = Pair::load(data, b);
        let h = data.step.dt;

        {
            let c_dot = s.w_b - s.w_a;
            let impulse = -self.angular_mass * c_dot;
            let old = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.angular_impulse - old;
            s.w_a -= b.inv_i_a * impulse;
            s.w_b += b.inv_i_b * impulse;
        }

        {
            let c_dot = s.relative_velocity(self.r_a, self.r_b);
            let impulse = -(self.linear_mass * c_dot);
            let old = self.linear_impulse;
            self.linear_impulse += impulse;
            let max_impulse = h * self.max_force;
            if self.linear_impulse.length_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize_or_zero() * max_impulse;
            }
            let impulse = self.linear_impulse - old;
            s.apply_impulse(b, self.r_a, self.r_b, impulse, 0.0);
        }
        s.store_velocities(data, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::StepConf,
        core::{
            constraints::{DistanceJointDef, JointDef, RevoluteJointDef},
            types::Transform,
        },
        utils::allocator::BodyId,
    };
    use approx::assert_relative_eq;

    fn bodies(inv_mass_b: f32, inv_i_b: f32) -> JointBodies {
        JointBodies {
            index_a: 0,
            index_b: 1,
            local_center_a: Vec2::ZERO,
            local_center_b: Vec2::ZERO,
            inv_mass_a: 0.0,
            inv_mass_b,
            inv_i_a: 0.0,
            inv_i_b,
        }
    }

    fn joint(def: JointDef, b: JointBodies) -> Joint {
        let mut joint = Joint::new(&def, &Transform::IDENTITY).expect("valid joint");
        joint.bodies = b;
        joint
    }

    #[test]
    fn rigid_distance_joint_removes_stretching_velocity() {
        let def = DistanceJointDef::new(BodyId::from_index(0), BodyId::from_index(1), 1.0);
        let mut joint = joint(JointDef::Distance(def), bodies(1.0, 0.0));

        let step = StepConf::default();
        let mut positions = vec![
            Position::default(),
            Position {
                center: Vec2::new(1.0, 0.0),
                angle: 0.0,
            },
        ];
        let mut velocities = vec![
            Velocity::default(),
            Velocity {
                linear: Vec2::new(3.0, 1.0),
                angular: 0.0,
            },
        ];
        let mut data = SolverData {
            step: &step,
            positions: &mut positions,
            velocities: &mut velocities,
        };
        joint.init_velocity_constraints(&mut data);
        joint.solve_velocity_constraints(&mut data);

        let v = data.velocities[1].linear;
        assert_relative_eq!(v.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-5);
        assert!(joint.reaction_force(step.inv_dt()).x < 0.0);
    }

    #[test]
    fn revolute_joint_pulls_anchor_back_together() {
        let def = RevoluteJointDef::new(BodyId::from_index(0), BodyId::from_index(1));
        let mut joint = joint(JointDef::Revolute(def), bodies(1.0, 1.0));

        let step = StepConf::default();
        let mut positions = vec![
            Position::default(),
            Position {
                center: Vec2::new(0.1, -0.05),
                angle: 0.0,
            },
        ];
        let mut velocities = vec![Velocity::default(); 2];
        let mut data = SolverData {
            step: &step,
            positions: &mut positions,
            velocities: &mut velocities,
        };

        joint.init_velocity_constraints(&mut data);
        let mut solved = false;
        for _ in 0..10 {
            if joint.solve_position_constraints(&mut data) {
                solved = true;
                break;
            }
        }
        assert!(solved);
        assert!(data.positions[1].center.length() <= step.linear_slop);
    }

    #[test]
    fn motor_torque_is_capped() {
        let def = RevoluteJointDef::new(BodyId::from_index(0), BodyId::from_index(1))
            .with_motor(10.0, 6.0);
        let mut joint = joint(JointDef::Revolute(def), bodies(1.0, 1.0));

        let step = StepConf::default();
        let mut positions = vec![Position::default(); 2];
        let mut velocities = vec![Velocity::default(); 2];
        let mut data = SolverData {
            step: &step,
            positions: &mut positions,
            velocities: &mut velocities,
        };
        joint.init_velocity_constraints(&mut data);
        joint.solve_velocity_constraints(&mut data);

        // One step may deliver at most dt * max torque of angular impulse.
        assert_relative_eq!(data.velocities[1].angular, step.dt * 6.0, epsilon = 1e-6);
        assert_relative_eq!(
            joint.reaction_torque(step.inv_dt()),
            6.0,
            epsilon = 1e-4
        );
    }
}
