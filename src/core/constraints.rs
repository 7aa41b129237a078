use glam::{Mat2, Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::types::Transform;
use crate::{
    error::{PhysicsError, PhysicsResult},
    utils::{allocator::BodyId, math},
};

/// Joint creation parameters; the variant selects the joint kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Rope(RopeJointDef),
    Revolute(RevoluteJointDef),
    Weld(WeldJointDef),
    Target(TargetJointDef),
    Friction(FrictionJointDef),
}

/// Keeps two anchor points at a fixed distance, optionally as a soft spring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub length: f32,
    /// Spring frequency in hertz; zero makes the joint rigid.
    pub frequency_hz: f32,
    pub damping_ratio: f32,
    pub collide_connected: bool,
}

impl DistanceJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, length: f32) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_anchors(mut self, local_a: Vec2, local_b: Vec2) -> Self {
        self.local_anchor_a = local_a;
        self.local_anchor_b = local_b;
        self
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

/// One-sided distance limit: the anchors may get closer but not farther than `max_length`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RopeJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub max_length: f32,
    pub collide_connected: bool,
}

impl RopeJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, max_length: f32) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_length,
            collide_connected: false,
        }
    }

    pub fn with_anchors(mut self, local_a: Vec2, local_b: Vec2) -> Self {
        self.local_anchor_a = local_a;
        self.local_anchor_b = local_b;
        self
    }
}

/// Shared point with free relative rotation, optional angle limit and motor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevoluteJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Angle of B relative to A when the joint angle is zero.
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_torque: f32,
    pub collide_connected: bool,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_anchors(mut self, local_a: Vec2, local_b: Vec2) -> Self {
        self.local_anchor_a = local_a;
        self.local_anchor_b = local_b;
        self
    }

    pub fn with_limit(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }
}

/// Glues two bodies together; the angular part can be softened with a spring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeldJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f32,
    pub frequency_hz: f32,
    pub damping_ratio: f32,
    pub collide_connected: bool,
}

impl WeldJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_anchors(mut self, local_a: Vec2, local_b: Vec2) -> Self {
        self.local_anchor_a = local_a;
        self.local_anchor_b = local_b;
        self
    }

    pub fn with_reference_angle(mut self, angle: f32) -> Self {
        self.reference_angle = angle;
        self
    }
}

/// Pulls a point of body B toward a world target with a soft, force-limited spring.
///
/// Body A only serves as the reference the joint is attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Initial target; the grabbed point on B is taken from here.
    pub target: Vec2,
    pub max_force: f32,
    pub frequency_hz: f32,
    pub damping_ratio: f32,
    pub collide_connected: bool,
}

impl TargetJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, target: Vec2, max_force: f32) -> Self {
        Self {
            body_a,
            body_b,
            target,
            max_force,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
            collide_connected: false,
        }
    }
}

/// Top-down friction: resists relative linear and angular motion up to a limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrictionJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub max_force: f32,
    pub max_torque: f32,
    pub collide_connected: bool,
}

impl FrictionJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, max_force: f32, max_torque: f32) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_force,
            max_torque,
            collide_connected: false,
        }
    }
}

impl JointDef {
    pub fn body_a(&self) -> BodyId {
        self.bodies().0
    }

    pub fn body_b(&self) -> BodyId {
        self.bodies().1
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        match self {
            JointDef::Distance(d) => (d.body_a, d.body_b),
            JointDef::Rope(d) => (d.body_a, d.body_b),
            JointDef::Revolute(d) => (d.body_a, d.body_b),
            JointDef::Weld(d) => (d.body_a, d.body_b),
            JointDef::Target(d) => (d.body_a, d.body_b),
            JointDef::Friction(d) => (d.body_a, d.body_b),
        }
    }

    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Distance(d) => d.collide_connected,
            JointDef::Rope(d) => d.collide_connected,
            JointDef::Revolute(d) => d.collide_connected,
            JointDef::Weld(d) => d.collide_connected,
            JointDef::Target(d) => d.collide_connected,
            JointDef::Friction(d) => d.collide_connected,
        }
    }

    /// Checks body distinctness and that every parameter is finite and in range.
    pub fn validate(&self) -> PhysicsResult<()> {
        let (a, b) = self.bodies();
        if a == b {
            return Err(PhysicsError::InvalidArgument(
                "joint must connect two different bodies".into(),
            ));
        }

        let invalid = |what: &str| Err(PhysicsError::InvalidArgument(format!("invalid {what}")));
        let finite2 = |v: Vec2| math::is_finite(v);
        let non_negative = |x: f32| x.is_finite() && x >= 0.0;

        match self {
            JointDef::Distance(d) => {
                if !finite2(d.local_anchor_a) || !finite2(d.local_anchor_b) {
                    return invalid("distance joint anchor");
                }
                if !non_negative(d.length) {
                    return invalid("distance joint length");
                }
                if !non_negative(d.frequency_hz) || !non_negative(d.damping_ratio) {
                    return invalid("distance joint spring");
                }
            }
            JointDef::Rope(d) => {
                if !finite2(d.local_anchor_a) || !finite2(d.local_anchor_b) {
                    return invalid("rope joint anchor");
                }
                if !non_negative(d.max_length) {
                    return invalid("rope joint max length");
                }
            }
            JointDef::Revolute(d) => {
                if !finite2(d.local_anchor_a) || !finite2(d.local_anchor_b) {
                    return invalid("revolute joint anchor");
                }
                if !d.reference_angle.is_finite()
                    || !d.lower_angle.is_finite()
                    || !d.upper_angle.is_finite()
                    || d.lower_angle > d.upper_angle
                {
                    return invalid("revolute joint angle limits");
                }
                if !d.motor_speed.is_finite() || !non_negative(d.max_motor_torque) {
                    return invalid("revolute joint motor");
                }
            }
            JointDef::Weld(d) => {
                if !finite2(d.local_anchor_a) || !finite2(d.local_anchor_b) {
                    return invalid("weld joint anchor");
                }
                if !d.reference_angle.is_finite()
                    || !non_negative(d.frequency_hz)
                    || !non_negative(d.damping_ratio)
                {
                    return invalid("weld joint parameters");
                }
            }
            JointDef::Target(d) => {
                if !finite2(d.target) {
                    return invalid("target joint target");
                }
                if !non_negative(d.max_force)
                    || !non_negative(d.frequency_hz)
                    || !non_negative(d.damping_ratio)
                {
                    return invalid("target joint parameters");
                }
            }
            JointDef::Friction(d) => {
                if !finite2(d.local_anchor_a) || !finite2(d.local_anchor_b) {
                    return invalid("friction joint anchor");
                }
                if !non_negative(d.max_force) || !non_negative(d.max_torque) {
                    return invalid("friction joint limits");
                }
            }
        }
        Ok(())
    }
}

/// State of a one-sided or two-sided limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    Equal,
}

/// Island-local body data copied in at velocity initialization.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JointBodies {
    pub index_a: usize,
    pub index_b: usize,
    pub local_center_a: Vec2,
    pub local_center_b: Vec2,
    pub inv_mass_a: f32,
    pub inv_mass_b: f32,
    pub inv_i_a: f32,
    pub inv_i_b: f32,
}

#[derive(Debug, Clone, Default)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) length: f32,
    pub(crate) frequency_hz: f32,
    pub(crate) damping_ratio: f32,
    pub(crate) impulse: f32,
    pub(crate) gamma: f32,
    pub(crate) bias: f32,
    pub(crate) u: Vec2,
    pub(crate) r_a: Vec2,
    pub(crate) r_b: Vec2,
    pub(crate) mass: f32,
}

#[derive(Debug, Clone, Default)]
pub struct RopeJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) max_length: f32,
    pub(crate) length: f32,
    pub(crate) impulse: f32,
    pub(crate) u: Vec2,
    pub(crate) r_a: Vec2,
    pub(crate) r_b: Vec2,
    pub(crate) mass: f32,
    pub(crate) state: LimitState,
}

#[derive(Debug, Clone, Default)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f32,
    pub(crate) enable_limit: bool,
    pub(crate) lower_angle: f32,
    pub(crate) upper_angle: f32,
    pub(crate) enable_motor: bool,
    pub(crate) motor_speed: f32,
    pub(crate) max_motor_torque: f32,
    /// Point impulse in x/y, limit impulse in z.
    pub(crate) impulse: Vec3,
    pub(crate) motor_impulse: f32,
    pub(crate) r_a: Vec2,
    pub(crate) r_b: Vec2,
    pub(crate) mass: Mat3,
    pub(crate) motor_mass: f32,
    pub(crate) limit_state: LimitState,
}

#[derive(Debug, Clone, Default)]
pub struct WeldJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f32,
    pub(crate) frequency_hz: f32,
    pub(crate) damping_ratio: f32,
    pub(crate) bias: f32,
    pub(crate) gamma: f32,
    pub(crate) impulse: Vec3,
    pub(crate) r_a: Vec2,
    pub(crate) r_b: Vec2,
    pub(crate) mass: Mat3,
}

#[derive(Debug, Clone, Default)]
pub struct TargetJoint {
    pub(crate) local_anchor_b: Vec2,
    pub(crate) target: Vec2,
    pub(crate) max_force: f32,
    pub(crate) frequency_hz: f32,
    pub(crate) damping_ratio: f32,
    pub(crate) impulse: Vec2,
    pub(crate) beta: f32,
    pub(crate) gamma: f32,
    pub(crate) r_b: Vec2,
    pub(crate) c: Vec2,
    pub(crate) mass: Mat2,
}

#[derive(Debug, Clone, Default)]
pub struct FrictionJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) max_force: f32,
    pub(crate) max_torque: f32,
    pub(crate) linear_impulse: Vec2,
    pub(crate) angular_impulse: f32,
    pub(crate) r_a: Vec2,
    pub(crate) r_b: Vec2,
    pub(crate) linear_mass: Mat2,
    pub(crate) angular_mass: f32,
}

/// Closed set of joint kinds with their parameters and solver state.
#[derive(Debug, Clone)]
pub enum JointKind {
    Distance(DistanceJoint),
    Rope(RopeJoint),
    Revolute(RevoluteJoint),
    Weld(WeldJoint),
    Target(TargetJoint),
    Friction(FrictionJoint),
}

/// Constraint between two bodies owned by a world.
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,
    pub(crate) in_island: bool,
    pub(crate) bodies: JointBodies,
    pub(crate) kind: JointKind,
}

impl Joint {
    /// Builds a joint from a validated definition.
    ///
    /// `xf_b` is body B's current transform, used to pin the grabbed point of
    /// target joints.
    pub(crate) fn new(def: &JointDef, xf_b: &Transform) -> PhysicsResult<Self> {
        def.validate()?;
        let kind = match def {
            JointDef::Distance(d) => JointKind::Distance(DistanceJoint {
                local_anchor_a: d.local_anchor_a,
                local_anchor_b: d.local_anchor_b,
                length: d.length,
                frequency_hz: d.frequency_hz,
                damping_ratio: d.damping_ratio,
                ..Default::default()
            }),
            JointDef::Rope(d) => JointKind::Rope(RopeJoint {
                local_anchor_a: d.local_anchor_a,
                local_anchor_b: d.local_anchor_b,
                max_length: d.max_length,
                ..Default::default()
            }),
            JointDef::Revolute(d) => JointKind::Revolute(RevoluteJoint {
                local_anchor_a: d.local_anchor_a,
                local_anchor_b: d.local_anchor_b,
                reference_angle: d.reference_angle,
                enable_limit: d.enable_limit,
                lower_angle: d.lower_angle,
                upper_angle: d.upper_angle,
                enable_motor: d.enable_motor,
                motor_speed: d.motor_speed,
                max_motor_torque: d.max_motor_torque,
                ..Default::default()
            }),
            JointDef::Weld(d) => JointKind::Weld(WeldJoint {
                local_anchor_a: d.local_anchor_a,
                local_anchor_b: d.local_anchor_b,
                reference_angle: d.reference_angle,
                frequency_hz: d.frequency_hz,
                damping_ratio: d.damping_ratio,
                ..Default::default()
            }),
            JointDef::Target(d) => JointKind::Target(TargetJoint {
                local_anchor_b: xf_b.apply_inverse(d.target),
                target: d.target,
                max_force: d.max_force,
                frequency_hz: d.frequency_hz,
                damping_ratio: d.damping_ratio,
                ..Default::default()
            }),
            JointDef::Friction(d) => JointKind::Friction(FrictionJoint {
                local_anchor_a: d.local_anchor_a,
                local_anchor_b: d.local_anchor_b,
                max_force: d.max_force,
                max_torque: d.max_torque,
                ..Default::default()
            }),
        };

        Ok(Self {
            body_a: def.body_a(),
            body_b: def.body_b(),
            collide_connected: def.collide_connected(),
            in_island: false,
            bodies: JointBodies::default(),
            kind,
        })
    }

    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    /// Returns the body on the other end, or `None` if `body` is not attached.
    pub fn other_body(&self, body: BodyId) -> Option<BodyId> {
        if body == self.body_a {
            Some(self.body_b)
        } else if body == self.body_b {
            Some(self.body_a)
        } else {
            None
        }
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Anchor on body A in A's frame. Target joints anchor to the world target instead.
    pub fn local_anchor_a(&self) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => j.local_anchor_a,
            JointKind::Rope(j) => j.local_anchor_a,
            JointKind::Revolute(j) => j.local_anchor_a,
            JointKind::Weld(j) => j.local_anchor_a,
            JointKind::Target(_) => Vec2::ZERO,
            JointKind::Friction(j) => j.local_anchor_a,
        }
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => j.local_anchor_b,
            JointKind::Rope(j) => j.local_anchor_b,
            JointKind::Revolute(j) => j.local_anchor_b,
            JointKind::Weld(j) => j.local_anchor_b,
            JointKind::Target(j) => j.local_anchor_b,
            JointKind::Friction(j) => j.local_anchor_b,
        }
    }

    /// Constraint force on body B at its anchor, from the last solve.
    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => j.u * (j.impulse * inv_dt),
            JointKind::Rope(j) => j.u * (j.impulse * inv_dt),
            JointKind::Revolute(j) => Vec2::new(j.impulse.x, j.impulse.y) * inv_dt,
            JointKind::Weld(j) => Vec2::new(j.impulse.x, j.impulse.y) * inv_dt,
            JointKind::Target(j) => j.impulse * inv_dt,
            JointKind::Friction(j) => j.linear_impulse * inv_dt,
        }
    }

    /// Constraint torque on body B, from the last solve.
    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        match &self.kind {
            JointKind::Distance(_) | JointKind::Rope(_) | JointKind::Target(_) => 0.0,
            JointKind::Revolute(j) => (j.impulse.z + j.motor_impulse) * inv_dt,
            JointKind::Weld(j) => j.impulse.z * inv_dt,
            JointKind::Friction(j) => j.angular_impulse * inv_dt,
        }
    }

    /// Moves the target of a target joint. No-op for other kinds.
    pub(crate) fn set_target(&mut self, target: Vec2) {
        if let JointKind::Target(j) = &mut self.kind {
            j.target = target;
        }
    }

    /// Updates the motor of a revolute joint. No-op for other kinds.
    pub(crate) fn set_motor(&mut self, enabled: bool, speed: f32, max_torque: f32) {
        if let JointKind::Revolute(j) = &mut self.kind {
            j.enable_motor = enabled;
            j.motor_speed = speed;
            j.max_motor_torque = max_torque;
        }
    }

    pub(crate) fn set_limit(&mut self, enabled: bool, lower: f32, upper: f32) {
        if let JointKind::Revolute(j) = &mut self.kind {
            if enabled != j.enable_limit {
                j.impulse.z = 0.0;
            }
            j.enable_limit = enabled;
            j.lower_angle = lower;
            j.upper_angle = upper;
        }
    }
}
