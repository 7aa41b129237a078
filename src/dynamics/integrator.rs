use glam::Vec2;

use crate::{
    config::StepConf,
    core::{
        rigidbody::Body,
        types::{Position, Velocity},
    },
};

/// Semi-implicit Euler integrator for island-local body state.
///
/// Velocities are updated first from gravity, forces and damping; positions
/// then move with the solved velocities.
#[derive(Debug, Clone, Copy)]
pub struct Integrator {
    pub gravity: Vec2,
    pub dt: f32,
    max_translation: f32,
    max_rotation: f32,
}

impl Integrator {
    pub fn new(gravity: Vec2, step: &StepConf) -> Self {
        Self {
            gravity,
            dt: step.dt,
            max_translation: step.max_translation,
            max_rotation: step.max_rotation,
        }
    }

    /// Applies gravity, accumulated force/torque and damping. Only dynamic
    /// bodies accelerate; other bodies keep their velocity.
    pub fn integrate_velocity(&self, body: &Body, velocity: Velocity) -> Velocity {
        if !body.is_accelerable() {
            return velocity;
        }

        let h = self.dt;
        let mut v = velocity.linear
            + (self.gravity * body.gravity_scale() + body.force() * body.inv_mass()) * h;
        let mut w = velocity.angular + h * body.inv_inertia * body.torque();

        // Pade approximation of exp(-h * c), stable for any damping.
        v *= 1.0 / (1.0 + h * body.linear_damping());
        w *= 1.0 / (1.0 + h * body.angular_damping());

        Velocity {
            linear: v,
            angular: w,
        }
    }

    /// Moves a position by `velocity`, first scaling the velocity down so a
    /// single step never exceeds the translation and rotation caps.
    pub fn integrate_position(&self, position: Position, velocity: &mut Velocity) -> Position {
        let h = self.dt;

        let translation = velocity.linear * h;
        if translation.length_squared() > self.max_translation * self.max_translation {
            velocity.linear *= self.max_translation / translation.length();
        }

        let rotation = velocity.angular * h;
        if rotation * rotation > self.max_rotation * self.max_rotation {
            velocity.angular *= self.max_rotation / rotation.abs();
        }

        Position {
            center: position.center + velocity.linear * h,
            angle: position.angle + velocity.angular * h,
        }
    }
}
