use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{
    collider::Shape,
    types::{MassData, Rot, Sweep, Transform, Velocity},
};
use crate::utils::{
    allocator::{Arena, ContactId, JointId, ShapeId},
    math,
};

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Zero velocity, infinite mass, never moves.
    #[default]
    Static,
    /// Moves under its own velocity only, unaffected by forces or contacts.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Body creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Fast body that must not tunnel through other dynamic bodies.
    pub bullet: bool,
    pub enabled: bool,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            enabled: true,
        }
    }
}

impl BodyDef {
    pub fn dynamic() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            ..Self::default()
        }
    }

    pub fn kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            ..Self::default()
        }
    }

    pub fn static_body() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_velocity(mut self, linear: Vec2, angular: f32) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    pub fn fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub(crate) fn is_valid(&self) -> bool {
        math::is_finite(self.position)
            && self.angle.is_finite()
            && math::is_finite(self.linear_velocity)
            && self.angular_velocity.is_finite()
            && self.linear_damping.is_finite()
            && self.linear_damping >= 0.0
            && self.angular_damping.is_finite()
            && self.angular_damping >= 0.0
            && self.gravity_scale.is_finite()
    }
}

/// Broad-phase registration of one shape child on a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BodyProxy {
    pub shape: ShapeId,
    pub child: usize,
    pub proxy_id: usize,
}

/// Rigid body owned by a world.
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) transform: Transform,
    pub(crate) sweep: Sweep,
    pub(crate) velocity: Velocity,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,

    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,
    pub(crate) sleep_time: f32,

    pub(crate) awake: bool,
    pub(crate) enabled: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) mass_dirty: bool,
    pub(crate) in_island: bool,
    /// Pose already advanced by the current step's regular solve.
    pub(crate) swept: bool,
    /// Position inside the island currently being solved.
    pub(crate) island_index: usize,

    pub(crate) shapes: Vec<ShapeId>,
    pub(crate) proxies: Vec<BodyProxy>,
    pub(crate) contacts: Vec<ContactId>,
    pub(crate) joints: Vec<JointId>,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let transform = Transform::new(def.position, def.angle);
        let dynamic = def.body_type == BodyType::Dynamic;
        let moving = def.body_type != BodyType::Static;
        Self {
            body_type: def.body_type,
            transform,
            sweep: Sweep {
                local_center: Vec2::ZERO,
                c0: def.position,
                c: def.position,
                a0: def.angle,
                a: def.angle,
                alpha0: 0.0,
            },
            velocity: if moving {
                Velocity {
                    linear: def.linear_velocity,
                    angular: def.angular_velocity,
                }
            } else {
                Velocity::default()
            },
            force: Vec2::ZERO,
            torque: 0.0,
            mass: if dynamic { 1.0 } else { 0.0 },
            inv_mass: if dynamic { 1.0 } else { 0.0 },
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            awake: def.awake && moving,
            enabled: def.enabled,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            allow_sleep: def.allow_sleep,
            mass_dirty: dynamic,
            in_island: false,
            swept: false,
            island_index: 0,
            shapes: Vec::new(),
            proxies: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Static bodies never move; kinematic and dynamic bodies do.
    pub fn is_speedable(&self) -> bool {
        self.body_type != BodyType::Static
    }

    /// Only dynamic bodies respond to forces and impulses.
    pub fn is_accelerable(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Bodies that must not tunnel through anything: bullets and non-dynamic bodies.
    pub fn is_impenetrable(&self) -> bool {
        self.bullet || self.body_type != BodyType::Dynamic
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn position(&self) -> Vec2 {
        self.transform.position
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.velocity.linear
    }

    pub fn angular_velocity(&self) -> f32 {
        self.velocity.angular
    }

    /// Velocity of a world point attached to this body.
    pub fn linear_velocity_at(&self, world_point: Vec2) -> Vec2 {
        self.velocity.linear + math::cross_sv(self.velocity.angular, world_point - self.sweep.c)
    }

    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn torque(&self) -> f32 {
        self.torque
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f32 {
        self.inertia + self.mass * self.sweep.local_center.length_squared()
    }

    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass,
            center: self.sweep.local_center,
            inertia: self.inertia(),
        }
    }

    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    pub fn sleep_time(&self) -> f32 {
        self.sleep_time
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.allow_sleep
    }

    /// Whether mass data is waiting to be recomputed from the attached shapes.
    pub fn is_mass_data_dirty(&self) -> bool {
        self.mass_dirty
    }

    pub fn shapes(&self) -> &[ShapeId] {
        &self.shapes
    }

    pub fn contacts(&self) -> &[ContactId] {
        &self.contacts
    }

    pub fn joints(&self) -> &[JointId] {
        &self.joints
    }

    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.transform.apply(local_point)
    }

    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.transform.apply_inverse(world_point)
    }

    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.transform.rotation.rotate(local_vector)
    }

    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.transform.rotation.inv_rotate(world_vector)
    }

    pub(crate) fn set_awake_flag(&mut self, awake: bool) {
        if awake {
            if !self.awake && self.is_speedable() {
                self.awake = true;
                self.sleep_time = 0.0;
            }
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.velocity = Velocity::default();
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    /// Rebuilds the transform from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        let rotation = Rot::from_angle(self.sweep.a);
        self.transform = Transform {
            position: self.sweep.c - rotation.rotate(self.sweep.local_center),
            rotation,
        };
    }

    /// Rewinds the body to fraction `alpha` of its sweep.
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    pub(crate) fn set_transform_internal(&mut self, position: Vec2, angle: f32) {
        self.transform = Transform::new(position, angle);
        self.sweep.c = self.transform.apply(self.sweep.local_center);
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }

    pub(crate) fn set_velocity_internal(&mut self, velocity: Velocity) {
        if self.is_speedable() {
            self.velocity = velocity;
        }
    }

    /// Recomputes mass, center and inertia from the attached shapes.
    ///
    /// A dynamic body without mass gets unit mass so it still responds to gravity.
    pub(crate) fn reset_mass_data(&mut self, shapes: &Arena<ShapeId, Shape>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.sweep.local_center = Vec2::ZERO;
        self.mass_dirty = false;

        if !self.is_dynamic() {
            self.sweep.c0 = self.transform.position;
            self.sweep.c = self.transform.position;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = Vec2::ZERO;
        let mut rot_inertia = 0.0;
        for shape in self.shapes.iter().filter_map(|id| shapes.get(*id)) {
            if shape.density() == 0.0 {
                continue;
            }
            let md = shape.compute_mass();
            self.mass += md.mass;
            local_center += md.center * md.mass;
            rot_inertia += md.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        self.apply_mass_center(local_center, rot_inertia);
    }

    /// Overrides the computed mass properties. No-op for non-dynamic bodies.
    pub(crate) fn set_mass_data(&mut self, data: &MassData) {
        if !self.is_dynamic() {
            return;
        }
        self.mass = if data.mass > 0.0 { data.mass } else { 1.0 };
        self.inv_mass = 1.0 / self.mass;
        self.mass_dirty = false;
        self.apply_mass_center(data.center, data.inertia);
    }

    fn apply_mass_center(&mut self, local_center: Vec2, origin_inertia: f32) {
        if origin_inertia > 0.0 && !self.fixed_rotation {
            self.inertia = origin_inertia - self.mass * local_center.length_squared();
            self.inv_inertia = if self.inertia > 0.0 {
                1.0 / self.inertia
            } else {
                0.0
            };
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        // Keep the origin fixed; the center of mass may move.
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.transform.apply(local_center);
        self.sweep.c0 = self.sweep.c;

        self.velocity.linear += math::cross_sv(self.velocity.angular, self.sweep.c - old_center);
    }
}
