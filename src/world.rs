//! The simulation container: owns every body, shape, joint and contact and
//! advances them with [`PhysicsWorld::step`].

pub mod collision_manager;
pub mod listener;
mod solve;
pub mod stats;

use std::{sync::Arc, time::Instant};

use glam::Vec2;

pub use collision_manager::ProxyData;
pub use listener::{
    ContactEvent, ContactEventLog, ContactListener, DestructionListener, DestructionLog,
};
pub use stats::{PreStepStats, RegStepStats, StepStats, ToiStepStats};

use self::collision_manager::CollisionManager;
use crate::{
    collision::{
        aabb::Aabb,
        contact::{Contact, WorldManifold},
        queries::{ProxyHit, RayCastAction, RayCastInput, RayHit},
    },
    config::{StepConf, WorldConf},
    core::{
        collider::{Shape, ShapeDef},
        constraints::{Joint, JointDef, JointKind},
        rigidbody::{Body, BodyDef, BodyProxy, BodyType},
        types::{mix_friction, mix_restitution, Filter, MassData, Velocity},
    },
    dynamics::island::Island,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::{Arena, BodyId, ContactId, JointId, ShapeId},
        logging::ScopedTimer,
        math,
        profiling::{PhaseTimer, StepProfile},
    },
};

/// What the world is doing right now. Topology changes are only accepted in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorldPhase {
    #[default]
    Idle,
    /// Inside [`PhysicsWorld::step`], including listener callbacks.
    Stepping,
    /// Tearing down contacts of a body or shape being removed.
    Destroying,
}

/// Central simulation container orchestrating all subsystems.
pub struct PhysicsWorld {
    pub(crate) bodies: Arena<BodyId, Body>,
    pub(crate) shapes: Arena<ShapeId, Shape>,
    pub(crate) joints: Arena<JointId, Joint>,
    pub(crate) collision: CollisionManager,
    pub(crate) island: Island,
    pub(crate) gravity: Vec2,
    pub(crate) step_conf: StepConf,
    pub(crate) phase: WorldPhase,
    pub(crate) step_complete: bool,
    pub(crate) parallel_enabled: bool,
    pub(crate) contact_listener: Option<Arc<dyn ContactListener>>,
    destruction_listener: Option<Arc<dyn DestructionListener>>,
    conf: WorldConf,
    new_shapes: bool,
    inv_dt0: f32,
    profile: StepProfile,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(WorldConf::default())
    }
}

impl PhysicsWorld {
    pub fn new(conf: WorldConf) -> Self {
        Self {
            bodies: Arena::new(),
            shapes: Arena::new(),
            joints: Arena::new(),
            collision: CollisionManager::new(conf.aabb_extension, conf.max_contacts),
            island: Island::new(),
            gravity: conf.gravity,
            step_conf: conf.step,
            phase: WorldPhase::Idle,
            step_complete: true,
            parallel_enabled: cfg!(feature = "parallel"),
            contact_listener: None,
            destruction_listener: None,
            conf,
            new_shapes: false,
            inv_dt0: 0.0,
            profile: StepProfile::default(),
        }
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    pub fn phase(&self) -> WorldPhase {
        self.phase
    }

    pub fn is_locked(&self) -> bool {
        self.phase != WorldPhase::Idle
    }

    /// False while sub-stepping left continuous collision work for the next step.
    pub fn is_step_complete(&self) -> bool {
        self.step_complete
    }

    /// Template the per-call dt and iteration counts are applied to.
    pub fn step_conf(&self) -> &StepConf {
        &self.step_conf
    }

    pub fn set_step_conf(&mut self, conf: StepConf) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        self.step_conf = conf;
        Ok(())
    }

    /// Toggles rayon for narrow-phase evaluation. Has no effect without the
    /// `parallel` feature.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled && cfg!(feature = "parallel");
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    pub fn set_contact_listener(&mut self, listener: Arc<dyn ContactListener>) {
        self.contact_listener = Some(listener);
    }

    pub fn clear_contact_listener(&mut self) {
        self.contact_listener = None;
    }

    pub fn set_destruction_listener(&mut self, listener: Arc<dyn DestructionListener>) {
        self.destruction_listener = Some(listener);
    }

    /// Timing of the most recent step.
    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    fn ensure_unlocked(&self) -> PhysicsResult<()> {
        if self.is_locked() {
            return Err(PhysicsError::WorldLocked);
        }
        Ok(())
    }

    // ---------------------------------------------------------------- bodies

    pub fn create_body(&mut self, def: &BodyDef) -> PhysicsResult<BodyId> {
        self.ensure_unlocked()?;
        if !def.is_valid() {
            return Err(PhysicsError::InvalidArgument(
                "body definition has non-finite or negative values".into(),
            ));
        }
        if self.bodies.len() >= self.conf.max_bodies {
            return Err(PhysicsError::CapacityExceeded {
                kind: "body",
                limit: self.conf.max_bodies,
            });
        }

        let mut body = Body::new(def);
        body.reset_mass_data(&self.shapes);
        let id = self.bodies.insert(body);
        log::debug!("created {:?} body {id:?}", def.body_type);
        Ok(id)
    }

    /// Destroys a body with its joints, contacts and proxies. Attached shapes
    /// are detached but stay alive.
    pub fn destroy_body(&mut self, id: BodyId) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        let joints = self.body(id)?.joints.clone();

        for joint_id in joints {
            if let Some(joint) = self.remove_joint(joint_id) {
                if let Some(listener) = &self.destruction_listener {
                    listener.joint_destroyed(joint_id, &joint);
                }
            }
        }
        self.destroy_body_contacts(id, None);
        self.destroy_proxies(id);

        if let Some(body) = self.bodies.remove(id) {
            for shape_id in body.shapes {
                if let Some(shape) = self.shapes.get_mut(shape_id) {
                    shape.bodies.retain(|b| *b != id);
                }
            }
        }
        log::debug!("destroyed body {id:?}");
        Ok(())
    }

    pub fn body(&self, id: BodyId) -> PhysicsResult<&Body> {
        self.bodies
            .get(id)
            .ok_or_else(|| PhysicsError::invalid_handle(id))
    }

    fn body_mut(&mut self, id: BodyId) -> PhysicsResult<&mut Body> {
        self.bodies
            .get_mut(id)
            .ok_or_else(|| PhysicsError::invalid_handle(id))
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> + '_ {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleports a body. Contacts are re-evaluated on the next step.
    pub fn set_transform(&mut self, id: BodyId, position: Vec2, angle: f32) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        if !math::is_finite(position) || !angle.is_finite() {
            return Err(PhysicsError::InvalidArgument(
                "transform must be finite".into(),
            ));
        }
        self.body_mut(id)?.set_transform_internal(position, angle);
        self.synchronize_body(id);
        self.new_shapes = true;
        Ok(())
    }

    /// Sets linear and angular velocity. Ignored for static bodies; wakes the
    /// body when the velocity is non-zero.
    pub fn set_velocity(&mut self, id: BodyId, linear: Vec2, angular: f32) -> PhysicsResult<()> {
        if !math::is_finite(linear) || !angular.is_finite() {
            return Err(PhysicsError::InvalidArgument(
                "velocity must be finite".into(),
            ));
        }
        let body = self.body_mut(id)?;
        if !body.is_speedable() {
            return Ok(());
        }
        if linear != Vec2::ZERO || angular != 0.0 {
            body.set_awake_flag(true);
        }
        body.set_velocity_internal(Velocity { linear, angular });
        Ok(())
    }

    /// Applies a force at a world point, accumulated until the end of the next step.
    pub fn apply_force(
        &mut self,
        id: BodyId,
        force: Vec2,
        point: Vec2,
        wake: bool,
    ) -> PhysicsResult<()> {
        let body = self.accelerable(id, wake)?;
        if let Some(body) = body {
            body.force += force;
            body.torque += math::cross(point - body.sweep.c, force);
        }
        Ok(())
    }

    pub fn apply_force_to_center(&mut self, id: BodyId, force: Vec2, wake: bool) -> PhysicsResult<()> {
        if let Some(body) = self.accelerable(id, wake)? {
            body.force += force;
        }
        Ok(())
    }

    pub fn apply_torque(&mut self, id: BodyId, torque: f32, wake: bool) -> PhysicsResult<()> {
        if let Some(body) = self.accelerable(id, wake)? {
            body.torque += torque;
        }
        Ok(())
    }

    /// Applies an impulse at a world point, changing velocity immediately.
    pub fn apply_linear_impulse(
        &mut self,
        id: BodyId,
        impulse: Vec2,
        point: Vec2,
        wake: bool,
    ) -> PhysicsResult<()> {
        if let Some(body) = self.accelerable(id, wake)? {
            body.velocity.linear += impulse * body.inv_mass;
            body.velocity.angular += body.inv_inertia * math::cross(point - body.sweep.c, impulse);
        }
        Ok(())
    }

    pub fn apply_angular_impulse(&mut self, id: BodyId, impulse: f32, wake: bool) -> PhysicsResult<()> {
        if let Some(body) = self.accelerable(id, wake)? {
            body.velocity.angular += body.inv_inertia * impulse;
        }
        Ok(())
    }

    /// Awake dynamic body, waking it first when asked. `None` when forces
    /// would be ignored.
    fn accelerable(&mut self, id: BodyId, wake: bool) -> PhysicsResult<Option<&mut Body>> {
        let body = self.body_mut(id)?;
        if !body.is_accelerable() {
            return Ok(None);
        }
        if wake {
            body.set_awake_flag(true);
        }
        Ok(body.awake.then_some(body))
    }

    pub fn set_awake(&mut self, id: BodyId, awake: bool) -> PhysicsResult<()> {
        self.body_mut(id)?.set_awake_flag(awake);
        Ok(())
    }

    pub fn set_sleeping_allowed(&mut self, id: BodyId, allowed: bool) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        body.allow_sleep = allowed;
        if !allowed {
            body.set_awake_flag(true);
        }
        Ok(())
    }

    pub fn set_bullet(&mut self, id: BodyId, bullet: bool) -> PhysicsResult<()> {
        self.body_mut(id)?.bullet = bullet;
        Ok(())
    }

    /// Disabled bodies keep their state but have no proxies, contacts or
    /// island membership.
    pub fn set_enabled(&mut self, id: BodyId, enabled: bool) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        let body = self.body_mut(id)?;
        if body.enabled == enabled {
            return Ok(());
        }
        body.enabled = enabled;
        if enabled {
            self.create_proxies(id);
            self.new_shapes = true;
        } else {
            self.destroy_body_contacts(id, None);
            self.destroy_proxies(id);
        }
        Ok(())
    }

    /// Changes the body type, dropping its contacts so they are rebuilt with
    /// the new rules.
    pub fn set_type(&mut self, id: BodyId, body_type: BodyType) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        let body = self.bodies.get_mut(id).ok_or_else(|| PhysicsError::invalid_handle(id))?;
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        body.reset_mass_data(&self.shapes);

        if body_type == BodyType::Static {
            body.velocity = Velocity::default();
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            body.awake = false;
            self.synchronize_body(id);
        }
        if let Some(body) = self.bodies.get_mut(id) {
            body.set_awake_flag(true);
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }

        self.destroy_body_contacts(id, None);
        if let Some(body) = self.bodies.get(id) {
            for proxy in &body.proxies {
                self.collision.broad_phase.touch_proxy(proxy.proxy_id);
            }
        }
        self.new_shapes = true;
        Ok(())
    }

    pub fn set_fixed_rotation(&mut self, id: BodyId, fixed: bool) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(id).ok_or_else(|| PhysicsError::invalid_handle(id))?;
        if body.fixed_rotation == fixed {
            return Ok(());
        }
        body.fixed_rotation = fixed;
        body.velocity.angular = 0.0;
        body.reset_mass_data(&self.shapes);
        Ok(())
    }

    /// Overrides mass, center and inertia computed from the shapes.
    pub fn set_mass_data(&mut self, id: BodyId, data: &MassData) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        if !data.mass.is_finite() || !data.inertia.is_finite() || !math::is_finite(data.center) {
            return Err(PhysicsError::InvalidArgument(
                "mass data must be finite".into(),
            ));
        }
        self.body_mut(id)?.set_mass_data(data);
        Ok(())
    }

    /// Recomputes mass properties from the attached shapes.
    pub fn reset_mass_data(&mut self, id: BodyId) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        let body = self.bodies.get_mut(id).ok_or_else(|| PhysicsError::invalid_handle(id))?;
        body.reset_mass_data(&self.shapes);
        Ok(())
    }

    // ---------------------------------------------------------------- shapes

    pub fn create_shape(&mut self, def: ShapeDef) -> PhysicsResult<ShapeId> {
        self.ensure_unlocked()?;
        if self.shapes.len() >= self.conf.max_shapes {
            return Err(PhysicsError::CapacityExceeded {
                kind: "shape",
                limit: self.conf.max_shapes,
            });
        }
        let shape = Shape::new(def)?;
        Ok(self.shapes.insert(shape))
    }

    /// Creates a shape and attaches it to `body` in one go.
    pub fn add_shape(&mut self, body: BodyId, def: ShapeDef) -> PhysicsResult<ShapeId> {
        self.body(body)?;
        let shape = self.create_shape(def)?;
        self.attach_shape(body, shape)?;
        Ok(shape)
    }

    /// Detaches the shape from every body, then drops it.
    pub fn destroy_shape(&mut self, id: ShapeId) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        let bodies = self.shape(id)?.bodies.clone();
        for body in bodies {
            self.detach_internal(body, id);
        }
        self.shapes.remove(id);
        Ok(())
    }

    pub fn shape(&self, id: ShapeId) -> PhysicsResult<&Shape> {
        self.shapes
            .get(id)
            .ok_or_else(|| PhysicsError::invalid_handle(id))
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Registers one broad-phase proxy per shape child and updates the body's mass.
    pub fn attach_shape(&mut self, body_id: BodyId, shape_id: ShapeId) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        self.shape(shape_id)?;
        if self.body(body_id)?.shapes.contains(&shape_id) {
            return Err(PhysicsError::AlreadyAttached);
        }

        if let Some(body) = self.bodies.get_mut(body_id) {
            body.shapes.push(shape_id);
        }
        if let Some(shape) = self.shapes.get_mut(shape_id) {
            shape.bodies.push(body_id);
        }
        self.create_shape_proxies(body_id, shape_id);
        if let Some(body) = self.bodies.get_mut(body_id) {
            body.reset_mass_data(&self.shapes);
        }
        self.new_shapes = true;
        Ok(())
    }

    pub fn detach_shape(&mut self, body_id: BodyId, shape_id: ShapeId) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        self.shape(shape_id)?;
        if !self.body(body_id)?.shapes.contains(&shape_id) {
            return Err(PhysicsError::NotAttached);
        }
        self.detach_internal(body_id, shape_id);
        Ok(())
    }

    fn detach_internal(&mut self, body_id: BodyId, shape_id: ShapeId) {
        let Some(body) = self.bodies.get(body_id) else {
            return;
        };
        let proxies: Vec<usize> = body
            .proxies
            .iter()
            .filter(|p| p.shape == shape_id)
            .map(|p| p.proxy_id)
            .collect();

        self.destroy_body_contacts(body_id, Some(&proxies));
        for proxy_id in proxies {
            self.collision.broad_phase.destroy_proxy(proxy_id);
        }
        if let Some(body) = self.bodies.get_mut(body_id) {
            body.proxies.retain(|p| p.shape != shape_id);
            body.shapes.retain(|s| *s != shape_id);
        }
        if let Some(shape) = self.shapes.get_mut(shape_id) {
            shape.bodies.retain(|b| *b != body_id);
        }
        if let Some(body) = self.bodies.get_mut(body_id) {
            body.reset_mass_data(&self.shapes);
        }
    }

    /// Changes a shape's collision filter and re-checks its pairs.
    pub fn set_shape_filter(&mut self, id: ShapeId, filter: Filter) -> PhysicsResult<()> {
        self.shapes
            .get_mut(id)
            .ok_or_else(|| PhysicsError::invalid_handle(id))?
            .filter = filter;
        self.refilter_shape(id)
    }

    /// Flags the shape's contacts for filtering and its proxies for new pairs,
    /// both handled on the next step.
    pub fn refilter_shape(&mut self, id: ShapeId) -> PhysicsResult<()> {
        let bodies = self.shape(id)?.bodies.clone();
        for body_id in bodies {
            let Some(body) = self.bodies.get(body_id) else {
                continue;
            };
            for contact_id in &body.contacts {
                if let Some(contact) = self.collision.contacts.get_mut(*contact_id) {
                    if contact.shape_a == id || contact.shape_b == id {
                        contact.needs_filtering = true;
                    }
                }
            }
            for proxy in body.proxies.iter().filter(|p| p.shape == id) {
                self.collision.broad_phase.touch_proxy(proxy.proxy_id);
            }
        }
        self.new_shapes = true;
        Ok(())
    }

    fn create_shape_proxies(&mut self, body_id: BodyId, shape_id: ShapeId) {
        let (Some(body), Some(shape)) = (self.bodies.get_mut(body_id), self.shapes.get(shape_id))
        else {
            return;
        };
        if !body.enabled {
            return;
        }
        for child in 0..shape.child_count() {
            let aabb = shape.compute_aabb(child, &body.transform);
            let proxy_id = self.collision.broad_phase.create_proxy(
                &aabb,
                ProxyData {
                    body: body_id,
                    shape: shape_id,
                    child,
                },
            );
            body.proxies.push(BodyProxy {
                shape: shape_id,
                child,
                proxy_id,
            });
        }
    }

    fn create_proxies(&mut self, body_id: BodyId) {
        let shapes = match self.bodies.get(body_id) {
            Some(body) => body.shapes.clone(),
            None => return,
        };
        for shape_id in shapes {
            self.create_shape_proxies(body_id, shape_id);
        }
    }

    fn destroy_proxies(&mut self, body_id: BodyId) {
        let Some(body) = self.bodies.get_mut(body_id) else {
            return;
        };
        for proxy in body.proxies.drain(..) {
            self.collision.broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    // ---------------------------------------------------------------- joints

    pub fn create_joint(&mut self, def: &JointDef) -> PhysicsResult<JointId> {
        self.ensure_unlocked()?;
        let (a, b) = (def.body_a(), def.body_b());
        self.body(a)?;
        let xf_b = self.body(b)?.transform;
        if self.joints.len() >= self.conf.max_joints {
            return Err(PhysicsError::CapacityExceeded {
                kind: "joint",
                limit: self.conf.max_joints,
            });
        }

        let joint = Joint::new(def, &xf_b)?;
        let collide_connected = joint.collide_connected;
        let id = self.joints.insert(joint);
        for body_id in [a, b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.joints.push(id);
            }
        }

        // Existing contacts between the two bodies are dropped on the next step.
        if !collide_connected {
            self.flag_contacts_between(a, b);
        }
        log::debug!("created joint {id:?} between {a:?} and {b:?}");
        Ok(id)
    }

    pub fn destroy_joint(&mut self, id: JointId) -> PhysicsResult<()> {
        self.ensure_unlocked()?;
        self.joint(id)?;
        self.remove_joint(id);
        Ok(())
    }

    fn remove_joint(&mut self, id: JointId) -> Option<Joint> {
        let joint = self.joints.remove(id)?;
        for body_id in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.joints.retain(|j| *j != id);
                body.set_awake_flag(true);
            }
        }
        // The pair may collide now; have the broad-phase report it again.
        if !joint.collide_connected {
            if let Some(body) = self.bodies.get(joint.body_a) {
                for proxy in &body.proxies {
                    self.collision.broad_phase.touch_proxy(proxy.proxy_id);
                }
                self.new_shapes = true;
            }
        }
        log::debug!("destroyed joint {id:?}");
        Some(joint)
    }

    fn flag_contacts_between(&mut self, a: BodyId, b: BodyId) {
        let Some(body) = self.bodies.get(b) else {
            return;
        };
        for contact_id in &body.contacts {
            if let Some(contact) = self.collision.contacts.get_mut(*contact_id) {
                if contact.body_a == a || contact.body_b == a {
                    contact.needs_filtering = true;
                }
            }
        }
    }

    pub fn joint(&self, id: JointId) -> PhysicsResult<&Joint> {
        self.joints
            .get(id)
            .ok_or_else(|| PhysicsError::invalid_handle(id))
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointId, &Joint)> + '_ {
        self.joints.iter()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Moves the world target of a target joint.
    pub fn set_joint_target(&mut self, id: JointId, target: Vec2) -> PhysicsResult<()> {
        if !math::is_finite(target) {
            return Err(PhysicsError::InvalidArgument("target must be finite".into()));
        }
        let joint = self.joint_of_kind(id, "target", |k| matches!(k, JointKind::Target(_)))?;
        joint.set_target(target);
        let body_b = joint.body_b;
        self.wake(&[body_b]);
        Ok(())
    }

    pub fn set_joint_motor(
        &mut self,
        id: JointId,
        enabled: bool,
        speed: f32,
        max_torque: f32,
    ) -> PhysicsResult<()> {
        if !speed.is_finite() || !max_torque.is_finite() || max_torque < 0.0 {
            return Err(PhysicsError::InvalidArgument(
                "motor speed and torque must be finite, torque non-negative".into(),
            ));
        }
        let joint = self.joint_of_kind(id, "revolute", |k| matches!(k, JointKind::Revolute(_)))?;
        joint.set_motor(enabled, speed, max_torque);
        let bodies = [joint.body_a, joint.body_b];
        self.wake(&bodies);
        Ok(())
    }

    pub fn set_joint_limit(
        &mut self,
        id: JointId,
        enabled: bool,
        lower: f32,
        upper: f32,
    ) -> PhysicsResult<()> {
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(PhysicsError::InvalidArgument(
                "limits must be finite with lower <= upper".into(),
            ));
        }
        let joint = self.joint_of_kind(id, "revolute", |k| matches!(k, JointKind::Revolute(_)))?;
        joint.set_limit(enabled, lower, upper);
        let bodies = [joint.body_a, joint.body_b];
        self.wake(&bodies);
        Ok(())
    }

    fn joint_of_kind(
        &mut self,
        id: JointId,
        expected: &str,
        is_kind: impl Fn(&JointKind) -> bool,
    ) -> PhysicsResult<&mut Joint> {
        let joint = self
            .joints
            .get_mut(id)
            .ok_or_else(|| PhysicsError::invalid_handle(id))?;
        if !is_kind(&joint.kind) {
            return Err(PhysicsError::InvalidArgument(format!(
                "joint {id:?} is not a {expected} joint"
            )));
        }
        Ok(joint)
    }

    fn wake(&mut self, ids: &[BodyId]) {
        for id in ids {
            if let Some(body) = self.bodies.get_mut(*id) {
                body.set_awake_flag(true);
            }
        }
    }

    // -------------------------------------------------------------- contacts

    pub fn contacts(&self) -> impl Iterator<Item = (ContactId, &Contact)> + '_ {
        self.collision.contacts.iter()
    }

    pub fn contact(&self, id: ContactId) -> PhysicsResult<&Contact> {
        self.collision
            .contacts
            .get(id)
            .ok_or_else(|| PhysicsError::invalid_handle(id))
    }

    fn contact_mut(&mut self, id: ContactId) -> PhysicsResult<&mut Contact> {
        self.collision
            .contacts
            .get_mut(id)
            .ok_or_else(|| PhysicsError::invalid_handle(id))
    }

    pub fn contact_count(&self) -> usize {
        self.collision.contacts.len()
    }

    /// World-space normal, points and separations of a contact.
    pub fn world_manifold(&self, id: ContactId) -> PhysicsResult<WorldManifold> {
        let contact = self.contact(id)?;
        let body_a = self.body(contact.body_a)?;
        let body_b = self.body(contact.body_b)?;
        let radius_a = self.shape(contact.shape_a)?.distance_proxy(contact.child_a).radius();
        let radius_b = self.shape(contact.shape_b)?.distance_proxy(contact.child_b).radius();
        Ok(WorldManifold::new(
            &contact.manifold,
            &body_a.transform,
            radius_a,
            &body_b.transform,
            radius_b,
        ))
    }

    /// Disabled contacts are still tracked but not solved. The flag persists
    /// until changed again, so listeners may flip it in `pre_solve`.
    pub fn set_contact_enabled(&mut self, id: ContactId, enabled: bool) -> PhysicsResult<()> {
        self.contact_mut(id)?.set_enabled(enabled);
        Ok(())
    }

    pub fn set_contact_friction(&mut self, id: ContactId, friction: f32) -> PhysicsResult<()> {
        if !friction.is_finite() || friction < 0.0 {
            return Err(PhysicsError::InvalidArgument(
                "friction must be finite and non-negative".into(),
            ));
        }
        self.contact_mut(id)?.set_friction(friction);
        Ok(())
    }

    pub fn set_contact_restitution(&mut self, id: ContactId, restitution: f32) -> PhysicsResult<()> {
        if !restitution.is_finite() || restitution < 0.0 {
            return Err(PhysicsError::InvalidArgument(
                "restitution must be finite and non-negative".into(),
            ));
        }
        self.contact_mut(id)?.set_restitution(restitution);
        Ok(())
    }

    /// Restores the friction mixed from the two shapes.
    pub fn reset_contact_friction(&mut self, id: ContactId) -> PhysicsResult<()> {
        let (a, b) = self.contact_shapes(id)?;
        let friction = mix_friction(a.friction, b.friction);
        self.contact_mut(id)?.set_friction(friction);
        Ok(())
    }

    pub fn reset_contact_restitution(&mut self, id: ContactId) -> PhysicsResult<()> {
        let (a, b) = self.contact_shapes(id)?;
        let restitution = mix_restitution(a.restitution, b.restitution);
        self.contact_mut(id)?.set_restitution(restitution);
        Ok(())
    }

    fn contact_shapes(&self, id: ContactId) -> PhysicsResult<(&Shape, &Shape)> {
        let contact = self.contact(id)?;
        Ok((self.shape(contact.shape_a)?, self.shape(contact.shape_b)?))
    }

    // --------------------------------------------------------------- queries

    /// Reports every proxy whose fat AABB overlaps `aabb`. Return `false` to stop.
    pub fn query_aabb<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(ProxyHit) -> bool,
    {
        let broad_phase = &self.collision.broad_phase;
        broad_phase.query(aabb, |proxy_id| {
            let data = broad_phase.user_data(proxy_id);
            callback(ProxyHit {
                body: data.body,
                shape: data.shape,
                child: data.child,
            })
        });
    }

    /// Casts the segment `p1 -> p2` against shape geometry. Hits arrive in no
    /// particular order; the callback's [`RayCastAction`] steers the search.
    pub fn ray_cast<F>(&self, p1: Vec2, p2: Vec2, mut callback: F)
    where
        F: FnMut(RayHit) -> RayCastAction,
    {
        let input = RayCastInput::new(p1, p2);
        let broad_phase = &self.collision.broad_phase;
        broad_phase.ray_cast(&input, |sub_input, proxy_id| {
            let data = broad_phase.user_data(proxy_id);
            let (Some(body), Some(shape)) = (self.bodies.get(data.body), self.shapes.get(data.shape))
            else {
                return sub_input.max_fraction;
            };
            let Some(output) = shape.ray_cast(sub_input, &body.transform, data.child) else {
                return sub_input.max_fraction;
            };

            let fraction = output.fraction;
            let hit = RayHit {
                body: data.body,
                shape: data.shape,
                child: data.child,
                point: p1 + (p2 - p1) * fraction,
                normal: output.normal,
                fraction,
            };
            match callback(hit) {
                RayCastAction::Terminate => 0.0,
                RayCastAction::Ignore => -1.0,
                RayCastAction::Clip => fraction,
                RayCastAction::Continue => sub_input.max_fraction,
            }
        });
    }

    // ------------------------------------------------------------------ step

    /// Advances the world by `dt` seconds.
    ///
    /// Order: pending pairs, contact update, island solve, continuous
    /// collision, force clearing. `dt == 0` only refreshes contacts. The step
    /// always completes; numerical trouble is reported in the returned stats.
    pub fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32) -> StepStats {
        if self.is_locked() {
            log::warn!("step called from inside a step, ignored");
            return StepStats::default();
        }
        if !dt.is_finite() || dt < 0.0 {
            log::warn!("step called with invalid dt {dt}, ignored");
            return StepStats::default();
        }

        let _timer = ScopedTimer::new("world::step");
        let start = Instant::now();
        let mut profile = StepProfile::default();
        let mut stats = StepStats::default();

        for body in self.bodies.values_mut().filter(|b| b.mass_dirty) {
            body.reset_mass_data(&self.shapes);
        }

        stats.pre.proxies_moved = self.collision.broad_phase.move_count() as u32;
        if self.new_shapes {
            self.find_new_contacts(&mut stats.pre);
            self.new_shapes = false;
        }

        self.phase = WorldPhase::Stepping;
        let step = StepConf {
            dt,
            dt_ratio: dt * self.inv_dt0,
            velocity_iterations,
            position_iterations,
            ..self.step_conf
        };

        {
            let _phase = PhaseTimer::new(&mut profile.collide_time);
            self.collide(&mut stats.pre);
        }
        if self.step_complete && dt > 0.0 {
            let _phase = PhaseTimer::new(&mut profile.solve_time);
            self.solve_islands(&step, &mut stats.reg, &mut stats.pre);
        }
        if step.continuous_physics && dt > 0.0 {
            let _phase = PhaseTimer::new(&mut profile.toi_time);
            self.solve_toi(&step, &mut stats.toi, &mut stats.pre);
        }

        if dt > 0.0 {
            self.inv_dt0 = step.inv_dt();
        }
        if step.clear_forces {
            for body in self.bodies.values_mut() {
                body.force = Vec2::ZERO;
                body.torque = 0.0;
            }
        }
        self.phase = WorldPhase::Idle;

        profile.total_time = start.elapsed();
        profile.body_count = self.bodies.len();
        profile.contact_count = self.collision.contacts.len();
        profile.joint_count = self.joints.len();
        profile.report();
        self.profile = profile;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn shapeless_body_integrates_under_gravity() {
        let mut world = PhysicsWorld::default();
        let id = world
            .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 1.0)))
            .unwrap();

        world.step(0.01, 8, 3);
        let body = world.body(id).unwrap();
        assert_relative_eq!(body.linear_velocity().y, -0.1, epsilon = 1e-6);
        assert_relative_eq!(body.position().y, 0.999, epsilon = 1e-6);
    }

    #[test]
    fn zero_dt_refreshes_contacts_without_moving() {
        let mut world = PhysicsWorld::default();
        let ground = world.create_body(&BodyDef::static_body()).unwrap();
        world.add_shape(ground, ShapeDef::box_shape(5.0, 0.5)).unwrap();
        let ball = world
            .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 0.9)))
            .unwrap();
        world.add_shape(ball, ShapeDef::disk(0.5)).unwrap();

        let stats = world.step(0.0, 8, 3);
        assert_eq!(stats.pre.contacts_added, 1);
        assert_eq!(stats.reg.islands_found, 0);
        assert_eq!(world.body(ball).unwrap().position(), Vec2::new(0.0, 0.9));
        let (_, contact) = world.contacts().next().unwrap();
        assert!(contact.is_touching());
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut world = PhysicsWorld::default();
        let id = world.create_body(&BodyDef::dynamic()).unwrap();
        world.destroy_body(id).unwrap();
        assert!(matches!(
            world.body(id),
            Err(PhysicsError::InvalidHandle { kind: "body", .. })
        ));
        assert!(world.destroy_body(id).is_err());
        assert!(world.set_velocity(id, Vec2::X, 0.0).is_err());
    }

    #[test]
    fn attach_twice_and_detach_unknown_fail() {
        let mut world = PhysicsWorld::default();
        let body = world.create_body(&BodyDef::dynamic()).unwrap();
        let shape = world.create_shape(ShapeDef::disk(0.5)).unwrap();
        world.attach_shape(body, shape).unwrap();
        assert_eq!(
            world.attach_shape(body, shape),
            Err(PhysicsError::AlreadyAttached)
        );
        let other = world.create_body(&BodyDef::dynamic()).unwrap();
        assert_eq!(world.detach_shape(other, shape), Err(PhysicsError::NotAttached));
    }

    #[test]
    fn joint_kind_mismatch_is_an_argument_error() {
        use crate::core::constraints::DistanceJointDef;

        let mut world = PhysicsWorld::default();
        let a = world.create_body(&BodyDef::dynamic()).unwrap();
        let b = world.create_body(&BodyDef::dynamic()).unwrap();
        let joint = world
            .create_joint(&JointDef::Distance(DistanceJointDef::new(a, b, 1.0)))
            .unwrap();
        assert!(matches!(
            world.set_joint_motor(joint, true, 1.0, 10.0),
            Err(PhysicsError::InvalidArgument(_))
        ));
    }
}
