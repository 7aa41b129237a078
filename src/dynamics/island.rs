use glam::Vec2;

use super::{
    integrator::Integrator,
    solver::{ContactImpulse, ContactSolver, ContactSolverInput, SolverBody},
    SolverData,
};
use crate::{
    collision::contact::Contact,
    config::StepConf,
    core::{
        collider::Shape,
        constraints::{Joint, JointBodies},
        rigidbody::Body,
        types::{Position, Velocity},
    },
    utils::allocator::{Arena, BodyId, ContactId, JointId, ShapeId},
};

/// Outcome of solving one island.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IslandReport {
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    /// Position constraints converged within tolerance.
    pub solved: bool,
    pub bodies_slept: u32,
    pub min_separation: f32,
    pub max_incremental_impulse: f32,
}

/// A connected set of awake bodies plus the touching contacts and joints
/// between them, solved together.
///
/// Buffers are kept between solves to avoid reallocating every step.
#[derive(Debug, Default)]
pub struct Island {
    pub(crate) bodies: Vec<BodyId>,
    pub(crate) contacts: Vec<ContactId>,
    pub(crate) joints: Vec<JointId>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    /// Bodies whose pose an earlier island already advanced this step.
    fixed: Vec<bool>,
    impulses: Vec<(ContactId, ContactImpulse)>,
    stack: Vec<BodyId>,
}

impl Island {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bodies(&self) -> &[BodyId] {
        &self.bodies
    }

    pub fn contacts(&self) -> &[ContactId] {
        &self.contacts
    }

    pub fn joints(&self) -> &[JointId] {
        &self.joints
    }

    /// Impulses applied by the last solve, in island contact order.
    pub fn impulses(&self) -> &[(ContactId, ContactImpulse)] {
        &self.impulses
    }

    pub(crate) fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
        self.impulses.clear();
    }

    pub(crate) fn add_body(&mut self, id: BodyId, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(id);
    }

    pub(crate) fn add_contact(&mut self, id: ContactId) {
        self.contacts.push(id);
    }

    /// Collects the island reachable from `seed` through touching contacts and
    /// joints. Static and kinematic bodies join the island but do not
    /// propagate it, so they can take part in several islands per step.
    pub(crate) fn flood_fill(
        &mut self,
        seed: BodyId,
        bodies: &mut Arena<BodyId, Body>,
        contacts: &mut Arena<ContactId, Contact>,
        joints: &mut Arena<JointId, Joint>,
    ) {
        let mut stack = std::mem::take(&mut self.stack);
        stack.clear();
        if let Some(body) = bodies.get_mut(seed) {
            body.in_island = true;
            stack.push(seed);
        }

        while let Some(id) = stack.pop() {
            let Some(body) = bodies.get_mut(id) else {
                continue;
            };
            self.add_body(id, body);
            body.set_awake_flag(true);
            if !body.is_dynamic() {
                continue;
            }
            let body_contacts = body.contacts.clone();
            let body_joints = body.joints.clone();

            for contact_id in body_contacts {
                let Some(contact) = contacts.get_mut(contact_id) else {
                    continue;
                };
                if contact.in_island || !contact.enabled || !contact.touching || contact.sensor {
                    continue;
                }
                contact.in_island = true;
                self.contacts.push(contact_id);

                let other = if contact.body_a == id {
                    contact.body_b
                } else {
                    contact.body_a
                };
                if let Some(other_body) = bodies.get_mut(other) {
                    if !other_body.in_island {
                        other_body.in_island = true;
                        stack.push(other);
                    }
                }
            }

            for joint_id in body_joints {
                let Some(joint) = joints.get_mut(joint_id) else {
                    continue;
                };
                if joint.in_island {
                    continue;
                }
                let Some(other) = joint.other_body(id) else {
                    continue;
                };
                let Some(other_body) = bodies.get_mut(other) else {
                    continue;
                };
                if !other_body.enabled {
                    continue;
                }
                joint.in_island = true;
                self.joints.push(joint_id);
                if !other_body.in_island {
                    other_body.in_island = true;
                    stack.push(other);
                }
            }
        }

        self.stack = stack;
    }

    fn load_bodies(&mut self, bodies: &Arena<BodyId, Body>) {
        self.positions.clear();
        self.velocities.clear();
        for body in self.bodies.iter().filter_map(|id| bodies.get(*id)) {
            self.positions.push(Position {
                center: body.sweep.c,
                angle: body.sweep.a,
            });
            self.velocities.push(body.velocity);
        }
    }

    fn solver_inputs(
        &self,
        bodies: &Arena<BodyId, Body>,
        contacts: &Arena<ContactId, Contact>,
        shapes: &Arena<ShapeId, Shape>,
    ) -> (Vec<ContactId>, Vec<ContactSolverInput>) {
        let solver_body = |body: &Body| SolverBody {
            index: body.island_index,
            inv_mass: body.inv_mass,
            inv_i: body.inv_inertia,
            local_center: body.sweep.local_center,
        };

        let mut ids = Vec::with_capacity(self.contacts.len());
        let mut inputs = Vec::with_capacity(self.contacts.len());
        for &id in &self.contacts {
            let Some(contact) = contacts.get(id) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b))
            else {
                continue;
            };
            let (Some(shape_a), Some(shape_b)) =
                (shapes.get(contact.shape_a), shapes.get(contact.shape_b))
            else {
                continue;
            };
            ids.push(id);
            inputs.push(ContactSolverInput {
                manifold: contact.manifold,
                friction: contact.friction,
                restitution: contact.restitution,
                radius_a: shape_a.distance_proxy(contact.child_a).radius(),
                radius_b: shape_b.distance_proxy(contact.child_b).radius(),
                body_a: solver_body(body_a),
                body_b: solver_body(body_b),
            });
        }
        (ids, inputs)
    }

    fn store_bodies(&self, bodies: &mut Arena<BodyId, Body>) {
        for (i, id) in self.bodies.iter().enumerate() {
            if let Some(body) = bodies.get_mut(*id) {
                body.sweep.c = self.positions[i].center;
                body.sweep.a = self.positions[i].angle;
                body.velocity = self.velocities[i];
                body.synchronize_transform();
            }
        }
    }

    /// Integrates, solves and, when allowed, puts the island to sleep.
    pub(crate) fn solve(
        &mut self,
        step: &StepConf,
        gravity: Vec2,
        bodies: &mut Arena<BodyId, Body>,
        contacts: &mut Arena<ContactId, Contact>,
        joints: &mut Arena<JointId, Joint>,
        shapes: &Arena<ShapeId, Shape>,
    ) -> IslandReport {
        let integrator = Integrator::new(gravity, step);
        let mut report = IslandReport::default();

        // Sweeps start at the current pose. A kinematic body shared with an
        // earlier island keeps the sweep that island gave it.
        self.fixed.clear();
        for id in &self.bodies {
            let fixed = match bodies.get_mut(*id) {
                Some(body) => {
                    let fixed = body.swept && !body.is_dynamic();
                    if !fixed {
                        body.sweep.c0 = body.sweep.c;
                        body.sweep.a0 = body.sweep.a;
                    }
                    body.swept = body.is_speedable();
                    fixed
                }
                None => true,
            };
            self.fixed.push(fixed);
        }
        self.load_bodies(bodies);
        for (i, id) in self.bodies.iter().enumerate() {
            if let Some(body) = bodies.get(*id) {
                self.velocities[i] = integrator.integrate_velocity(body, self.velocities[i]);
            }
        }

        let (contact_ids, inputs) = self.solver_inputs(bodies, contacts, shapes);
        let mut contact_solver = ContactSolver::new(step, &inputs);
        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        if step.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        for id in &self.joints {
            let Some(joint) = joints.get_mut(*id) else {
                continue;
            };
            let (Some(a), Some(b)) = (bodies.get(joint.body_a), bodies.get(joint.body_b)) else {
                continue;
            };
            joint.bodies = JointBodies {
                index_a: a.island_index,
                index_b: b.island_index,
                local_center_a: a.sweep.local_center,
                local_center_b: b.sweep.local_center,
                inv_mass_a: a.inv_mass,
                inv_mass_b: b.inv_mass,
                inv_i_a: a.inv_inertia,
                inv_i_b: b.inv_inertia,
            };
            let mut data = SolverData {
                step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            joint.init_velocity_constraints(&mut data);
        }

        for _ in 0..step.velocity_iterations {
            let mut data = SolverData {
                step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            for id in &self.joints {
                if let Some(joint) = joints.get_mut(*id) {
                    joint.solve_velocity_constraints(&mut data);
                }
            }
            let impulse = contact_solver.solve_velocity_constraints(&mut self.velocities);
            report.max_incremental_impulse = report.max_incremental_impulse.max(impulse);
            report.velocity_iterations += 1;
        }

        for (i, id) in contact_ids.iter().enumerate() {
            if let Some(contact) = contacts.get_mut(*id) {
                contact_solver.store_impulses(i, &mut contact.manifold);
            }
            self.impulses.push((*id, contact_solver.impulse(i)));
        }

        for i in 0..self.positions.len() {
            if self.fixed[i] {
                continue;
            }
            self.positions[i] =
                integrator.integrate_position(self.positions[i], &mut self.velocities[i]);
        }

        report.min_separation = f32::MAX;
        for _ in 0..step.position_iterations {
            let min_separation = contact_solver.solve_position_constraints(&mut self.positions);
            report.min_separation = report.min_separation.min(min_separation);
            report.position_iterations += 1;
            let contacts_okay = min_separation >= -3.0 * step.linear_slop;

            let mut data = SolverData {
                step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            // Every joint gets its iteration even after one fails.
            let joints_okay = self.joints.iter().fold(true, |okay, id| {
                let solved = joints
                    .get_mut(*id)
                    .map_or(true, |joint| joint.solve_position_constraints(&mut data));
                okay && solved
            });

            if contacts_okay && joints_okay {
                report.solved = true;
                break;
            }
        }

        self.store_bodies(bodies);

        if step.allow_sleep {
            report.bodies_slept = self.update_sleep(step, bodies, report.solved);
        }
        report
    }

    /// Advances sleep timers and sends the whole island to sleep once every
    /// body has been slow for long enough. Returns the number of bodies put to sleep.
    fn update_sleep(&self, step: &StepConf, bodies: &mut Arena<BodyId, Body>, solved: bool) -> u32 {
        let lin_tol_sqr = step.linear_sleep_tolerance * step.linear_sleep_tolerance;
        let ang_tol_sqr = step.angular_sleep_tolerance * step.angular_sleep_tolerance;

        let mut min_sleep_time = f32::MAX;
        for (i, id) in self.bodies.iter().enumerate() {
            let Some(body) = bodies.get_mut(*id) else {
                continue;
            };
            if !body.is_speedable() {
                continue;
            }
            if self.fixed[i] {
                min_sleep_time = min_sleep_time.min(body.sleep_time);
                continue;
            }
            let v = body.velocity;
            if !body.allow_sleep
                || v.angular * v.angular > ang_tol_sqr
                || v.linear.length_squared() > lin_tol_sqr
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += step.dt;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time < step.time_to_sleep || !solved {
            return 0;
        }

        // Kinematic bodies only sleep in an island of their own; otherwise a
        // neighbouring island may still depend on them.
        let lone = !self
            .bodies
            .iter()
            .any(|id| bodies.get(*id).is_some_and(Body::is_dynamic));
        let mut slept = 0;
        for id in &self.bodies {
            let Some(body) = bodies.get_mut(*id) else {
                continue;
            };
            if body.is_dynamic() {
                body.set_awake_flag(false);
                slept += 1;
            } else if lone && body.is_speedable() {
                body.set_awake_flag(false);
            }
        }
        slept
    }

    /// Resolves a time-of-impact sub-step. Only the two bodies at
    /// `toi_index_a`/`toi_index_b` are moved by the position correction; the
    /// rest of the island acts as static there but still takes part in the
    /// velocity solve.
    pub(crate) fn solve_toi(
        &mut self,
        step: &StepConf,
        toi_index_a: usize,
        toi_index_b: usize,
        bodies: &mut Arena<BodyId, Body>,
        contacts: &Arena<ContactId, Contact>,
        shapes: &Arena<ShapeId, Shape>,
    ) -> IslandReport {
        let mut report = IslandReport::default();
        self.impulses.clear();
        self.load_bodies(bodies);

        let (contact_ids, inputs) = self.solver_inputs(bodies, contacts, shapes);
        let mut contact_solver = ContactSolver::new(step, &inputs);

        report.min_separation = f32::MAX;
        for _ in 0..step.toi_position_iterations {
            let min_separation = contact_solver.solve_toi_position_constraints(
                &mut self.positions,
                toi_index_a,
                toi_index_b,
            );
            report.min_separation = report.min_separation.min(min_separation);
            report.position_iterations += 1;
            if min_separation >= -1.5 * step.linear_slop {
                report.solved = true;
                break;
            }
        }

        // The corrected pose becomes the new start of the sweep.
        for index in [toi_index_a, toi_index_b] {
            if let Some(body) = self.bodies.get(index).and_then(|id| bodies.get_mut(*id)) {
                body.sweep.c0 = self.positions[index].center;
                body.sweep.a0 = self.positions[index].angle;
            }
        }

        // Impulses from the regular solve already warm started this step, so
        // the sub-step starts cold and does not store its impulses back.
        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        for _ in 0..step.toi_velocity_iterations {
            let impulse = contact_solver.solve_velocity_constraints(&mut self.velocities);
            report.max_incremental_impulse = report.max_incremental_impulse.max(impulse);
            report.velocity_iterations += 1;
        }
        for (i, id) in contact_ids.iter().enumerate() {
            self.impulses.push((*id, contact_solver.impulse(i)));
        }

        let integrator = Integrator::new(Vec2::ZERO, step);
        for i in 0..self.positions.len() {
            self.positions[i] =
                integrator.integrate_position(self.positions[i], &mut self.velocities[i]);
        }

        self.store_bodies(bodies);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rigidbody::BodyDef;
    use approx::assert_relative_eq;

    #[test]
    fn flood_fill_stops_at_static_bodies() {
        let mut bodies: Arena<BodyId, Body> = Arena::new();
        let mut contacts: Arena<ContactId, Contact> = Arena::new();
        let mut joints: Arena<JointId, Joint> = Arena::new();

        let ground = bodies.insert(Body::new(&BodyDef::static_body()));
        let left = bodies.insert(Body::new(&BodyDef::dynamic()));
        let right = bodies.insert(Body::new(&BodyDef::dynamic()));

        let shape = ShapeId::from_index(0);
        for (body, proxy) in [(left, 1), (right, 2)] {
            let mut contact = Contact::new(
                (ground, shape, 0, 0),
                (body, shape, 0, proxy),
                0.2,
                0.0,
                false,
            );
            contact.touching = true;
            let id = contacts.insert(contact);
            for owner in [ground, body] {
                if let Some(b) = bodies.get_mut(owner) {
                    b.contacts.push(id);
                }
            }
        }

        let mut island = Island::new();
        island.flood_fill(left, &mut bodies, &mut contacts, &mut joints);
        assert_eq!(island.bodies(), &[left, ground]);
        assert_eq!(island.contacts().len(), 1);
        assert!(!bodies.get(right).map_or(true, |b| b.in_island));
    }

    #[test]
    fn flood_fill_stops_at_kinematic_bodies() {
        let mut bodies: Arena<BodyId, Body> = Arena::new();
        let mut contacts: Arena<ContactId, Contact> = Arena::new();
        let mut joints: Arena<JointId, Joint> = Arena::new();

        let platform = bodies.insert(Body::new(&BodyDef::kinematic()));
        let left = bodies.insert(Body::new(&BodyDef::dynamic()));
        let right = bodies.insert(Body::new(&BodyDef::dynamic()));

        let shape = ShapeId::from_index(0);
        for (body, proxy) in [(left, 1), (right, 2)] {
            let mut contact = Contact::new(
                (platform, shape, 0, 0),
                (body, shape, 0, proxy),
                0.2,
                0.0,
                false,
            );
            contact.touching = true;
            let id = contacts.insert(contact);
            for owner in [platform, body] {
                if let Some(b) = bodies.get_mut(owner) {
                    b.contacts.push(id);
                }
            }
        }

        let mut island = Island::new();
        island.flood_fill(left, &mut bodies, &mut contacts, &mut joints);
        assert_eq!(island.bodies(), &[left, platform]);
        assert!(!bodies.get(right).map_or(true, |b| b.in_island));

        // Seeding from the platform itself collects nothing else.
        if let Some(b) = bodies.get_mut(platform) {
            b.in_island = false;
        }
        island.clear();
        island.flood_fill(platform, &mut bodies, &mut contacts, &mut joints);
        assert_eq!(island.bodies(), &[platform]);
    }

    #[test]
    fn shapeless_body_falls_under_gravity() {
        let mut bodies: Arena<BodyId, Body> = Arena::new();
        let mut contacts: Arena<ContactId, Contact> = Arena::new();
        let mut joints: Arena<JointId, Joint> = Arena::new();
        let shapes: Arena<ShapeId, Shape> = Arena::new();

        let id = bodies.insert(Body::new(
            &BodyDef::dynamic().with_position(Vec2::new(0.0, 1.0)),
        ));
        let step = StepConf::default().with_dt(0.01);

        let mut island = Island::new();
        island.flood_fill(id, &mut bodies, &mut contacts, &mut joints);
        let report = island.solve(
            &step,
            Vec2::new(0.0, -10.0),
            &mut bodies,
            &mut contacts,
            &mut joints,
            &shapes,
        );

        assert!(report.solved);
        assert_eq!(report.bodies_slept, 0);
        let body = bodies.get(id).expect("body");
        assert_relative_eq!(body.linear_velocity().y, -0.1, epsilon = 1e-6);
        assert_relative_eq!(body.position().y, 0.999, epsilon = 1e-6);
    }

    #[test]
    fn resting_island_falls_asleep_after_timeout() {
        let mut bodies: Arena<BodyId, Body> = Arena::new();
        let mut contacts: Arena<ContactId, Contact> = Arena::new();
        let mut joints: Arena<JointId, Joint> = Arena::new();
        let shapes: Arena<ShapeId, Shape> = Arena::new();

        let id = bodies.insert(Body::new(&BodyDef::dynamic()));
        let step = StepConf::default();
        let mut island = Island::new();

        let mut slept_at = None;
        for i in 0..60 {
            if let Some(body) = bodies.get_mut(id) {
                body.in_island = false;
            }
            island.clear();
            island.flood_fill(id, &mut bodies, &mut contacts, &mut joints);
            let report = island.solve(
                &step,
                Vec2::ZERO,
                &mut bodies,
                &mut contacts,
                &mut joints,
                &shapes,
            );
            if report.bodies_slept > 0 {
                slept_at = Some(i);
                break;
            }
        }

        // Half a second at 60 Hz, give or take float accumulation.
        assert!(matches!(slept_at, Some(29) | Some(30)), "slept at {slept_at:?}");
        assert!(!bodies.get(id).map_or(true, |b| b.is_awake()));
    }
}
