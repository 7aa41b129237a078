//! Contact registry: turns broad-phase pairs into persistent contacts and
//! keeps their manifolds current.

use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{stats::PreStepStats, PhysicsWorld, WorldPhase};
use crate::{
    collision::{
        broadphase::BroadPhase,
        contact::{Contact, ContactEvaluation},
        distance::test_overlap,
        narrowphase::collide_shapes,
    },
    core::{
        collider::Shape,
        constraints::Joint,
        rigidbody::Body,
        types::{mix_friction, mix_restitution},
    },
    utils::{
        allocator::{Arena, BodyId, ContactId, JointId, ShapeId},
        logging::ScopedTimer,
    },
};

/// What a broad-phase proxy stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyData {
    pub body: BodyId,
    pub shape: ShapeId,
    pub child: usize,
}

/// Owns the broad-phase and every contact between shape children.
///
/// Contacts live in an arena so iteration follows slot order; `pairs` only
/// answers "does this proxy pair already have a contact".
pub(crate) struct CollisionManager {
    pub broad_phase: BroadPhase<ProxyData>,
    pub contacts: Arena<ContactId, Contact>,
    pairs: HashMap<(usize, usize), ContactId>,
    max_contacts: usize,
}

impl CollisionManager {
    pub fn new(aabb_extension: f32, max_contacts: usize) -> Self {
        Self {
            broad_phase: BroadPhase::new(aabb_extension),
            contacts: Arena::new(),
            pairs: HashMap::new(),
            max_contacts,
        }
    }

    /// Creates contacts for every new overlapping proxy pair.
    pub fn find_new_contacts(
        &mut self,
        bodies: &mut Arena<BodyId, Body>,
        shapes: &Arena<ShapeId, Shape>,
        joints: &Arena<JointId, Joint>,
        stats: &mut PreStepStats,
    ) {
        let _timer = ScopedTimer::new("contacts::find_new");
        for (proxy_a, proxy_b) in self.broad_phase.update_pairs() {
            self.add_pair(proxy_a, proxy_b, bodies, shapes, joints, stats);
        }
    }

    fn add_pair(
        &mut self,
        proxy_a: usize,
        proxy_b: usize,
        bodies: &mut Arena<BodyId, Body>,
        shapes: &Arena<ShapeId, Shape>,
        joints: &Arena<JointId, Joint>,
        stats: &mut PreStepStats,
    ) {
        let data_a = self.broad_phase.user_data(proxy_a);
        let data_b = self.broad_phase.user_data(proxy_b);

        if data_a.body == data_b.body || self.pairs.contains_key(&(proxy_a, proxy_b)) {
            return;
        }
        if !should_collide(bodies, joints, data_a.body, data_b.body) {
            return;
        }
        let (Some(shape_a), Some(shape_b)) = (shapes.get(data_a.shape), shapes.get(data_b.shape))
        else {
            return;
        };
        if !shape_a.filter.should_collide(&shape_b.filter) {
            return;
        }

        if self.contacts.len() >= self.max_contacts {
            stats.contacts_ignored += 1;
            log::warn!(
                "contact capacity of {} reached, ignoring pair {proxy_a}/{proxy_b}",
                self.max_contacts
            );
            return;
        }

        let contact = Contact::new(
            (data_a.body, data_a.shape, data_a.child, proxy_a),
            (data_b.body, data_b.shape, data_b.child, proxy_b),
            mix_friction(shape_a.friction, shape_b.friction),
            mix_restitution(shape_a.restitution, shape_b.restitution),
            shape_a.is_sensor || shape_b.is_sensor,
        );
        let id = self.contacts.insert(contact);
        self.pairs.insert((proxy_a, proxy_b), id);
        for body_id in [data_a.body, data_b.body] {
            if let Some(body) = bodies.get_mut(body_id) {
                body.contacts.push(id);
            }
        }
        stats.contacts_added += 1;
    }

    /// Unlinks and drops a contact. Wakes both bodies if it was pushing them apart.
    pub fn remove_contact(
        &mut self,
        id: ContactId,
        bodies: &mut Arena<BodyId, Body>,
    ) -> Option<Contact> {
        let contact = self.contacts.remove(id)?;
        self.pairs.remove(&pair_key(contact.proxy_a, contact.proxy_b));
        let wake = contact.touching && !contact.sensor;
        for body_id in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body_id) {
                body.contacts.retain(|c| *c != id);
                if wake {
                    body.set_awake_flag(true);
                }
            }
        }
        Some(contact)
    }

    /// Contacts touching any of the given proxies.
    pub fn contacts_of_proxies(&self, body: &Body, proxies: &[usize]) -> Vec<ContactId> {
        body.contacts
            .iter()
            .copied()
            .filter(|id| {
                self.contacts
                    .get(*id)
                    .is_some_and(|c| proxies.contains(&c.proxy_a) || proxies.contains(&c.proxy_b))
            })
            .collect()
    }
}

fn pair_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Body-level collision rule: at least one dynamic body, both enabled, and no
/// joint between them that turns collision off.
pub(crate) fn should_collide(
    bodies: &Arena<BodyId, Body>,
    joints: &Arena<JointId, Joint>,
    a: BodyId,
    b: BodyId,
) -> bool {
    let (Some(body_a), Some(body_b)) = (bodies.get(a), bodies.get(b)) else {
        return false;
    };
    if !body_a.is_dynamic() && !body_b.is_dynamic() {
        return false;
    }
    if !body_a.enabled || !body_b.enabled {
        return false;
    }
    !body_b.joints.iter().filter_map(|id| joints.get(*id)).any(|joint| {
        joint.other_body(b) == Some(a) && !joint.collide_connected
    })
}

/// Narrow phase for one contact, without touching it.
pub(crate) fn evaluate(
    contact: &Contact,
    bodies: &Arena<BodyId, Body>,
    shapes: &Arena<ShapeId, Shape>,
    max_distance_iterations: u32,
) -> Option<ContactEvaluation> {
    let xf_a = bodies.get(contact.body_a)?.transform;
    let xf_b = bodies.get(contact.body_b)?.transform;
    let proxy_a = shapes.get(contact.shape_a)?.distance_proxy(contact.child_a);
    let proxy_b = shapes.get(contact.shape_b)?.distance_proxy(contact.child_b);

    if contact.sensor {
        let overlapping = test_overlap(proxy_a, &xf_a, proxy_b, &xf_b, max_distance_iterations);
        return Some(ContactEvaluation::Sensor { overlapping });
    }
    let mut cache = contact.cache;
    let manifold = collide_shapes(
        proxy_a,
        &xf_a,
        proxy_b,
        &xf_b,
        &mut cache,
        max_distance_iterations,
    );
    Some(ContactEvaluation::Solid { manifold, cache })
}

/// Maps `items` in order, spreading the work over rayon's pool when enabled.
#[cfg(feature = "parallel")]
fn map_ordered<T, R, F>(items: &[T], parallel: bool, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    if parallel {
        items.par_iter().map(f).collect()
    } else {
        items.iter().map(f).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn map_ordered<T, R, F>(items: &[T], _parallel: bool, f: F) -> Vec<R>
where
    F: Fn(&T) -> R,
{
    items.iter().map(f).collect()
}

enum Triage {
    Update,
    Skip,
    Destroy,
}

impl PhysicsWorld {
    /// Registers new pairs reported by the broad-phase.
    pub(crate) fn find_new_contacts(&mut self, stats: &mut PreStepStats) {
        self.collision
            .find_new_contacts(&mut self.bodies, &self.shapes, &self.joints, stats);
    }

    /// Destroys a contact, firing `end_contact` first when it was touching.
    pub(crate) fn destroy_contact(&mut self, id: ContactId) {
        let touching = self.collision.contacts.get(id).is_some_and(|c| c.touching);
        if touching {
            if let Some(listener) = self.contact_listener.clone() {
                listener.end_contact(self, id);
            }
        }
        self.collision.remove_contact(id, &mut self.bodies);
    }

    /// Destroys the contacts of a body that is going away or being disabled.
    pub(crate) fn destroy_body_contacts(&mut self, body: BodyId, proxies: Option<&[usize]>) {
        let ids = match (self.bodies.get(body), proxies) {
            (Some(b), Some(proxies)) => self.collision.contacts_of_proxies(b, proxies),
            (Some(b), None) => b.contacts.clone(),
            (None, _) => return,
        };
        if ids.is_empty() {
            return;
        }
        let previous = self.phase;
        if previous == WorldPhase::Idle {
            self.phase = WorldPhase::Destroying;
        }
        for id in ids {
            self.destroy_contact(id);
        }
        self.phase = previous;
    }

    /// Refreshes every contact's manifold and fires begin/end/pre-solve.
    ///
    /// Manifolds are computed up front (in parallel with the `parallel`
    /// feature) and applied in contact slot order, so listeners observe the
    /// same sequence either way.
    pub(crate) fn collide(&mut self, stats: &mut PreStepStats) {
        let _timer = ScopedTimer::new("contacts::collide");

        let mut pending = Vec::with_capacity(self.collision.contacts.len());
        for id in self.collision.contacts.ids() {
            match self.triage(id) {
                Triage::Update => pending.push(id),
                Triage::Skip => stats.contacts_skipped += 1,
                Triage::Destroy => {
                    self.destroy_contact(id);
                    stats.contacts_destroyed += 1;
                }
            }
        }

        let evaluations = self.evaluate_all(&pending);
        for (id, evaluation) in pending.into_iter().zip(evaluations) {
            if let Some(evaluation) = evaluation {
                self.apply_evaluation(id, evaluation);
                stats.contacts_updated += 1;
            }
        }
    }

    fn triage(&mut self, id: ContactId) -> Triage {
        let Some(contact) = self.collision.contacts.get(id) else {
            return Triage::Skip;
        };

        if contact.needs_filtering {
            let filter_ok = match (self.shapes.get(contact.shape_a), self.shapes.get(contact.shape_b)) {
                (Some(a), Some(b)) => a.filter.should_collide(&b.filter),
                _ => false,
            };
            if !filter_ok || !should_collide(&self.bodies, &self.joints, contact.body_a, contact.body_b)
            {
                return Triage::Destroy;
            }
        }

        let active = |id: BodyId| {
            self.bodies
                .get(id)
                .is_some_and(|b| b.awake && b.is_speedable())
        };
        if !active(contact.body_a) && !active(contact.body_b) {
            return Triage::Skip;
        }

        if !self
            .collision
            .broad_phase
            .test_overlap(contact.proxy_a, contact.proxy_b)
        {
            return Triage::Destroy;
        }

        if let Some(contact) = self.collision.contacts.get_mut(id) {
            contact.needs_filtering = false;
        }
        Triage::Update
    }

    fn evaluate_all(&self, ids: &[ContactId]) -> Vec<Option<ContactEvaluation>> {
        let iterations = self.step_conf.max_distance_iterations;
        let contacts = &self.collision.contacts;
        let bodies = &self.bodies;
        let shapes = &self.shapes;
        map_ordered(ids, self.parallel_enabled, |id| {
            contacts
                .get(*id)
                .and_then(|c| evaluate(c, bodies, shapes, iterations))
        })
    }

    /// Installs an evaluation and fires the listener hooks it implies.
    pub(crate) fn apply_evaluation(&mut self, id: ContactId, evaluation: ContactEvaluation) {
        let Some(contact) = self.collision.contacts.get_mut(id) else {
            return;
        };
        let update = contact.apply_evaluation(evaluation);
        let (body_a, body_b, sensor) = (contact.body_a, contact.body_b, contact.sensor);

        if update.touching != update.was_touching {
            for body in [body_a, body_b] {
                if let Some(body) = self.bodies.get_mut(body) {
                    body.set_awake_flag(true);
                }
            }
        }

        let Some(listener) = self.contact_listener.clone() else {
            return;
        };
        if !update.was_touching && update.touching {
            log::debug!("begin contact {id:?}");
            listener.begin_contact(self, id);
        }
        if update.was_touching && !update.touching {
            log::debug!("end contact {id:?}");
            listener.end_contact(self, id);
        }
        if !sensor && update.touching {
            listener.pre_solve(self, id, &update.old_manifold);
        }
    }

    /// Re-evaluates one contact at the bodies' current transforms.
    pub(crate) fn update_contact(&mut self, id: ContactId) {
        let iterations = self.step_conf.max_distance_iterations;
        let evaluation = self
            .collision
            .contacts
            .get(id)
            .and_then(|c| evaluate(c, &self.bodies, &self.shapes, iterations));
        if let Some(evaluation) = evaluation {
            self.apply_evaluation(id, evaluation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collision::aabb::Aabb,
        core::{collider::ShapeDef, rigidbody::BodyDef, types::Filter},
    };
    use glam::Vec2;

    struct Fixture {
        bodies: Arena<BodyId, Body>,
        shapes: Arena<ShapeId, Shape>,
        joints: Arena<JointId, Joint>,
        manager: CollisionManager,
    }

    impl Fixture {
        fn new(max_contacts: usize) -> Self {
            Self {
                bodies: Arena::new(),
                shapes: Arena::new(),
                joints: Arena::new(),
                manager: CollisionManager::new(0.1, max_contacts),
            }
        }

        fn add(&mut self, def: BodyDef, shape: ShapeDef) -> BodyId {
            let shape = self.shapes.insert(Shape::new(shape).unwrap());
            let body = self.bodies.insert(Body::new(&def));
            let xf = self.bodies.get(body).unwrap().transform;
            let aabb: Aabb = self.shapes.get(shape).unwrap().compute_aabb(0, &xf);
            self.manager.broad_phase.create_proxy(
                &aabb,
                ProxyData {
                    body,
                    shape,
                    child: 0,
                },
            );
            self.bodies.get_mut(body).unwrap().shapes.push(shape);
            body
        }

        fn find(&mut self) -> PreStepStats {
            let mut stats = PreStepStats::default();
            self.manager
                .find_new_contacts(&mut self.bodies, &self.shapes, &self.joints, &mut stats);
            stats
        }
    }

    #[test]
    fn overlapping_dynamic_pair_creates_one_contact() {
        let mut fx = Fixture::new(16);
        let a = fx.add(BodyDef::dynamic(), ShapeDef::disk(0.5));
        let b = fx.add(
            BodyDef::dynamic().with_position(Vec2::new(0.8, 0.0)),
            ShapeDef::disk(0.5),
        );
        let stats = fx.find();
        assert_eq!(stats.contacts_added, 1);
        assert_eq!(fx.bodies.get(a).unwrap().contacts().len(), 1);
        assert_eq!(fx.bodies.get(b).unwrap().contacts().len(), 1);

        // The same pair is never registered twice.
        let again = fx.find();
        assert_eq!(again.contacts_added, 0);
    }

    #[test]
    fn static_pairs_and_filtered_pairs_are_ignored() {
        let mut fx = Fixture::new(16);
        fx.add(BodyDef::static_body(), ShapeDef::disk(0.5));
        fx.add(BodyDef::static_body(), ShapeDef::disk(0.5));
        let none = Filter {
            mask_bits: 0,
            ..Filter::default()
        };
        fx.add(BodyDef::dynamic(), ShapeDef::disk(0.5).with_filter(none));
        assert_eq!(fx.find().contacts_added, 0);
    }

    #[test]
    fn capacity_overflow_is_counted_not_fatal() {
        let mut fx = Fixture::new(1);
        for _ in 0..3 {
            fx.add(BodyDef::dynamic(), ShapeDef::disk(0.5));
        }
        let stats = fx.find();
        assert_eq!(stats.contacts_added, 1);
        assert_eq!(stats.contacts_ignored, 2);
        assert_eq!(fx.manager.contacts.len(), 1);
    }

    #[test]
    fn removing_unlinks_both_bodies() {
        let mut fx = Fixture::new(16);
        let a = fx.add(BodyDef::dynamic(), ShapeDef::disk(0.5));
        let b = fx.add(BodyDef::dynamic(), ShapeDef::disk(0.5));
        fx.find();
        let id = fx.bodies.get(a).unwrap().contacts()[0];
        let removed = fx.manager.remove_contact(id, &mut fx.bodies).unwrap();
        assert!(fx.bodies.get(a).unwrap().contacts().is_empty());
        assert!(fx.bodies.get(b).unwrap().contacts().is_empty());
        assert!(fx.manager.remove_contact(id, &mut fx.bodies).is_none());

        // With the pair index cleared the broad-phase pair can be re-created.
        fx.manager.broad_phase.touch_proxy(removed.proxy_a);
        assert_eq!(fx.find().contacts_added, 1);
    }
}
