//! Listener hooks fired synchronously during world updates.

use parking_lot::Mutex;

use super::PhysicsWorld;
use crate::{
    collision::contact::Manifold,
    core::constraints::Joint,
    dynamics::solver::ContactImpulse,
    utils::allocator::{ContactId, JointId},
};

/// Receives contact notifications while the world is stepping.
///
/// Callbacks get the world itself. Reads, queries and non-topology setters
/// (velocities, forces, contact enabling) work as usual. Creating or
/// destroying bodies, shapes or joints fails with
/// [`crate::PhysicsError::WorldLocked`] until the step returns.
pub trait ContactListener: Send + Sync {
    /// Two shapes started touching.
    fn begin_contact(&self, _world: &mut PhysicsWorld, _contact: ContactId) {}

    /// Two shapes stopped touching, or their contact is being destroyed while touching.
    fn end_contact(&self, _world: &mut PhysicsWorld, _contact: ContactId) {}

    /// Called after a touching contact is updated and before it is solved.
    /// `old_manifold` is the manifold from the previous update.
    fn pre_solve(&self, _world: &mut PhysicsWorld, _contact: ContactId, _old_manifold: &Manifold) {}

    /// Called after the solver ran, with the impulses it applied.
    fn post_solve(&self, _world: &mut PhysicsWorld, _contact: ContactId, _impulse: &ContactImpulse) {}
}

/// Notified when joints go away implicitly, i.e. together with one of their bodies.
pub trait DestructionListener: Send + Sync {
    fn joint_destroyed(&self, id: JointId, joint: &Joint);
}

/// One recorded contact notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactEvent {
    Begin(ContactId),
    End(ContactId),
    PreSolve(ContactId),
    PostSolve(ContactId, ContactImpulse),
}

impl ContactEvent {
    pub fn contact(&self) -> ContactId {
        match *self {
            ContactEvent::Begin(id)
            | ContactEvent::End(id)
            | ContactEvent::PreSolve(id)
            | ContactEvent::PostSolve(id, _) => id,
        }
    }
}

/// Contact listener that records every notification, for hosts that prefer
/// polling events after a step over reacting inside callbacks.
#[derive(Debug, Default)]
pub struct ContactEventLog {
    events: Mutex<Vec<ContactEvent>>,
    record_solver_events: bool,
}

impl ContactEventLog {
    /// Records begin/end events only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records pre- and post-solve events as well.
    pub fn with_solver_events() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            record_solver_events: true,
        }
    }

    /// Takes all events recorded so far.
    pub fn drain(&self) -> Vec<ContactEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn push(&self, event: ContactEvent) {
        self.events.lock().push(event);
    }
}

impl ContactListener for ContactEventLog {
    fn begin_contact(&self, _world: &mut PhysicsWorld, contact: ContactId) {
        self.push(ContactEvent::Begin(contact));
    }

    fn end_contact(&self, _world: &mut PhysicsWorld, contact: ContactId) {
        self.push(ContactEvent::End(contact));
    }

    fn pre_solve(&self, _world: &mut PhysicsWorld, contact: ContactId, _old_manifold: &Manifold) {
        if self.record_solver_events {
            self.push(ContactEvent::PreSolve(contact));
        }
    }

    fn post_solve(&self, _world: &mut PhysicsWorld, contact: ContactId, impulse: &ContactImpulse) {
        if self.record_solver_events {
            self.push(ContactEvent::PostSolve(contact, *impulse));
        }
    }
}

/// Destruction listener that records implicitly destroyed joints.
#[derive(Debug, Default)]
pub struct DestructionLog {
    joints: Mutex<Vec<JointId>>,
}

impl DestructionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn joints(&self) -> Vec<JointId> {
        self.joints.lock().clone()
    }
}

impl DestructionListener for DestructionLog {
    fn joint_destroyed(&self, id: JointId, _joint: &Joint) {
        self.joints.lock().push(id);
    }
}
