//! Error types for world mutation and creation calls.

use thiserror::Error;

/// Errors surfaced by topology-changing world operations.
///
/// Stepping never fails; numerical trouble inside a step is recovered locally
/// and reported through [`crate::world::StepStats`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PhysicsError {
    /// The handle does not name a live entity (destroyed or never created).
    #[error("invalid {kind} handle (slot {index})")]
    InvalidHandle {
        /// Entity kind the handle refers to.
        kind: &'static str,
        /// Arena slot of the stale handle.
        index: usize,
    },

    /// A definition or argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A fixed-capacity limit of the world would be exceeded.
    #[error("{kind} capacity of {limit} exceeded")]
    CapacityExceeded {
        /// Entity kind whose capacity ran out.
        kind: &'static str,
        /// Configured limit.
        limit: usize,
    },

    /// Topology mutation attempted while the world is stepping.
    #[error("world is locked while stepping")]
    WorldLocked,

    /// The shape is already attached to the body.
    #[error("shape is already attached to this body")]
    AlreadyAttached,

    /// The shape is not attached to the body.
    #[error("shape is not attached to this body")]
    NotAttached,
}

impl PhysicsError {
    pub(crate) fn invalid_handle<I: crate::utils::allocator::ArenaId>(id: I) -> Self {
        Self::InvalidHandle {
            kind: I::KIND,
            index: id.index(),
        }
    }
}

/// Convenient Result type alias for world operations.
pub type PhysicsResult<T> = Result<T, PhysicsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::BodyId;

    #[test]
    fn error_display_names_the_entity_kind() {
        let err = PhysicsError::invalid_handle(BodyId::from_index(7));
        assert_eq!(err.to_string(), "invalid body handle (slot 7)");

        let err = PhysicsError::CapacityExceeded {
            kind: "joint",
            limit: 4,
        };
        assert!(err.to_string().contains("joint capacity of 4"));
    }

    #[test]
    fn locked_error_is_distinguishable() {
        assert_ne!(
            PhysicsError::WorldLocked,
            PhysicsError::InvalidArgument("x".into())
        );
    }
}
