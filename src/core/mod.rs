//! Core entity types: bodies, shapes, joints and the shared math value types.

pub mod collider;
pub mod constraints;
pub mod rigidbody;
pub mod types;

pub use collider::{Shape, ShapeDef, ShapeGeometry};
pub use constraints::{
    DistanceJointDef, FrictionJointDef, Joint, JointDef, JointKind, LimitState, RevoluteJointDef,
    RopeJointDef, TargetJointDef, WeldJointDef,
};
pub use rigidbody::{Body, BodyDef, BodyType};
pub use types::{Filter, MassData, Position, Rot, Sweep, Transform, Velocity};
