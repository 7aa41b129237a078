//! Utility helpers including math extensions, allocators, logging, and profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;

pub use allocator::{Arena, ArenaId, BodyId, ContactId, GenerationalId, JointId, ShapeId};
pub use math::*;
pub use profiling::StepProfile;
