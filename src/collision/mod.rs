//! Collision detection: broad-phase tree, GJK distance, manifolds, queries and time of impact.

pub mod aabb;
pub mod broadphase;
pub mod ccd;
pub mod clipping;
pub mod contact;
pub mod distance;
pub mod narrowphase;
pub mod queries;
pub mod shapes;

pub use aabb::Aabb;
pub use broadphase::{BroadPhase, DynamicTree};
pub use ccd::{time_of_impact, ToiConf, ToiOutput, ToiState};
pub use contact::{
    get_point_states, Contact, ContactFeature, FeatureType, Manifold, ManifoldKind,
    ManifoldPoint, PointState, WorldManifold,
};
pub use distance::{distance, test_overlap, DistanceOutput, DistanceState, SimplexCache};
pub use narrowphase::collide_shapes;
pub use queries::{ProxyHit, RayCastAction, RayCastInput, RayCastOutput, RayHit};
pub use shapes::DistanceProxy;
