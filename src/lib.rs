//! Impulse2D – deterministic fixed-step 2D rigid-body physics for Rust.
//!
//! The crate is built around a [`PhysicsWorld`] owning bodies, shapes,
//! joints and contacts behind typed handles. Each step runs a dynamic-tree
//! broad-phase, GJK-based narrow-phase, an island sequential-impulse solver
//! with warm starting and sleep, and time-of-impact sub-stepping for fast
//! bodies. [`PhysicsEngine`] adds a fixed-timestep accumulator on top.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

use std::time::Instant;

pub use glam::Vec2;

pub use collision::{
    aabb::Aabb,
    contact::{Contact, Manifold, WorldManifold},
    queries::{ProxyHit, RayCastAction, RayHit},
};
pub use config::{StepConf, WorldConf};
pub use crate::core::{
    collider::{Shape, ShapeDef, ShapeGeometry},
    constraints::{
        DistanceJointDef, FrictionJointDef, Joint, JointDef, JointKind, RevoluteJointDef,
        RopeJointDef, TargetJointDef, WeldJointDef,
    },
    rigidbody::{Body, BodyDef, BodyType},
    types::{Filter, MassData, Transform, Velocity},
};
pub use dynamics::solver::ContactImpulse;
pub use error::{PhysicsError, PhysicsResult};
pub use utils::allocator::{BodyId, ContactId, JointId, ShapeId};
pub use world::{
    ContactEvent, ContactEventLog, ContactListener, DestructionListener, DestructionLog,
    PhysicsWorld, StepStats, WorldPhase,
};

use utils::logging::warn_if_step_budget_exceeded;

/// Upper bound on fixed steps run for one frame, so a long stall does not
/// snowball into ever longer frames.
pub const MAX_STEPS_PER_FRAME: u32 = 8;

/// High-level convenience wrapper that owns a [`PhysicsWorld`] and advances
/// it in fixed increments of wall-clock time.
pub struct PhysicsEngine {
    world: PhysicsWorld,
    time_step: f32,
    accumulator: f32,
    velocity_iterations: u32,
    position_iterations: u32,
    budget_ms: Option<f32>,
    last_stats: StepStats,
}

impl PhysicsEngine {
    /// Creates a new physics engine with the provided fixed timestep.
    pub fn new(conf: WorldConf, time_step: f32) -> PhysicsResult<Self> {
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(PhysicsError::InvalidArgument(format!(
                "time step must be positive, got {time_step}"
            )));
        }
        Ok(Self {
            velocity_iterations: conf.step.velocity_iterations,
            position_iterations: conf.step.position_iterations,
            world: PhysicsWorld::new(conf),
            time_step,
            accumulator: 0.0,
            budget_ms: None,
            last_stats: StepStats::default(),
        })
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    pub fn set_iterations(&mut self, velocity: u32, position: u32) {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
    }

    /// Warn when a single fixed step takes longer than `budget_ms`.
    pub fn set_step_budget(&mut self, budget_ms: Option<f32>) {
        self.budget_ms = budget_ms;
    }

    /// Enables or disables parallel narrow-phase evaluation.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.world.set_parallel_enabled(enabled);
    }

    /// Returns whether the engine is currently using parallel execution.
    pub fn parallel_enabled(&self) -> bool {
        self.world.parallel_enabled()
    }

    /// Statistics of the most recent fixed step.
    pub fn last_stats(&self) -> &StepStats {
        &self.last_stats
    }

    /// Fraction of a fixed step left in the accumulator, for rendering
    /// interpolation between the last two states.
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.time_step
    }

    /// Feeds `frame_dt` seconds of wall-clock time and runs as many fixed
    /// steps as fit. Returns the number of steps taken.
    pub fn advance(&mut self, frame_dt: f32) -> u32 {
        if !frame_dt.is_finite() || frame_dt < 0.0 {
            log::warn!("ignoring invalid frame time {frame_dt}");
            return 0;
        }
        self.accumulator += frame_dt;

        let mut steps = 0;
        while self.accumulator >= self.time_step {
            if steps == MAX_STEPS_PER_FRAME {
                log::warn!(
                    "dropping {:.3} s of simulation time after {steps} steps",
                    self.accumulator
                );
                self.accumulator = 0.0;
                break;
            }
            let start = Instant::now();
            self.last_stats = self.world.step(
                self.time_step,
                self.velocity_iterations,
                self.position_iterations,
            );
            if let Some(budget) = self.budget_ms {
                warn_if_step_budget_exceeded(start.elapsed(), budget);
            }
            self.accumulator -= self.time_step;
            steps += 1;
        }
        steps
    }
}
