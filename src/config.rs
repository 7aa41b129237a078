//! Global configuration constants and per-step tunables for the engine.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 2] = [0.0, -10.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Default number of velocity iterations per regular step.
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 8;

/// Default number of position iterations per regular step.
pub const DEFAULT_POSITION_ITERATIONS: u32 = 3;

/// Collision and constraint tolerance (meters).
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular collision and constraint tolerance (radians).
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * PI;

/// Default skin radius for polygon-like shapes.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Fattening margin applied to broad-phase AABBs.
pub const AABB_EXTENSION: f32 = 0.1;

/// Scales the displacement prediction added to moving broad-phase AABBs.
pub const AABB_MULTIPLIER: f32 = 2.0;

/// Maximum linear position correction used when solving constraints.
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Maximum angular position correction used when solving constraints.
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * PI;

/// Maximum linear translation of a body per step.
pub const MAX_TRANSLATION: f32 = 2.0;

/// Maximum rotation of a body per step.
pub const MAX_ROTATION: f32 = 0.5 * PI;

/// Fraction of overlap resolved per regular position iteration.
pub const BAUMGARTE: f32 = 0.2;

/// Fraction of overlap resolved per TOI position iteration.
pub const TOI_BAUMGARTE: f32 = 0.75;

/// Relative speed below which collisions are treated as inelastic.
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Time a body must be still before it is put to sleep.
pub const TIME_TO_SLEEP: f32 = 0.5;

/// Linear speed below which a body may fall asleep.
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// Angular speed below which a body may fall asleep.
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * PI;

/// Maximum number of sub-steps per contact in continuous collision.
pub const MAX_SUB_STEPS: u32 = 8;

/// Maximum number of contacts gathered into a single TOI island.
pub const MAX_TOI_CONTACTS: usize = 32;

/// Iteration caps for the time-of-impact root search.
pub const MAX_TOI_ITERATIONS: u32 = 20;
pub const MAX_TOI_ROOT_ITERATIONS: u32 = 50;

/// Iteration cap for the GJK distance routine.
pub const MAX_DISTANCE_ITERATIONS: u32 = 20;

/// Default fixed-capacity limits of a world.
pub const DEFAULT_MAX_BODIES: usize = 1 << 16;
pub const DEFAULT_MAX_SHAPES: usize = 1 << 16;
pub const DEFAULT_MAX_JOINTS: usize = 1 << 16;
pub const DEFAULT_MAX_CONTACTS: usize = 1 << 18;

/// Per-step tunables for a single call to [`crate::world::PhysicsWorld::step`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConf {
    /// Step duration in seconds. Zero refreshes contacts without integrating.
    pub dt: f32,
    /// Ratio of this step's dt to the previous one, used to scale warm starts.
    pub dt_ratio: f32,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub toi_velocity_iterations: u32,
    pub toi_position_iterations: u32,
    pub linear_slop: f32,
    pub angular_slop: f32,
    pub max_linear_correction: f32,
    pub max_angular_correction: f32,
    pub max_translation: f32,
    pub max_rotation: f32,
    /// Baumgarte-style resolution rate for regular position iterations.
    pub resolution_rate: f32,
    /// Resolution rate for TOI position iterations.
    pub toi_resolution_rate: f32,
    pub velocity_threshold: f32,
    pub linear_sleep_tolerance: f32,
    pub angular_sleep_tolerance: f32,
    pub time_to_sleep: f32,
    pub allow_sleep: bool,
    pub warm_starting: bool,
    pub continuous_physics: bool,
    /// Solve one TOI event per step and leave the rest to the next step.
    pub sub_stepping: bool,
    pub max_sub_steps: u32,
    pub max_toi_iterations: u32,
    pub max_toi_root_iterations: u32,
    pub max_distance_iterations: u32,
    pub clear_forces: bool,
}

impl Default for StepConf {
    fn default() -> Self {
        Self {
            dt: DEFAULT_TIME_STEP,
            dt_ratio: 1.0,
            velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            position_iterations: DEFAULT_POSITION_ITERATIONS,
            toi_velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            toi_position_iterations: 20,
            linear_slop: LINEAR_SLOP,
            angular_slop: ANGULAR_SLOP,
            max_linear_correction: MAX_LINEAR_CORRECTION,
            max_angular_correction: MAX_ANGULAR_CORRECTION,
            max_translation: MAX_TRANSLATION,
            max_rotation: MAX_ROTATION,
            resolution_rate: BAUMGARTE,
            toi_resolution_rate: TOI_BAUMGARTE,
            velocity_threshold: VELOCITY_THRESHOLD,
            linear_sleep_tolerance: LINEAR_SLEEP_TOLERANCE,
            angular_sleep_tolerance: ANGULAR_SLEEP_TOLERANCE,
            time_to_sleep: TIME_TO_SLEEP,
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            max_sub_steps: MAX_SUB_STEPS,
            max_toi_iterations: MAX_TOI_ITERATIONS,
            max_toi_root_iterations: MAX_TOI_ROOT_ITERATIONS,
            max_distance_iterations: MAX_DISTANCE_ITERATIONS,
            clear_forces: true,
        }
    }
}

impl StepConf {
    /// Inverse of the step duration, zero for a zero-length step.
    pub fn inv_dt(&self) -> f32 {
        if self.dt > 0.0 {
            1.0 / self.dt
        } else {
            0.0
        }
    }

    pub fn with_dt(mut self, dt: f32) -> Self {
        self.dt = dt;
        self
    }

    pub fn with_iterations(mut self, velocity: u32, position: u32) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }
}

/// World-wide settings fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConf {
    pub gravity: glam::Vec2,
    pub max_bodies: usize,
    pub max_shapes: usize,
    pub max_joints: usize,
    pub max_contacts: usize,
    /// Fattening margin of broad-phase AABBs.
    pub aabb_extension: f32,
    /// Template used by [`crate::world::PhysicsWorld::step`].
    pub step: StepConf,
}

impl Default for WorldConf {
    fn default() -> Self {
        Self {
            gravity: glam::Vec2::from_array(DEFAULT_GRAVITY),
            max_bodies: DEFAULT_MAX_BODIES,
            max_shapes: DEFAULT_MAX_SHAPES,
            max_joints: DEFAULT_MAX_JOINTS,
            max_contacts: DEFAULT_MAX_CONTACTS,
            aabb_extension: AABB_EXTENSION,
            step: StepConf::default(),
        }
    }
}
