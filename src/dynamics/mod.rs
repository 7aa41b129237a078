//! Simulation dynamics: integration, contact and joint solvers, and islands.

pub mod integrator;
pub mod island;
pub mod joints;
pub mod solver;

use crate::{
    config::StepConf,
    core::types::{Position, Velocity},
};

pub use island::Island;

/// Island-local state shared by the contact and joint solvers during one solve.
pub(crate) struct SolverData<'a> {
    pub step: &'a StepConf,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}
