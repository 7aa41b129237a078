use serde::{Deserialize, Serialize};

/// Contact registry activity before solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreStepStats {
    /// Broad-phase proxies whose fat AABB had to be re-inserted.
    pub proxies_moved: u32,
    pub contacts_added: u32,
    pub contacts_destroyed: u32,
    /// Contacts whose manifold was recomputed.
    pub contacts_updated: u32,
    /// Contacts left alone because neither body was awake.
    pub contacts_skipped: u32,
    /// Candidate pairs dropped because the contact capacity was reached.
    pub contacts_ignored: u32,
}

/// Regular (discrete) island solving.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegStepStats {
    pub islands_found: u32,
    pub islands_solved: u32,
    pub sum_position_iterations: u32,
    pub sum_velocity_iterations: u32,
    pub bodies_slept: u32,
    pub proxies_moved: u32,
    pub min_separation: f32,
    pub max_incremental_impulse: f32,
}

impl Default for RegStepStats {
    fn default() -> Self {
        Self {
            islands_found: 0,
            islands_solved: 0,
            sum_position_iterations: 0,
            sum_velocity_iterations: 0,
            bodies_slept: 0,
            proxies_moved: 0,
            min_separation: f32::INFINITY,
            max_incremental_impulse: 0.0,
        }
    }
}

/// Continuous collision sub-stepping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToiStepStats {
    pub islands_found: u32,
    pub islands_solved: u32,
    /// Time-of-impact queries run.
    pub contacts_found: u32,
    /// Contacts skipped because they already used all their sub-steps.
    pub contacts_at_max_sub_steps: u32,
    /// Contacts re-evaluated at an impact time.
    pub contacts_updated_toi: u32,
    pub contacts_updated_touching: u32,
    pub contacts_skipped_touching: u32,
    pub sum_position_iterations: u32,
    pub sum_velocity_iterations: u32,
    pub max_distance_iterations: u32,
    pub max_toi_iterations: u32,
    pub max_root_iterations: u32,
    /// Root finder gave up; a conservative time was used instead.
    pub toi_failures: u32,
    pub sub_steps: u32,
    pub proxies_moved: u32,
    pub min_separation: f32,
    pub max_incremental_impulse: f32,
}

impl Default for ToiStepStats {
    fn default() -> Self {
        Self {
            islands_found: 0,
            islands_solved: 0,
            contacts_found: 0,
            contacts_at_max_sub_steps: 0,
            contacts_updated_toi: 0,
            contacts_updated_touching: 0,
            contacts_skipped_touching: 0,
            sum_position_iterations: 0,
            sum_velocity_iterations: 0,
            max_distance_iterations: 0,
            max_toi_iterations: 0,
            max_root_iterations: 0,
            toi_failures: 0,
            sub_steps: 0,
            proxies_moved: 0,
            min_separation: f32::INFINITY,
            max_incremental_impulse: 0.0,
        }
    }
}

/// Everything [`crate::world::PhysicsWorld::step`] reports about one step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepStats {
    pub pre: PreStepStats,
    pub reg: RegStepStats,
    pub toi: ToiStepStats,
}

impl StepStats {
    /// True when continuous collision ran out of sub-steps or root-finder
    /// iterations, i.e. some fast body may have tunneled this step.
    pub fn tunneling_risk(&self) -> bool {
        self.toi.contacts_at_max_sub_steps > 0 || self.toi.toi_failures > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_neutral_extremes() {
        let stats = StepStats::default();
        assert_eq!(stats.reg.min_separation, f32::INFINITY);
        assert_eq!(stats.toi.max_incremental_impulse, 0.0);
        assert!(!stats.tunneling_risk());

        let risky = StepStats {
            toi: ToiStepStats {
                toi_failures: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(risky.tunneling_risk());
    }
}
