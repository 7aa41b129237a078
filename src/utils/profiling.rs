use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Wall-clock timing of the phases of the most recent world step.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct StepProfile {
    pub collide_time: Duration,
    pub solve_time: Duration,
    pub toi_time: Duration,
    pub total_time: Duration,

    pub body_count: usize,
    pub contact_count: usize,
    pub joint_count: usize,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Logs a phase breakdown at debug level.
    pub fn report(&self) {
        let total_us = self.total_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        let share = |d: Duration| (d.as_micros() as f32 / total_us) * 100.0;
        log::debug!(
            "step: bodies={} contacts={} joints={} total={:.3} ms | collide {:.1}% | solve {:.1}% | toi {:.1}%",
            self.body_count,
            self.contact_count,
            self.joint_count,
            self.total_time.as_secs_f32() * 1000.0,
            share(self.collide_time),
            share(self.solve_time),
            share(self.toi_time),
        );
    }
}

/// Accumulates the lifetime of the timer into the referenced duration.
pub struct PhaseTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for PhaseTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
