//! Island solving for a whole step, plus the continuous-collision loop that
//! follows it.

use glam::Vec2;

use super::{
    stats::{PreStepStats, RegStepStats, ToiStepStats},
    PhysicsWorld,
};
use crate::{
    collision::ccd::{time_of_impact, ToiConf, ToiState},
    config::{StepConf, MAX_TOI_CONTACTS},
    dynamics::island::{Island, IslandReport},
    utils::{
        allocator::{BodyId, ContactId},
        logging::ScopedTimer,
    },
};

impl PhysicsWorld {
    /// Builds islands from awake bodies in slot order and solves each one.
    pub(crate) fn solve_islands(
        &mut self,
        step: &StepConf,
        stats: &mut RegStepStats,
        pre: &mut PreStepStats,
    ) {
        let _timer = ScopedTimer::new("islands::solve");

        for body in self.bodies.values_mut() {
            body.in_island = false;
            body.swept = false;
        }
        for contact in self.collision.contacts.values_mut() {
            contact.in_island = false;
        }
        for joint in self.joints.values_mut() {
            joint.in_island = false;
        }
        self.wake_kinematic_neighbours();

        let mut island = std::mem::take(&mut self.island);
        for seed in self.bodies.ids() {
            let Some(body) = self.bodies.get(seed) else {
                continue;
            };
            if body.in_island || !body.awake || !body.enabled || !body.is_dynamic() {
                continue;
            }
            self.solve_island(&mut island, seed, step, stats);
        }

        // Kinematic bodies no island reached still have to move.
        for seed in self.bodies.ids() {
            let Some(body) = self.bodies.get(seed) else {
                continue;
            };
            if body.swept || !body.awake || !body.enabled || !body.is_speedable() {
                continue;
            }
            self.solve_island(&mut island, seed, step, stats);
        }
        self.island = island;

        {
            let _timer = ScopedTimer::new("broadphase::synchronize");
            for id in self.bodies.ids() {
                if self.bodies.get(id).is_some_and(|b| b.swept) {
                    stats.proxies_moved += self.synchronize_body(id);
                }
            }
        }
        self.find_new_contacts(pre);
    }

    fn solve_island(
        &mut self,
        island: &mut Island,
        seed: BodyId,
        step: &StepConf,
        stats: &mut RegStepStats,
    ) {
        island.clear();
        island.flood_fill(
            seed,
            &mut self.bodies,
            &mut self.collision.contacts,
            &mut self.joints,
        );
        stats.islands_found += 1;

        let report = island.solve(
            step,
            self.gravity,
            &mut self.bodies,
            &mut self.collision.contacts,
            &mut self.joints,
            &self.shapes,
        );
        stats.sum_velocity_iterations += report.velocity_iterations;
        stats.sum_position_iterations += report.position_iterations;
        stats.bodies_slept += report.bodies_slept;
        stats.min_separation = stats.min_separation.min(report.min_separation);
        stats.max_incremental_impulse = stats
            .max_incremental_impulse
            .max(report.max_incremental_impulse);
        if report.solved {
            stats.islands_solved += 1;
        }

        self.report_impulses(island);

        // Static and kinematic bodies may take part in several islands.
        for id in island.bodies() {
            if let Some(body) = self.bodies.get_mut(*id) {
                if !body.is_dynamic() {
                    body.in_island = false;
                }
            }
        }
    }

    /// Islands do not spread through kinematic bodies, so a moving one wakes
    /// whatever rests on it or is jointed to it.
    fn wake_kinematic_neighbours(&mut self) {
        let mut woken = Vec::new();
        for body in self.bodies.values() {
            let moving = body.velocity.linear != Vec2::ZERO || body.velocity.angular != 0.0;
            if !body.awake || !body.enabled || body.is_dynamic() || !moving {
                continue;
            }
            let contacts = body
                .contacts
                .iter()
                .filter_map(|c| self.collision.contacts.get(*c));
            for contact in contacts {
                if contact.enabled && contact.touching && !contact.sensor {
                    woken.push(contact.body_a);
                    woken.push(contact.body_b);
                }
            }
            for joint in body.joints.iter().filter_map(|j| self.joints.get(*j)) {
                woken.push(joint.body_a);
                woken.push(joint.body_b);
            }
        }
        for id in woken {
            if let Some(body) = self.bodies.get_mut(id) {
                body.set_awake_flag(true);
            }
        }
    }

    fn report_impulses(&mut self, island: &Island) {
        let Some(listener) = self.contact_listener.clone() else {
            return;
        };
        for (id, impulse) in island.impulses() {
            listener.post_solve(self, *id, impulse);
        }
    }

    /// Moves a body's proxies to cover its sweep from `c0` to the current pose.
    /// Returns how many proxies had to be re-inserted.
    pub(crate) fn synchronize_body(&mut self, id: BodyId) -> u32 {
        let Some(body) = self.bodies.get(id) else {
            return 0;
        };
        let xf1 = body.sweep.transform_at(0.0);
        let xf2 = body.transform;
        let displacement = xf2.position - xf1.position;

        let mut moved = 0;
        for proxy in &body.proxies {
            let Some(shape) = self.shapes.get(proxy.shape) else {
                continue;
            };
            let aabb = shape
                .compute_aabb(proxy.child, &xf1)
                .union(&shape.compute_aabb(proxy.child, &xf2));
            if self
                .collision
                .broad_phase
                .move_proxy(proxy.proxy_id, &aabb, displacement)
            {
                moved += 1;
            }
        }
        moved
    }

    /// Finds the earliest time of impact, rewinds the two bodies to it, solves
    /// a small island around them for the rest of the step, and repeats until
    /// no impact remains.
    pub(crate) fn solve_toi(
        &mut self,
        step: &StepConf,
        stats: &mut ToiStepStats,
        pre: &mut PreStepStats,
    ) {
        let _timer = ScopedTimer::new("toi::solve");
        let conf = ToiConf::from_step(step);

        if self.step_complete {
            for body in self.bodies.values_mut() {
                body.in_island = false;
                body.sweep.alpha0 = 0.0;
            }
            for contact in self.collision.contacts.values_mut() {
                contact.in_island = false;
                contact.toi = None;
                contact.toi_count = 0;
            }
        }

        let mut island = std::mem::take(&mut self.island);
        loop {
            let Some((min_contact, min_alpha)) = self.find_min_toi(step, &conf, stats) else {
                self.step_complete = true;
                break;
            };

            if !self.advance_toi_pair(step, min_contact, min_alpha, stats) {
                continue;
            }

            self.gather_toi_island(&mut island, min_contact, min_alpha, stats);

            let sub_step = StepConf {
                dt: (1.0 - min_alpha) * step.dt,
                dt_ratio: 1.0,
                warm_starting: false,
                ..*step
            };
            let report = island.solve_toi(
                &sub_step,
                0,
                1,
                &mut self.bodies,
                &self.collision.contacts,
                &self.shapes,
            );
            accumulate_toi(stats, &report);
            self.report_impulses(&island);

            // Displaced bodies invalidate the impact times of all their contacts.
            for id in island.bodies() {
                let Some(body) = self.bodies.get_mut(*id) else {
                    continue;
                };
                body.in_island = false;
                if !body.is_dynamic() {
                    continue;
                }
                let contacts = body.contacts.clone();
                stats.proxies_moved += self.synchronize_body(*id);
                for contact_id in contacts {
                    if let Some(contact) = self.collision.contacts.get_mut(contact_id) {
                        contact.in_island = false;
                        contact.toi = None;
                    }
                }
            }

            self.find_new_contacts(pre);

            if step.sub_stepping {
                self.step_complete = false;
                break;
            }
        }
        self.island = island;

        if stats.contacts_at_max_sub_steps > 0 {
            log::warn!(
                "{} contacts hit the cap of {} sub-steps",
                stats.contacts_at_max_sub_steps,
                step.max_sub_steps
            );
        }
    }

    /// Earliest impact among all contacts, caching each contact's result for the step.
    fn find_min_toi(
        &mut self,
        step: &StepConf,
        conf: &ToiConf,
        stats: &mut ToiStepStats,
    ) -> Option<(ContactId, f32)> {
        let mut min_contact = None;
        let mut min_alpha = 1.0;

        for id in self.collision.contacts.ids() {
            let Some(contact) = self.collision.contacts.get(id) else {
                continue;
            };
            if !contact.enabled {
                continue;
            }
            if contact.toi_count > step.max_sub_steps {
                continue;
            }

            let alpha = match contact.toi {
                Some(alpha) => alpha,
                None => match self.compute_toi(id, conf, stats) {
                    Some(alpha) => alpha,
                    None => continue,
                },
            };
            if alpha < min_alpha {
                min_contact = Some(id);
                min_alpha = alpha;
            }
        }

        match min_contact {
            Some(id) if min_alpha < 1.0 - 10.0 * f32::EPSILON => Some((id, min_alpha)),
            _ => None,
        }
    }

    /// Runs time of impact for one contact and caches the result. `None` means
    /// the pair does not need continuous treatment right now.
    fn compute_toi(
        &mut self,
        id: ContactId,
        conf: &ToiConf,
        stats: &mut ToiStepStats,
    ) -> Option<f32> {
        let contact = self.collision.contacts.get(id)?;
        if contact.sensor {
            return None;
        }
        let (shape_a, child_a) = (contact.shape_a, contact.child_a);
        let (shape_b, child_b) = (contact.shape_b, contact.child_b);

        let (body_a, body_b) = self.bodies.get2_mut(contact.body_a, contact.body_b)?;
        let active_a = body_a.awake && body_a.is_speedable();
        let active_b = body_b.awake && body_b.is_speedable();
        if !active_a && !active_b {
            return None;
        }
        // Two plain dynamic bodies are left to the discrete solver.
        if !body_a.is_impenetrable() && !body_b.is_impenetrable() {
            return None;
        }

        // Bring both sweeps to the same start time.
        let mut alpha0 = body_a.sweep.alpha0;
        if body_a.sweep.alpha0 < body_b.sweep.alpha0 {
            alpha0 = body_b.sweep.alpha0;
            body_a.sweep.advance(alpha0);
        } else if body_b.sweep.alpha0 < body_a.sweep.alpha0 {
            alpha0 = body_a.sweep.alpha0;
            body_b.sweep.advance(alpha0);
        }

        let proxy_a = self.shapes.get(shape_a)?.distance_proxy(child_a);
        let proxy_b = self.shapes.get(shape_b)?.distance_proxy(child_b);
        let output = time_of_impact(proxy_a, &body_a.sweep, proxy_b, &body_b.sweep, conf);

        stats.contacts_found += 1;
        stats.max_toi_iterations = stats.max_toi_iterations.max(output.iterations);
        stats.max_root_iterations = stats.max_root_iterations.max(output.max_root_iterations);
        stats.max_distance_iterations = stats
            .max_distance_iterations
            .max(output.max_distance_iterations);

        let beta = output.t;
        let alpha = match output.state {
            ToiState::Touching => (alpha0 + (1.0 - alpha0) * beta).min(1.0),
            ToiState::Failed => {
                stats.toi_failures += 1;
                log::warn!("time of impact did not converge for {id:?}, using t = {beta}");
                (alpha0 + (1.0 - alpha0) * beta).min(1.0)
            }
            ToiState::Overlapped | ToiState::Separated => 1.0,
        };

        if let Some(contact) = self.collision.contacts.get_mut(id) {
            contact.toi = Some(alpha);
        }
        Some(alpha)
    }

    /// Moves the two bodies of the impact contact to `alpha` and refreshes it.
    /// Returns false, with the sweeps restored, when the contact turns out not
    /// to touch there.
    fn advance_toi_pair(
        &mut self,
        step: &StepConf,
        id: ContactId,
        alpha: f32,
        stats: &mut ToiStepStats,
    ) -> bool {
        let Some(contact) = self.collision.contacts.get(id) else {
            return false;
        };
        let (a, b) = (contact.body_a, contact.body_b);
        let Some((body_a, body_b)) = self.bodies.get2_mut(a, b) else {
            return false;
        };
        let backup = (body_a.sweep, body_b.sweep);
        body_a.advance(alpha);
        body_b.advance(alpha);

        self.update_contact(id);
        stats.contacts_updated_toi += 1;

        let Some(contact) = self.collision.contacts.get_mut(id) else {
            return false;
        };
        contact.toi = None;
        contact.toi_count += 1;
        // Past the cap the contact is skipped for the rest of the step.
        if contact.toi_count == step.max_sub_steps + 1 {
            stats.contacts_at_max_sub_steps += 1;
        }

        if !contact.enabled || !contact.touching {
            // Done for this step unless one of its bodies moves again.
            contact.toi = Some(1.0);
            if let Some((body_a, body_b)) = self.bodies.get2_mut(a, b) {
                body_a.sweep = backup.0;
                body_a.synchronize_transform();
                body_b.sweep = backup.1;
                body_b.synchronize_transform();
            }
            return false;
        }

        contact.in_island = true;
        if let Some((body_a, body_b)) = self.bodies.get2_mut(a, b) {
            body_a.set_awake_flag(true);
            body_b.set_awake_flag(true);
        }
        true
    }

    /// Seeds the island with the impact pair and adds the touching contacts of
    /// its dynamic bodies, advancing their neighbours to `alpha`.
    fn gather_toi_island(
        &mut self,
        island: &mut Island,
        min_contact: ContactId,
        alpha: f32,
        stats: &mut ToiStepStats,
    ) {
        island.clear();
        let Some(contact) = self.collision.contacts.get(min_contact) else {
            return;
        };
        let pair = [contact.body_a, contact.body_b];
        for id in pair {
            if let Some(body) = self.bodies.get_mut(id) {
                body.in_island = true;
                island.add_body(id, body);
            }
        }
        island.add_contact(min_contact);

        for body_id in pair {
            let Some(body) = self.bodies.get(body_id) else {
                continue;
            };
            if !body.is_dynamic() {
                continue;
            }
            let bullet = body.bullet;
            let body_contacts = body.contacts.clone();

            for contact_id in body_contacts {
                if island.bodies().len() >= 2 * MAX_TOI_CONTACTS
                    || island.contacts().len() >= MAX_TOI_CONTACTS
                {
                    break;
                }
                let Some(contact) = self.collision.contacts.get(contact_id) else {
                    continue;
                };
                if contact.in_island || contact.sensor {
                    continue;
                }
                let other_id = if contact.body_a == body_id {
                    contact.body_b
                } else {
                    contact.body_a
                };
                let Some(other) = self.bodies.get_mut(other_id) else {
                    continue;
                };
                // Plain dynamic neighbours are only swept along by bullets.
                if other.is_dynamic() && !bullet && !other.bullet {
                    continue;
                }

                let backup = other.sweep;
                if !other.in_island {
                    other.advance(alpha);
                }

                self.update_contact(contact_id);
                stats.contacts_updated_touching += 1;

                let solid = self
                    .collision
                    .contacts
                    .get(contact_id)
                    .is_some_and(|c| c.enabled && c.touching);
                let Some(other) = self.bodies.get_mut(other_id) else {
                    continue;
                };
                if !solid {
                    other.sweep = backup;
                    other.synchronize_transform();
                    stats.contacts_skipped_touching += 1;
                    continue;
                }

                if let Some(contact) = self.collision.contacts.get_mut(contact_id) {
                    contact.in_island = true;
                }
                island.add_contact(contact_id);

                if other.in_island {
                    continue;
                }
                other.in_island = true;
                other.set_awake_flag(true);
                island.add_body(other_id, other);
            }
        }
    }
}

fn accumulate_toi(stats: &mut ToiStepStats, report: &IslandReport) {
    stats.islands_found += 1;
    if report.solved {
        stats.islands_solved += 1;
    }
    stats.sub_steps += 1;
    stats.sum_position_iterations += report.position_iterations;
    stats.sum_velocity_iterations += report.velocity_iterations;
    stats.min_separation = stats.min_separation.min(report.min_separation);
    stats.max_incremental_impulse = stats
        .max_incremental_impulse
        .max(report.max_incremental_impulse);
}
