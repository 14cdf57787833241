//! One flight between two surface events.

use std::sync::Arc;

use rand::Rng;

use super::{Contact, EndCause, Simulation, StepOutcome};
use crate::results::HitType;
use crate::util::Result;

impl Simulation {
    /// Fly the current particle to its next hard hit and resolve the hit.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.finished {
            return Ok(StepOutcome::Finished);
        }
        let model = Arc::clone(&self.model);
        let (origin, dir, exclude, structure) = {
            let p = &self.particle;
            (p.position, p.direction, p.last_hit, p.structure)
        };
        let (t0, speed) = (self.particle.flight_time, self.particle.velocity);

        let rng = &mut self.rng;
        let hits = model.structures[structure].intersect(&model.geometry.facets, origin, dir, exclude, |f, d| {
            let opacity = model.opacity(f, t0 + d / 100.0 / speed);
            opacity == 1.0 || rng.gen::<f64>() < opacity
        });

        let Some(hit) = hits.hard else {
            return self.leak();
        };
        for pass in hits.passes_before_hit() {
            let c = Contact {
                facet: pass.facet,
                u: pass.u,
                v: pass.v,
                time: self.particle.time_at(pass.distance),
            };
            self.register_transparent_pass(&c);
        }

        let p = &mut self.particle;
        p.position += hit.distance * dir;
        let last_time = p.flight_time;
        p.flight_time = p.time_at(hit.distance);
        let c = Contact {
            facet: hit.facet,
            u: hit.u,
            v: hit.v,
            time: p.flight_time,
        };

        let params = &model.params;
        let past_latest = !params.calc_constant_flow && p.flight_time > params.latest_moment;
        let decayed = params.enable_decay && p.expected_decay < p.flight_time;
        if past_latest || decayed {
            let end = params.latest_moment.min(p.expected_decay);
            let remainder = p.velocity * 100.0 * (end - last_time).max(0.0);
            self.results.global_hits.dist_traveled_total += remainder * p.ori_ratio;
            self.record_hit(HitType::Last);
            return self.end_particle(EndCause::TimeExpired);
        }

        let weight = p.ori_ratio;
        self.increase_distance(hit.distance * weight);
        if model.facet(hit.facet).props.teleport_dest != 0 {
            return Ok(self.perform_teleport(&c));
        }

        let sticking = model.sticking(hit.facet, c.time);
        if !self.otf.low_flux_mode {
            if sticking == 1.0 || (sticking > 0.0 && self.rnd() < sticking) {
                self.record_absorb(&c);
                return self.end_particle(EndCause::Absorbed);
            }
            return Ok(self.perform_bounce(&c));
        }

        if sticking > 0.0 {
            self.particle.ori_ratio = weight * sticking;
            self.record_absorb(&c);
            self.particle.ori_ratio = weight * (1.0 - sticking);
        }
        if self.particle.ori_ratio > self.otf.low_flux_cutoff {
            Ok(self.perform_bounce(&c))
        } else {
            self.end_particle(EndCause::BelowCutoff)
        }
    }

    fn leak(&mut self) -> Result<StepOutcome> {
        self.results.global_hits.nb_leak_total += 1;
        self.record_leak();
        self.end_particle(EndCause::Leaked)
    }

    /// Report the end of the current particle and launch the next one.
    fn end_particle(&mut self, cause: EndCause) -> Result<StepOutcome> {
        let weight = self.particle.ori_ratio;
        if !self.start_from_source()? {
            self.finished = true;
        }
        Ok(StepOutcome::Ended { cause, weight })
    }
}
