//! Surface interactions: reflection, absorption and link crossing.

use std::f64::consts::PI;
use std::sync::Arc;

use super::{Contact, Simulation, StepOutcome};
use crate::geometry::FacetFrame;
use crate::physics::{accommodate, sojourn_delay};
use crate::results::HitType;
use crate::util::DVec3;

impl Simulation {
    /// Reflect the particle off `c`, or carry it through a structure link.
    pub(super) fn perform_bounce(&mut self, c: &Contact) -> StepOutcome {
        let model = Arc::clone(&self.model);
        let facet = model.facet(c.facet);
        let props = &facet.props;
        let moving = props.is_moving && model.params.motion.is_some();

        let g = &mut self.results.global_hits.hits;
        g.nb_mc_hit += 1;
        g.nb_hit_equiv += self.particle.ori_ratio;

        if props.super_dest != 0 {
            self.increase_facet_counter(c.facet, c.time, 1, 0, 0, 0.0, 0.0);
            self.particle.structure = props.super_dest - 1;
            self.particle.last_hit = Some(c.facet);
            if moving {
                self.record_hit(HitType::Moving);
                self.treat_moving_facet();
            } else {
                self.record_hit(HitType::Trans);
            }
            self.log_hit(c, HitType::Trans);
            self.record_profile(c, true, 2.0, 2.0);
            self.record_angle_map(c.facet);
            if props.texture.count_transparent {
                self.record_texture(c, true, 2.0, 2.0);
            }
            if props.texture.count_direction {
                self.record_direction(c);
            }
            return StepOutcome::Linked;
        }

        let frame = &facet.frame;
        // back side of a two-sided facet: reflect around -N
        let revert = props.two_sided && self.particle.direction.dot(frame.n) > 0.0;
        let k = self.speed_factor();

        let ort = self.particle.ort_velocity(frame.n);
        self.increase_facet_counter(c.facet, c.time, 1, 0, 0, 1.0 / ort, k * ort);
        self.particle.bounces += 1;
        if props.texture.count_reflection {
            self.record_texture(c, true, 1.0, 1.0);
        }
        if props.texture.count_direction {
            self.record_direction(c);
        }
        self.log_hit(c, HitType::Ref);
        self.record_profile(c, true, 1.0, 1.0);
        self.record_angle_map(c.facet);

        self.update_velocity(c.facet);
        if props.sojourn.enabled {
            let r = 1.0 - self.rnd();
            self.particle.flight_time +=
                sojourn_delay(props.sojourn.frequency, props.sojourn.energy, props.temperature, r);
        }

        let refl = &props.reflection;
        self.particle.direction = if refl.diffuse > 0.999999 {
            self.cosine_direction(frame, 0.0, revert)
        } else {
            let r = self.rnd();
            if r < refl.diffuse {
                self.cosine_direction(frame, 0.0, revert)
            } else if r < refl.diffuse + refl.specular {
                let (theta, phi) = frame.cartesian_to_polar(self.particle.direction);
                frame.polar_to_cartesian(PI - theta, phi, false)
            } else {
                self.cosine_direction(frame, refl.cosine_exponent, revert)
            }
        };
        if moving {
            self.treat_moving_facet();
        }

        let ort = self.particle.ort_velocity(frame.n);
        let after = Contact {
            time: self.particle.flight_time,
            ..*c
        };
        self.increase_facet_counter(c.facet, after.time, 0, 0, 0, 1.0 / ort, k * ort);
        if props.texture.count_reflection {
            self.record_texture(&after, false, 1.0, 1.0);
        }
        self.record_profile(&after, false, 1.0, 1.0);

        self.record_hit(if moving { HitType::Moving } else { HitType::Ref });
        self.particle.last_hit = Some(c.facet);
        StepOutcome::Bounced
    }

    /// Deposit the particle's current weight on `c`.
    pub(super) fn record_absorb(&mut self, c: &Contact) {
        let model = Arc::clone(&self.model);
        let facet = model.facet(c.facet);
        let props = &facet.props;
        let w = self.particle.ori_ratio;

        let g = &mut self.results.global_hits.hits;
        g.nb_mc_hit += 1;
        g.nb_hit_equiv += w;
        g.nb_abs_equiv += w;

        self.record_histograms(c.facet);
        self.record_hit(HitType::Abs);
        let ort = self.particle.ort_velocity(facet.frame.n);
        let k = self.speed_factor();
        self.increase_facet_counter(c.facet, c.time, 1, 0, 1, 2.0 / ort, k * ort);
        self.log_hit(c, HitType::Abs);
        self.record_profile(c, true, 2.0, 1.0);
        self.record_angle_map(c.facet);
        if props.texture.count_absorption {
            self.record_texture(c, true, 2.0, 1.0);
        }
        if props.texture.count_direction {
            self.record_direction(c);
        }
    }

    /// cos^N distributed direction around N (or -N when `revert`).
    fn cosine_direction(&mut self, frame: &FacetFrame, exponent: f64, revert: bool) -> DVec3 {
        let theta = if exponent == 0.0 {
            self.rnd().sqrt().acos()
        } else {
            self.rnd().powf(1.0 / (exponent + 1.0)).acos()
        };
        let phi = 2.0 * PI * self.rnd();
        frame.polar_to_cartesian(theta, phi, revert)
    }

    /// Relax the particle speed towards the wall temperature.
    fn update_velocity(&mut self, facet: usize) {
        let model = Arc::clone(&self.model);
        let props = &model.facet(facet).props;
        if props.accommodation > 0.9999 {
            self.particle.velocity = self.generate_velocity(facet);
            return;
        }
        let sampled = if model.params.use_maxwell {
            Some(self.generate_velocity(facet))
        } else {
            None
        };
        self.particle.velocity = accommodate(
            self.particle.velocity,
            sampled,
            props.temperature,
            model.params.gas_mass,
            props.accommodation,
        );
    }
}
