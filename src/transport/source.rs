//! Desorption: source choice, launch point, direction, speed and time.

use std::f64::consts::PI;
use std::sync::Arc;

use super::{Contact, Particle, Simulation};
use crate::geometry::{DesorptionLaw, Facet};
use crate::physics::{self, decay_moment};
use crate::results::HitType;
use crate::util::{interpolate_x, lower_bound, DVec3, Error, Result};

/// Rejection sampling attempts before falling back to a fixed point.
pub(super) const MAX_POINT_TRIES: usize = 1000;

impl Simulation {
    /// Launch a new particle. Returns `false` once this thread's share of
    /// the desorption limit is used up.
    pub(super) fn start_from_source(&mut self) -> Result<bool> {
        let share = self.desorption_share();
        if share > 0 && self.total_desorbed >= share {
            self.particle.last_hit = None;
            return Ok(false);
        }

        let model = Arc::clone(&self.model);
        let (src, cell) = self.choose_source()?;
        let facet = model.facet(src);
        let props = &facet.props;
        let structure = props
            .structure
            .ok_or(Error::DesorbingFromAllStructures { facet: src + 1 })?;
        let reverse = props.two_sided && self.rnd() > 0.5;

        let flight_time = self.generate_desorption_time(src);
        let velocity = self.generate_velocity(src);
        let expected_decay = if model.params.enable_decay {
            decay_moment(flight_time, model.params.half_life, 1.0 - self.rnd())
        } else {
            1e100
        };

        let (u, v) = self.launch_point(facet, cell);
        self.particle = Particle {
            position: facet.frame.point_at(u, v),
            velocity,
            flight_time,
            expected_decay,
            structure,
            last_hit: Some(src),
            ..Particle::default()
        };

        let moving = props.is_moving && model.params.motion.is_some();
        self.record_hit(if moving { HitType::Moving } else { HitType::Des });

        self.particle.direction = self.desorption_direction(facet, src, reverse);
        if moving {
            self.treat_moving_facet();
        }

        self.total_desorbed += 1;
        self.results.global_hits.hits.nb_desorbed += 1;

        let c = Contact {
            facet: src,
            u,
            v,
            time: flight_time,
        };
        let ort = self.particle.ort_velocity(facet.frame.n);
        let k = self.speed_factor();
        self.increase_facet_counter(src, flight_time, 0, 1, 0, 2.0 / ort, k * ort);
        self.record_profile(&c, false, 2.0, 1.0);
        self.log_hit(&c, HitType::Des);
        if props.texture.count_desorption {
            self.record_texture(&c, true, 2.0, 1.0);
        }
        Ok(true)
    }

    /// Weighted draw over sources. Map facets also yield the chosen cell.
    fn choose_source(&mut self) -> Result<(usize, Option<usize>)> {
        let model = Arc::clone(&self.model);
        let target = self.rnd() * model.params.total_desorbed_molecules;
        let mut sum = 0.0;
        for (id, rt) in model.facets.iter().enumerate() {
            if rt.source_weight <= 0.0 || !model.facet(id).props.desorption.is_source() {
                continue;
            }
            if target < sum + rt.source_weight {
                let cell = (!rt.map_cdf.is_empty()).then(|| {
                    lower_bound(target - sum, &rt.map_cdf)
                        .map_or(0, |i| i + 1)
                        .min(rt.map_cdf.len() - 1)
                });
                return Ok((id, cell));
            }
            sum += rt.source_weight;
        }
        Err(Error::NoStartingPoint)
    }

    fn generate_desorption_time(&mut self, src: usize) -> f64 {
        let model = Arc::clone(&self.model);
        let props = &model.facet(src).props;
        let id = props
            .outgassing_param
            .filter(|_| props.outgassing_map.is_none())
            .and_then(|p| model.integrated_desorption[p].as_deref());
        match id {
            Some(id) => {
                let total = id.last().map_or(0.0, |l| l.1);
                interpolate_x(self.rnd() * total, id, true)
            }
            None => self.rnd() * model.params.latest_moment,
        }
    }

    /// Speed drawn at the wall temperature of `facet`.
    pub(super) fn generate_velocity(&mut self, facet: usize) -> f64 {
        let model = Arc::clone(&self.model);
        if model.params.use_maxwell {
            interpolate_x(self.rnd(), model.speed_cdf(facet), true)
        } else {
            physics::mean_speed(model.facet(facet).props.temperature, model.params.gas_mass)
        }
    }

    /// Uniform point inside the polygon, or inside one outgassing map cell.
    pub(super) fn launch_point(&mut self, facet: &Facet, cell: Option<usize>) -> (f64, f64) {
        let map = facet.props.outgassing_map.as_ref().filter(|m| m.width > 0 && m.height > 0);
        let cell = cell.zip(map).map(|(c, m)| {
            let (w, h) = (m.width as f64, m.height as f64);
            ((c % m.width) as f64, (c / m.width) as f64, w, h)
        });

        for _ in 0..MAX_POINT_TRIES {
            let (u, v) = match cell {
                Some((cu, cv, w, h)) => ((cu + self.rnd()) / w, (cv + self.rnd()) / h),
                None => (self.rnd(), self.rnd()),
            };
            if facet.contains(u, v) {
                return (u, v);
            }
        }

        match cell {
            Some((cu, cv, w, h)) => ((cu + 0.5) / w, (cv + 0.5) / h),
            None => facet_center_uv(facet),
        }
    }

    fn desorption_direction(&mut self, facet: &Facet, src: usize, reverse: bool) -> DVec3 {
        let frame = &facet.frame;
        let (theta, phi) = match facet.props.desorption {
            DesorptionLaw::Uniform => (self.rnd().acos(), 2.0 * PI * self.rnd()),
            DesorptionLaw::None | DesorptionLaw::Cosine => (self.rnd().sqrt().acos(), 2.0 * PI * self.rnd()),
            DesorptionLaw::CosineN { exponent } => {
                (self.rnd().powf(1.0 / (exponent + 1.0)).acos(), 2.0 * PI * self.rnd())
            }
            DesorptionLaw::AngleMap => {
                let model = Arc::clone(&self.model);
                if let Some(sampler) = model.facets[src].angle_map.as_ref() {
                    let (theta, phi) = sampler.sample(&mut self.rng);
                    // recorded angles are incident ones: keep travelling the same way
                    return frame.polar_to_cartesian(PI - theta, phi, false);
                }
                (self.rnd().sqrt().acos(), 2.0 * PI * self.rnd())
            }
        };
        frame.polar_to_cartesian(theta, phi, reverse)
    }

    /// Add the surface velocity of a moving facet to the particle.
    pub(super) fn treat_moving_facet(&mut self) {
        let p = &mut self.particle;
        let (dir, speed) = self.model.params.motion.apply(p.position, p.direction, p.velocity);
        p.direction = dir;
        p.velocity = speed;
    }
}

/// Local coordinates of the vertex average of `facet`.
pub(super) fn facet_center_uv(facet: &Facet) -> (f64, f64) {
    let fr = &facet.frame;
    let d = fr.center - fr.o;
    (d.dot(fr.u) / fr.u.length_squared(), d.dot(fr.v) / fr.v.length_squared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OnTheFlyParams, RunConfig};
    use crate::geometry::{FacetProperties, Geometry};
    use crate::model::SimulationModel;

    fn triangle_source(law: DesorptionLaw) -> Arc<SimulationModel> {
        let vertices = vec![DVec3::ZERO, DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 2.0, 0.0)];
        let props = FacetProperties {
            desorption: law,
            outgassing: 1.0,
            ..Default::default()
        };
        let geometry = Geometry::new(vertices, vec![Facet::new(vec![0, 1, 2], props)], 1).unwrap();
        let cfg = RunConfig {
            geometry,
            ..Default::default()
        };
        Arc::new(SimulationModel::prepare(&cfg).unwrap())
    }

    #[test]
    fn test_launch_points_inside() {
        let model = triangle_source(DesorptionLaw::Cosine);
        let mut sim = Simulation::new(model.clone(), OnTheFlyParams::default(), 7);
        let facet = model.facet(0);
        for _ in 0..500 {
            let (u, v) = sim.launch_point(facet, None);
            assert!(facet.contains(u, v));
        }
    }

    #[test]
    fn test_desorbed_direction_leaves_front() {
        for law in [
            DesorptionLaw::Uniform,
            DesorptionLaw::Cosine,
            DesorptionLaw::CosineN { exponent: 4.0 },
        ] {
            let model = triangle_source(law);
            let mut sim = Simulation::new(model.clone(), OnTheFlyParams::default(), 3);
            for _ in 0..200 {
                assert!(sim.start_from_source().unwrap());
                let d = sim.particle().direction;
                assert!((d.length() - 1.0).abs() < 1e-9);
                assert!(d.dot(model.facet(0).frame.n) >= 0.0);
            }
            assert_eq!(sim.total_desorbed(), 200);
            assert_eq!(sim.results().facet_states[0].steady().nb_desorbed, 200);
        }
    }

    #[test]
    fn test_desorption_limit_share() {
        let model = triangle_source(DesorptionLaw::Cosine);
        let otf = OnTheFlyParams {
            desorption_limit: 10,
            nb_process: 2,
            ..Default::default()
        };
        let mut sim = Simulation::new(model, otf, 1);
        let launched = (0..20).filter(|_| sim.start_from_source().unwrap()).count();
        assert_eq!(launched, 5);
        assert_eq!(sim.status_text(), "MC 5/5 (100.0%)");
    }

    #[test]
    fn test_center_fallback() {
        let model = triangle_source(DesorptionLaw::Cosine);
        let (u, v) = facet_center_uv(model.facet(0));
        assert!((u - 1.0 / 3.0).abs() < 1e-12);
        assert!((v - 1.0 / 3.0).abs() < 1e-12);
    }
}
