//! Angular coefficient mode: cosine rays from every facet in turn, counting
//! which facet each one reaches first.

use std::f64::consts::PI;
use std::sync::Arc;

use rand::Rng;

use super::Simulation;
use crate::util::Result;

impl Simulation {
    /// Trace `rays` rays, cycling over the emitting facets.
    ///
    /// Returns `false` when no facet can emit.
    pub(super) fn trace_coefficient_rays(&mut self, rays: usize) -> Result<bool> {
        let model = Arc::clone(&self.model);
        let facets = &model.geometry.facets;
        let emitters: Vec<usize> = (0..facets.len())
            .filter(|&i| !facets[i].is_link() && facets[i].props.structure.is_some())
            .collect();
        if emitters.is_empty() {
            return Ok(false);
        }

        for _ in 0..rays {
            let src = emitters[self.ac_cursor % emitters.len()];
            self.ac_cursor = (self.ac_cursor + 1) % emitters.len();
            let facet = &facets[src];
            let Some(structure) = facet.props.structure else {
                continue;
            };

            let (u, v) = self.launch_point(facet, None);
            let origin = facet.frame.point_at(u, v);
            let theta = self.rnd().sqrt().acos();
            let phi = 2.0 * PI * self.rnd();
            let dir = facet.frame.polar_to_cartesian(theta, phi, false);

            let rng = &mut self.rng;
            let hits = model.structures[structure].intersect(facets, origin, dir, Some(src), |f, _| {
                let opacity = model.opacity(f, 0.0);
                opacity == 1.0 || rng.gen::<f64>() < opacity
            });
            self.results.angular_coefficients.record(src, hits.hard.map(|h| h.facet));
            self.total_rays += 1;
        }
        Ok(true)
    }
}
