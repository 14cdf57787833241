//! Result accumulator.
//!
//! Each transport thread fills a private [`GlobalSimuState`] and periodically
//! merges it into the shared one. Every numeric field is a sum, so merging is
//! associative and commutative; only the hit/leak caches depend on merge
//! order.
//!
//! Results are organized as:
//! - [`GlobalHits`]: geometry-wide counters, caches, texture limits
//! - one [`Histogram`] per moment for the whole geometry
//! - one [`FacetState`] per facet, each holding one [`FacetMomentSnapshot`]
//!   per moment (index 0 is the steady state)
//! - the [`AngularCoefficients`] ray matrix

mod ac;
mod facet;
mod global;
mod histogram;
mod log;

pub use ac::*;
pub use facet::*;
pub use global::*;
pub use histogram::*;
pub use log::*;

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::geometry::Facet;

/// Complete results of a run, or of one thread since its last merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSimuState {
    pub global_hits: GlobalHits,
    pub global_histograms: Vec<Histogram>,
    pub facet_states: Vec<FacetState>,
    pub angular_coefficients: AngularCoefficients,
}

impl GlobalSimuState {
    /// Allocate results matching `facets` and `moment_count` user moments.
    pub fn new(facets: &[Facet], moment_count: usize, histograms: &HistogramParams) -> Self {
        Self {
            global_hits: GlobalHits::default(),
            global_histograms: vec![Histogram::new(histograms); moment_count + 1],
            facet_states: facets.iter().map(|f| FacetState::new(f, moment_count)).collect(),
            angular_coefficients: AngularCoefficients::new(facets.len()),
        }
    }

    /// Reallocate in place for a changed geometry or moment list.
    pub fn resize(&mut self, facets: &[Facet], moment_count: usize, histograms: &HistogramParams) {
        *self = Self::new(facets, moment_count, histograms);
    }

    /// Zero every counter, keeping the layout.
    pub fn reset(&mut self) {
        self.global_hits.reset();
        self.global_histograms.iter_mut().for_each(Histogram::reset);
        self.facet_states.iter_mut().for_each(FacetState::reset);
        self.angular_coefficients.reset();
    }

    /// Number of buckets per facet, steady state included.
    pub fn bucket_count(&self) -> usize {
        self.global_histograms.len()
    }

    /// Add `local` into `self`.
    pub fn merge_from(&mut self, local: &GlobalSimuState) {
        self.global_hits.merge_from(&local.global_hits);
        for (a, b) in self.global_histograms.iter_mut().zip(&local.global_histograms) {
            *a += b;
        }
        for (a, b) in self.facet_states.iter_mut().zip(&local.facet_states) {
            *a += b;
        }
        self.angular_coefficients += &local.angular_coefficients;
    }

    /// Recompute texture autoscale limits over the textured facets in `hit`.
    ///
    /// `steady_correction` scales the steady-state bucket and
    /// `moment_correction` the moment buckets so both compare in the same
    /// unit. Bounds that no cell updates keep their previous value.
    pub fn update_texture_limits(
        &mut self,
        facets: &[Facet],
        hit: &[bool],
        steady_correction: f64,
        moment_correction: f64,
    ) {
        let old = self.global_hits.texture_limits;
        let mut limits = [TextureMinMax::default(); 3];

        for (id, facet) in facets.iter().enumerate() {
            let Some(mesh) = facet.mesh.as_ref() else {
                continue;
            };
            if !hit.get(id).copied().unwrap_or(false) {
                continue;
            }
            for (m, snapshot) in self.facet_states[id].moments.iter().enumerate() {
                let correction = if m == 0 { steady_correction } else { moment_correction };
                for (t, cell) in snapshot.texture.iter().enumerate() {
                    let inc = mesh.cell_increments[t];
                    let values = [
                        cell.sum_v_ort_per_area * correction,
                        cell.count_equiv * inc * correction,
                        inc * cell.sum_1_per_ort_velocity * correction,
                    ];
                    for (lim, value) in limits.iter_mut().zip(values) {
                        lim.update(value, mesh.large_enough[t], m != 0);
                    }
                }
            }
        }

        for (lim, old) in limits.iter_mut().zip(&old) {
            lim.restore_unset(old);
        }
        self.global_hits.texture_limits = limits;
    }
}

impl AddAssign<&GlobalSimuState> for GlobalSimuState {
    fn add_assign(&mut self, rhs: &GlobalSimuState) {
        self.merge_from(rhs);
    }
}
