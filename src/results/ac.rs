//! Angular coefficients (view factors) between facets.
//!
//! `F_ij` is estimated as the fraction of cosine-distributed rays leaving
//! facet `i` whose first hard hit is facet `j`. The steady-state incident
//! flux then satisfies `Φ_i = Q_i + Σ_j (1 - s_j) Φ_j F_ji`, which
//! [`AngularCoefficients::solve_step`] iterates.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Ray counts between every pair of facets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AngularCoefficients {
    size: usize,
    /// Rays emitted per source facet.
    emitted: Vec<u64>,
    /// Row-major `source * size + destination`.
    counts: Vec<u64>,
    /// Rays per source that left the geometry.
    leaked: Vec<u64>,
}

impl AngularCoefficients {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            emitted: vec![0; size],
            counts: vec![0; size * size],
            leaked: vec![0; size],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Total emitted rays.
    pub fn total_emitted(&self) -> u64 {
        self.emitted.iter().sum()
    }

    pub fn emitted(&self, source: usize) -> u64 {
        self.emitted[source]
    }

    pub fn leaked(&self, source: usize) -> u64 {
        self.leaked[source]
    }

    /// Record one ray from `source` ending on `dest`, or leaking when `None`.
    pub fn record(&mut self, source: usize, dest: Option<usize>) {
        self.emitted[source] += 1;
        match dest {
            Some(d) => self.counts[source * self.size + d] += 1,
            None => self.leaked[source] += 1,
        }
    }

    /// Estimated fraction of the radiation leaving `i` that reaches `j`.
    pub fn view_factor(&self, i: usize, j: usize) -> f64 {
        match self.emitted[i] {
            0 => 0.0,
            n => self.counts[i * self.size + j] as f64 / n as f64,
        }
    }

    /// One Jacobi sweep of the incident flux balance.
    ///
    /// `sources` are the desorption rates, `sticking` the absorption
    /// probabilities. Returns the largest absolute change of `flux`.
    pub fn solve_step(&self, flux: &mut [f64], sources: &[f64], sticking: &[f64]) -> f64 {
        let n = self.size;
        let previous = flux.to_vec();
        let mut delta: f64 = 0.0;
        for i in 0..n {
            let mut incoming = sources.get(i).copied().unwrap_or(0.0);
            for j in 0..n {
                let s = sticking.get(j).copied().unwrap_or(0.0);
                incoming += (1.0 - s) * previous[j] * self.view_factor(j, i);
            }
            delta = delta.max((incoming - previous[i]).abs());
            flux[i] = incoming;
        }
        delta
    }

    pub fn reset(&mut self) {
        self.emitted.fill(0);
        self.counts.fill(0);
        self.leaked.fill(0);
    }
}

impl AddAssign<&AngularCoefficients> for AngularCoefficients {
    fn add_assign(&mut self, rhs: &AngularCoefficients) {
        if self.size != rhs.size {
            return;
        }
        for (a, b) in self.emitted.iter_mut().zip(&rhs.emitted) {
            *a += *b;
        }
        for (a, b) in self.counts.iter_mut().zip(&rhs.counts) {
            *a += *b;
        }
        for (a, b) in self.leaked.iter_mut().zip(&rhs.leaked) {
            *a += *b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_factors() {
        let mut ac = AngularCoefficients::new(2);
        for _ in 0..3 {
            ac.record(0, Some(1));
        }
        ac.record(0, None);
        assert_eq!(ac.view_factor(0, 1), 0.75);
        assert_eq!(ac.view_factor(1, 0), 0.0);
        assert_eq!(ac.leaked(0), 1);
    }

    #[test]
    fn test_solve_two_parallel_plates() {
        // two facets seeing only each other
        let mut ac = AngularCoefficients::new(2);
        ac.record(0, Some(1));
        ac.record(1, Some(0));
        let mut flux = vec![0.0; 2];
        let sources = [1.0, 0.0];
        let sticking = [0.5, 0.5];
        for _ in 0..200 {
            if ac.solve_step(&mut flux, &sources, &sticking) < 1e-12 {
                break;
            }
        }
        // Φ0 = 1 + 0.5 Φ1, Φ1 = 0.5 Φ0
        assert!((flux[0] - 4.0 / 3.0).abs() < 1e-9);
        assert!((flux[1] - 2.0 / 3.0).abs() < 1e-9);
    }
}
