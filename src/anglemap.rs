//! Incident angle maps.
//!
//! A facet can record the (theta, phi) angles at which particles cross or hit
//! it into a 2D histogram, and a recorded histogram can later drive the
//! directions of particles desorbed from a facet.
//!
//! Theta rows are split at `theta_limit`: `theta_lower_res` rows cover
//! `[0, theta_limit)`, `theta_higher_res` rows cover `[theta_limit, π/2]`.
//! Phi columns cover `[-π, π)` in `phi_width` steps.
//!
//! Sampling treats every bin value as the pdf at the bin center and builds
//! cumulative distributions by half-segment integration, so samples are
//! interpolated between bin centers (linearly where the pdf is flat,
//! quadratically where it has a slope).

use std::f64::consts::{FRAC_PI_2, PI};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::util::{lower_bound, weigh, weighed_lower_bound, Error, Result};

/// Layout of a facet's angle map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AngleMapParams {
    pub record: bool,
    pub theta_limit: f64,
    pub theta_lower_res: usize,
    pub theta_higher_res: usize,
    pub phi_width: usize,
}

impl Default for AngleMapParams {
    fn default() -> Self {
        Self {
            record: false,
            theta_limit: FRAC_PI_2,
            theta_lower_res: 10,
            theta_higher_res: 10,
            phi_width: 20,
        }
    }
}

impl AngleMapParams {
    /// Number of theta rows.
    #[inline]
    pub fn theta_res(&self) -> usize {
        self.theta_lower_res + self.theta_higher_res
    }

    /// Number of bins.
    #[inline]
    pub fn len(&self) -> usize {
        self.theta_res() * self.phi_width
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bin of an incident direction given by its facet-local angles.
    ///
    /// Back-side incidence is folded onto `[0, π/2]`. Returns `None` when the
    /// band containing theta has no resolution.
    pub fn bin(&self, theta: f64, phi: f64) -> Option<usize> {
        if self.phi_width == 0 {
            return None;
        }
        let theta = if theta > FRAC_PI_2 { (PI - theta).abs() } else { theta };
        let row = if theta < self.theta_limit {
            if self.theta_lower_res == 0 {
                return None;
            }
            (theta / self.theta_limit * self.theta_lower_res as f64) as usize
        } else {
            if self.theta_higher_res == 0 {
                return None;
            }
            let span = FRAC_PI_2 - self.theta_limit;
            let frac = if span > 0.0 { (theta - self.theta_limit) / span } else { 0.0 };
            self.theta_lower_res + (frac * self.theta_higher_res as f64) as usize
        };
        let col = ((phi + 3.1415926) / (2.0 * PI) * self.phi_width as f64) as usize;
        let row = row.min(self.theta_res() - 1);
        let col = col.min(self.phi_width - 1);
        Some(row * self.phi_width + col)
    }

    /// Theta at a fractional row index (row centers sit at `i + 0.5`).
    pub fn theta_at(&self, index: f64) -> f64 {
        if (index as usize) < self.theta_lower_res {
            self.theta_limit * index / self.theta_lower_res as f64
        } else {
            self.theta_limit
                + (FRAC_PI_2 - self.theta_limit) * (index - self.theta_lower_res as f64)
                    / self.theta_higher_res as f64
        }
    }

    /// Phi at a fractional, periodic column index.
    pub fn phi_at(&self, index: f64) -> f64 {
        let width = self.phi_width as f64;
        let index = if index < width { index } else { index - width };
        -PI + 2.0 * PI * index / width
    }
}

/// Cumulative distributions built from a recorded angle map.
#[derive(Debug, Clone)]
pub struct AngleMapSampler {
    params: AngleMapParams,
    pdf: Vec<u64>,
    /// Sum of each theta row.
    row_sums: Vec<u64>,
    total: u64,
    theta_cdf: Vec<f64>,
    /// One CDF per theta row, `phi_width` values each.
    phi_cdfs: Vec<f64>,
}

impl AngleMapSampler {
    /// Build the CDFs of `pdf`, which must match the `params` layout.
    pub fn new(facet: usize, params: AngleMapParams, pdf: &[u64]) -> Result<Self> {
        let angle_err = |reason: &str| Error::AngleMap {
            facet: facet + 1,
            reason: reason.to_string(),
        };
        if params.is_empty() || pdf.len() != params.len() {
            return Err(angle_err("angle map size does not match its parameters"));
        }

        let (rows, width) = (params.theta_res(), params.phi_width);
        let row_sums: Vec<u64> = pdf.chunks(width).map(|r| r.iter().sum()).collect();
        let total: u64 = row_sums.iter().sum();
        if total == 0 {
            return Err(angle_err("all-zero recorded angle map"));
        }

        let norm = 1.0 / total as f64;
        let mut theta_cdf = Vec::with_capacity(rows);
        for i in 0..rows {
            let value = match i {
                0 => 0.5 * row_sums[0] as f64 * norm,
                _ => theta_cdf[i - 1] + (row_sums[i - 1] + row_sums[i]) as f64 * 0.5 * norm,
            };
            theta_cdf.push(value);
        }

        let mut phi_cdfs = Vec::with_capacity(rows * width);
        for (row, &sum) in pdf.chunks(width).zip(&row_sums) {
            let start = phi_cdfs.len();
            for j in 0..width {
                let value = if sum == 0 {
                    (0.5 + j as f64) / width as f64
                } else if j == 0 {
                    0.5 * row[0] as f64 / sum as f64
                } else {
                    phi_cdfs[start + j - 1] + (row[j - 1] + row[j]) as f64 * 0.5 / sum as f64
                };
                phi_cdfs.push(value);
            }
        }

        Ok(Self {
            params,
            pdf: pdf.to_vec(),
            row_sums,
            total,
            theta_cdf,
            phi_cdfs,
        })
    }

    /// Draw an incident `(theta, phi)` pair.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        let (theta, lower, overshoot) = self.generate_theta(rng.gen());
        let phi = self.generate_phi(lower, overshoot, rng.gen());
        (theta, phi)
    }

    fn last_row(&self) -> isize {
        self.params.theta_res() as isize - 1
    }

    /// Returns theta, the row after which it lies (-1 for the first half
    /// row) and the fractional position past that row's center.
    fn generate_theta(&self, lookup: f64) -> (f64, isize, f64) {
        let p = &self.params;
        let lower = lower_bound(lookup, &self.theta_cdf).map_or(-1, |i| i as isize);

        let overshoot = if lower == -1 {
            0.5 + 0.5 * lookup / self.theta_cdf[0]
        } else if lower == self.last_row() {
            let c = self.theta_cdf[lower as usize];
            0.5 * (lookup - c) / (1.0 - c)
        } else {
            let i = lower as usize;
            let (c0, c1) = (self.theta_cdf[i], self.theta_cdf[i + 1]);
            let linear = (lookup - c0) / (c1 - c0);
            if self.row_sums[i] == self.row_sums[i + 1] {
                linear
            } else {
                let step = p.theta_at(i as f64 + 1.5) - p.theta_at(i as f64 + 0.5);
                let total = self.total as f64;
                let b = self.row_sums[i] as f64 / total / step;
                let a = 0.5 * (self.row_sums[i + 1] as f64 - self.row_sums[i] as f64) / total / (step * step);
                let disc = b * b + 4.0 * a * (lookup - c0);
                if disc < 0.0 {
                    linear
                } else {
                    (-b + disc.sqrt()) / (2.0 * a) / step
                }
            }
        };

        (p.theta_at(lower as f64 + 0.5 + overshoot), lower, overshoot)
    }

    fn generate_phi(&self, theta_lower: isize, theta_overshoot: f64, lookup: f64) -> f64 {
        let p = &self.params;
        let width = p.phi_width;
        if width == 1 {
            return -PI + 2.0 * PI * lookup;
        }

        let mut lookup = lookup;
        let (phi_lower, w) = if theta_lower == -1 || theta_lower == self.last_row() {
            let row = theta_lower.max(0) as usize;
            let cdf = &self.phi_cdfs[row * width..(row + 1) * width];
            // periodic over [-π, π), the lookup can exceed 1
            lookup += cdf[0];
            (lower_bound(lookup, cdf).map_or(-1, |i| i as isize), theta_overshoot)
        } else {
            let i = theta_lower as usize;
            let (s0, s1) = (self.row_sums[i] as f64, self.row_sums[i + 1] as f64);
            let div = s0 * (1.0 - theta_overshoot) + s1 * theta_overshoot;
            let w = if div > 0.0 { theta_overshoot * s1 / div } else { theta_overshoot };
            let a = &self.phi_cdfs[i * width..(i + 1) * width];
            let b = &self.phi_cdfs[(i + 1) * width..(i + 2) * width];
            lookup += weigh(a[0], b[0], w);
            (weighed_lower_bound(lookup, w, a, b).map_or(-1, |i| i as isize), w)
        };

        let theta_index = theta_lower as f64 + 0.5 + w;
        let overshoot = if phi_lower == -1 {
            0.5 + 0.5 * lookup / self.phi_cdf_value(theta_index, 0)
        } else {
            let c0 = self.phi_cdf_value(theta_index, phi_lower as usize);
            let c1 = self.phi_cdf_value(theta_index, phi_lower as usize + 1);
            let linear = (lookup - c0) / (c1 - c0);
            let pdf0 = self.phi_pdf_value(theta_index, phi_lower as usize);
            let pdf1 = self.phi_pdf_value(theta_index, phi_lower as usize + 1);
            if pdf0 == pdf1 {
                linear
            } else {
                let step = 2.0 * PI / width as f64;
                let sum = self.phi_cdf_sum(theta_index);
                let b = pdf0 / sum / step;
                let a = 0.5 * (pdf1 - pdf0) / sum / (step * step);
                let disc = b * b + 4.0 * a * (lookup - c0);
                if disc < 0.0 {
                    linear
                } else {
                    (-b + disc.sqrt()) / (2.0 * a) / step
                }
            }
        };

        p.phi_at(phi_lower as f64 + 0.5 + overshoot)
    }

    /// Row pair and blend factor for a fractional theta index.
    fn rows_at(&self, theta_index: f64) -> (usize, usize, f64) {
        let last = self.params.theta_res() - 1;
        if theta_index < 0.5 {
            (0, 0, 0.0)
        } else if theta_index >= last as f64 + 0.5 {
            (last, last, 0.0)
        } else {
            let lower = (theta_index - 0.5) as usize;
            (lower, lower + 1, theta_index - 0.5 - lower as f64)
        }
    }

    fn phi_pdf_value(&self, theta_index: f64, col: usize) -> f64 {
        let width = self.params.phi_width;
        let col = col % width;
        let (r0, r1, w) = self.rows_at(theta_index);
        weigh(
            self.pdf[r0 * width + col] as f64,
            self.pdf[r1 * width + col] as f64,
            w,
        )
    }

    fn phi_cdf_value(&self, theta_index: f64, col: usize) -> f64 {
        let width = self.params.phi_width;
        let at = |row: usize| {
            if col < width {
                self.phi_cdfs[row * width + col]
            } else {
                1.0 + self.phi_cdfs[row * width]
            }
        };
        let (r0, r1, w) = self.rows_at(theta_index);
        weigh(at(r0), at(r1), w)
    }

    fn phi_cdf_sum(&self, theta_index: f64) -> f64 {
        let (r0, r1, w) = self.rows_at(theta_index);
        weigh(self.row_sums[r0] as f64, self.row_sums[r1] as f64, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(lower: usize, higher: usize, width: usize) -> AngleMapParams {
        AngleMapParams {
            record: true,
            theta_limit: FRAC_PI_2 / 2.0,
            theta_lower_res: lower,
            theta_higher_res: higher,
            phi_width: width,
        }
    }

    #[test]
    fn test_bin_folding() {
        let p = params(4, 4, 8);
        // normal incidence from the front and from the back share a bin
        assert_eq!(p.bin(PI, 0.0), p.bin(0.0, 0.0));
        assert_eq!(p.bin(0.01, -PI + 1e-9), Some(0));
        assert_eq!(p.bin(FRAC_PI_2, PI), Some(p.len() - 1));

        let no_lower = params(0, 4, 8);
        assert_eq!(no_lower.bin(0.1, 0.0), None);
    }

    #[test]
    fn test_theta_phi_at() {
        let p = params(4, 4, 8);
        assert_eq!(p.theta_at(0.0), 0.0);
        assert!((p.theta_at(4.0) - p.theta_limit).abs() < 1e-12);
        assert!((p.theta_at(8.0) - FRAC_PI_2).abs() < 1e-12);
        assert!((p.phi_at(0.0) + PI).abs() < 1e-12);
        // periodic
        assert!((p.phi_at(9.0) - p.phi_at(1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_empty_map() {
        let p = params(2, 2, 4);
        assert!(AngleMapSampler::new(0, p, &vec![0; p.len()]).is_err());
        assert!(AngleMapSampler::new(0, p, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_samples_stay_in_range() {
        let p = params(5, 5, 12);
        let pdf: Vec<u64> = (0..p.len() as u64).map(|i| 1 + (i * 7) % 13).collect();
        let sampler = AngleMapSampler::new(0, p, &pdf).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20_000 {
            let (theta, phi) = sampler.sample(&mut rng);
            assert!(theta.is_finite() && phi.is_finite());
            assert!((0.0..=FRAC_PI_2 + 1e-9).contains(&theta), "theta {theta}");
            assert!((-PI - 1e-9..=PI + 1e-9).contains(&phi), "phi {phi}");
        }
    }

    #[test]
    fn test_single_row_concentration() {
        // every count in the row just below the limit
        let p = params(4, 4, 8);
        let mut pdf = vec![0u64; p.len()];
        for c in 0..8 {
            pdf[3 * 8 + c] = 100;
        }
        let sampler = AngleMapSampler::new(0, p, &pdf).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 5_000;
        let mean: f64 = (0..n).map(|_| sampler.sample(&mut rng).0).sum::<f64>() / n as f64;
        let center = p.theta_at(3.5);
        assert!((mean - center).abs() < 0.2, "mean {mean} center {center}");
    }
}
