//! Bounce, distance and flight-time histograms.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Which histograms are recorded and their binning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramParams {
    pub record_bounce: bool,
    pub nb_bounce_max: usize,
    pub nb_bounce_binsize: usize,
    pub record_distance: bool,
    /// [cm]
    pub distance_max: f64,
    pub distance_binsize: f64,
    pub record_time: bool,
    /// [s]
    pub time_max: f64,
    pub time_binsize: f64,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            record_bounce: false,
            nb_bounce_max: 10000,
            nb_bounce_binsize: 1,
            record_distance: false,
            distance_max: 10.0,
            distance_binsize: 0.001,
            record_time: false,
            time_max: 0.1,
            time_binsize: 1e-5,
        }
    }
}

impl HistogramParams {
    /// Bounce bins, including the overrun bin.
    pub fn bounce_size(&self) -> usize {
        self.nb_bounce_max / self.nb_bounce_binsize.max(1) + 2
    }

    /// Distance bins, including the overrun bin.
    pub fn distance_size(&self) -> usize {
        bin_count(self.distance_max, self.distance_binsize)
    }

    /// Time bins, including the overrun bin.
    pub fn time_size(&self) -> usize {
        bin_count(self.time_max, self.time_binsize)
    }

    pub fn records_any(&self) -> bool {
        self.record_bounce || self.record_distance || self.record_time
    }
}

fn bin_count(max: f64, binsize: f64) -> usize {
    if binsize > 0.0 {
        (max / binsize) as usize + 1
    } else {
        1
    }
}

/// Weighted histograms of one facet (or the whole geometry) for one moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub bounces: Vec<f64>,
    pub distances: Vec<f64>,
    pub times: Vec<f64>,
}

impl Histogram {
    /// Allocate the histograms enabled in `params`.
    pub fn new(params: &HistogramParams) -> Self {
        let alloc = |on: bool, len: usize| if on { vec![0.0; len] } else { Vec::new() };
        Self {
            bounces: alloc(params.record_bounce, params.bounce_size()),
            distances: alloc(params.record_distance, params.distance_size()),
            times: alloc(params.record_time, params.time_size()),
        }
    }

    /// Add `weight` to the bins of a particle's bounce count, distance and time.
    ///
    /// Values beyond the last bin land in the overrun bin.
    pub fn record(&mut self, params: &HistogramParams, bounces: usize, distance: f64, time: f64, weight: f64) {
        if let Some(last) = self.bounces.len().checked_sub(1) {
            let bin = (bounces / params.nb_bounce_binsize.max(1)).min(last);
            self.bounces[bin] += weight;
        }
        if let Some(last) = self.distances.len().checked_sub(1) {
            let bin = ((distance / params.distance_binsize) as usize).min(last);
            self.distances[bin] += weight;
        }
        if let Some(last) = self.times.len().checked_sub(1) {
            let bin = ((time / params.time_binsize) as usize).min(last);
            self.times[bin] += weight;
        }
    }

    pub fn reset(&mut self) {
        self.bounces.fill(0.0);
        self.distances.fill(0.0);
        self.times.fill(0.0);
    }
}

impl AddAssign<&Histogram> for Histogram {
    fn add_assign(&mut self, rhs: &Histogram) {
        add_slices(&mut self.bounces, &rhs.bounces);
        add_slices(&mut self.distances, &rhs.distances);
        add_slices(&mut self.times, &rhs.times);
    }
}

/// Element-wise `a += b` over the common length.
pub(crate) fn add_slices(a: &mut [f64], b: &[f64]) {
    for (x, y) in a.iter_mut().zip(b) {
        *x += *y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sizes() {
        let p = HistogramParams::default();
        assert_eq!(p.bounce_size(), 10002);
        assert_eq!(p.distance_size(), 10001);
        assert_eq!(p.time_size(), 10001);
    }

    #[test]
    fn test_record_overrun() {
        let p = HistogramParams {
            record_bounce: true,
            nb_bounce_max: 4,
            nb_bounce_binsize: 2,
            record_time: true,
            time_max: 1.0,
            time_binsize: 0.5,
            ..Default::default()
        };
        let mut h = Histogram::new(&p);
        assert_eq!(h.bounces.len(), 4);
        assert!(h.distances.is_empty());

        h.record(&p, 3, 0.0, 0.2, 1.0);
        h.record(&p, 100, 0.0, 7.0, 0.5);
        assert_eq!(h.bounces, vec![0.0, 1.0, 0.0, 0.5]);
        assert_eq!(h.times, vec![1.0, 0.0, 0.5]);
    }
}
