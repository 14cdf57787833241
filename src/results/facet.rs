//! Per-facet, per-moment counters.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use super::histogram::Histogram;
use crate::geometry::{Facet, ProfileKind};
use crate::util::DVec3;

/// Number of slices in a facet profile.
pub const PROFILE_SIZE: usize = 100;

/// Hit counters of one facet for one moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetHitCounter {
    pub nb_mc_hit: u64,
    /// Hits weighted by the particle weight.
    pub nb_hit_equiv: f64,
    pub nb_desorbed: u64,
    pub nb_abs_equiv: f64,
    pub sum_1_per_ort_velocity: f64,
    pub sum_v_ort: f64,
    pub sum_1_per_velocity: f64,
}

impl AddAssign<&FacetHitCounter> for FacetHitCounter {
    fn add_assign(&mut self, rhs: &FacetHitCounter) {
        self.nb_mc_hit += rhs.nb_mc_hit;
        self.nb_hit_equiv += rhs.nb_hit_equiv;
        self.nb_desorbed += rhs.nb_desorbed;
        self.nb_abs_equiv += rhs.nb_abs_equiv;
        self.sum_1_per_ort_velocity += rhs.sum_1_per_ort_velocity;
        self.sum_v_ort += rhs.sum_v_ort;
        self.sum_1_per_velocity += rhs.sum_1_per_velocity;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSlice {
    pub count_equiv: f64,
    pub sum_1_per_ort_velocity: f64,
    pub sum_v_ort: f64,
}

impl AddAssign<&ProfileSlice> for ProfileSlice {
    fn add_assign(&mut self, rhs: &ProfileSlice) {
        self.count_equiv += rhs.count_equiv;
        self.sum_1_per_ort_velocity += rhs.sum_1_per_ort_velocity;
        self.sum_v_ort += rhs.sum_v_ort;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureCell {
    pub count_equiv: f64,
    pub sum_1_per_ort_velocity: f64,
    /// Sum of orthogonal speed [m/s] per cell area [cm²].
    pub sum_v_ort_per_area: f64,
}

impl AddAssign<&TextureCell> for TextureCell {
    fn add_assign(&mut self, rhs: &TextureCell) {
        self.count_equiv += rhs.count_equiv;
        self.sum_1_per_ort_velocity += rhs.sum_1_per_ort_velocity;
        self.sum_v_ort_per_area += rhs.sum_v_ort_per_area;
    }
}

/// Accumulated velocity vectors of the particles crossing a texture cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionCell {
    pub dir: DVec3,
    pub count: u64,
}

impl AddAssign<&DirectionCell> for DirectionCell {
    fn add_assign(&mut self, rhs: &DirectionCell) {
        self.dir += rhs.dir;
        self.count += rhs.count;
    }
}

/// Everything a facet records for one moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetMomentSnapshot {
    pub hits: FacetHitCounter,
    pub profile: Vec<ProfileSlice>,
    pub texture: Vec<TextureCell>,
    pub direction: Vec<DirectionCell>,
    pub histogram: Histogram,
}

impl FacetMomentSnapshot {
    fn new(facet: &Facet) -> Self {
        let props = &facet.props;
        let cells = facet.mesh.as_ref().map_or(0, |m| m.len());
        let profile = match props.profile {
            ProfileKind::None => 0,
            _ => PROFILE_SIZE,
        };
        let direction = if props.texture.count_direction { cells } else { 0 };
        Self {
            hits: FacetHitCounter::default(),
            profile: vec![ProfileSlice::default(); profile],
            texture: vec![TextureCell::default(); cells],
            direction: vec![DirectionCell::default(); direction],
            histogram: Histogram::new(&props.histograms),
        }
    }

    fn reset(&mut self) {
        self.hits = FacetHitCounter::default();
        self.profile.fill(ProfileSlice::default());
        self.texture.fill(TextureCell::default());
        self.direction.fill(DirectionCell::default());
        self.histogram.reset();
    }
}

impl AddAssign<&FacetMomentSnapshot> for FacetMomentSnapshot {
    fn add_assign(&mut self, rhs: &FacetMomentSnapshot) {
        self.hits += &rhs.hits;
        for (a, b) in self.profile.iter_mut().zip(&rhs.profile) {
            *a += b;
        }
        for (a, b) in self.texture.iter_mut().zip(&rhs.texture) {
            *a += b;
        }
        for (a, b) in self.direction.iter_mut().zip(&rhs.direction) {
            *a += b;
        }
        self.histogram += &rhs.histogram;
    }
}

/// Results of one facet: index 0 is steady state, then one per moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetState {
    pub moments: Vec<FacetMomentSnapshot>,
    pub recorded_angle_map: Vec<u64>,
}

impl FacetState {
    pub fn new(facet: &Facet, moment_count: usize) -> Self {
        let angle_map = &facet.props.angle_map;
        Self {
            moments: vec![FacetMomentSnapshot::new(facet); moment_count + 1],
            recorded_angle_map: if angle_map.record {
                vec![0; angle_map.len()]
            } else {
                Vec::new()
            },
        }
    }

    pub fn reset(&mut self) {
        self.moments.iter_mut().for_each(FacetMomentSnapshot::reset);
        self.recorded_angle_map.fill(0);
    }

    /// Steady-state counters.
    pub fn steady(&self) -> &FacetHitCounter {
        &self.moments[0].hits
    }
}

impl AddAssign<&FacetState> for FacetState {
    fn add_assign(&mut self, rhs: &FacetState) {
        for (a, b) in self.moments.iter_mut().zip(&rhs.moments) {
            *a += b;
        }
        for (a, b) in self.recorded_angle_map.iter_mut().zip(&rhs.recorded_angle_map) {
            *a += *b;
        }
    }
}
