//! Recording of events into the thread-local results.
//!
//! Every counter is written to the steady-state bucket and to each moment
//! whose window contains the event time. `velocity_factor` and
//! `ort_speed_factor` are the weights of the 1/v and v sums: an event that
//! stands for both the incoming and the outgoing flight (absorption,
//! transparent pass) counts twice.

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use smallvec::SmallVec;

use super::{Contact, Simulation};
use crate::geometry::ProfileKind;
use crate::physics::velocity_factor;
use crate::results::{HitEntry, HitType, LeakEntry, ParticleLoggerItem, PROFILE_SIZE};

/// Result buckets touched by an event.
type Buckets = SmallVec<[usize; 4]>;

impl Simulation {
    fn buckets(&self, time: f64) -> Buckets {
        let mut b = Buckets::new();
        b.push(0);
        b.extend(self.model.moment_buckets(time));
        b
    }

    /// `k` applied to orthogonal speeds when speeds are not sampled.
    #[inline]
    pub(super) fn speed_factor(&self) -> f64 {
        velocity_factor(self.model.params.use_maxwell)
    }

    pub(super) fn record_hit(&mut self, kind: HitType) {
        let pos = self.particle.position;
        self.results.global_hits.hit_cache.push(HitEntry { pos, kind });
    }

    pub(super) fn record_leak(&mut self) {
        self.record_hit(HitType::Ref);
        self.record_hit(HitType::Last);
        let entry = LeakEntry {
            pos: self.particle.position,
            dir: self.particle.direction,
        };
        self.results.global_hits.leak_cache.push(entry);
    }

    pub(super) fn increase_distance(&mut self, d: f64) {
        let g = &mut self.results.global_hits;
        g.dist_traveled_total += d;
        g.dist_traveled_full_hits_only += d;
        self.particle.distance += d;
    }

    /// Facet hit counters. `hit`, `desorb` and `absorb` are event counts.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn increase_facet_counter(
        &mut self,
        facet: usize,
        time: f64,
        hit: u64,
        desorb: u64,
        absorb: u64,
        sum_1_per_ort_velocity: f64,
        sum_v_ort: f64,
    ) {
        let w = self.particle.ori_ratio;
        let velocity = self.particle.velocity;
        let hit_equiv = hit as f64 * w;
        self.hit_facets[facet] = true;
        for m in self.buckets(time) {
            let c = &mut self.results.facet_states[facet].moments[m].hits;
            c.nb_desorbed += desorb;
            c.nb_abs_equiv += absorb as f64 * w;
            c.nb_hit_equiv += hit_equiv;
            c.nb_mc_hit += hit;
            c.sum_1_per_ort_velocity += w * sum_1_per_ort_velocity;
            c.sum_v_ort += w * sum_v_ort;
            c.sum_1_per_velocity += (hit_equiv + desorb as f64) / velocity;
        }
    }

    pub(super) fn record_texture(&mut self, c: &Contact, count_hit: bool, velocity_factor: f64, ort_speed_factor: f64) {
        let model = Arc::clone(&self.model);
        let facet = model.facet(c.facet);
        let Some(mesh) = facet.mesh.as_ref() else {
            return;
        };
        let cell = mesh.cell_index(c.u, c.v);
        let w = self.particle.ori_ratio;
        let ort_velocity = self.speed_factor() * self.particle.ort_velocity(facet.frame.n);
        let increment = mesh.cell_increments[cell];
        for m in self.buckets(c.time) {
            let t = &mut self.results.facet_states[c.facet].moments[m].texture[cell];
            if count_hit {
                t.count_equiv += w;
            }
            t.sum_1_per_ort_velocity += w * velocity_factor / ort_velocity;
            t.sum_v_ort_per_area += w * ort_speed_factor * ort_velocity * increment;
        }
    }

    pub(super) fn record_direction(&mut self, c: &Contact) {
        let model = Arc::clone(&self.model);
        let Some(mesh) = model.facet(c.facet).mesh.as_ref() else {
            return;
        };
        let cell = mesh.cell_index(c.u, c.v);
        let add = self.particle.ori_ratio * self.particle.direction * self.particle.velocity;
        for m in self.buckets(c.time) {
            if let Some(d) = self.results.facet_states[c.facet].moments[m].direction.get_mut(cell) {
                d.dir += add;
                d.count += 1;
            }
        }
    }

    pub(super) fn record_profile(&mut self, c: &Contact, count_hit: bool, velocity_factor: f64, ort_speed_factor: f64) {
        let model = Arc::clone(&self.model);
        let facet = model.facet(c.facet);
        let kind = facet.props.profile;
        if kind == ProfileKind::None {
            return;
        }
        let p = &self.particle;
        let w = p.ori_ratio;
        let cos = p.direction.dot(facet.frame.n).abs();
        let k = self.speed_factor();
        let saturate = |x: f64| (x.max(0.0) as usize).min(PROFILE_SIZE - 1);

        let (pos, sums) = match kind {
            ProfileKind::None => return,
            ProfileKind::Angular => {
                if !count_hit {
                    return;
                }
                (saturate(cos.acos() / FRAC_PI_2 * PROFILE_SIZE as f64), false)
            }
            ProfileKind::U | ProfileKind::V => {
                let along = if kind == ProfileKind::U { c.u } else { c.v };
                let pos = along * PROFILE_SIZE as f64;
                if !(0.0..PROFILE_SIZE as f64).contains(&pos) {
                    return;
                }
                (pos as usize, true)
            }
            ProfileKind::Velocity | ProfileKind::OrtVelocity | ProfileKind::TanVelocity => {
                if !count_hit {
                    return;
                }
                let dot = match kind {
                    ProfileKind::Velocity => 1.0,
                    ProfileKind::OrtVelocity => cos,
                    _ => (1.0 - cos * cos).max(0.0).sqrt(),
                };
                let max_speed = model.facets[c.facet].max_speed;
                (saturate(dot * p.velocity / max_speed * PROFILE_SIZE as f64), false)
            }
        };

        let ort_velocity = p.velocity * cos;
        for m in self.buckets(c.time) {
            let slice = &mut self.results.facet_states[c.facet].moments[m].profile[pos];
            if count_hit {
                slice.count_equiv += w;
            }
            if sums {
                slice.sum_1_per_ort_velocity += w * velocity_factor / ort_velocity;
                slice.sum_v_ort += w * ort_speed_factor * k * ort_velocity;
            }
        }
    }

    pub(super) fn record_angle_map(&mut self, facet: usize) {
        let model = Arc::clone(&self.model);
        let f = model.facet(facet);
        if !f.props.angle_map.record {
            return;
        }
        let (theta, phi) = f.frame.cartesian_to_polar(self.particle.direction);
        if let Some(bin) = f.props.angle_map.bin(theta, phi) {
            if let Some(count) = self.results.facet_states[facet].recorded_angle_map.get_mut(bin) {
                *count += 1;
            }
        }
    }

    /// Bounce, distance and flight time histograms of an ending particle.
    pub(super) fn record_histograms(&mut self, facet: usize) {
        let model = Arc::clone(&self.model);
        let global = &model.params.global_histograms;
        let local = &model.facet(facet).props.histograms;
        let p = &self.particle;
        let (bounces, distance, time, w) = (p.bounces, p.distance, p.flight_time, p.ori_ratio);
        for m in self.buckets(time) {
            self.results.global_histograms[m].record(global, bounces, distance, time, w);
            self.results.facet_states[facet].moments[m]
                .histogram
                .record(local, bounces, distance, time, w);
        }
    }

    /// Append to the particle log when `c` is on the logged facet.
    pub(super) fn log_hit(&mut self, c: &Contact, kind: HitType) {
        if !self.otf.enable_logging || self.otf.log_facet != c.facet || self.log.len() >= self.log_target {
            return;
        }
        let (theta, phi) = self.model.facet(c.facet).frame.cartesian_to_polar(self.particle.direction);
        let p = &self.particle;
        self.log.push(ParticleLoggerItem {
            u: c.u,
            v: c.v,
            theta,
            phi,
            velocity: p.velocity,
            time: p.flight_time,
            weight: p.ori_ratio,
            decay_moment: p.expected_decay,
            kind,
        });
    }

    /// Everything a crossing of a transparent facet records.
    pub(super) fn register_transparent_pass(&mut self, c: &Contact) {
        let model = Arc::clone(&self.model);
        let facet = model.facet(c.facet);
        let props = &facet.props;
        let ort = self.particle.ort_velocity(facet.frame.n);
        let k = self.speed_factor();
        self.increase_facet_counter(c.facet, c.time, 1, 0, 0, 2.0 / ort, 2.0 * k * ort);
        if props.texture.count_transparent {
            self.record_texture(c, true, 2.0, 2.0);
        }
        if props.texture.count_direction {
            self.record_direction(c);
        }
        self.log_hit(c, HitType::Trans);
        self.record_profile(c, true, 2.0, 2.0);
        self.record_angle_map(c.facet);
    }
}
