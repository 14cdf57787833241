//! Per-thread particle transport engine.
//!
//! A [`Simulation`] follows one particle at a time through the prepared
//! [`SimulationModel`]: desorption from a source facet, straight flights
//! resolved against the structure's AABB tree, then bounce, absorption,
//! teleport or link crossing until the particle ends and the next one starts.
//! Every event is recorded into a private [`GlobalSimuState`] that the owner
//! periodically merges into the shared results with [`Simulation::merge_into`].
//!
//! The engine is deterministic for a given seed.

mod collision;
mod coefficients;
mod particle;
mod record;
mod source;
mod step;
mod teleport;

pub use particle::*;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::OnTheFlyParams;
use crate::model::SimulationModel;
use crate::results::{log_target, merge_log, GlobalSimuState, ParticleLoggerItem};
use crate::util::Result;

/// What a running thread computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// Particle transport.
    #[default]
    MonteCarlo,
    /// View factor estimation between facets.
    AngularCoefficient,
}

/// Transport engine of one thread.
#[derive(Debug)]
pub struct Simulation {
    model: Arc<SimulationModel>,
    otf: OnTheFlyParams,
    rng: StdRng,
    particle: Particle,
    results: GlobalSimuState,
    log: Vec<ParticleLoggerItem>,
    log_target: usize,
    /// Facets touched since the last merge.
    hit_facets: Vec<bool>,
    /// Particles desorbed by this thread since the last reset.
    total_desorbed: u64,
    /// Rays traced in angular coefficient mode since the last reset.
    total_rays: u64,
    /// Next source facet in angular coefficient mode.
    ac_cursor: usize,
    finished: bool,
}

impl Simulation {
    pub fn new(model: Arc<SimulationModel>, otf: OnTheFlyParams, seed: u64) -> Self {
        let results = model.new_results();
        let hit_facets = vec![false; model.geometry.facet_count()];
        let log_target = if otf.enable_logging {
            log_target(otf.log_limit, 0, otf.nb_process)
        } else {
            0
        };
        Self {
            model,
            otf,
            rng: StdRng::seed_from_u64(seed),
            particle: Particle::default(),
            results,
            log: Vec::new(),
            log_target,
            hit_facets,
            total_desorbed: 0,
            total_rays: 0,
            ac_cursor: 0,
            finished: false,
        }
    }

    #[inline]
    pub fn model(&self) -> &Arc<SimulationModel> {
        &self.model
    }

    #[inline]
    pub fn particle(&self) -> &Particle {
        &self.particle
    }

    /// Results recorded since the last merge.
    #[inline]
    pub fn results(&self) -> &GlobalSimuState {
        &self.results
    }

    /// Particle log entries collected since the last log merge.
    #[inline]
    pub fn log(&self) -> &[ParticleLoggerItem] {
        &self.log
    }

    #[inline]
    pub fn total_desorbed(&self) -> u64 {
        self.total_desorbed
    }

    #[inline]
    pub fn total_rays(&self) -> u64 {
        self.total_rays
    }

    /// Whether the desorption limit was reached.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// This thread's share of the desorption limit, 0 when unlimited.
    pub fn desorption_share(&self) -> u64 {
        self.otf.desorption_limit / self.otf.nb_process.max(1) as u64
    }

    /// Progress line shown in the thread status.
    pub fn status_text(&self) -> String {
        match self.desorption_share() {
            0 => format!("MC {}", self.total_desorbed),
            max => format!(
                "MC {}/{} ({:.1}%)",
                self.total_desorbed,
                max,
                self.total_desorbed as f64 * 100.0 / max as f64
            ),
        }
    }

    /// Take new on-the-fly parameters. `logged` is the shared log length.
    pub fn update_params(&mut self, otf: OnTheFlyParams, logged: usize) {
        self.log_target = if otf.enable_logging {
            log_target(otf.log_limit, logged, otf.nb_process)
        } else {
            0
        };
        self.otf = otf;
        self.log.truncate(self.log_target);
    }

    /// Drop all local results and counters.
    pub fn reset(&mut self) {
        self.results.reset();
        self.hit_facets.fill(false);
        self.log.clear();
        self.particle = Particle::default();
        self.total_desorbed = 0;
        self.total_rays = 0;
        self.ac_cursor = 0;
        self.finished = false;
    }

    /// Launch a particle unless one is already in flight.
    ///
    /// Returns `false` if none can be launched.
    pub fn start(&mut self) -> Result<bool> {
        if self.particle.last_hit.is_none() {
            self.finished = !self.start_from_source()?;
        }
        Ok(!self.finished)
    }

    /// Run `steps` transport steps (or rays) in `mode`.
    ///
    /// Returns `false` once the desorption limit is reached.
    pub fn run_steps(&mut self, mode: SimulationMode, steps: usize) -> Result<bool> {
        match mode {
            SimulationMode::MonteCarlo => {
                for _ in 0..steps {
                    if self.finished {
                        break;
                    }
                    self.step()?;
                }
                Ok(!self.finished)
            }
            SimulationMode::AngularCoefficient => self.trace_coefficient_rays(steps),
        }
    }

    /// Whether anything was recorded since the last merge.
    pub fn has_unmerged(&self) -> bool {
        self.hit_facets.iter().any(|&h| h)
            || self.results.global_hits.nb_leak_total > 0
            || self.results.angular_coefficients.total_emitted() > 0
    }

    /// Add local results to `shared`, refresh its texture limits, then
    /// clear the local copy.
    pub fn merge_into(&mut self, shared: &mut GlobalSimuState) {
        let params = &self.model.params;
        shared.merge_from(&self.results);
        shared.update_texture_limits(
            &self.model.geometry.facets,
            &self.hit_facets,
            params.final_outgassing_rate,
            params.total_desorbed_molecules / params.time_window,
        );
        self.results.reset();
        self.hit_facets.fill(false);
    }

    /// Move the collected log into `shared`, up to the log limit.
    pub fn merge_log_into(&mut self, shared: &mut Vec<ParticleLoggerItem>) {
        if self.log.is_empty() {
            return;
        }
        merge_log(shared, &self.log, self.otf.log_limit);
        self.log.clear();
        self.log_target = log_target(self.otf.log_limit, shared.len(), self.otf.nb_process);
    }

    #[inline]
    fn rnd(&mut self) -> f64 {
        self.rng.gen()
    }
}
