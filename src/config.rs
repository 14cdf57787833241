//! Run description and parameters.
//!
//! [`RunConfig`] is what an external loader hands to the kernel: geometry,
//! time-dependent parameter curves, moments and global parameters. It
//! round-trips through JSON so a run can be described in a file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geometry::{Geometry, Parameter};
use crate::physics::Motion;
use crate::results::HistogramParams;
use crate::util::{Error, Result};

/// Global parameters, fixed between two reloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerParams {
    /// Molar mass [g/mol].
    pub gas_mass: f64,
    pub enable_decay: bool,
    /// [s]
    pub half_life: f64,
    /// Width of the window around each moment [s].
    pub time_window: f64,
    pub use_maxwell: bool,
    /// Keep particles alive past the latest moment.
    pub calc_constant_flow: bool,
    pub motion: Motion,
    pub global_histograms: HistogramParams,

    // Derived by `SimulationModel::prepare`.
    /// Last instant that contributes to time-resolved results [s].
    pub latest_moment: f64,
    /// Molecules desorbed up to `latest_moment`.
    pub total_desorbed_molecules: f64,
    /// [molecules/s]
    pub final_outgassing_rate: f64,
    /// [Pa.m3/s]
    pub final_outgassing_rate_pa_m3_s: f64,
}

impl Default for WorkerParams {
    fn default() -> Self {
        Self {
            gas_mass: 28.0,
            enable_decay: false,
            half_life: 1.0,
            time_window: 1e-10,
            use_maxwell: true,
            calc_constant_flow: true,
            motion: Motion::None,
            global_histograms: HistogramParams::default(),
            latest_moment: 1e-10,
            total_desorbed_molecules: 0.0,
            final_outgassing_rate: 0.0,
            final_outgassing_rate_pa_m3_s: 0.0,
        }
    }
}

/// Parameters that can change while the simulation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnTheFlyParams {
    /// Number of transport threads.
    pub nb_process: usize,
    /// Stop after this many desorptions in total, 0 for no limit.
    pub desorption_limit: u64,
    pub low_flux_mode: bool,
    /// Weight under which a split particle is dropped.
    pub low_flux_cutoff: f64,
    pub enable_logging: bool,
    /// Facet whose hits go to the particle log.
    pub log_facet: usize,
    /// Capacity of the shared particle log.
    pub log_limit: usize,
}

impl Default for OnTheFlyParams {
    fn default() -> Self {
        Self {
            nb_process: 1,
            desorption_limit: 0,
            low_flux_mode: false,
            low_flux_cutoff: 1e-7,
            enable_logging: false,
            log_facet: 0,
            log_limit: 10_000,
        }
    }
}

/// Everything needed to start a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub geometry: Geometry,
    pub parameters: Vec<Parameter>,
    /// User moments [s].
    pub moments: Vec<f64>,
    pub params: WorkerParams,
    pub otf: OnTheFlyParams,
}

impl RunConfig {
    /// Parse from a JSON string and derive facet frames.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut cfg: Self = serde_json::from_str(text)?;
        cfg.geometry.initialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), facets = cfg.geometry.facet_count(), "run config loaded");
        Ok(cfg)
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values no run can use.
    pub fn validate(&self) -> Result<()> {
        let p = &self.params;
        if !(p.gas_mass > 0.0) {
            return Err(Error::invalid(format!("gas mass must be positive, got {}", p.gas_mass)));
        }
        if !(p.time_window > 0.0) {
            return Err(Error::invalid("time window must be positive"));
        }
        if p.enable_decay && !(p.half_life > 0.0) {
            return Err(Error::invalid("half life must be positive when decay is enabled"));
        }
        if self.moments.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(Error::invalid("moments must be finite and non-negative"));
        }
        if !(0.0..1.0).contains(&self.otf.low_flux_cutoff) {
            return Err(Error::invalid("low flux cutoff must be in [0, 1)"));
        }
        Ok(())
    }
}
