//! # vacuum-mc
//!
//! Test-particle Monte Carlo kernel for rarefied-gas transport in vacuum
//! chamber geometries.
//!
//! Particles are desorbed from source facets, traced through an AABB tree
//! per structure and bounced, absorbed, teleported or passed through links
//! until they end. Every event lands in per-facet and per-moment counters
//! that a pool of threads merges into one shared result store.
//!
//! ## Modules
//!
//! - [`util`] - Error type, math helpers, interpolation
//! - [`geometry`] - Facets, frames, time-dependent parameters
//! - [`spatial`] - AABB tree build and ray queries
//! - [`physics`] - Speed distributions, outgassing integrals, decay
//! - [`anglemap`] - Incident angle map recording and sampling
//! - [`results`] - Result accumulator and particle log
//! - [`config`] - Run description and parameters (JSON)
//! - [`model`] - Prepared read-only model of a run
//! - [`transport`] - Per-thread particle transport engine
//! - [`worker`] - Thread pool and coordinator
//!
//! ## Example
//!
//! ```ignore
//! use vacuum_mc::prelude::*;
//!
//! let config = RunConfig::load("chamber.json")?;
//! let mut worker = Worker::new(4)?;
//! worker.load(config)?;
//! worker.start_stop(SimulationMode::MonteCarlo)?;
//! while worker.update()? {
//!     std::thread::sleep(std::time::Duration::from_millis(500));
//! }
//! let results = worker.shared_results();
//! println!("{} desorbed", results.global_hits.hits.nb_desorbed);
//! ```

pub mod util;
pub mod geometry;
pub mod spatial;
pub mod physics;
pub mod anglemap;
pub mod results;
pub mod config;
pub mod model;
pub mod transport;
pub mod worker;

// Re-export commonly used types
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{OnTheFlyParams, RunConfig, WorkerParams};
    pub use crate::geometry::{DesorptionLaw, Facet, FacetProperties, Geometry, Parameter};
    pub use crate::model::SimulationModel;
    pub use crate::results::{GlobalSimuState, HitType};
    pub use crate::transport::{Simulation, SimulationMode, StepOutcome};
    pub use crate::util::{DVec3, Error, Result};
    pub use crate::worker::{ProcessState, Worker};
}
