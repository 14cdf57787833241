//! Error types for the simulation kernel.

use thiserror::Error;

/// Main error type for simulation operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No facet has a desorption law set
    #[error("No desorption facet found")]
    NoDesorptionFacet,

    /// Sum of all outgassing is zero
    #[error("Total outgassing is zero")]
    ZeroOutgassing,

    /// A super-structure link points past the last structure
    #[error("Invalid structure (wrong link on F#{facet})")]
    InvalidStructureLink { facet: usize },

    /// A facet refers to a time-dependent parameter that does not exist
    #[error("Facet #{facet}: {field} parameter #{param} does not exist")]
    UnknownParameter {
        facet: usize,
        field: &'static str,
        param: usize,
    },

    /// Incident angle map cannot be used as configured
    #[error("Facet #{facet}: {reason}")]
    AngleMap { facet: usize, reason: String },

    /// Facet polygon is malformed
    #[error("Invalid facet #{facet}: {reason}")]
    InvalidFacet { facet: usize, reason: String },

    /// A facet that belongs to all structures was selected as a source
    #[error("Facet {facet} is in all structures, it shouldn't desorb.")]
    DesorbingFromAllStructures { facet: usize },

    /// Source selection walked past all sources
    #[error("No starting point, aborting")]
    NoStartingPoint,

    /// Command needs geometry but none was loaded
    #[error("No geometry loaded")]
    NoGeometry,

    /// Command needs worker threads but none are running
    #[error("No sub process found. (Simulation not available)")]
    NoWorkers,

    /// One or more worker threads reported failure
    #[error("{message}\n{details}")]
    SubProcess { message: String, details: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid facet error.
    pub fn facet(facet: usize, reason: impl Into<String>) -> Self {
        Self::InvalidFacet {
            facet,
            reason: reason.into(),
        }
    }
}

/// Result type alias for simulation operations.
pub type Result<T> = std::result::Result<T, Error>;
