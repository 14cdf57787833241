//! In-flight particle state.

use crate::util::DVec3;

/// The particle currently followed by a [`Simulation`](super::Simulation).
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// [cm]
    pub position: DVec3,
    /// Unit vector.
    pub direction: DVec3,
    /// [m/s]
    pub velocity: f64,
    /// Time since the start of the simulated process [s].
    pub flight_time: f64,
    /// Weighted distance since desorption [cm].
    pub distance: f64,
    pub bounces: usize,
    /// Statistical weight, below 1 only in low-flux mode.
    pub ori_ratio: f64,
    /// Facet the particle last left; never re-tested on the next step.
    pub last_hit: Option<usize>,
    /// Source of the last teleport, target of a `-1` teleport.
    pub teleported_from: Option<usize>,
    /// Structure the particle travels in.
    pub structure: usize,
    /// Instant the particle decays, `1e100` without decay [s].
    pub expected_decay: f64,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            direction: DVec3::Z,
            velocity: 0.0,
            flight_time: 0.0,
            distance: 0.0,
            bounces: 0,
            ori_ratio: 1.0,
            last_hit: None,
            teleported_from: None,
            structure: 0,
            expected_decay: 1e100,
        }
    }
}

impl Particle {
    /// Flight time at which the particle reaches distance `d` [cm].
    #[inline]
    pub fn time_at(&self, d: f64) -> f64 {
        self.flight_time + d / 100.0 / self.velocity
    }

    /// Orthogonal speed against a surface of normal `n` [m/s].
    #[inline]
    pub fn ort_velocity(&self, n: DVec3) -> f64 {
        self.velocity * self.direction.dot(n).abs()
    }
}

/// A particle's contact with a facet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub facet: usize,
    /// Facet-local coordinates.
    pub u: f64,
    pub v: f64,
    /// Flight time at the contact [s].
    pub time: f64,
}

/// Why a particle stopped being followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCause {
    Absorbed,
    /// No facet in the way.
    Leaked,
    /// Past the latest moment, or decayed.
    TimeExpired,
    /// Low-flux weight fell under the cutoff.
    BelowCutoff,
}

/// Result of one transport step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Bounced,
    /// Crossed a link into another structure.
    Linked,
    Teleported,
    /// The particle ended with `weight` left; the next one is already launched
    /// unless the desorption limit was reached.
    Ended { cause: EndCause, weight: f64 },
    /// Desorption limit reached, nothing in flight.
    Finished,
}
