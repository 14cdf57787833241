//! Per-particle diagnostic log.

use serde::{Deserialize, Serialize};

use super::global::HitType;

/// One logged hit on the monitored facet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleLoggerItem {
    /// Facet-local position.
    pub u: f64,
    pub v: f64,
    /// Facet-local direction.
    pub theta: f64,
    pub phi: f64,
    /// [m/s]
    pub velocity: f64,
    /// Flight time [s].
    pub time: f64,
    pub weight: f64,
    pub decay_moment: f64,
    pub kind: HitType,
}

/// Number of items a thread may collect before its next merge.
///
/// Each thread gets an equal share of the remaining capacity, rounded up.
pub fn log_target(log_limit: usize, logged: usize, threads: usize) -> usize {
    log_limit.saturating_sub(logged) / threads.max(1) + 1
}

/// Append as many `items` as fit under `log_limit`. Returns how many were taken.
pub fn merge_log(shared: &mut Vec<ParticleLoggerItem>, items: &[ParticleLoggerItem], log_limit: usize) -> usize {
    let room = log_limit.saturating_sub(shared.len()).min(items.len());
    shared.extend_from_slice(&items[..room]);
    room
}
