//! Thread pool running one [`Simulation`](crate::transport::Simulation) per
//! thread.
//!
//! ```text
//! Starting -> Ready <-> Running <-> Paused
//!               |          |
//!               |          +-> Done
//!               +-> Killed     any -> Error (until Reset or Load)
//! ```
//!
//! The coordinator ([`Worker`]) and the threads share three locks: the
//! control block, the results and the particle log. None is ever taken
//! while holding another.

mod control;
mod coordinator;
mod thread;

pub use control::{Command, ControlBlock, ProcessState, StatusUpdate, ThreadSlot};
pub use coordinator::{GlobalSnapshot, Worker, MAX_THREADS};
