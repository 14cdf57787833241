//! State shared between the coordinator and the simulation threads.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::OnTheFlyParams;
use crate::model::SimulationModel;
use crate::results::{GlobalSimuState, ParticleLoggerItem};
use crate::transport::SimulationMode;

/// Lifecycle of one simulation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    /// Spawned, not yet polling commands.
    #[default]
    Starting,
    Ready,
    Running,
    Paused,
    /// Desorption limit reached.
    Done,
    /// Stopped on a runtime error until reset or reloaded.
    Error,
    Killed,
}

impl ProcessState {
    /// Whether the thread is still tracing particles.
    #[inline]
    pub fn is_active(self) -> bool {
        self == ProcessState::Running
    }
}

/// Instruction from the coordinator to one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Take the current model and parameters, drop local results.
    Load,
    /// Take new on-the-fly parameters and keep the current state.
    UpdateParams,
    Start(SimulationMode),
    /// Finish the batch, merge, then wait.
    Pause,
    /// Drop local results.
    Reset,
    /// Release the model.
    Close,
    Exit,
}

/// One thread's entry in the control block.
#[derive(Debug, Clone, Default)]
pub struct ThreadSlot {
    pub state: ProcessState,
    /// Pending command. Cleared by the thread once executed.
    pub command: Option<Command>,
    /// Particles desorbed, or rays traced in angular coefficient mode.
    pub progress: u64,
}

impl ThreadSlot {
    /// Command executed and state among `expected`.
    #[inline]
    pub fn settled_in(&self, expected: &[ProcessState]) -> bool {
        self.command.is_none() && expected.contains(&self.state)
    }
}

/// Worker control block: per-thread slots plus what `Load` hands out.
#[derive(Debug, Default)]
pub struct ControlBlock {
    pub slots: Vec<ThreadSlot>,
    pub model: Option<Arc<SimulationModel>>,
    pub otf: OnTheFlyParams,
}

impl ControlBlock {
    /// Queue `command` for every thread.
    pub fn broadcast(&mut self, command: Command) {
        for slot in &mut self.slots {
            slot.command = Some(command);
        }
    }

    /// Sum of every thread's progress counter.
    pub fn total_progress(&self) -> u64 {
        self.slots.iter().map(|s| s.progress).sum()
    }
}

/// Everything behind a lock, one lock each.
#[derive(Debug, Default)]
pub struct Shared {
    pub control: Mutex<ControlBlock>,
    pub results: Mutex<GlobalSimuState>,
    pub log: Mutex<Vec<ParticleLoggerItem>>,
}

/// Status line posted by a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub thread: usize,
    pub text: String,
}
