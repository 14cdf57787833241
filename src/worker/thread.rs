//! Main loop of one simulation thread.
//!
//! The thread polls its control block slot between batches, runs a batch of
//! transport steps while `Running`, then tries to merge its private results
//! into the shared ones. A merge that cannot take the lock in time is skipped:
//! nothing local is cleared, so the next successful merge carries both batches.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info_span, warn};

use super::control::{Command, ProcessState, Shared, StatusUpdate};
use crate::transport::{Simulation, SimulationMode};
use crate::util::{Error, Result};

/// Bounded wait on the control block.
pub(crate) const COMMAND_WAIT: Duration = Duration::from_millis(20);
/// Merge wait between two batches.
pub(crate) const MERGE_WAIT_RUNNING: Duration = Duration::from_millis(20);
/// Merge wait when the run stops and nothing may be left behind.
pub(crate) const MERGE_WAIT_FINAL: Duration = Duration::from_secs(2);
/// Sleep between polls while idle.
const IDLE_POLL: Duration = Duration::from_millis(5);
/// First batch size, before any speed is measured.
const INITIAL_BATCH: usize = 250;

pub(crate) struct SimThread {
    id: usize,
    seed: u64,
    shared: Arc<Shared>,
    status: Sender<StatusUpdate>,
    sim: Option<Simulation>,
    state: ProcessState,
    mode: SimulationMode,
    /// Measured over the last batch, 0 before the first one.
    steps_per_sec: f64,
    /// Whether the last merge attempt went through.
    merged: bool,
}

impl SimThread {
    pub(crate) fn new(id: usize, seed: u64, shared: Arc<Shared>, status: Sender<StatusUpdate>) -> Self {
        Self {
            id,
            seed,
            shared,
            status,
            sim: None,
            state: ProcessState::Starting,
            mode: SimulationMode::MonteCarlo,
            steps_per_sec: 0.0,
            merged: true,
        }
    }

    pub(crate) fn run(mut self) {
        let span = info_span!("worker", id = self.id);
        let _enter = span.enter();
        self.report(ProcessState::Ready, None);

        loop {
            let command = self
                .shared
                .control
                .try_lock_for(COMMAND_WAIT)
                .and_then(|cb| cb.slots.get(self.id).and_then(|s| s.command));

            if let Some(command) = command {
                debug!(?command, "command");
                match self.execute(command) {
                    Ok(ProcessState::Killed) => {
                        self.report(ProcessState::Killed, Some(command));
                        return;
                    }
                    Ok(state) => self.report(state, Some(command)),
                    Err(e) => self.fail(&e, Some(command)),
                }
                continue;
            }

            if self.state == ProcessState::Running {
                if let Err(e) = self.run_batch() {
                    self.fail(&e, None);
                }
            } else {
                thread::sleep(IDLE_POLL);
            }
        }
    }

    fn execute(&mut self, command: Command) -> Result<ProcessState> {
        match command {
            Command::Load => {
                let (model, otf) = {
                    let cb = self.shared.control.lock();
                    (cb.model.clone(), cb.otf.clone())
                };
                let model = model.ok_or(Error::NoGeometry)?;
                // distinct stream per thread
                let seed = self.seed.wrapping_add(self.id as u64);
                self.sim = Some(Simulation::new(model, otf, seed));
                self.steps_per_sec = 0.0;
                self.merged = true;
                Ok(ProcessState::Ready)
            }
            Command::UpdateParams => {
                let otf = self.shared.control.lock().otf.clone();
                let logged = self.shared.log.try_lock_for(COMMAND_WAIT).map_or(0, |l| l.len());
                if let Some(sim) = self.sim.as_mut() {
                    sim.update_params(otf, logged);
                }
                Ok(self.state)
            }
            // an error sticks until Reset or Load
            Command::Start(_) | Command::Pause if self.state == ProcessState::Error => Ok(ProcessState::Error),
            Command::Start(mode) => {
                let sim = self.sim.as_mut().ok_or(Error::NoGeometry)?;
                self.mode = mode;
                let launched = match mode {
                    SimulationMode::MonteCarlo => sim.start()?,
                    SimulationMode::AngularCoefficient => true,
                };
                // unmerged results keep the thread Running until merged
                Ok(if launched || !self.merged { ProcessState::Running } else { ProcessState::Done })
            }
            Command::Pause => {
                if !self.merged {
                    self.merge(MERGE_WAIT_FINAL);
                }
                if self.sim.is_some() {
                    let (progress, text) = self.progress_report();
                    self.publish(progress, text);
                }
                Ok(match self.state {
                    ProcessState::Done => ProcessState::Done,
                    _ => ProcessState::Paused,
                })
            }
            Command::Reset => {
                if let Some(sim) = self.sim.as_mut() {
                    sim.reset();
                }
                self.merged = true;
                self.publish(0, "Reset".into());
                Ok(ProcessState::Ready)
            }
            Command::Close => {
                self.sim = None;
                Ok(ProcessState::Ready)
            }
            Command::Exit => {
                if !self.merged {
                    self.merge(MERGE_WAIT_FINAL);
                }
                Ok(ProcessState::Killed)
            }
        }
    }

    /// Steps for the next batch, aiming at about one second.
    fn batch_size(&self) -> usize {
        if self.steps_per_sec <= 0.0 {
            INITIAL_BATCH
        } else {
            ((self.steps_per_sec + 0.5) as usize).max(1)
        }
    }

    fn run_batch(&mut self) -> Result<()> {
        let steps = self.batch_size();
        let mode = self.mode;
        let Some(sim) = self.sim.as_mut() else {
            return Err(Error::NoGeometry);
        };

        let start = Instant::now();
        let more = sim.run_steps(mode, steps)?;
        let elapsed = start.elapsed().as_secs_f64();
        if more && elapsed > 0.0 {
            self.steps_per_sec = steps as f64 / elapsed;
        }

        let (progress, text) = self.progress_report();
        self.publish(progress, text);

        if more {
            self.merge(MERGE_WAIT_RUNNING);
            return Ok(());
        }
        // stay Running until the last results are in, the next call retries
        if !self.merge(MERGE_WAIT_FINAL) {
            warn!("final merge timed out, retrying");
            return Ok(());
        }
        let mut cb = self.shared.control.lock();
        if let Some(slot) = cb.slots.get_mut(self.id) {
            slot.state = ProcessState::Done;
        }
        self.state = ProcessState::Done;
        Ok(())
    }

    fn progress_report(&self) -> (u64, String) {
        match (self.sim.as_ref(), self.mode) {
            (None, _) => (0, String::new()),
            (Some(sim), SimulationMode::MonteCarlo) => (sim.total_desorbed(), sim.status_text()),
            (Some(sim), SimulationMode::AngularCoefficient) => {
                (sim.total_rays(), format!("AC {}", sim.total_rays()))
            }
        }
    }

    /// Merge local results and log into the shared ones within `wait`.
    fn merge(&mut self, wait: Duration) -> bool {
        let Some(sim) = self.sim.as_mut() else {
            return true;
        };
        let Some(mut results) = self.shared.results.try_lock_for(wait) else {
            self.merged = false;
            let _ = self.status.send(StatusUpdate {
                thread: self.id,
                text: format!("{} (waiting for results lock)", sim.status_text()),
            });
            return false;
        };
        sim.merge_into(&mut results);
        drop(results);
        if let Some(mut log) = self.shared.log.try_lock_for(wait) {
            sim.merge_log_into(&mut log);
        }
        self.merged = true;
        true
    }

    fn publish(&self, progress: u64, text: String) {
        if let Some(mut cb) = self.shared.control.try_lock_for(COMMAND_WAIT) {
            if let Some(slot) = cb.slots.get_mut(self.id) {
                slot.progress = progress;
            }
        }
        let _ = self.status.send(StatusUpdate { thread: self.id, text });
    }

    /// Write `state` to the slot and acknowledge `done` unless a newer
    /// command replaced it meanwhile.
    fn report(&mut self, state: ProcessState, done: Option<Command>) {
        self.state = state;
        let mut cb = self.shared.control.lock();
        if let Some(slot) = cb.slots.get_mut(self.id) {
            slot.state = state;
            if done.is_some() && slot.command == done {
                slot.command = None;
            }
        }
    }

    fn fail(&mut self, e: &Error, done: Option<Command>) {
        tracing::error!(error = %e, "simulation thread stopped");
        let _ = self.status.send(StatusUpdate {
            thread: self.id,
            text: format!("Error: {e}"),
        });
        self.report(ProcessState::Error, done);
    }
}
