//! The coordinator: owns the simulation threads and the shared results.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::MutexGuard;
use tracing::{debug, info, warn};

use super::control::{Command, ProcessState, Shared, StatusUpdate, ThreadSlot};
use super::thread::{SimThread, COMMAND_WAIT};
use crate::config::{OnTheFlyParams, RunConfig};
use crate::model::SimulationModel;
use crate::results::{FacetState, GlobalHits, GlobalSimuState, Histogram, ParticleLoggerItem};
use crate::transport::SimulationMode;
use crate::util::{Error, Result};

/// Upper bound on simulation threads.
pub const MAX_THREADS: usize = 32;
/// Longest wait for every thread to execute a command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
/// Time given to threads to exit before they are detached.
const KILL_GRACE: Duration = Duration::from_secs(40);
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Geometry-wide results copied out of the shared state.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSnapshot {
    pub hits: GlobalHits,
    /// Steady state first, then one per moment.
    pub histograms: Vec<Histogram>,
}

/// Pool of simulation threads plus the shared result store.
///
/// Every command is broadcast through the control block, then the
/// coordinator polls until each thread has executed it. A thread that
/// reports [`ProcessState::Error`] fails the call with the aggregated
/// status of all threads; the others keep their results.
pub struct Worker {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    status_tx: Sender<StatusUpdate>,
    status_rx: Receiver<StatusUpdate>,
    /// Last status line of every thread.
    status: Vec<String>,
    config: Option<RunConfig>,
    model: Option<Arc<SimulationModel>>,
    mode: SimulationMode,
    running: bool,
    seed: u64,
    forced_terminations: usize,
    /// Incident flux iterated by [`Worker::step_ac`].
    ac_flux: Vec<f64>,
    /// Global counters as of the last [`Worker::update`].
    cached_global: GlobalHits,
}

impl Worker {
    /// Start `threads` idle threads seeded from the clock.
    pub fn new(threads: usize) -> Result<Self> {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);
        Self::with_seed(threads, seed)
    }

    /// Start `threads` idle threads; thread `i` uses seed `seed + i`.
    pub fn with_seed(threads: usize, seed: u64) -> Result<Self> {
        let (status_tx, status_rx) = channel();
        let mut worker = Self {
            shared: Arc::new(Shared::default()),
            handles: Vec::new(),
            status_tx,
            status_rx,
            status: Vec::new(),
            config: None,
            model: None,
            mode: SimulationMode::MonteCarlo,
            running: false,
            seed,
            forced_terminations: 0,
            ac_flux: Vec::new(),
            cached_global: GlobalHits::default(),
        };
        worker.set_proc_number(threads)?;
        Ok(worker)
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[inline]
    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// Threads that had to be detached instead of joined.
    #[inline]
    pub fn forced_terminations(&self) -> usize {
        self.forced_terminations
    }

    /// Last status line of every thread.
    #[inline]
    pub fn status(&self) -> &[String] {
        &self.status
    }

    #[inline]
    pub fn model(&self) -> Option<&Arc<SimulationModel>> {
        self.model.as_ref()
    }

    #[inline]
    pub fn config(&self) -> Option<&RunConfig> {
        self.config.as_ref()
    }

    /// Global counters as of the last [`Worker::update`].
    #[inline]
    pub fn cached_global(&self) -> &GlobalHits {
        &self.cached_global
    }

    /// Incident flux per facet from [`Worker::step_ac`].
    #[inline]
    pub fn ac_flux(&self) -> &[f64] {
        &self.ac_flux
    }

    /// States of all threads.
    pub fn states(&self) -> Vec<ProcessState> {
        self.shared.control.lock().slots.iter().map(|s| s.state).collect()
    }

    /// Particles desorbed (or rays traced) by all threads.
    pub fn progress(&self) -> u64 {
        self.shared.control.lock().total_progress()
    }

    /// Replace the pool with `threads` new threads, capped at [`MAX_THREADS`].
    pub fn set_proc_number(&mut self, threads: usize) -> Result<()> {
        if threads == 0 {
            return Err(Error::NoWorkers);
        }
        let threads = threads.min(MAX_THREADS);
        self.kill_all();

        self.shared.control.lock().slots = vec![ThreadSlot::default(); threads];
        self.status = vec![String::new(); threads];
        for id in 0..threads {
            let t = SimThread::new(id, self.seed, Arc::clone(&self.shared), self.status_tx.clone());
            let handle = thread::Builder::new()
                .name(format!("vacuum-mc-{id}"))
                .spawn(move || t.run())?;
            self.handles.push(handle);
        }
        self.wait_for(|s| s.settled_in(&[ProcessState::Ready]))?;
        info!(threads, "simulation threads started");

        if self.config.is_some() {
            self.reload()?;
        }
        Ok(())
    }

    /// Store `config` and load it into every thread.
    pub fn load(&mut self, config: RunConfig) -> Result<()> {
        self.config = Some(config);
        self.reload()
    }

    /// Stop, rebuild the model from the stored configuration, resize the
    /// shared results and hand the model to every thread.
    ///
    /// Configuration errors are returned before any thread is touched.
    pub fn reload(&mut self) -> Result<()> {
        if self.handles.is_empty() {
            return Err(Error::NoWorkers);
        }
        let config = self.config.as_ref().ok_or(Error::NoGeometry)?;
        let model = Arc::new(SimulationModel::prepare(config)?);
        let otf = self.thread_params(&config.otf);

        if self.running {
            self.stop()?;
        }
        *self.shared.results.lock() = model.new_results();
        self.shared.log.lock().clear();
        {
            let mut cb = self.shared.control.lock();
            cb.model = Some(Arc::clone(&model));
            cb.otf = otf;
            cb.broadcast(Command::Load);
        }
        self.wait_for(|s| s.settled_in(&[ProcessState::Ready]))?;

        self.ac_flux = vec![0.0; model.geometry.facet_count()];
        self.cached_global = GlobalHits::default();
        self.model = Some(model);
        debug!("model loaded");
        Ok(())
    }

    /// Pause a running pool, or start it in `mode`.
    pub fn start_stop(&mut self, mode: SimulationMode) -> Result<()> {
        if self.running {
            self.stop()
        } else {
            self.start(mode)
        }
    }

    fn start(&mut self, mode: SimulationMode) -> Result<()> {
        if self.handles.is_empty() {
            return Err(Error::NoWorkers);
        }
        if self.model.is_none() {
            return Err(Error::NoGeometry);
        }
        self.shared.control.lock().broadcast(Command::Start(mode));
        let res = self.wait_for(|s| s.settled_in(&[ProcessState::Running, ProcessState::Done]));
        self.mode = mode;
        // threads that did start keep running even if another one failed
        self.running = self.any_running();
        res?;
        info!(?mode, "simulation started");
        Ok(())
    }

    /// Pause every thread after its current batch and final merge.
    pub fn stop(&mut self) -> Result<()> {
        self.shared.control.lock().broadcast(Command::Pause);
        let stopped = [
            ProcessState::Paused,
            ProcessState::Done,
            ProcessState::Ready,
            ProcessState::Error,
        ];
        let res = self.wait_for(|s| s.settled_in(&stopped));
        self.running = self.any_running();
        res
    }

    /// Stop and zero every result, shared and thread-local.
    pub fn reset_stats_and_hits(&mut self) -> Result<()> {
        if self.running {
            self.stop()?;
        }
        self.shared.control.lock().broadcast(Command::Reset);
        self.wait_for(|s| s.settled_in(&[ProcessState::Ready]))?;
        self.shared.results.lock().reset();
        self.shared.log.lock().clear();
        self.ac_flux.fill(0.0);
        self.cached_global = GlobalHits::default();
        Ok(())
    }

    /// Poll the threads. Returns whether the run is still going.
    ///
    /// The run ends when every thread is done. A thread in error is
    /// reported with the status of all threads while the others go on.
    pub fn update(&mut self) -> Result<bool> {
        self.drain_status();
        let (failed, all_done) = {
            let cb = self.shared.control.lock();
            let failed = cb.slots.iter().any(|s| s.state == ProcessState::Error);
            let done = !cb.slots.is_empty() && cb.slots.iter().all(|s| s.state == ProcessState::Done);
            (failed, done)
        };
        if let Some(results) = self.shared.results.try_lock_for(COMMAND_WAIT) {
            self.cached_global = results.global_hits.clone();
        }
        if failed {
            // the other threads go on, `start_stop` still pauses them
            self.running = self.any_running();
            self.drain_status();
            return Err(Error::SubProcess {
                message: "Simulation thread error".into(),
                details: self.error_details(),
            });
        }
        if all_done && self.running {
            self.running = false;
            info!("desorption limit reached");
        }
        Ok(self.running)
    }

    /// Lock and return the shared results. Release promptly.
    pub fn shared_results(&self) -> MutexGuard<'_, GlobalSimuState> {
        self.shared.results.lock()
    }

    /// Lock and return the shared particle log. Release promptly.
    pub fn particle_log(&self) -> MutexGuard<'_, Vec<ParticleLoggerItem>> {
        self.shared.log.lock()
    }

    /// Copy of one facet's results, all moments included.
    pub fn facet_snapshot(&self, facet: usize) -> Option<FacetState> {
        self.shared.results.lock().facet_states.get(facet).cloned()
    }

    pub fn global_snapshot(&self) -> GlobalSnapshot {
        let results = self.shared.results.lock();
        GlobalSnapshot {
            hits: results.global_hits.clone(),
            histograms: results.global_histograms.clone(),
        }
    }

    /// Pass new on-the-fly parameters to every thread without stopping.
    pub fn change_params(&mut self, otf: OnTheFlyParams) -> Result<()> {
        let thread_otf = self.thread_params(&otf);
        if let Some(config) = self.config.as_mut() {
            config.otf = otf;
        }
        {
            let mut cb = self.shared.control.lock();
            cb.otf = thread_otf;
            cb.broadcast(Command::UpdateParams);
        }
        self.wait_for(|s| s.command.is_none())
    }

    /// One sweep of the steady-state flux balance over the angular
    /// coefficients gathered so far. Returns the largest flux change.
    pub fn step_ac(&mut self) -> Result<f64> {
        let model = self.model.as_ref().ok_or(Error::NoGeometry)?;
        let n = model.geometry.facet_count();
        let sources: Vec<f64> = model
            .facets
            .iter()
            .map(|f| f.source_weight / model.params.latest_moment)
            .collect();
        let sticking: Vec<f64> = (0..n).map(|i| model.sticking(i, 0.0)).collect();
        self.ac_flux.resize(n, 0.0);
        let results = self.shared.results.lock();
        Ok(results.angular_coefficients.solve_step(&mut self.ac_flux, &sources, &sticking))
    }

    /// One line per thread with its state and last status.
    pub fn error_details(&self) -> String {
        let cb = self.shared.control.lock();
        cb.slots
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let text = self.status.get(i).map_or("", String::as_str);
                format!("Thread #{}: [{:?}] {}", i + 1, s.state, text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Ask every thread to exit; detach those that miss the grace period.
    pub fn kill_all(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.shared.control.lock().broadcast(Command::Exit);
        let deadline = Instant::now() + KILL_GRACE;
        let mut handles: Vec<Option<JoinHandle<()>>> = self.handles.drain(..).map(Some).collect();

        while Instant::now() < deadline && handles.iter().any(Option::is_some) {
            for handle in handles.iter_mut() {
                if handle.as_ref().is_some_and(|h| h.is_finished()) {
                    if let Some(h) = handle.take() {
                        let _ = h.join();
                    }
                }
            }
            thread::sleep(WAIT_POLL);
        }

        let forced = handles.iter().filter(|h| h.is_some()).count();
        if forced > 0 {
            warn!(forced, "threads did not exit in time, detached");
            self.forced_terminations += forced;
        }
        self.drain_status();
        self.running = false;
        self.shared.control.lock().slots.clear();
    }

    fn thread_params(&self, otf: &OnTheFlyParams) -> OnTheFlyParams {
        OnTheFlyParams {
            nb_process: self.handles.len().max(1),
            ..otf.clone()
        }
    }

    fn any_running(&self) -> bool {
        let cb = self.shared.control.lock();
        cb.slots.iter().any(|s| s.state == ProcessState::Running)
    }

    fn drain_status(&mut self) {
        while let Ok(update) = self.status_rx.try_recv() {
            if let Some(line) = self.status.get_mut(update.thread) {
                *line = update.text;
            }
        }
    }

    /// Poll until every slot satisfies `done`, failing on a thread error.
    fn wait_for(&mut self, done: impl Fn(&ThreadSlot) -> bool) -> Result<()> {
        let start = Instant::now();
        loop {
            self.drain_status();
            let (all_done, failed) = {
                let cb = self.shared.control.lock();
                let failed = cb
                    .slots
                    .iter()
                    .any(|s| s.command.is_none() && s.state == ProcessState::Error && !done(s));
                (cb.slots.iter().all(&done), failed)
            };
            if all_done {
                return Ok(());
            }
            if failed {
                self.drain_status();
                return Err(Error::SubProcess {
                    message: "Thread error".into(),
                    details: self.error_details(),
                });
            }
            if start.elapsed() > COMMAND_TIMEOUT {
                return Err(Error::SubProcess {
                    message: "Timeout waiting for threads".into(),
                    details: self.error_details(),
                });
            }
            thread::sleep(WAIT_POLL);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.kill_all();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("threads", &self.handles.len())
            .field("mode", &self.mode)
            .field("running", &self.running)
            .field("forced_terminations", &self.forced_terminations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{DesorptionLaw, Geometry};
    use crate::util::DVec3;

    fn endless_box() -> RunConfig {
        let mut geometry = Geometry::closed_box(DVec3::new(4.0, 4.0, 20.0)).unwrap();
        geometry.facets[0].props.desorption = DesorptionLaw::Cosine;
        geometry.facets[0].props.outgassing = 1e-3;
        geometry.facets[1].props.sticking = 1.0;
        RunConfig {
            geometry,
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_thread_does_not_hide_running_ones() {
        let mut worker = Worker::with_seed(2, 4).unwrap();
        worker.load(endless_box()).unwrap();
        worker.start_stop(SimulationMode::MonteCarlo).unwrap();

        // thread 0 fails while thread 1 keeps going
        worker.shared.control.lock().slots[0].state = ProcessState::Error;
        assert!(matches!(worker.update(), Err(Error::SubProcess { .. })));
        assert!(worker.is_running());
        assert_eq!(worker.states()[1], ProcessState::Running);

        // the toggle pauses the survivor instead of starting again
        worker.start_stop(SimulationMode::MonteCarlo).unwrap();
        assert!(!worker.is_running());
        assert!(worker.states().iter().all(|&s| s != ProcessState::Running));
        assert_eq!(worker.states()[1], ProcessState::Paused);

        worker.reset_stats_and_hits().unwrap();
        assert!(worker.states().iter().all(|&s| s == ProcessState::Ready));
    }
}
