//! Thread pool lifecycle, error reporting and contention on the shared results.

use std::thread;
use std::time::{Duration, Instant};

use vacuum_mc::config::RunConfig;
use vacuum_mc::geometry::{DesorptionLaw, Facet, FacetProperties, Geometry};
use vacuum_mc::transport::SimulationMode;
use vacuum_mc::util::DVec3;
use vacuum_mc::worker::{ProcessState, Worker, MAX_THREADS};
use vacuum_mc::Error;

/// Closed box with a source at z = 0 and a pump at z = max.
fn pumped_box(limit: u64) -> RunConfig {
    let mut geometry = Geometry::closed_box(DVec3::new(4.0, 4.0, 20.0)).unwrap();
    let src = &mut geometry.facets[0].props;
    src.desorption = DesorptionLaw::Cosine;
    src.outgassing = 1e-3;
    geometry.facets[1].props.sticking = 1.0;
    let mut cfg = RunConfig {
        geometry,
        ..Default::default()
    };
    cfg.otf.desorption_limit = limit;
    cfg
}

fn run_to_end(worker: &mut Worker) {
    let start = Instant::now();
    while worker.update().unwrap() {
        assert!(start.elapsed() < Duration::from_secs(60), "run did not finish");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_pool_lifecycle() {
    let mut worker = Worker::with_seed(2, 11).unwrap();
    assert_eq!(worker.thread_count(), 2);
    assert!(worker.states().iter().all(|&s| s == ProcessState::Ready));

    worker.load(pumped_box(2000)).unwrap();
    worker.start_stop(SimulationMode::MonteCarlo).unwrap();
    assert!(worker.is_running());
    run_to_end(&mut worker);

    assert!(worker.states().iter().all(|&s| s == ProcessState::Done));
    {
        let results = worker.shared_results();
        let g = &results.global_hits;
        assert_eq!(g.hits.nb_desorbed, 2000);
        assert_eq!(g.hits.nb_abs_equiv + g.nb_leak_total as f64, 2000.0);
        assert_eq!(results.facet_states[0].steady().nb_desorbed, 2000);
    }
    assert_eq!(worker.progress(), 2000);
    assert_eq!(worker.cached_global().hits.nb_desorbed, 2000);

    worker.reset_stats_and_hits().unwrap();
    assert!(worker.states().iter().all(|&s| s == ProcessState::Ready));
    assert_eq!(worker.global_snapshot().hits.hits.nb_desorbed, 0);

    // a second run after reset starts from zero
    worker.start_stop(SimulationMode::MonteCarlo).unwrap();
    run_to_end(&mut worker);
    assert_eq!(worker.shared_results().global_hits.hits.nb_desorbed, 2000);

    worker.kill_all();
    assert_eq!(worker.thread_count(), 0);
    assert_eq!(worker.forced_terminations(), 0);
}

#[test]
fn test_pause_merges_everything() {
    let mut worker = Worker::with_seed(3, 5).unwrap();
    worker.load(pumped_box(0)).unwrap();
    worker.start_stop(SimulationMode::MonteCarlo).unwrap();
    thread::sleep(Duration::from_millis(300));
    worker.start_stop(SimulationMode::MonteCarlo).unwrap();
    assert!(!worker.is_running());
    assert!(worker.states().iter().all(|&s| s == ProcessState::Paused));

    let desorbed = worker.shared_results().global_hits.hits.nb_desorbed;
    assert!(desorbed > 0);
    assert_eq!(desorbed, worker.progress());

    // resume continues the particles in flight
    worker.start_stop(SimulationMode::MonteCarlo).unwrap();
    thread::sleep(Duration::from_millis(100));
    worker.stop().unwrap();
    assert!(worker.shared_results().global_hits.hits.nb_desorbed >= desorbed);
}

#[test]
fn test_merge_timeout_loses_nothing() {
    let mut worker = Worker::with_seed(2, 3).unwrap();
    worker.load(pumped_box(20_000)).unwrap();
    worker.start_stop(SimulationMode::MonteCarlo).unwrap();
    {
        // hold the results across several merge attempts
        let _guard = worker.shared_results();
        thread::sleep(Duration::from_millis(400));
        assert!(worker.states().iter().all(|&s| s != ProcessState::Error));
    }
    run_to_end(&mut worker);
    let results = worker.shared_results();
    assert_eq!(results.global_hits.hits.nb_desorbed, 20_000);
    assert_eq!(results.facet_states[0].steady().nb_desorbed, 20_000);
}

#[test]
fn test_finished_thread_waits_for_its_last_merge() {
    let mut worker = Worker::with_seed(1, 6).unwrap();
    worker.load(pumped_box(300)).unwrap();
    worker.start_stop(SimulationMode::MonteCarlo).unwrap();
    {
        // longer than the final merge wait: the run ends while locked out
        let _guard = worker.shared_results();
        thread::sleep(Duration::from_millis(3500));
        assert_eq!(worker.states(), vec![ProcessState::Running]);
    }
    run_to_end(&mut worker);
    assert_eq!(worker.states(), vec![ProcessState::Done]);
    let results = worker.shared_results();
    assert_eq!(results.global_hits.hits.nb_desorbed, 300);
    assert_eq!(results.facet_states[0].steady().nb_desorbed, 300);
}

#[test]
fn test_thread_error_is_reported() {
    let mut cfg = pumped_box(100);
    cfg.geometry.facets[0].props.structure = None;
    let mut worker = Worker::with_seed(2, 1).unwrap();
    worker.load(cfg).unwrap();

    let err = worker.start_stop(SimulationMode::MonteCarlo).unwrap_err();
    let Error::SubProcess { details, .. } = &err else {
        panic!("unexpected error {err}");
    };
    assert!(details.contains("Thread #1"));
    assert!(details.contains("shouldn't desorb"));
    assert!(worker.error_details().contains("[Error]"));
    assert!(!worker.is_running());

    // the error sticks through pause and start
    let start = Instant::now();
    while !worker.states().iter().all(|&s| s == ProcessState::Error) {
        assert!(start.elapsed() < Duration::from_secs(10));
        thread::sleep(Duration::from_millis(10));
    }
    worker.stop().unwrap();
    assert!(worker.states().iter().all(|&s| s == ProcessState::Error));
    assert!(worker.start_stop(SimulationMode::MonteCarlo).is_err());
    assert!(worker.states().iter().all(|&s| s == ProcessState::Error));

    // reset brings the threads back
    worker.reset_stats_and_hits().unwrap();
    assert!(worker.states().iter().all(|&s| s == ProcessState::Ready));
}

#[test]
fn test_configuration_errors() {
    let mut worker = Worker::with_seed(1, 0).unwrap();
    assert!(matches!(
        worker.start_stop(SimulationMode::MonteCarlo),
        Err(Error::NoGeometry)
    ));

    let mut cfg = pumped_box(10);
    cfg.geometry.facets[2].props.super_dest = 5;
    let err = worker.load(cfg).unwrap_err();
    assert_eq!(err.to_string(), "Invalid structure (wrong link on F#3)");

    let mut cfg = pumped_box(10);
    cfg.geometry.facets[0].props.desorption = DesorptionLaw::None;
    assert!(matches!(worker.load(cfg), Err(Error::NoDesorptionFacet)));

    assert!(matches!(worker.set_proc_number(0), Err(Error::NoWorkers)));
}

#[test]
fn test_thread_count_is_capped() {
    let mut worker = Worker::with_seed(1, 0).unwrap();
    worker.set_proc_number(MAX_THREADS + 8).unwrap();
    assert_eq!(worker.thread_count(), MAX_THREADS);
    assert_eq!(worker.states().len(), MAX_THREADS);
}

#[test]
fn test_change_params_while_running() {
    let mut worker = Worker::with_seed(2, 8).unwrap();
    let mut cfg = pumped_box(0);
    cfg.otf.enable_logging = true;
    cfg.otf.log_facet = 1;
    cfg.otf.log_limit = 50;
    worker.load(cfg.clone()).unwrap();
    worker.start_stop(SimulationMode::MonteCarlo).unwrap();
    thread::sleep(Duration::from_millis(200));

    let mut otf = cfg.otf.clone();
    otf.desorption_limit = 1_000_000;
    worker.change_params(otf).unwrap();
    assert!(worker.is_running());
    worker.stop().unwrap();

    let log = worker.particle_log();
    assert!(!log.is_empty());
    assert!(log.len() <= 50);
}

#[test]
fn test_angular_coefficients_through_pool() {
    // two facing unit plates 0.1 apart
    let vertices = vec![
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(1.0, 0.0, 0.0),
        DVec3::new(1.0, 1.0, 0.0),
        DVec3::new(0.0, 1.0, 0.0),
        DVec3::new(0.0, 1.0, 0.1),
        DVec3::new(1.0, 1.0, 0.1),
        DVec3::new(1.0, 0.0, 0.1),
        DVec3::new(0.0, 0.0, 0.1),
    ];
    let source = FacetProperties {
        desorption: DesorptionLaw::Cosine,
        outgassing: 1e-3,
        ..Default::default()
    };
    let pump = FacetProperties {
        sticking: 1.0,
        ..Default::default()
    };
    let cfg = RunConfig {
        geometry: Geometry::new(
            vertices,
            vec![Facet::new(vec![0, 1, 2, 3], source), Facet::new(vec![4, 5, 6, 7], pump)],
            1,
        )
        .unwrap(),
        ..Default::default()
    };

    let mut worker = Worker::with_seed(2, 2).unwrap();
    worker.load(cfg).unwrap();
    worker.start_stop(SimulationMode::AngularCoefficient).unwrap();
    assert_eq!(worker.mode(), SimulationMode::AngularCoefficient);
    thread::sleep(Duration::from_millis(500));
    worker.stop().unwrap();

    let f01 = {
        let results = worker.shared_results();
        let ac = &results.angular_coefficients;
        assert!(ac.total_emitted() > 1000);
        ac.view_factor(0, 1)
    };
    assert!((f01 - 0.827).abs() < 0.05, "F01 = {f01}");

    let mut delta = f64::INFINITY;
    for _ in 0..100 {
        delta = worker.step_ac().unwrap();
    }
    assert!(delta < 1e-9);
    // the pump only sees the part of the source flux that does not leak
    let flux = worker.ac_flux();
    assert!(flux[1] > 0.0 && flux[1] <= flux[0]);
}
