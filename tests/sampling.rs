//! Statistical checks of the samplers.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vacuum_mc::config::{OnTheFlyParams, RunConfig};
use vacuum_mc::geometry::{DesorptionLaw, Facet, FacetProperties, Geometry};
use vacuum_mc::model::SimulationModel;
use vacuum_mc::physics::{maxwell_cdf, mean_speed, CDF_SIZE};
use vacuum_mc::transport::{EndCause, Simulation, StepOutcome};
use vacuum_mc::util::{interpolate_x, DVec3};

/// Molecules leaving a wall are flux weighted: mean `3π/8` of the gas mean.
#[test]
fn test_wall_speed_mean() {
    for (temperature, mass) in [(293.15, 28.0), (77.0, 2.0), (500.0, 44.0)] {
        let cdf = maxwell_cdf(temperature, mass, CDF_SIZE);
        let mut rng = StdRng::seed_from_u64(1234);
        let n = 200_000;
        let sum: f64 = (0..n).map(|_| interpolate_x(rng.gen(), &cdf, true)).sum();
        let mean = sum / n as f64;
        let expected = mean_speed(temperature, mass) * 3.0 * std::f64::consts::PI / 8.0;
        // the table ends at 4 v_p and is linear between points
        assert!(
            (mean - expected).abs() / expected < 0.015,
            "T={temperature} M={mass}: {mean} vs {expected}"
        );
    }
}

/// A lone source hexagon: every particle leaks on its first step.
fn hexagon_source() -> Arc<SimulationModel> {
    let vertices: Vec<DVec3> = (0..6)
        .map(|i| {
            let a = i as f64 * std::f64::consts::PI / 3.0;
            DVec3::new(3.0 * a.cos(), 3.0 * a.sin(), 1.0)
        })
        .collect();
    let props = FacetProperties {
        desorption: DesorptionLaw::Cosine,
        outgassing: 1.0,
        ..Default::default()
    };
    let cfg = RunConfig {
        geometry: Geometry::new(vertices, vec![Facet::new((0..6).collect(), props)], 1).unwrap(),
        ..Default::default()
    };
    Arc::new(SimulationModel::prepare(&cfg).unwrap())
}

#[test]
fn test_launch_points_inside_convex_polygon() {
    let model = hexagon_source();
    let facet = model.facet(0);
    let fr = &facet.frame;
    let mut sim = Simulation::new(model.clone(), OnTheFlyParams::default(), 5);
    assert!(sim.start().unwrap());

    let mut mean = DVec3::ZERO;
    let n = 2000;
    for _ in 0..n {
        let d = sim.particle().position - fr.o;
        let (u, v) = (d.dot(fr.u) / fr.u.length_squared(), d.dot(fr.v) / fr.v.length_squared());
        assert!(facet.contains(u, v), "({u}, {v}) outside");
        mean += sim.particle().position;

        let outcome = sim.step().unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Ended {
                cause: EndCause::Leaked,
                ..
            }
        ));
    }
    // uniform over a centered hexagon
    mean /= n as f64;
    assert!((mean - fr.center).length() < 0.15);
    assert_eq!(sim.results().global_hits.nb_leak_total, n as u64);
}

#[test]
fn test_cosine_directions() {
    let model = hexagon_source();
    let n = model.facet(0).frame.n;
    let mut sim = Simulation::new(model, OnTheFlyParams::default(), 17);
    sim.start().unwrap();
    let count = 20_000;
    let mut sum_cos = 0.0;
    for _ in 0..count {
        let c = sim.particle().direction.dot(n);
        assert!(c >= 0.0);
        sum_cos += c;
        sim.step().unwrap();
    }
    // E[cos] = 2/3 for a cosine law
    let mean = sum_cos / count as f64;
    assert!((mean - 2.0 / 3.0).abs() < 0.01, "{mean}");
}
