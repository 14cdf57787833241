//! Prepared, read-only bundle of everything a run needs.
//!
//! [`SimulationModel::prepare`] validates a [`RunConfig`], builds one AABB
//! tree per structure and precomputes the sampling tables (speed CDFs,
//! integrated desorption curves, outgassing map CDFs, angle map samplers).
//! Threads share the model through an `Arc` and never mutate it.

use rayon::prelude::*;

use crate::anglemap::AngleMapSampler;
use crate::config::{RunConfig, WorkerParams};
use crate::geometry::{DesorptionLaw, Facet, Geometry, Parameter};
use crate::physics::{self, KB, MBAR_L_TO_PA_M3};
use crate::results::GlobalSimuState;
use crate::spatial::AabbTree;
use crate::util::{Error, Result};

/// Sampling data derived for one facet.
#[derive(Debug, Clone, Default)]
pub struct FacetRuntime {
    /// Index into [`SimulationModel::speed_cdfs`].
    pub cdf: usize,
    /// Upper bound of velocity profiles [m/s].
    pub max_speed: f64,
    /// Molecules desorbed by this facet up to the latest moment.
    pub source_weight: f64,
    /// Cumulative molecules per outgassing map cell.
    pub map_cdf: Vec<f64>,
    pub angle_map: Option<AngleMapSampler>,
}

/// Geometry, trees and sampling tables of one run.
#[derive(Debug, Clone)]
pub struct SimulationModel {
    pub geometry: Geometry,
    pub parameters: Vec<Parameter>,
    pub moments: Vec<f64>,
    /// Includes the derived totals.
    pub params: WorkerParams,
    /// One tree per structure.
    pub structures: Vec<AabbTree>,
    /// `(temperature, cdf)` for every distinct wall temperature.
    pub speed_cdfs: Vec<(f64, Vec<(f64, f64)>)>,
    /// Integrated desorption per parameter, for outgassing curves only.
    pub integrated_desorption: Vec<Option<Vec<(f64, f64)>>>,
    pub facets: Vec<FacetRuntime>,
}

impl SimulationModel {
    /// Validate `config` and build the trees and tables.
    #[tracing::instrument(skip_all, fields(facets = config.geometry.facet_count()))]
    pub fn prepare(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        let mut geometry = config.geometry.clone();
        let parameters = config.parameters.clone();
        let mut params = config.params.clone();

        check_facets(&geometry, parameters.len())?;
        for facet in geometry.facets.iter_mut().filter(|f| f.is_link()) {
            facet.props.opacity = 1.0;
            facet.props.opacity_param = None;
            facet.props.sticking = 0.0;
            facet.props.sticking_param = None;
        }

        let structures: Vec<AabbTree> = (0..geometry.structure_count)
            .into_par_iter()
            .map(|s| AabbTree::build(&geometry.facets, &geometry.structure_facets(s)))
            .collect();

        params.latest_moment = physics::latest_moment(&config.moments, params.time_window);

        let mut integrated_desorption = vec![None; parameters.len()];
        for facet in &geometry.facets {
            if let Some(p) = facet.props.outgassing_param {
                if integrated_desorption[p].is_none() {
                    integrated_desorption[p] =
                        Some(physics::integrated_desorption(&parameters[p].values, params.latest_moment));
                }
            }
        }

        let mut speed_cdfs: Vec<(f64, Vec<(f64, f64)>)> = Vec::new();
        let mut facets = Vec::with_capacity(geometry.facet_count());
        for (id, facet) in geometry.facets.iter().enumerate() {
            let t = facet.props.temperature;
            let cdf = match speed_cdfs.iter().position(|(temp, _)| *temp == t) {
                Some(i) => i,
                None => {
                    speed_cdfs.push((t, physics::maxwell_cdf(t, params.gas_mass, physics::CDF_SIZE)));
                    speed_cdfs.len() - 1
                }
            };
            facets.push(FacetRuntime {
                cdf,
                max_speed: physics::max_speed(t, params.gas_mass),
                angle_map: prepare_angle_map(id, facet)?,
                ..Default::default()
            });
        }

        let mut model = Self {
            geometry,
            parameters,
            moments: config.moments.clone(),
            params,
            structures,
            speed_cdfs,
            integrated_desorption,
            facets,
        };
        model.calc_total_outgassing()?;

        tracing::info!(
            facets = model.geometry.facet_count(),
            structures = model.structures.len(),
            moments = model.moments.len(),
            total_desorbed = model.params.total_desorbed_molecules,
            "model prepared"
        );
        Ok(model)
    }

    /// Source weights and outgassing totals.
    fn calc_total_outgassing(&mut self) -> Result<()> {
        let latest = self.params.latest_moment;
        let mut any_source = false;
        let mut total = 0.0;
        let mut rate = 0.0;
        let mut rate_pa = 0.0;

        for (facet, rt) in self.geometry.facets.iter().zip(self.facets.iter_mut()) {
            let props = &facet.props;
            if !props.desorption.is_source() {
                continue;
            }
            any_source = true;
            let kt = KB * props.temperature;

            if let Some(map) = &props.outgassing_map {
                let mut acc = 0.0;
                rt.map_cdf = map
                    .cells
                    .iter()
                    .map(|&c| {
                        acc += latest * c / kt;
                        acc
                    })
                    .collect();
                rt.source_weight = acc;
                rate += map.total() / kt;
                rate_pa += map.total();
            } else if let Some(p) = props.outgassing_param {
                let id = self.integrated_desorption[p].as_deref().unwrap_or(&[]);
                rt.source_weight = id.last().map_or(0.0, |l| l.1) / kt;
                let last = self.parameters[p].last_value() * MBAR_L_TO_PA_M3;
                rate += last / kt;
                rate_pa += last;
            } else {
                rt.source_weight = latest * props.outgassing / kt;
                rate += props.outgassing / kt;
                rate_pa += props.outgassing;
            }
            total += rt.source_weight;
        }

        if !any_source {
            return Err(Error::NoDesorptionFacet);
        }
        if !(total > 0.0) {
            return Err(Error::ZeroOutgassing);
        }
        self.params.total_desorbed_molecules = total;
        self.params.final_outgassing_rate = rate;
        self.params.final_outgassing_rate_pa_m3_s = rate_pa;
        Ok(())
    }

    /// Empty results matching this model's facets and moments.
    pub fn new_results(&self) -> GlobalSimuState {
        GlobalSimuState::new(&self.geometry.facets, self.moments.len(), &self.params.global_histograms)
    }

    #[inline]
    pub fn facet(&self, id: usize) -> &Facet {
        &self.geometry.facets[id]
    }

    /// Moment buckets (1-based, 0 is steady state) whose window contains `time`.
    pub fn moment_buckets(&self, time: f64) -> impl Iterator<Item = usize> + '_ {
        let half = self.params.time_window / 2.0;
        self.moments
            .iter()
            .enumerate()
            .filter(move |(_, m)| (time - **m).abs() < half)
            .map(|(i, _)| i + 1)
    }

    /// Speed CDF of a facet.
    #[inline]
    pub fn speed_cdf(&self, facet: usize) -> &[(f64, f64)] {
        &self.speed_cdfs[self.facets[facet].cdf].1
    }

    /// Sticking probability of a facet at `time`.
    pub fn sticking(&self, facet: usize, time: f64) -> f64 {
        let props = &self.geometry.facets[facet].props;
        match props.sticking_param {
            Some(p) => self.parameters[p].interpolate_y(time, false),
            None => props.sticking,
        }
    }

    /// Opacity of a facet at `time`.
    pub fn opacity(&self, facet: usize, time: f64) -> f64 {
        let props = &self.geometry.facets[facet].props;
        match props.opacity_param {
            Some(p) => self.parameters[p].interpolate_y(time, false),
            None => props.opacity,
        }
    }
}

fn check_facets(geometry: &Geometry, param_count: usize) -> Result<()> {
    let structures = geometry.structure_count;
    for (id, facet) in geometry.facets.iter().enumerate() {
        let props = &facet.props;
        let structure_ok = props.structure.map_or(true, |s| s < structures);
        if !structure_ok || props.super_dest > structures {
            return Err(Error::InvalidStructureLink { facet: id + 1 });
        }
        if props.teleport_dest > geometry.facet_count() as i64 || props.teleport_dest < -1 {
            return Err(Error::facet(id, format!("teleport destination {} out of range", props.teleport_dest)));
        }
        if let Some(map) = &props.outgassing_map {
            let expected = map.width * map.height;
            if expected == 0 || map.cells.len() != expected {
                return Err(Error::facet(
                    id,
                    format!(
                        "outgassing map has {} cells for a {}x{} grid",
                        map.cells.len(),
                        map.width,
                        map.height
                    ),
                ));
            }
            if map.cells.iter().any(|c| !c.is_finite() || *c < 0.0) {
                return Err(Error::facet(id, "outgassing map cells must be finite and non-negative"));
            }
        }
        let refs = [
            ("sticking", props.sticking_param),
            ("opacity", props.opacity_param),
            ("outgassing", props.outgassing_param),
        ];
        for (field, param) in refs {
            if let Some(p) = param.filter(|&p| p >= param_count) {
                return Err(Error::UnknownParameter {
                    facet: id + 1,
                    field,
                    param: p,
                });
            }
        }
    }
    Ok(())
}

fn prepare_angle_map(id: usize, facet: &Facet) -> Result<Option<AngleMapSampler>> {
    let props = &facet.props;
    if props.desorption != DesorptionLaw::AngleMap {
        return Ok(None);
    }
    let err = |reason: &str| Error::AngleMap {
        facet: id + 1,
        reason: reason.to_string(),
    };
    if props.angle_map.record {
        return Err(err("Can't RECORD and USE angle map desorption at the same time"));
    }
    if props.angle_map_cache.is_empty() {
        return Err(err("Uses angle map desorption but doesn't have a recorded angle map"));
    }
    AngleMapSampler::new(id, props.angle_map, &props.angle_map_cache).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{FacetProperties, OutgassingMap};
    use crate::util::DVec3;

    fn square_config(props: FacetProperties) -> RunConfig {
        let vertices = vec![DVec3::ZERO, DVec3::X, DVec3::new(1.0, 1.0, 0.0), DVec3::Y];
        let geometry = Geometry::new(vertices, vec![Facet::new(vec![0, 1, 2, 3], props)], 1).unwrap();
        RunConfig {
            geometry,
            ..Default::default()
        }
    }

    fn source_props() -> FacetProperties {
        FacetProperties {
            desorption: DesorptionLaw::Cosine,
            outgassing: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_source() {
        let cfg = square_config(FacetProperties::default());
        assert!(matches!(SimulationModel::prepare(&cfg), Err(Error::NoDesorptionFacet)));
    }

    #[test]
    fn test_zero_outgassing() {
        let cfg = square_config(FacetProperties {
            outgassing: 0.0,
            ..source_props()
        });
        assert!(matches!(SimulationModel::prepare(&cfg), Err(Error::ZeroOutgassing)));
    }

    #[test]
    fn test_bad_link() {
        let cfg = square_config(FacetProperties {
            super_dest: 3,
            ..source_props()
        });
        let err = SimulationModel::prepare(&cfg).unwrap_err();
        assert_eq!(err.to_string(), "Invalid structure (wrong link on F#1)");
    }

    #[test]
    fn test_unknown_parameter() {
        let cfg = square_config(FacetProperties {
            sticking_param: Some(0),
            ..source_props()
        });
        assert!(matches!(
            SimulationModel::prepare(&cfg),
            Err(Error::UnknownParameter { field: "sticking", .. })
        ));
    }

    #[test]
    fn test_angle_map_errors() {
        let mut props = FacetProperties {
            desorption: DesorptionLaw::AngleMap,
            ..source_props()
        };
        let err = SimulationModel::prepare(&square_config(props.clone())).unwrap_err();
        assert!(err.to_string().contains("doesn't have a recorded angle map"));

        props.angle_map.record = true;
        props.angle_map_cache = vec![1; props.angle_map.len()];
        let err = SimulationModel::prepare(&square_config(props)).unwrap_err();
        assert!(err.to_string().contains("RECORD and USE"));
    }

    #[test]
    fn test_totals() {
        let mut cfg = square_config(source_props());
        cfg.moments = vec![1.0];
        cfg.params.time_window = 0.2;
        let model = SimulationModel::prepare(&cfg).unwrap();
        let kt = KB * 293.15;
        assert!((model.params.latest_moment - 1.1).abs() < 1e-12);
        let expected = 1.1 / kt;
        assert!((model.params.total_desorbed_molecules - expected).abs() / expected < 1e-12);
        assert_eq!(model.params.final_outgassing_rate_pa_m3_s, 1.0);
        assert_eq!(model.structures.len(), 1);
        assert_eq!(model.moment_buckets(1.05).collect::<Vec<_>>(), vec![1]);
        assert_eq!(model.moment_buckets(1.2).count(), 0);
    }

    #[test]
    fn test_outgassing_map_cdf() {
        let cfg = square_config(FacetProperties {
            outgassing_map: Some(OutgassingMap {
                width: 2,
                height: 1,
                cells: vec![1.0, 3.0],
            }),
            ..source_props()
        });
        let model = SimulationModel::prepare(&cfg).unwrap();
        let cdf = &model.facets[0].map_cdf;
        assert_eq!(cdf.len(), 2);
        assert!((cdf[1] / cdf[0] - 4.0).abs() < 1e-9);
        assert_eq!(model.facets[0].source_weight, cdf[1]);
    }

    #[test]
    fn test_outgassing_map_must_match_grid() {
        let with_map = |width, height, cells: Vec<f64>| {
            square_config(FacetProperties {
                outgassing_map: Some(OutgassingMap { width, height, cells }),
                ..source_props()
            })
        };
        for cfg in [
            with_map(1, 1, vec![1.0, 1.0]),
            with_map(0, 0, vec![1.0]),
            with_map(2, 2, vec![1.0; 3]),
            with_map(1, 1, vec![-1.0]),
        ] {
            let err = SimulationModel::prepare(&cfg).unwrap_err();
            assert!(matches!(err, Error::InvalidFacet { facet: 0, .. }), "{err}");
        }
        assert!(SimulationModel::prepare(&with_map(2, 2, vec![1.0; 4])).is_ok());
    }

    #[test]
    fn test_links_forced_opaque() {
        let vertices = vec![DVec3::ZERO, DVec3::X, DVec3::new(1.0, 1.0, 0.0), DVec3::Y];
        let link = FacetProperties {
            super_dest: 2,
            opacity: 0.3,
            sticking: 0.5,
            ..Default::default()
        };
        let geometry = Geometry::new(
            vertices,
            vec![
                Facet::new(vec![0, 1, 2, 3], source_props()),
                Facet::new(vec![0, 1, 2, 3], link),
            ],
            2,
        )
        .unwrap();
        let cfg = RunConfig {
            geometry,
            ..Default::default()
        };
        let model = SimulationModel::prepare(&cfg).unwrap();
        assert_eq!(model.opacity(1, 0.0), 1.0);
        assert_eq!(model.sticking(1, 0.0), 0.0);
        assert_eq!(model.structures.len(), 2);
    }
}
