//! Facet description and its derived local frame.
//!
//! A facet is a planar polygon. Its physical properties come from the loader
//! ([`FacetProperties`]); everything else ([`FacetFrame`], [`TextureMesh`]) is
//! derived from the vertex positions by [`Facet::initialize`].
//!
//! The local frame follows the usual (U,V,N) convention: `O` is the corner of
//! the polygon's bounding rectangle, `U` and `V` span that rectangle, so any
//! point of the facet plane is `O + u*U + v*V` with the polygon inside
//! `[0,1]²`. `nU`, `nV` and `N` form an orthonormal basis, with `N` pointing
//! to the front side.

use serde::{Deserialize, Serialize};

use super::polygon;
use crate::anglemap::AngleMapParams;
use crate::results::HistogramParams;
use crate::util::{BBox3d, DVec2, DVec3, Error, Result};

/// Samples per axis used to estimate partial texture cell areas.
const CELL_COVERAGE_SAMPLES: usize = 6;

/// Directional law used when a particle is emitted from a facet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum DesorptionLaw {
    /// Not a source.
    #[default]
    None,
    Uniform,
    Cosine,
    CosineN { exponent: f64 },
    /// Directions drawn from the facet's imported incident angle map.
    AngleMap,
}

impl DesorptionLaw {
    #[inline]
    pub fn is_source(&self) -> bool {
        !matches!(self, DesorptionLaw::None)
    }
}

/// Quantity recorded by a facet's 1D profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    #[default]
    None,
    /// Position along U.
    U,
    /// Position along V.
    V,
    /// Incident angle to the normal.
    Angular,
    /// Speed.
    Velocity,
    /// Speed component along the normal.
    OrtVelocity,
    /// Speed component in the facet plane.
    TanVelocity,
}

/// Reflection composition. What is neither diffuse nor specular is cos^N.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reflection {
    pub diffuse: f64,
    pub specular: f64,
    pub cosine_exponent: f64,
}

impl Default for Reflection {
    fn default() -> Self {
        Self {
            diffuse: 1.0,
            specular: 0.0,
            cosine_exponent: 0.0,
        }
    }
}

/// Arrhenius-type adsorption delay applied on each bounce.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sojourn {
    pub enabled: bool,
    /// Attempt frequency [Hz].
    pub frequency: f64,
    /// Binding energy [J/mol].
    pub energy: f64,
}

impl Default for Sojourn {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: 1e13,
            energy: 100.0,
        }
    }
}

/// Texture resolution and which events are counted on it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureSettings {
    /// Cells per cm along U and V. Zero disables the texture.
    pub cells_per_cm: f64,
    pub count_desorption: bool,
    pub count_absorption: bool,
    pub count_reflection: bool,
    pub count_transparent: bool,
    pub count_direction: bool,
}

/// Per-cell desorption map covering the facet's `[0,1]²` rectangle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutgassingMap {
    pub width: usize,
    pub height: usize,
    /// Outgassing per cell [Pa.m3/s], row-major (`u + v * width`).
    pub cells: Vec<f64>,
}

impl OutgassingMap {
    pub fn total(&self) -> f64 {
        self.cells.iter().sum()
    }
}

/// Physical and recording properties of a facet, as provided by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetProperties {
    pub sticking: f64,
    /// Time-dependent sticking curve, overrides `sticking`.
    pub sticking_param: Option<usize>,
    pub opacity: f64,
    /// Time-dependent opacity curve, overrides `opacity`.
    pub opacity_param: Option<usize>,
    /// Outgassing [Pa.m3/s].
    pub outgassing: f64,
    /// Time-dependent outgassing curve [mbar.l/s], overrides `outgassing`.
    pub outgassing_param: Option<usize>,
    pub outgassing_map: Option<OutgassingMap>,
    /// Wall temperature [K].
    pub temperature: f64,
    pub desorption: DesorptionLaw,
    pub reflection: Reflection,
    pub accommodation: f64,
    pub sojourn: Sojourn,
    pub two_sided: bool,
    pub is_moving: bool,
    /// Display hint only, ignored by transport.
    pub volatile: bool,

    /// Owning structure, `None` for facets present in all structures.
    pub structure: Option<usize>,
    /// 1-based target structure of a link facet, 0 when not a link.
    pub super_dest: usize,
    /// 1-based teleport target facet, -1 to return to the origin, 0 for none.
    pub teleport_dest: i64,

    pub profile: ProfileKind,
    pub texture: TextureSettings,
    pub angle_map: AngleMapParams,
    /// Previously recorded angle map used by [`DesorptionLaw::AngleMap`].
    pub angle_map_cache: Vec<u64>,
    pub histograms: HistogramParams,
}

impl Default for FacetProperties {
    fn default() -> Self {
        Self {
            sticking: 0.0,
            sticking_param: None,
            opacity: 1.0,
            opacity_param: None,
            outgassing: 0.0,
            outgassing_param: None,
            outgassing_map: None,
            temperature: 293.15,
            desorption: DesorptionLaw::None,
            reflection: Reflection::default(),
            accommodation: 1.0,
            sojourn: Sojourn::default(),
            two_sided: false,
            is_moving: false,
            volatile: false,
            structure: Some(0),
            super_dest: 0,
            teleport_dest: 0,
            profile: ProfileKind::None,
            texture: TextureSettings::default(),
            angle_map: AngleMapParams::default(),
            angle_map_cache: Vec::new(),
            histograms: HistogramParams::default(),
        }
    }
}

/// Derived plane frame of a facet.
#[derive(Debug, Clone, Default)]
pub struct FacetFrame {
    pub o: DVec3,
    pub u: DVec3,
    pub v: DVec3,
    pub n: DVec3,
    pub nu: DVec3,
    pub nv: DVec3,
    /// `U x V`, not normalized.
    pub nuv: DVec3,
    pub center: DVec3,
    pub bbox: BBox3d,
    /// Polygon area [cm²].
    pub area: f64,
    /// Vertices in normalized (u,v) coordinates.
    pub polygon: Vec<DVec2>,
}

impl FacetFrame {
    /// Point of the plane at local coordinates (u,v).
    #[inline]
    pub fn point_at(&self, u: f64, v: f64) -> DVec3 {
        self.o + u * self.u + v * self.v
    }

    /// Direction from angles in the (nU,nV,N) basis.
    ///
    /// `theta` is measured from the normal, `phi` from nU. `reverse` flips
    /// the normal for back-side emission.
    pub fn polar_to_cartesian(&self, theta: f64, phi: f64, reverse: bool) -> DVec3 {
        let (sin_t, cos_t) = theta.sin_cos();
        let (sin_p, cos_p) = phi.sin_cos();
        let n = if reverse { -self.n } else { self.n };
        sin_t * cos_p * self.nu + sin_t * sin_p * self.nv + cos_t * n
    }

    /// Angles `(theta, phi)` of `dir` in the (nU,nV,N) basis.
    ///
    /// Theta is in `[0, π]`, phi in `(-π, π]`.
    pub fn cartesian_to_polar(&self, dir: DVec3) -> (f64, f64) {
        let u = dir.dot(self.nu);
        let v = dir.dot(self.nv);
        let n = dir.dot(self.n).clamp(-1.0, 1.0);
        (n.acos(), v.atan2(u))
    }
}

/// Texture grid derived from [`TextureSettings`] and the facet frame.
#[derive(Debug, Clone)]
pub struct TextureMesh {
    pub width: usize,
    pub height: usize,
    /// Fractional number of cells along U.
    pub width_d: f64,
    /// Fractional number of cells along V.
    pub height_d: f64,
    /// Inverse area of a full cell [1/cm²].
    pub full_cell_increment: f64,
    /// Inverse area of each cell's part inside the polygon.
    pub cell_increments: Vec<f64>,
    /// Cells too small to take part in autoscaling are `false`.
    pub large_enough: Vec<bool>,
}

impl TextureMesh {
    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell index of local coordinates (u,v).
    #[inline]
    pub fn cell_index(&self, u: f64, v: f64) -> usize {
        let tu = ((u * self.width_d) as usize).min(self.width.saturating_sub(1));
        let tv = ((v * self.height_d) as usize).min(self.height.saturating_sub(1));
        tu + tv * self.width
    }
}

/// A facet: vertex loop, properties and derived data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Facet {
    pub indices: Vec<usize>,
    #[serde(default)]
    pub props: FacetProperties,
    #[serde(skip)]
    pub frame: FacetFrame,
    #[serde(skip)]
    pub mesh: Option<TextureMesh>,
}

impl Facet {
    pub fn new(indices: Vec<usize>, props: FacetProperties) -> Self {
        Self {
            indices,
            props,
            frame: FacetFrame::default(),
            mesh: None,
        }
    }

    /// Compute the frame and texture mesh from vertex positions.
    pub fn initialize(&mut self, id: usize, vertices: &[DVec3]) -> Result<()> {
        if self.indices.len() < 3 {
            return Err(Error::facet(id, "fewer than 3 vertices"));
        }
        let mut points = Vec::with_capacity(self.indices.len());
        for &i in &self.indices {
            let p = vertices
                .get(i)
                .ok_or_else(|| Error::facet(id, format!("vertex index {i} out of range")))?;
            points.push(*p);
        }

        self.frame = build_frame(&points).ok_or_else(|| Error::facet(id, "degenerate polygon"))?;
        self.mesh = build_mesh(&self.frame, &self.props.texture);
        Ok(())
    }

    /// Whether local coordinates (u,v) fall inside the polygon.
    #[inline]
    pub fn contains(&self, u: f64, v: f64) -> bool {
        polygon::is_in_poly(DVec2::new(u, v), &self.frame.polygon)
    }

    #[inline]
    pub fn is_link(&self) -> bool {
        self.props.super_dest != 0
    }

    #[inline]
    pub fn is_textured(&self) -> bool {
        self.mesh.is_some()
    }
}

/// Newell normal, first-edge tangent, bounding rectangle of the projection.
fn build_frame(points: &[DVec3]) -> Option<FacetFrame> {
    let count = points.len();
    let mut normal = DVec3::ZERO;
    let mut center = DVec3::ZERO;
    let mut bbox = BBox3d::EMPTY;
    for (i, &p) in points.iter().enumerate() {
        let q = points[(i + 1) % count];
        normal.x += (p.y - q.y) * (p.z + q.z);
        normal.y += (p.z - q.z) * (p.x + q.x);
        normal.z += (p.x - q.x) * (p.y + q.y);
        center += p;
        bbox.expand_by_point(p);
    }
    center /= count as f64;

    let n = normal.try_normalize()?;
    let p0 = points[0];
    let nu = points
        .iter()
        .skip(1)
        .map(|&p| (p - p0) - (p - p0).dot(n) * n)
        .find_map(|e| e.try_normalize())?;
    let nv = n.cross(nu);

    let projected: Vec<DVec2> = points
        .iter()
        .map(|&p| DVec2::new((p - p0).dot(nu), (p - p0).dot(nv)))
        .collect();
    let min = projected.iter().fold(DVec2::splat(f64::INFINITY), |a, &p| a.min(p));
    let max = projected
        .iter()
        .fold(DVec2::splat(f64::NEG_INFINITY), |a, &p| a.max(p));
    let extent = max - min;
    if extent.x <= 1e-12 || extent.y <= 1e-12 {
        return None;
    }

    let polygon: Vec<DVec2> = projected.iter().map(|&p| (p - min) / extent).collect();
    let u = nu * extent.x;
    let v = nv * extent.y;
    let area = polygon::signed_area(&polygon).abs() * extent.x * extent.y;

    Some(FacetFrame {
        o: p0 + min.x * nu + min.y * nv,
        u,
        v,
        n,
        nu,
        nv,
        nuv: u.cross(v),
        center,
        bbox,
        area,
        polygon,
    })
}

fn build_mesh(frame: &FacetFrame, settings: &TextureSettings) -> Option<TextureMesh> {
    if settings.cells_per_cm <= 0.0 {
        return None;
    }
    let (len_u, len_v) = (frame.u.length(), frame.v.length());
    let width_d = len_u * settings.cells_per_cm;
    let height_d = len_v * settings.cells_per_cm;
    let width = (width_d.ceil() as usize).max(1);
    let height = (height_d.ceil() as usize).max(1);
    let full_cell_increment = (width_d * height_d) / (len_u * len_v);

    let mut cell_increments = Vec::with_capacity(width * height);
    for j in 0..height {
        for i in 0..width {
            let min = DVec2::new(i as f64 / width_d, j as f64 / height_d);
            let max = DVec2::new((i + 1) as f64 / width_d, (j + 1) as f64 / height_d).min(DVec2::ONE);
            let covered = polygon::coverage(&frame.polygon, min, max, CELL_COVERAGE_SAMPLES);
            let area = (max - min).x * len_u * (max - min).y * len_v * covered;
            cell_increments.push(if area > 0.0 { 1.0 / area } else { 0.0 });
        }
    }
    let large_enough = cell_increments
        .iter()
        .map(|&inc| inc < 5.0 * full_cell_increment)
        .collect();

    Some(TextureMesh {
        width,
        height,
        width_d,
        height_d,
        full_cell_increment,
        cell_increments,
        large_enough,
    })
}
