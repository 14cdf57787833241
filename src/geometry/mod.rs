//! Geometry snapshot: vertices, facets and their grouping into structures.
//!
//! The snapshot is populated by an external loader and stays immutable for
//! the duration of a run. Facets are stored in one contiguous arena and
//! referenced everywhere else by their index.

mod facet;
mod parameter;
pub mod polygon;

pub use facet::*;
pub use parameter::*;

use serde::{Deserialize, Serialize};

use crate::util::{DVec3, Result};

/// Vertices, facets and structure count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub vertices: Vec<DVec3>,
    pub facets: Vec<Facet>,
    /// Number of disjoint sub-volumes.
    pub structure_count: usize,
}

impl Geometry {
    /// Build a geometry and derive every facet's frame.
    pub fn new(vertices: Vec<DVec3>, facets: Vec<Facet>, structure_count: usize) -> Result<Self> {
        let mut geom = Self {
            vertices,
            facets,
            structure_count: structure_count.max(1),
        };
        geom.initialize()?;
        Ok(geom)
    }

    /// Recompute derived facet data, e.g. after deserialization.
    pub fn initialize(&mut self) -> Result<()> {
        self.structure_count = self.structure_count.max(1);
        let vertices = &self.vertices;
        for (id, facet) in self.facets.iter_mut().enumerate() {
            facet.initialize(id, vertices)?;
        }
        Ok(())
    }

    #[inline]
    pub fn facet_count(&self) -> usize {
        self.facets.len()
    }

    /// Indices of the facets visible from structure `s`.
    ///
    /// Facets in all structures are included in every list.
    pub fn structure_facets(&self, s: usize) -> Vec<usize> {
        self.facets
            .iter()
            .enumerate()
            .filter(|(_, f)| f.props.structure.map_or(true, |fs| fs == s))
            .map(|(i, _)| i)
            .collect()
    }

    /// Closed box from the origin to `size` with normals pointing inward.
    ///
    /// Facets are ordered z = 0, z = max, y = 0, y = max, x = 0, x = max.
    pub fn closed_box(size: DVec3) -> Result<Self> {
        let (x, y, z) = (size.x, size.y, size.z);
        let vertices = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(x, 0.0, 0.0),
            DVec3::new(x, y, 0.0),
            DVec3::new(0.0, y, 0.0),
            DVec3::new(0.0, 0.0, z),
            DVec3::new(x, 0.0, z),
            DVec3::new(x, y, z),
            DVec3::new(0.0, y, z),
        ];
        let faces = [
            [0, 1, 2, 3],
            [4, 7, 6, 5],
            [0, 4, 5, 1],
            [3, 2, 6, 7],
            [0, 3, 7, 4],
            [1, 5, 6, 2],
        ];
        let facets = faces
            .iter()
            .map(|f| Facet::new(f.to_vec(), FacetProperties::default()))
            .collect();
        Self::new(vertices, facets, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_facets() {
        let vertices = vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
        let mk = |structure| {
            Facet::new(
                vec![0, 1, 2],
                FacetProperties {
                    structure,
                    ..Default::default()
                },
            )
        };
        let geom = Geometry::new(vertices, vec![mk(Some(0)), mk(Some(1)), mk(None)], 2).unwrap();
        assert_eq!(geom.structure_facets(0), vec![0, 2]);
        assert_eq!(geom.structure_facets(1), vec![1, 2]);
    }

    #[test]
    fn test_closed_box_faces_inward() {
        let size = DVec3::new(2.0, 3.0, 4.0);
        let geom = Geometry::closed_box(size).unwrap();
        assert_eq!(geom.facet_count(), 6);
        let inside = size / 2.0;
        for f in &geom.facets {
            assert!((inside - f.frame.center).dot(f.frame.n) > 0.0);
        }
        let area: f64 = geom.facets.iter().map(|f| f.frame.area).sum();
        assert!((area - 2.0 * (6.0 + 8.0 + 12.0)).abs() < 1e-9);
    }
}
