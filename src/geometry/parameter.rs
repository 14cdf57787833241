//! Time-dependent facet parameters.

use serde::{Deserialize, Serialize};

use crate::util::interpolate_y;

/// Named piecewise-linear curve of `(time [s], value)` points.
///
/// Used for sticking, opacity and outgassing values that change over time.
/// Outgassing curves are expressed in mbar.l/s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub values: Vec<(f64, f64)>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, values: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Value at `time`, clamped to the end points unless `extrapolate` is set.
    #[inline]
    pub fn interpolate_y(&self, time: f64, extrapolate: bool) -> f64 {
        interpolate_y(time, &self.values, extrapolate)
    }

    /// Last tabulated value, or 0 for an empty curve.
    pub fn last_value(&self) -> f64 {
        self.values.last().map(|p| p.1).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate() {
        let p = Parameter::new("ramp", vec![(0.0, 1.0), (1.0, 3.0)]);
        assert_eq!(p.interpolate_y(0.5, false), 2.0);
        assert_eq!(p.interpolate_y(5.0, false), 3.0);
        assert_eq!(p.last_value(), 3.0);
    }
}
