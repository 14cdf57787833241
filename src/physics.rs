//! Gas kinetics helpers: speed distributions, integrated desorption, decay.
//!
//! Units follow the rest of the crate: lengths in cm, speeds in m/s, times
//! in s, outgassing in Pa.m3/s (time-dependent curves in mbar.l/s).

use crate::util::{interpolate_y, DVec3};

/// Boltzmann constant [J/K] as used for outgassing conversions.
pub const KB: f64 = 1.38e-23;
/// Molar gas constant [J/(mol.K)].
pub const R: f64 = 8.3144621;
/// Points in a wall-collision speed cumulative distribution.
pub const CDF_SIZE: usize = 100;
/// `sqrt(8R/π/1000)`: mean speed is `MEAN_SPEED_FACTOR * sqrt(T/M)`.
pub const MEAN_SPEED_FACTOR: f64 = 145.469;
/// Squared mean wall-collision speed per `T/M`, used for partial accommodation.
const WALL_SPEED2_FACTOR: f64 = 29369.939;
/// mbar.l/s to Pa.m3/s.
pub const MBAR_L_TO_PA_M3: f64 = 0.1;
/// `1/ln 2`.
const INV_LN2: f64 = 1.44269;
/// Sub-steps used to integrate a sloped outgassing segment.
const ID_SUBSTEPS: usize = 20;

/// Speed CDF of molecules leaving a wall, as `(speed, probability)` pairs.
///
/// The Maxwell-Boltzmann density weighted by speed (`v³ exp(-v²/2a²)`), so
/// its mean is `3π/8` times [`mean_speed`]. Tabulated over `[0, 4 v_p)` in
/// `size` bins, `v_p` the most probable speed.
pub fn maxwell_cdf(temperature: f64, gas_mass: f64, size: usize) -> Vec<(f64, f64)> {
    // molar mass to atomic mass
    let a = (KB * temperature / (gas_mass * 1.67e-27)).sqrt();
    let most_probable = (2.0 * R * temperature / (gas_mass / 1000.0)).sqrt();
    let bin = 4.0 * most_probable / size as f64;
    (0..size)
        .map(|i| {
            let x = i as f64 * bin;
            let k = x * x / (2.0 * a * a);
            (x, 1.0 - (-k).exp() * (k + 1.0))
        })
        .collect()
}

/// Mean thermal speed [m/s].
#[inline]
pub fn mean_speed(temperature: f64, gas_mass: f64) -> f64 {
    MEAN_SPEED_FACTOR * (temperature / gas_mass).sqrt()
}

/// Upper speed bound of velocity profiles [m/s].
#[inline]
pub fn max_speed(temperature: f64, gas_mass: f64) -> f64 {
    4.0 * (2.0 * 8.31 * temperature / 0.001 / gas_mass).sqrt()
}

/// Correction applied to orthogonal speed sums when speeds are not sampled.
#[inline]
pub fn velocity_factor(use_maxwell: bool) -> f64 {
    if use_maxwell {
        1.0
    } else {
        1.1781
    }
}

/// Speed after a partially accommodating wall collision.
///
/// `sampled` is a fresh speed drawn at the wall temperature, only used with
/// the Maxwell distribution.
pub fn accommodate(old: f64, sampled: Option<f64>, temperature: f64, gas_mass: f64, factor: f64) -> f64 {
    let old2 = old * old;
    let new2 = match sampled {
        Some(v) => v * v,
        None => WALL_SPEED2_FACTOR * (temperature / gas_mass),
    };
    (old2 + (new2 - old2) * factor).sqrt()
}

/// Latest instant that contributes to a time-resolved run.
pub fn latest_moment(moments: &[f64], time_window: f64) -> f64 {
    let last = moments.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let latest = if last.is_finite() {
        last + time_window / 2.0
    } else {
        time_window / 2.0
    };
    latest.max(1e-10)
}

/// Integrated desorption of an outgassing curve [Pa.m3] up to `latest`.
///
/// `values` is the `(time, mbar.l/s)` curve. The result starts at `(0, 0)`,
/// then `(x0, x0 y0)`; flat segments integrate as rectangles, sloped ones in
/// trapezoid sub-steps.
pub fn integrated_desorption(values: &[(f64, f64)], latest: f64) -> Vec<(f64, f64)> {
    let mut id = vec![(0.0, 0.0)];
    let Some(&(x0, y0)) = values.first() else {
        return id;
    };
    id.push((x0, x0 * y0 * MBAR_L_TO_PA_M3));

    let mut last = 0;
    for pos in 1..values.len() {
        if values[pos].0 >= latest {
            break;
        }
        integrate_segment(&mut id, values, values[pos - 1].0, values[pos].0, values[pos - 1].1, values[pos].1);
        last = pos;
    }

    let (x_last, y_last) = values[last];
    if latest > x_last {
        let y_latest = interpolate_y(latest, values, false);
        integrate_segment(&mut id, values, x_last, latest, y_last, y_latest);
    }
    id
}

fn integrate_segment(id: &mut Vec<(f64, f64)>, values: &[(f64, f64)], x_a: f64, x_b: f64, y_a: f64, y_b: f64) {
    let mut acc = id.last().map_or(0.0, |p| p.1);
    if (y_a - y_b).abs() < 1e-12 * y_a.abs().max(1.0) {
        id.push((x_b, acc + (x_b - x_a) * y_b * MBAR_L_TO_PA_M3));
        return;
    }
    let dt = (x_b - x_a) / ID_SUBSTEPS as f64;
    for k in 1..=ID_SUBSTEPS {
        let t = x_a + k as f64 * dt;
        let avg = (interpolate_y(t - dt, values, false) + interpolate_y(t, values, false)) * 0.5;
        acc += dt * avg * MBAR_L_TO_PA_M3;
        id.push((t, acc));
    }
}

/// Decay deadline of a particle desorbed at `t0`, from a uniform draw `r`.
#[inline]
pub fn decay_moment(t0: f64, half_life: f64, r: f64) -> f64 {
    t0 + half_life * INV_LN2 * -r.ln()
}

/// Adsorption delay on a wall, from a uniform draw `r`.
///
/// Arrhenius rate `frequency * exp(-energy / (R T))`.
#[inline]
pub fn sojourn_delay(frequency: f64, energy: f64, temperature: f64, r: f64) -> f64 {
    let a = (-energy / (8.31 * temperature)).exp();
    -r.ln() / (a * frequency)
}

/// Surface velocity of a moving facet at `position` [m/s].
///
/// `Translation` adds a constant vector; `Rotation` adds `ω × r` about an
/// axis through `base`, with `r` converted from cm to m.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Motion {
    #[default]
    None,
    Translation { velocity: DVec3 },
    Rotation { base: DVec3, omega: DVec3 },
}

impl Motion {
    #[inline]
    pub fn is_some(&self) -> bool {
        !matches!(self, Motion::None)
    }

    pub fn surface_velocity(&self, position: DVec3) -> DVec3 {
        match *self {
            Motion::None => DVec3::ZERO,
            Motion::Translation { velocity } => velocity,
            Motion::Rotation { base, omega } => omega.cross(0.01 * (position - base)),
        }
    }

    /// Add the surface velocity to a particle moving along `dir` at `speed`.
    pub fn apply(&self, position: DVec3, dir: DVec3, speed: f64) -> (DVec3, f64) {
        let v = dir * speed + self.surface_velocity(position);
        match v.try_normalize() {
            Some(d) => (d, v.length()),
            None => (dir, speed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maxwell_cdf_shape() {
        let cdf = maxwell_cdf(293.15, 28.0, CDF_SIZE);
        assert_eq!(cdf.len(), CDF_SIZE);
        assert_eq!(cdf[0], (0.0, 0.0));
        assert!(cdf.windows(2).all(|w| w[1].0 > w[0].0 && w[1].1 >= w[0].1));
        assert!(cdf[CDF_SIZE - 1].1 > 0.999);
    }

    #[test]
    fn test_mean_speed_n2() {
        let v = mean_speed(293.15, 28.0);
        assert!((v - 470.9).abs() < 1.0, "{v}");
    }

    #[test]
    fn test_latest_moment() {
        assert_eq!(latest_moment(&[], 1e-10), 1e-10);
        assert_eq!(latest_moment(&[1.0, 3.0, 2.0], 0.2), 3.1);
        assert_eq!(latest_moment(&[], 1.0), 0.5);
    }

    #[test]
    fn test_integrated_desorption_constant() {
        // 10 mbar.l/s = 1 Pa.m3/s from t=0
        let id = integrated_desorption(&[(0.0, 10.0), (10.0, 10.0)], 4.0);
        let last = id.last().unwrap();
        assert_eq!(last.0, 4.0);
        assert!((last.1 - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_integrated_desorption_ramp() {
        // linear from 0 to 10 mbar.l/s over 1 s, integral 0.5 Pa.m3
        let id = integrated_desorption(&[(0.0, 0.0), (1.0, 10.0)], 5.0);
        let at_one = id.iter().find(|p| (p.0 - 1.0).abs() < 1e-9).unwrap();
        assert!((at_one.1 - 0.5).abs() < 1e-9);
        // then constant 1 Pa.m3/s up to t=5
        assert!((id.last().unwrap().1 - 4.5).abs() < 1e-9);
        assert!(id.windows(2).all(|w| w[1].1 >= w[0].1));
    }

    #[test]
    fn test_accommodation() {
        assert_eq!(accommodate(300.0, Some(500.0), 300.0, 28.0, 1.0), 500.0);
        assert_eq!(accommodate(300.0, Some(500.0), 300.0, 28.0, 0.0), 300.0);
        let half = accommodate(300.0, Some(500.0), 300.0, 28.0, 0.5);
        assert!((half * half - (300.0f64.powi(2) + 500.0f64.powi(2)) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_motion() {
        let m = Motion::Rotation {
            base: DVec3::ZERO,
            omega: DVec3::new(0.0, 0.0, 10.0),
        };
        // 100 cm from the axis at 10 rad/s: 10 m/s tangential
        let v = m.surface_velocity(DVec3::new(100.0, 0.0, 0.0));
        assert!((v - DVec3::new(0.0, 10.0, 0.0)).length() < 1e-12);

        let (dir, speed) = Motion::Translation { velocity: DVec3::X * 3.0 }.apply(DVec3::ZERO, DVec3::Y, 4.0);
        assert!((speed - 5.0).abs() < 1e-12);
        assert!((dir - DVec3::new(0.6, 0.8, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_decay_and_sojourn() {
        assert_eq!(decay_moment(2.0, 1.0, 1.0), 2.0);
        assert!(decay_moment(0.0, 1.0, 0.5) > 0.0);
        assert!(sojourn_delay(1e13, 100.0, 300.0, 0.5) > 0.0);
    }
}
