//! 2D polygon helpers in facet-local (u,v) space.

use crate::util::DVec2;

/// Point-in-polygon by crossing count along v.
///
/// Works for convex and concave polygons regardless of winding.
pub fn is_in_poly(p: DVec2, poly: &[DVec2]) -> bool {
    if poly.len() < 3 {
        return false;
    }

    let mut n_updown = 0i32;
    let mut n_found = 0i32;
    for (j, &p1) in poly.iter().enumerate() {
        let p2 = poly[(j + 1) % poly.len()];
        if (p.x < p1.x) != (p.x < p2.x) {
            let slope = (p2.y - p1.y) / (p2.x - p1.x);
            if slope * p.x - p.y < slope * p1.x - p1.y {
                n_updown += 1;
            } else {
                n_updown -= 1;
            }
            n_found += 1;
        }
    }

    // one of the half counts is odd, the other even
    ((n_found / 2) & 1) ^ ((n_updown / 2) & 1) != 0
}

/// Signed area by the shoelace formula.
pub fn signed_area(poly: &[DVec2]) -> f64 {
    let n = poly.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (poly[i], poly[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    0.5 * twice
}

/// Fraction of the axis-aligned rectangle `[min, max]` covered by the polygon.
///
/// Estimated on a regular `samples x samples` grid of cell centers.
pub fn coverage(poly: &[DVec2], min: DVec2, max: DVec2, samples: usize) -> f64 {
    let samples = samples.max(1);
    let step = (max - min) / samples as f64;
    let mut inside = 0usize;
    for i in 0..samples {
        for j in 0..samples {
            let p = min + step * DVec2::new(i as f64 + 0.5, j as f64 + 0.5);
            if is_in_poly(p, poly) {
                inside += 1;
            }
        }
    }
    inside as f64 / (samples * samples) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<DVec2> {
        vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(1.0, 1.0),
            DVec2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_square() {
        let sq = square();
        assert!(is_in_poly(DVec2::new(0.5, 0.5), &sq));
        assert!(is_in_poly(DVec2::new(0.1, 0.9), &sq));
        assert!(!is_in_poly(DVec2::new(1.5, 0.5), &sq));
        assert!(!is_in_poly(DVec2::new(0.5, -0.1), &sq));
    }

    #[test]
    fn test_winding_independent() {
        let mut sq = square();
        sq.reverse();
        assert!(is_in_poly(DVec2::new(0.5, 0.5), &sq));
        assert!(!is_in_poly(DVec2::new(-0.5, 0.5), &sq));
    }

    #[test]
    fn test_concave() {
        // U shape opening upwards
        let u = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(1.0, 1.0),
            DVec2::new(0.7, 1.0),
            DVec2::new(0.7, 0.3),
            DVec2::new(0.3, 0.3),
            DVec2::new(0.3, 1.0),
            DVec2::new(0.0, 1.0),
        ];
        assert!(is_in_poly(DVec2::new(0.15, 0.8), &u));
        assert!(is_in_poly(DVec2::new(0.5, 0.1), &u));
        assert!(!is_in_poly(DVec2::new(0.5, 0.8), &u));
    }

    #[test]
    fn test_area_and_coverage() {
        let sq = square();
        assert!((signed_area(&sq) - 1.0).abs() < 1e-12);

        let tri = vec![DVec2::ZERO, DVec2::X, DVec2::Y];
        let c = coverage(&tri, DVec2::ZERO, DVec2::ONE, 40);
        assert!((c - 0.5).abs() < 0.05);
    }
}
