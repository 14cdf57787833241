//! Tabulated function lookups.
//!
//! Tables are `(x, y)` pairs sorted ascending on the searched column. All
//! searches return the index of the last element strictly below the key, or
//! `None` when the key is not above the first element.

/// Linear blend between `a` and `b`.
#[inline]
pub fn weigh(a: f64, b: f64, w: f64) -> f64 {
    a + (b - a) * w
}

/// Index of the last element strictly lower than `key`.
pub fn lower_bound(key: f64, values: &[f64]) -> Option<usize> {
    values.partition_point(|&v| v < key).checked_sub(1)
}

/// Same as [`lower_bound`] but searching column `x` (or `y`) of a pair table.
pub fn lower_bound_pairs(key: f64, table: &[(f64, f64)], on_x: bool) -> Option<usize> {
    table
        .partition_point(|p| column(p, on_x) < key)
        .checked_sub(1)
}

#[inline]
fn column(p: &(f64, f64), x: bool) -> f64 {
    if x {
        p.0
    } else {
        p.1
    }
}

/// Evaluate `y(x)` by linear interpolation.
pub fn interpolate_y(x: f64, table: &[(f64, f64)], extrapolate: bool) -> f64 {
    interpolate(x, table, true, extrapolate)
}

/// Evaluate the inverse `x(y)` of a monotonous table by linear interpolation.
pub fn interpolate_x(y: f64, table: &[(f64, f64)], extrapolate: bool) -> f64 {
    interpolate(y, table, false, extrapolate)
}

fn interpolate(lookup: f64, table: &[(f64, f64)], on_x: bool, extrapolate: bool) -> f64 {
    match table.len() {
        0 => return 0.0,
        1 => return column(&table[0], !on_x),
        _ => {}
    }

    let last = table.len() - 1;
    let lower = match lower_bound_pairs(lookup, table, on_x) {
        None if !extrapolate => return column(&table[0], !on_x),
        None => 0,
        Some(i) if i == last && !extrapolate => return column(&table[last], !on_x),
        Some(i) if i == last => last - 1,
        Some(i) => i,
    };

    let (a, b) = (&table[lower], &table[lower + 1]);
    let delta = column(b, on_x) - column(a, on_x);
    let overshoot = lookup - column(a, on_x);
    if delta == 0.0 {
        return column(a, !on_x);
    }
    weigh(column(a, !on_x), column(b, !on_x), overshoot / delta)
}

/// Lower bound over a row blended between two cumulative distributions.
///
/// Returns `None` when `key` is below the first blended value, `len - 1` when
/// it is at or above the last one.
pub fn weighed_lower_bound(key: f64, w: f64, a: &[f64], b: &[f64]) -> Option<usize> {
    let len = a.len().min(b.len());
    if len == 0 {
        return None;
    }
    let blended = |i: usize| weigh(a[i], b[i], w);
    if key < blended(0) {
        return None;
    }

    // Blended rows stay monotonous, so a plain binary search applies.
    let (mut lo, mut hi) = (0usize, len);
    while lo < hi {
        let mid = (lo + hi) / 2;
        if blended(mid) <= key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Some(lo - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: [(f64, f64); 3] = [(0.0, 0.0), (1.0, 10.0), (2.0, 30.0)];

    #[test]
    fn test_lower_bound() {
        let v = [1.0, 2.0, 3.0];
        assert_eq!(lower_bound(0.5, &v), None);
        assert_eq!(lower_bound(1.0, &v), None);
        assert_eq!(lower_bound(1.5, &v), Some(0));
        assert_eq!(lower_bound(3.5, &v), Some(2));
    }

    #[test]
    fn test_interpolate_y() {
        assert_eq!(interpolate_y(0.5, &TABLE, false), 5.0);
        assert_eq!(interpolate_y(1.5, &TABLE, false), 20.0);
        // clamped
        assert_eq!(interpolate_y(-1.0, &TABLE, false), 0.0);
        assert_eq!(interpolate_y(3.0, &TABLE, false), 30.0);
        // extrapolated from the last segment
        assert_eq!(interpolate_y(3.0, &TABLE, true), 50.0);
        assert_eq!(interpolate_y(-1.0, &TABLE, true), -10.0);
    }

    #[test]
    fn test_interpolate_x() {
        assert_eq!(interpolate_x(20.0, &TABLE, false), 1.5);
        assert_eq!(interpolate_x(5.0, &TABLE, false), 0.5);
    }

    #[test]
    fn test_single_entry() {
        assert_eq!(interpolate_y(42.0, &[(1.0, 7.0)], true), 7.0);
    }

    #[test]
    fn test_weighed_lower_bound() {
        let a = [0.1, 0.5, 0.9];
        let b = [0.3, 0.7, 1.0];
        assert_eq!(weighed_lower_bound(0.05, 0.0, &a, &b), None);
        assert_eq!(weighed_lower_bound(0.2, 0.0, &a, &b), Some(0));
        assert_eq!(weighed_lower_bound(0.2, 1.0, &a, &b), None);
        assert_eq!(weighed_lower_bound(0.6, 0.5, &a, &b), Some(1));
        assert_eq!(weighed_lower_bound(0.99, 0.0, &a, &b), Some(2));
    }
}
