//! Axis-aligned search boxes
//!
//! An [`Interval`] is the rank-n box `[lower[0], upper[0]] × … ×
//! [lower[n-1], upper[n-1]]` that a solve task works on. Boxes are created by
//! the parser or the subdivision machinery and never mutated afterwards; the
//! area (product of widths) is cached at construction.
//!
//! Approximations always live on the unit box `[-1, 1]ⁿ`; [`Interval::project`]
//! maps a unit-coordinate sub-box back onto a world box.

/// Fixed subdivision ratio. The unit box is split at `2r - 1`, an irrational
/// point, so that roots landing exactly on a subdivision boundary at every
/// level cannot occur.
pub const SUBDIVISION_RATIO: f64 = 0.513_930_390_090_873_8;

/// Unit-coordinate midpoint at which every dimension is subdivided.
pub fn subdivision_midpoint() -> f64 {
    2.0 * SUBDIVISION_RATIO - 1.0
}

/// An axis-aligned box with cached area
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    lower: Vec<f64>,
    upper: Vec<f64>,
    area: f64,
}

impl Interval {
    /// Create a box from its bound vectors.
    ///
    /// The vectors must have equal length and satisfy `lower[i] < upper[i]`
    /// in every dimension; violations are caught by the input parser before
    /// a box is ever built, so this constructor only debug-asserts.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        debug_assert_eq!(lower.len(), upper.len());
        let area = lower
            .iter()
            .zip(upper.iter())
            .map(|(lo, hi)| hi - lo)
            .product();
        Self { lower, upper, area }
    }

    /// The unit box `[-1, 1]ⁿ`
    pub fn unit(rank: usize) -> Self {
        Self::new(vec![-1.0; rank], vec![1.0; rank])
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.lower.len()
    }

    /// Lower bounds
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// Upper bounds
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Product of the widths, cached at construction
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Width of dimension `dim`
    pub fn width(&self, dim: usize) -> f64 {
        self.upper[dim] - self.lower[dim]
    }

    /// Map a single unit coordinate in dimension `dim` to world coordinates.
    pub fn map_from_unit(&self, dim: usize, x: f64) -> f64 {
        0.5 * (self.width(dim) * x + self.upper[dim] + self.lower[dim])
    }

    /// Map a unit-coordinate point to a world point.
    pub fn point_from_unit(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .enumerate()
            .map(|(dim, &x)| self.map_from_unit(dim, x))
            .collect()
    }

    /// Project a unit-coordinate sub-box onto this box.
    ///
    /// `unit` lives on `[-1, 1]ⁿ`; the result is the corresponding world
    /// sub-box of `self`.
    pub fn project(&self, unit: &Interval) -> Interval {
        let lower = unit
            .lower
            .iter()
            .enumerate()
            .map(|(dim, &x)| self.map_from_unit(dim, x))
            .collect();
        let upper = unit
            .upper
            .iter()
            .enumerate()
            .map(|(dim, &x)| self.map_from_unit(dim, x))
            .collect();
        Interval::new(lower, upper)
    }

    /// The 2ⁿ unit sub-boxes obtained by splitting every dimension at the
    /// irrational subdivision midpoint. Sub-box `i` takes the lower half in
    /// dimension `d` when bit `d` of `i` is clear.
    pub fn unit_subintervals(rank: usize) -> Vec<Interval> {
        let mid = subdivision_midpoint();
        (0..1usize << rank)
            .map(|bits| {
                let mut lower = vec![-1.0; rank];
                let mut upper = vec![mid; rank];
                for dim in 0..rank {
                    if bits >> dim & 1 == 1 {
                        lower[dim] = mid;
                        upper[dim] = 1.0;
                    }
                }
                Interval::new(lower, upper)
            })
            .collect()
    }

    /// Render as `[lo,hi]` per dimension, bracketed when the rank exceeds one.
    pub fn display(&self) -> String {
        let body = self
            .lower
            .iter()
            .zip(self.upper.iter())
            .map(|(lo, hi)| format!("[{},{}]", lo, hi))
            .collect::<Vec<_>>()
            .join(",");
        if self.rank() > 1 {
            format!("[{}]", body)
        } else {
            body
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_area_cached() {
        let b = Interval::new(vec![-1.0, 0.0], vec![1.0, 4.0]);
        assert_relative_eq!(b.area(), 8.0);
        assert_relative_eq!(Interval::unit(3).area(), 8.0);
    }

    #[test]
    fn test_projection_roundtrip() {
        let world = Interval::new(vec![-2.0, 1.0], vec![2.0, 3.0]);
        let unit = Interval::unit(2);
        let projected = world.project(&unit);
        assert_eq!(projected.lower(), world.lower());
        assert_eq!(projected.upper(), world.upper());

        // Center of the unit box maps to the center of the world box
        let center = world.point_from_unit(&[0.0, 0.0]);
        assert_relative_eq!(center[0], 0.0);
        assert_relative_eq!(center[1], 2.0);
    }

    #[test]
    fn test_unit_subintervals_tile_the_unit_box() {
        for rank in 1..=3 {
            let subs = Interval::unit_subintervals(rank);
            assert_eq!(subs.len(), 1 << rank);
            let total: f64 = subs.iter().map(Interval::area).sum();
            assert_relative_eq!(total, 2f64.powi(rank as i32), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_subdivision_midpoint_is_interior() {
        let m = subdivision_midpoint();
        assert!(m > -1.0 && m < 1.0);
        // Not the obvious midpoint: regular grids of roots must not align
        assert!(m.abs() > 1e-3);
    }

    #[test]
    fn test_display() {
        let b = Interval::new(vec![0.0], vec![1.0]);
        assert_eq!(b.display(), "[0,1]");
        let b2 = Interval::new(vec![0.0, -1.0], vec![1.0, 1.0]);
        assert_eq!(b2.display(), "[[0,1],[-1,1]]");
    }
}
