//! Bounding-interval computation
//!
//! Two passes shrink a unit subcell around the zero set of the approximated
//! system. The linear-error solve treats each approximation as its linear
//! part plus a residual bound and intersects the 2ⁿ extreme solutions of
//! `A·x = −c ± e`. The Lipschitz pass preconditions the full polynomials by
//! `A⁻¹` (making the linear part the identity) and walks each boundary
//! inward by `certified_min / lipschitz`, where the certified minimum of the
//! boundary-reduced polynomial comes from closed-form cubic-or-lower line
//! optimisation with all unrepresented mass folded into its error.

use nalgebra::{DMatrix, DVector};

use crate::approximation::{flat_index, for_each_index, ChebyshevApproximation};
use crate::interval::Interval;

/// Pivot threshold below which the linear part counts as singular
const SINGULAR_THRESHOLD: f64 = 1e-10;

/// Boundary sweep stops once no edge moves further than this
const SWEEP_TOLERANCE: f64 = 1e-3;

const MAX_SWEEPS: usize = 50;

/// Result of one certified line optimisation: the guaranteed distance of the
/// polynomial from zero over the segment (0 when not certified)
fn certified_distance(min_value: f64, max_value: f64, error: f64) -> f64 {
    if min_value > error {
        min_value - error
    } else if max_value < -error {
        -max_value - error
    } else {
        0.0
    }
}

fn cheb_quadratic(c: f64, b: f64, a: f64, t: f64) -> f64 {
    c + b * t + a * (2.0 * t * t - 1.0)
}

fn cheb_cubic(d: f64, c: f64, b: f64, a: f64, t: f64) -> f64 {
    let two_t2 = 2.0 * t * t;
    d + c * t + b * (two_t2 - 1.0) + a * (two_t2 * t - 3.0 * t)
}

/// Certified minimum |p| over `[low, high]` for a Chebyshev series, using at
/// most the cubic coefficients; everything above degree three joins `extra`
/// in the error bound.
pub(crate) fn optimize_line(poly: &[f64], low: f64, high: f64, extra_error: f64) -> f64 {
    let coefficient = |k: usize| poly.get(k).copied().unwrap_or(0.0);
    let tail: f64 = poly.iter().skip(4).map(|c| c.abs()).sum();
    let a = coefficient(3);
    if a == 0.0 {
        return optimize_line_quadratic(poly, low, high, extra_error);
    }
    let d = coefficient(0);
    let c = coefficient(1);
    let b = coefficient(2);
    let error = extra_error + tail;

    let v1 = cheb_cubic(d, c, b, a, low);
    let v2 = cheb_cubic(d, c, b, a, high);
    let mut min_value = v1.min(v2);
    let mut max_value = v1.max(v2);
    let mut take = |t: f64| {
        if t > low && t < high {
            let v = cheb_cubic(d, c, b, a, t);
            min_value = min_value.min(v);
            max_value = max_value.max(v);
        }
    };

    if b == 0.0 {
        // Critical points of d + ct + a·T3: 12a·t² − 3a + c = 0
        let square = 0.25 - c / (12.0 * a);
        if square > 0.0 {
            let root = square.sqrt();
            take(root);
            take(-root);
        }
    } else {
        // 12a·t² + 4b·t + (c − 3a) = 0, solved in the numerically stable
        // sign-aware form
        let discriminant = b * b - 3.0 * a * (c - 3.0 * a);
        if discriminant >= 0.0 {
            let temp = -b + if b > 0.0 {
                -discriminant.sqrt()
            } else {
                discriminant.sqrt()
            };
            take(temp / (6.0 * a));
            take((c - 3.0 * a) / (2.0 * temp));
        }
    }

    certified_distance(min_value, max_value, error)
}

fn optimize_line_quadratic(poly: &[f64], low: f64, high: f64, extra_error: f64) -> f64 {
    let coefficient = |k: usize| poly.get(k).copied().unwrap_or(0.0);
    let a = coefficient(2);
    if a == 0.0 {
        return optimize_line_linear(poly, low, high, extra_error);
    }
    let c = coefficient(0);
    let b = coefficient(1);
    let error = extra_error + poly.iter().skip(3).map(|v| v.abs()).sum::<f64>();

    let v1 = cheb_quadratic(c, b, a, low);
    let v2 = cheb_quadratic(c, b, a, high);
    let mut min_value = v1.min(v2);
    let mut max_value = v1.max(v2);
    let vertex = -b / (4.0 * a);
    if vertex > low && vertex < high {
        let v = cheb_quadratic(c, b, a, vertex);
        min_value = min_value.min(v);
        max_value = max_value.max(v);
    }
    certified_distance(min_value, max_value, error)
}

fn optimize_line_linear(poly: &[f64], low: f64, high: f64, extra_error: f64) -> f64 {
    let coefficient = |k: usize| poly.get(k).copied().unwrap_or(0.0);
    let b = coefficient(0);
    let a = coefficient(1);
    let error = extra_error + poly.iter().skip(2).map(|v| v.abs()).sum::<f64>();
    if a == 0.0 {
        return certified_distance(b, b, error);
    }
    let v1 = b + low * a;
    let v2 = b + high * a;
    certified_distance(v1.min(v2), v1.max(v2), error)
}

/// A preconditioned polynomial as a dense coefficient cube
struct PreconditionedPoly {
    coefficients: Vec<f64>,
    error: f64,
}

/// Shrinks unit subcells around the zero set of the linearised system
pub struct IntervalBounder {
    rank: usize,
}

impl IntervalBounder {
    pub fn new(rank: usize) -> Self {
        Self { rank }
    }

    /// Compute a bounding box for the zeros of the system on the unit cell.
    ///
    /// Returns `None` when the cell provably contains no zero; otherwise a
    /// sub-box of the unit box (the full unit box when the linear part is too
    /// ill-conditioned to say anything).
    pub fn compute_bounding_interval(
        &self,
        approximations: &mut [ChebyshevApproximation],
    ) -> Option<Interval> {
        debug_assert_eq!(approximations.len(), self.rank);
        let rank = self.rank;

        // Linear part, constants, and residual bounds
        let mut linear = DMatrix::zeros(rank, rank);
        let mut constants = DVector::zeros(rank);
        let mut residuals = DVector::zeros(rank);
        for (i, approximation) in approximations.iter_mut().enumerate() {
            let mut linear_mass = 0.0;
            for d in 0..rank {
                let value = approximation.linear_coefficient(d);
                linear[(i, d)] = value;
                linear_mass += value.abs();
            }
            constants[i] = approximation.constant_term();
            residuals[i] = approximation.sum_abs_values()
                - approximation.constant_term().abs()
                - linear_mass
                + approximation.approximation_error();
        }

        let qr = linear.col_piv_qr();
        let diagonal = qr.r().diagonal();
        let min_pivot = diagonal.iter().fold(f64::INFINITY, |m, d| m.min(d.abs()));
        if !min_pivot.is_finite() || min_pivot < SINGULAR_THRESHOLD {
            return Some(Interval::unit(rank));
        }

        // Extreme solutions of A·x = −c ± e, one per sign pattern
        let mut lower = vec![f64::INFINITY; rank];
        let mut upper = vec![f64::NEG_INFINITY; rank];
        for pattern in 0..1usize << rank {
            let mut rhs = DVector::zeros(rank);
            for i in 0..rank {
                let sign = if pattern >> i & 1 == 1 { 1.0 } else { -1.0 };
                rhs[i] = -constants[i] + sign * residuals[i];
            }
            let solution = match qr.solve(&rhs) {
                Some(solution) => solution,
                None => return Some(Interval::unit(rank)),
            };
            for d in 0..rank {
                lower[d] = lower[d].min(solution[d]);
                upper[d] = upper[d].max(solution[d]);
            }
        }
        for d in 0..rank {
            lower[d] = lower[d].max(-1.0);
            upper[d] = upper[d].min(1.0);
            if !(lower[d] <= upper[d]) {
                return None;
            }
        }

        // Preconditioned Lipschitz tightening
        let inverse = match qr.try_inverse() {
            Some(inverse) => inverse,
            None => return Some(Interval::new(lower, upper)),
        };
        let side = approximations
            .iter()
            .map(|a| a.built_degree() + 1)
            .max()
            .unwrap_or(1);
        let polys = self.precondition(approximations, &inverse, side);
        self.lipschitz_tighten(&polys, side, &mut lower, &mut upper)?;

        Some(Interval::new(lower, upper))
    }

    /// `P = A⁻¹·p`: the preconditioned system has identity linear part, and
    /// each preconditioned error mixes the originals by |A⁻¹|.
    fn precondition(
        &self,
        approximations: &mut [ChebyshevApproximation],
        inverse: &DMatrix<f64>,
        side: usize,
    ) -> Vec<PreconditionedPoly> {
        let rank = self.rank;
        let len = side.pow(rank as u32);

        (0..rank)
            .map(|d| {
                let mut coefficients = vec![0.0; len];
                for_each_index(rank, side, |index| {
                    let mut value = 0.0;
                    for (i, approximation) in approximations.iter().enumerate() {
                        value += inverse[(d, i)] * approximation.corner_coefficient(index);
                    }
                    coefficients[flat_index(index, side)] = value;
                });
                let error = approximations
                    .iter()
                    .enumerate()
                    .map(|(i, a)| inverse[(d, i)].abs() * a.approximation_error())
                    .sum();
                PreconditionedPoly {
                    coefficients,
                    error,
                }
            })
            .collect()
    }

    /// Walk each boundary inward while the reduced polynomial is certified
    /// nonzero on it. Returns `None` when a dimension's bounds cross.
    fn lipschitz_tighten(
        &self,
        polys: &[PreconditionedPoly],
        side: usize,
        lower: &mut [f64],
        upper: &mut [f64],
    ) -> Option<()> {
        let rank = self.rank;

        // Polynomial Lipschitz constant per dimension: Σ |c_k|·k_d²
        let lipschitz: Vec<f64> = (0..rank)
            .map(|d| {
                let mut sum = 0.0;
                for_each_index(rank, side, |index| {
                    let k = index[d] as f64;
                    sum += polys[d].coefficients[flat_index(index, side)].abs() * k * k;
                });
                sum
            })
            .collect();

        let mut reduced = Vec::new();
        for _ in 0..MAX_SWEEPS {
            let mut largest_move: f64 = 0.0;
            for d in 0..rank {
                if !(lipschitz[d] > 0.0) || !lipschitz[d].is_finite() {
                    continue;
                }
                // Alternate the low and the high boundary of this dimension
                for high_side in [false, true] {
                    let at = if high_side { upper[d] } else { lower[d] };
                    clenshaw_reduce(&polys[d].coefficients, rank, side, d, at, &mut reduced);
                    let distance = self.reduced_min_abs(
                        &reduced,
                        rank - 1,
                        side,
                        d,
                        lower,
                        upper,
                        polys[d].error,
                    );
                    if distance > 0.0 && distance.is_finite() {
                        let step = distance / lipschitz[d];
                        if high_side {
                            upper[d] -= step;
                        } else {
                            lower[d] += step;
                        }
                        largest_move = largest_move.max(step);
                        if lower[d] > upper[d] {
                            return None;
                        }
                    }
                }
            }
            if largest_move <= SWEEP_TOLERANCE {
                break;
            }
        }
        Some(())
    }

    /// Certified minimum |Q| of a reduced polynomial over the current box.
    /// With one dimension left the closed forms apply directly; with more,
    /// every dimension but the first is collapsed into the error.
    #[allow(clippy::too_many_arguments)]
    fn reduced_min_abs(
        &self,
        reduced: &[f64],
        reduced_rank: usize,
        side: usize,
        removed_dim: usize,
        lower: &[f64],
        upper: &[f64],
        error: f64,
    ) -> f64 {
        // Dimensions surviving the reduction, in original order
        let mut remaining = (0..self.rank).filter(|&d| d != removed_dim);
        match reduced_rank {
            0 => certified_distance(reduced[0], reduced[0], error),
            1 => {
                let d = remaining.next().unwrap_or(0);
                optimize_line(reduced, lower[d], upper[d], error)
            }
            _ => {
                let first = remaining.next().unwrap_or(0);
                // 1-D profile along the first remaining dimension; all mass
                // involving the other dimensions becomes error
                let tail_stride = side.pow((reduced_rank - 1) as u32);
                let mut profile = vec![0.0; side];
                let mut folded = 0.0;
                for (flat, &value) in reduced.iter().enumerate() {
                    if flat % tail_stride == 0 {
                        profile[flat / tail_stride] = value;
                    } else {
                        folded += value.abs();
                    }
                }
                optimize_line(&profile, lower[first], upper[first], error + folded)
            }
        }
    }
}

/// Clenshaw evaluation along one axis: collapse `poly` at `x_dim = t`,
/// leaving a coefficient cube over the remaining dimensions in `out`.
pub(crate) fn clenshaw_reduce(
    poly: &[f64],
    rank: usize,
    side: usize,
    dim: usize,
    t: f64,
    out: &mut Vec<f64>,
) {
    let reduced_len = side.pow((rank - 1) as u32);
    let stride = side.pow((rank - 1 - dim) as u32);

    // Base offset of every lane (the slice at index 0 along `dim`)
    let mut bases = Vec::with_capacity(reduced_len);
    {
        let mut index = vec![0usize; rank];
        loop {
            bases.push(flat_index(&index, side));
            let mut d = rank;
            loop {
                if d == 0 {
                    break;
                }
                d -= 1;
                if d == dim {
                    continue; // held at zero
                }
                index[d] += 1;
                if index[d] < side {
                    break;
                }
                index[d] = 0;
            }
            if index.iter().all(|&k| k == 0) {
                break;
            }
        }
    }
    debug_assert_eq!(bases.len(), reduced_len);

    out.clear();
    out.resize(reduced_len, 0.0);
    let mut b1 = vec![0.0; reduced_len];
    let mut b2 = vec![0.0; reduced_len];
    let two_t = 2.0 * t;
    for k in (1..side).rev() {
        for (lane, &base) in bases.iter().enumerate() {
            let next = poly[base + k * stride] + two_t * b1[lane] - b2[lane];
            b2[lane] = b1[lane];
            b1[lane] = next;
        }
    }
    for (lane, &base) in bases.iter().enumerate() {
        out[lane] = poly[base] + t * b1[lane] - b2[lane];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::chebyshev_t;
    use approx::assert_relative_eq;

    #[test]
    fn test_clenshaw_reduce_1d_matches_direct_evaluation() {
        // p(t) = 1 + 2T1 - 0.5T2 + 0.25T3
        let poly = [1.0, 2.0, -0.5, 0.25];
        let mut out = Vec::new();
        for &t in &[-1.0, -0.3, 0.0, 0.7, 1.0] {
            clenshaw_reduce(&poly, 1, 4, 0, t, &mut out);
            let direct: f64 = poly
                .iter()
                .enumerate()
                .map(|(k, &c)| c * chebyshev_t(t, k))
                .sum();
            assert_relative_eq!(out[0], direct, epsilon = 1e-13);
        }
    }

    #[test]
    fn test_clenshaw_reduce_2d_leaves_polynomial_in_other_dim() {
        // p(x, y) = T1(x)·T2(y): reducing x at t leaves t·T2(y)
        let side = 3;
        let mut poly = vec![0.0; side * side];
        poly[flat_index(&[1, 2], side)] = 1.0;
        let mut out = Vec::new();
        clenshaw_reduce(&poly, 2, side, 0, 0.6, &mut out);
        assert_relative_eq!(out[0], 0.0, epsilon = 1e-14);
        assert_relative_eq!(out[1], 0.0, epsilon = 1e-14);
        assert_relative_eq!(out[2], 0.6, epsilon = 1e-14);

        // Reducing y at t leaves T2(t)·T1(x)
        clenshaw_reduce(&poly, 2, side, 1, 0.5, &mut out);
        let t2 = chebyshev_t(0.5, 2);
        assert_relative_eq!(out[0], 0.0, epsilon = 1e-14);
        assert_relative_eq!(out[1], t2, epsilon = 1e-14);
        assert_relative_eq!(out[2], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_optimize_line_constant_and_linear() {
        // |5| with 1 of error: certified distance 4
        assert_relative_eq!(optimize_line(&[5.0], -1.0, 1.0, 1.0), 4.0);
        // 5 - 4t on [-1, 1]: minimum 1, no certification with error 2
        assert_relative_eq!(optimize_line(&[5.0, -4.0], -1.0, 1.0, 0.5), 0.5);
        assert_relative_eq!(optimize_line(&[5.0, -4.0], -1.0, 1.0, 2.0), 0.0);
        // Negative side: -5 + 4t has maximum -1
        assert_relative_eq!(optimize_line(&[-5.0, 4.0], -1.0, 1.0, 0.5), 0.5);
    }

    #[test]
    fn test_optimize_line_quadratic_vertex() {
        // 3 + T2: dips to 2 at t = 0
        assert_relative_eq!(optimize_line(&[3.0, 0.0, 1.0], -1.0, 1.0, 0.0), 2.0);
        // Restricted away from the vertex the endpoint minimum governs
        assert_relative_eq!(optimize_line(&[3.0, 0.0, 1.0], 0.5, 1.0, 0.0), 3.0 + chebyshev_t(0.5, 2));
    }

    fn scan_min_abs(poly: &[f64], low: f64, high: f64) -> f64 {
        let mut min = f64::INFINITY;
        for i in 0..=4000 {
            let t = low + (high - low) * i as f64 / 4000.0;
            let v: f64 = poly
                .iter()
                .enumerate()
                .map(|(k, &c)| c * chebyshev_t(t, k))
                .sum();
            min = min.min(v.abs());
        }
        min
    }

    #[test]
    fn test_optimize_line_cubic_against_scan() {
        let cases: [&[f64]; 6] = [
            &[2.0, 0.3, -0.2, 0.6],
            &[-3.0, 1.0, 0.5, -0.25],
            &[1.5, -2.0, 0.0, 0.4],
            &[0.9, 0.0, 0.0, 0.5],
            &[4.0, 1.0, 2.0, 0.75, 0.01],
            &[-1.2, 0.8, -0.3, 0.2],
        ];
        for poly in cases {
            for (low, high) in [(-1.0, 1.0), (-0.4, 0.9), (0.1, 0.2)] {
                let certified = optimize_line(poly, low, high, 0.0);
                let scanned = scan_min_abs(poly, low, high);
                // The tail beyond the cubic is folded as error, so the
                // certificate may be loose, but must never exceed the truth
                assert!(
                    certified <= scanned + 1e-9,
                    "certificate {} above scan {} for {:?} on [{}, {}]",
                    certified,
                    scanned,
                    poly,
                    low,
                    high
                );
            }
        }
    }

    #[test]
    fn test_certified_distance_signs() {
        assert_relative_eq!(certified_distance(3.0, 5.0, 1.0), 2.0);
        assert_relative_eq!(certified_distance(-5.0, -3.0, 1.0), 2.0);
        assert_relative_eq!(certified_distance(-1.0, 1.0, 0.5), 0.0);
    }

    fn build_approximation(
        rank: usize,
        degree: usize,
        entries: &[(&[usize], f64)],
        error: f64,
    ) -> ChebyshevApproximation {
        let mut approximation = ChebyshevApproximation::new(rank);
        let side = 2 * degree;
        {
            let coefficients = approximation.prepare(degree);
            for (index, value) in entries {
                coefficients[flat_index(index, side)] = *value;
            }
        }
        approximation.set_measurements(1.0, true, error);
        approximation
    }

    #[test]
    fn test_bounding_contracts_around_a_1d_root() {
        // p(x) = x - 0.3 + 0.05·T2(x), root near 0.3385
        let mut approximations = vec![build_approximation(
            1,
            2,
            &[(&[0], -0.3), (&[1], 1.0), (&[2], 0.05)],
            1e-12,
        )];
        let bounder = IntervalBounder::new(1);
        let bounding = bounder
            .compute_bounding_interval(&mut approximations)
            .expect("cell contains a root");
        let (lo, hi) = (bounding.lower()[0], bounding.upper()[0]);
        // Subset of the unit cell and of the linear-error box [0.25, 0.35]
        assert!(lo >= 0.25 - 1e-12 && hi <= 0.35 + 1e-12);
        // The true root stays inside
        let root = 0.338_539_126_015_655_3;
        assert!(lo <= root && root <= hi, "root left the box [{}, {}]", lo, hi);
        // The Lipschitz sweep tightened beyond the linear-error box
        assert!(hi - lo < 0.05);
    }

    #[test]
    fn test_bounding_rejects_rootless_cell() {
        // p(x) = x - 5: no zero in the unit cell
        let mut approximations = vec![build_approximation(
            1,
            2,
            &[(&[0], -5.0), (&[1], 1.0)],
            1e-12,
        )];
        let bounder = IntervalBounder::new(1);
        assert!(bounder.compute_bounding_interval(&mut approximations).is_none());
    }

    #[test]
    fn test_bounding_2d_contains_the_root() {
        // x + y = 0, x - y = 0.5: root (0.25, -0.25)
        let mut approximations = vec![
            build_approximation(2, 2, &[(&[1, 0], 1.0), (&[0, 1], 1.0)], 1e-13),
            build_approximation(2, 2, &[(&[0, 0], -0.5), (&[1, 0], 1.0), (&[0, 1], -1.0)], 1e-13),
        ];
        let bounder = IntervalBounder::new(2);
        let bounding = bounder
            .compute_bounding_interval(&mut approximations)
            .expect("root inside");
        for d in 0..2 {
            assert!(bounding.lower()[d] >= -1.0 && bounding.upper()[d] <= 1.0);
        }
        assert!(bounding.lower()[0] <= 0.25 && 0.25 <= bounding.upper()[0]);
        assert!(bounding.lower()[1] <= -0.25 && -0.25 <= bounding.upper()[1]);
        // An exactly linear system pins the root tightly
        assert!(bounding.area() < 1e-6);
    }

    #[test]
    fn test_singular_linear_part_skips_bounding() {
        let mut approximations = vec![
            build_approximation(2, 2, &[(&[1, 0], 1.0), (&[0, 1], 1.0)], 1e-13),
            build_approximation(2, 2, &[(&[0, 0], 0.1), (&[1, 0], 1.0), (&[0, 1], 1.0)], 1e-13),
        ];
        let bounder = IntervalBounder::new(2);
        let bounding = bounder
            .compute_bounding_interval(&mut approximations)
            .expect("skip yields the full cell");
        assert_relative_eq!(bounding.area(), 4.0);
    }
}
