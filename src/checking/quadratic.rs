//! Quadratic-subinterval sign check
//!
//! The constant, linear, and quadratic Chebyshev coefficients of an
//! approximation form a quadratic whose extrema over a sub-box can be pinned
//! down in closed form. Everything the quadratic leaves out — higher
//! coefficients and the approximation error — is folded into a residual
//! bound; when the quadratic keeps a definite sign over a subinterval with
//! slack exceeding that bound, the subinterval cannot contain a zero.
//!
//! Ranks one and two enumerate their extremum candidates directly. Higher
//! ranks walk every face stratum of the box (each dimension fixed at a bound
//! or left free) and take the critical point of the restricted quadratic on
//! each, which covers every point a box-constrained extremum can occur at.

use nalgebra::{DMatrix, DVector};

use crate::approximation::ChebyshevApproximation;

/// Sign classification against an error threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalSign {
    /// Not provably bounded away from zero
    Zero,
    Positive,
    Negative,
}

pub fn eval_sign(value: f64, error: f64) -> EvalSign {
    if value > error {
        EvalSign::Positive
    } else if value < -error {
        EvalSign::Negative
    } else {
        EvalSign::Zero
    }
}

/// The degree-≤2 part of an approximation plus a bound on everything else
#[derive(Debug, Clone)]
pub struct QuadraticPart {
    rank: usize,
    constant: f64,
    /// Coefficients of `T₁(x_d)`
    linear: Vec<f64>,
    /// Coefficients of `T₂(x_d)`
    diagonal: Vec<f64>,
    /// Coefficients of `T₁(x_i)·T₁(x_j)` for `i < j`, row-major upper triangle
    cross: Vec<f64>,
    /// ℓ¹ mass of all other coefficients plus the approximation error
    error: f64,
}

impl QuadraticPart {
    pub fn from_approximation(approximation: &mut ChebyshevApproximation) -> Self {
        let rank = approximation.rank();
        let mut index = vec![0usize; rank];

        let constant = approximation.constant_term();
        let mut used = constant.abs();

        let mut linear = vec![0.0; rank];
        let mut diagonal = vec![0.0; rank];
        for d in 0..rank {
            linear[d] = approximation.linear_coefficient(d);
            index.fill(0);
            index[d] = 2;
            diagonal[d] = approximation.corner_coefficient(&index);
            used += linear[d].abs() + diagonal[d].abs();
        }

        let mut cross = vec![0.0; rank * rank];
        for i in 0..rank {
            for j in i + 1..rank {
                index.fill(0);
                index[i] = 1;
                index[j] = 1;
                let value = approximation.corner_coefficient(&index);
                cross[i * rank + j] = value;
                used += value.abs();
            }
        }

        let error =
            approximation.sum_abs_values() - used + approximation.approximation_error();
        Self {
            rank,
            constant,
            linear,
            diagonal,
            cross,
            error,
        }
    }

    fn cross_at(&self, i: usize, j: usize) -> f64 {
        match i.cmp(&j) {
            std::cmp::Ordering::Less => self.cross[i * self.rank + j],
            std::cmp::Ordering::Greater => self.cross[j * self.rank + i],
            std::cmp::Ordering::Equal => 0.0,
        }
    }

    /// Value of the quadratic at a point
    pub fn eval(&self, x: &[f64]) -> f64 {
        let mut value = self.constant;
        for d in 0..self.rank {
            value += self.linear[d] * x[d] + self.diagonal[d] * (2.0 * x[d] * x[d] - 1.0);
            for j in d + 1..self.rank {
                value += self.cross[d * self.rank + j] * x[d] * x[j];
            }
        }
        value
    }

    /// Definite sign of the full approximation over the box, or
    /// [`EvalSign::Zero`] when it cannot be certified
    pub fn definite_sign(&self, lower: &[f64], upper: &[f64]) -> EvalSign {
        let (min, max) = match self.rank {
            1 => self.extrema_1d(lower[0], upper[0]),
            2 => self.extrema_2d(lower, upper),
            _ => self.extrema_nd(lower, upper),
        };
        if !min.is_finite() || !max.is_finite() {
            return EvalSign::Zero;
        }
        match (eval_sign(min, self.error), eval_sign(max, self.error)) {
            (EvalSign::Positive, _) => EvalSign::Positive,
            (_, EvalSign::Negative) => EvalSign::Negative,
            _ => EvalSign::Zero,
        }
    }

    /// `c + b·t + a·(2t² − 1)` extrema over `[low, high]`
    fn extrema_1d(&self, low: f64, high: f64) -> (f64, f64) {
        let a = self.diagonal[0];
        let b = self.linear[0];

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut take = |t: f64| {
            let v = self.eval(&[t]);
            min = min.min(v);
            max = max.max(v);
        };
        take(low);
        take(high);
        if a != 0.0 {
            let vertex = -b / (4.0 * a);
            if vertex > low && vertex < high {
                take(vertex);
            }
        }
        (min, max)
    }

    fn extrema_2d(&self, lower: &[f64], upper: &[f64]) -> (f64, f64) {
        let (a0, a1) = (self.diagonal[0], self.diagonal[1]);
        let (b0, b1) = (self.linear[0], self.linear[1]);
        let c = self.cross_at(0, 1);

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut take = |x: f64, y: f64| {
            let v = self.eval(&[x, y]);
            min = min.min(v);
            max = max.max(v);
        };

        // Corners
        for &x in &[lower[0], upper[0]] {
            for &y in &[lower[1], upper[1]] {
                take(x, y);
            }
        }

        // Edge critical points: fix one variable, the restriction is a
        // univariate quadratic with vertex -(b + c·v) / 4a
        if a1 != 0.0 {
            for &x in &[lower[0], upper[0]] {
                let y = -(b1 + c * x) / (4.0 * a1);
                if y > lower[1] && y < upper[1] {
                    take(x, y);
                }
            }
        }
        if a0 != 0.0 {
            for &y in &[lower[1], upper[1]] {
                let x = -(b0 + c * y) / (4.0 * a0);
                if x > lower[0] && x < upper[0] {
                    take(x, y);
                }
            }
        }

        // Interior critical point of 4a0·x + c·y = -b0, c·x + 4a1·y = -b1
        let det = 16.0 * a0 * a1 - c * c;
        if det != 0.0 {
            let x = (-4.0 * a1 * b0 + c * b1) / det;
            let y = (-4.0 * a0 * b1 + c * b0) / det;
            if x > lower[0] && x < upper[0] && y > lower[1] && y < upper[1] {
                take(x, y);
            }
        }

        (min, max)
    }

    /// General rank: every stratum of the box contributes the critical point
    /// of the quadratic restricted to it (corners are the all-fixed strata).
    fn extrema_nd(&self, lower: &[f64], upper: &[f64]) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        // Ternary odometer over {lower, upper, free} per dimension
        let mut choice = vec![0u8; self.rank];
        'strata: loop {
            let free: Vec<usize> = (0..self.rank).filter(|&d| choice[d] == 2).collect();
            let mut point = vec![0.0; self.rank];
            for d in 0..self.rank {
                point[d] = match choice[d] {
                    0 => lower[d],
                    1 => upper[d],
                    _ => 0.0,
                };
            }

            if free.is_empty() {
                let v = self.eval(&point);
                min = min.min(v);
                max = max.max(v);
            } else if let Some(critical) = self.restricted_critical_point(&free, &point) {
                let inside = free
                    .iter()
                    .zip(critical.iter())
                    .all(|(&d, &t)| t > lower[d] && t < upper[d]);
                if inside {
                    for (slot, &t) in free.iter().zip(critical.iter()) {
                        point[*slot] = t;
                    }
                    let v = self.eval(&point);
                    min = min.min(v);
                    max = max.max(v);
                }
            }

            // Advance the odometer
            let mut d = self.rank;
            loop {
                if d == 0 {
                    break 'strata;
                }
                d -= 1;
                choice[d] += 1;
                if choice[d] <= 2 {
                    break;
                }
                choice[d] = 0;
            }
        }

        (min, max)
    }

    /// Critical point of the quadratic with the fixed dimensions substituted:
    /// solve `H x = -g` over the free dimensions, where `H` has `4a_d` on the
    /// diagonal and the cross terms off it. Singular restrictions have their
    /// extrema on smaller strata and contribute nothing here.
    fn restricted_critical_point(&self, free: &[usize], fixed_point: &[f64]) -> Option<Vec<f64>> {
        let m = free.len();
        let mut hessian = DMatrix::zeros(m, m);
        let mut rhs = DVector::zeros(m);
        for (row, &d) in free.iter().enumerate() {
            hessian[(row, row)] = 4.0 * self.diagonal[d];
            let mut g = self.linear[d];
            for other in 0..self.rank {
                if free.contains(&other) {
                    if other != d {
                        let col = free.iter().position(|&f| f == other)?;
                        hessian[(row, col)] = self.cross_at(d, other);
                    }
                } else {
                    g += self.cross_at(d, other) * fixed_point[other];
                }
            }
            rhs[row] = -g;
        }
        hessian.lu().solve(&rhs).map(|x| x.iter().copied().collect())
    }
}
