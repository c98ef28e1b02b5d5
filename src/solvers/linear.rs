//! Degree-1 endgame
//!
//! Once every approximation has been trimmed to degree one the system is
//! `L·x = −c` on the unit cell. Rows are normalised by each function's
//! infinity norm so the conditioning reflects geometry rather than scale.
//! The candidate solution is accepted when every component lies within the
//! unit box up to the tolerance earned by the approximation errors.

use nalgebra::{DMatrix, DVector};

use super::WorkContext;
use crate::approximation::ChebyshevApproximation;
use crate::interval::Interval;
use crate::tracking::SolveMethod;
use crate::Result;

/// Pivot threshold below which the linear system counts as singular
const SINGULAR_THRESHOLD: f64 = 1e-10;

/// What the endgame did with a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearOutcome {
    /// Cell discharged (root stored, or candidate rejected as outside)
    Solved,
    /// System too close to singular; the caller should subdivide instead
    Singular,
}

/// Closed-form solver for all-linear cells
pub struct LinearSolver {
    rank: usize,
}

impl LinearSolver {
    pub fn new(rank: usize) -> Self {
        Self { rank }
    }

    /// Solve the linear system of `approximations` on `interval` and hand any
    /// accepted root to the tracker.
    pub fn solve(
        &self,
        approximations: &[ChebyshevApproximation],
        interval: &Interval,
        good_zeros_tol: f64,
        context: &mut WorkContext<'_>,
    ) -> Result<LinearOutcome> {
        let rank = self.rank;
        let mut matrix = DMatrix::zeros(rank, rank);
        let mut rhs = DVector::zeros(rank);
        for (i, approximation) in approximations.iter().enumerate() {
            let norm = approximation.inf_norm();
            let scale = if norm > 0.0 { 1.0 / norm } else { 1.0 };
            for d in 0..rank {
                matrix[(i, d)] = approximation.linear_coefficient(d) * scale;
            }
            rhs[i] = -approximation.constant_term() * scale;
        }

        let qr = matrix.col_piv_qr();
        let diagonal = qr.r().diagonal();
        let mut min_pivot = f64::INFINITY;
        let mut max_pivot: f64 = 0.0;
        for pivot in diagonal.iter() {
            min_pivot = min_pivot.min(pivot.abs());
            max_pivot = max_pivot.max(pivot.abs());
        }
        if !min_pivot.is_finite() || min_pivot < SINGULAR_THRESHOLD {
            return Ok(LinearOutcome::Singular);
        }

        let solution = match qr.solve(&rhs) {
            Some(solution) => solution,
            None => return Ok(LinearOutcome::Singular),
        };
        let condition_number = max_pivot / min_pivot;

        context.root_tracker.store_root(
            context.thread_num,
            solution.as_slice(),
            interval,
            SolveMethod::LinearSolve,
            condition_number,
            good_zeros_tol,
        )?;
        context.interval_tracker.store(
            context.thread_num,
            interval,
            SolveMethod::LinearSolve,
            0.0,
        );
        Ok(LinearOutcome::Solved)
    }
}
