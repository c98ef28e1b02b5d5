//! Interval exclusion and bounding
//!
//! Three escalating tests discharge or shrink subcells without ever sampling
//! the functions again:
//!
//! 1. The **constant-term check** discards a cell when the constant Chebyshev
//!    coefficient dominates every other coefficient plus the error bound.
//! 2. The **quadratic check** splits the unit cell at a fixed irrational
//!    midpoint and discards the sub-boxes on which the degree-≤2 part keeps a
//!    definite sign with slack above the residual bound.
//! 3. The **bounding solve** contracts the cell around the zero set of the
//!    preconditioned linear system.
//!
//! [`IntervalChecker::run_subinterval_checks`] combines the three into the
//! subdivision decision: discard, push one shrunken cell, or push the
//! surviving sub-boxes.

pub mod bounder;
pub mod quadratic;

pub use bounder::IntervalBounder;
pub use quadratic::{EvalSign, QuadraticPart};

use crate::approximation::ChebyshevApproximation;
use crate::interval::Interval;
use crate::solvers::{SolveTask, WorkContext};
use crate::timing::Stage;
use crate::tracking::SolveMethod;

/// Runs the cheap exclusion tests and pushes surviving children
pub struct IntervalChecker {
    rank: usize,
    /// The 2ⁿ unit sub-boxes split at the irrational midpoint
    unit_subintervals: Vec<Interval>,
    keep: Vec<bool>,
}

impl IntervalChecker {
    pub fn new(rank: usize) -> Self {
        let unit_subintervals = Interval::unit_subintervals(rank);
        let keep = vec![true; unit_subintervals.len()];
        Self {
            rank,
            unit_subintervals,
            keep,
        }
    }

    /// Whether the approximation is provably bounded away from zero on the
    /// whole cell: the constant term exceeds all remaining mass plus error.
    pub fn constant_term_excludes(&self, approximation: &mut ChebyshevApproximation) -> bool {
        let constant = approximation.constant_term().abs();
        let sum = approximation.sum_abs_values();
        let error = approximation.approximation_error();
        sum + error <= 2.0 * constant
    }

    /// Subdivide `task`, using the first `num_approximations` approximations
    /// to discard sub-boxes and, when the whole system is available, to
    /// shrink the cell with the bounding solve.
    pub fn run_subinterval_checks(
        &mut self,
        approximations: &mut [ChebyshevApproximation],
        task: &SolveTask,
        num_approximations: usize,
        context: &mut WorkContext<'_>,
    ) {
        // Quadratic exclusion per function; any definite sign removes a box
        {
            let _guard = context.timer.start(Stage::QuadraticCheck);
            self.keep.fill(true);
            for approximation in approximations[..num_approximations].iter_mut() {
                let quadratic = QuadraticPart::from_approximation(approximation);
                for (slot, sub) in self.unit_subintervals.iter().enumerate() {
                    if self.keep[slot]
                        && quadratic.definite_sign(sub.lower(), sub.upper()) != EvalSign::Zero
                    {
                        self.keep[slot] = false;
                    }
                }
            }
        }

        let bounding = if num_approximations == self.rank {
            let _guard = context.timer.start(Stage::BoundingInterval);
            let bounder = IntervalBounder::new(self.rank);
            bounder.compute_bounding_interval(&mut approximations[..num_approximations])
        } else {
            Some(Interval::unit(self.rank))
        };

        let bounding = match bounding {
            None => {
                // The bounding solve emptied the cell
                context.interval_tracker.store(
                    context.thread_num,
                    &task.interval,
                    SolveMethod::BoundingInterval,
                    0.0,
                );
                return;
            }
            Some(bounding) => bounding,
        };

        let kept_area: f64 = self
            .unit_subintervals
            .iter()
            .zip(self.keep.iter())
            .filter(|(_, &kept)| kept)
            .map(|(sub, _)| sub.area())
            .sum();

        // A sufficiently shrunken bounding box replaces the subdivision
        let child_level = task.level + 1;
        if bounding.area() < kept_area.min(1.5f64.powi(self.rank as i32)) {
            context.push_task(
                task.interval.project(&bounding),
                child_level,
                &task.good_degrees,
            );
            context.interval_tracker.store(
                context.thread_num,
                &task.interval,
                SolveMethod::BoundingInterval,
                bounding.area(),
            );
            return;
        }

        for (slot, sub) in self.unit_subintervals.iter().enumerate() {
            if self.keep[slot] {
                context.push_task(task.interval.project(sub), child_level, &task.good_degrees);
            }
        }
        context.interval_tracker.store(
            context.thread_num,
            &task.interval,
            SolveMethod::QuadraticCheck,
            kept_area,
        );
    }
}
