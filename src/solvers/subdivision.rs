//! Per-subcell solve pipeline
//!
//! One task flows through: depth guard → per-function approximation with
//! quality gates and the constant-term check → trimming toward the target
//! degree → the linear endgame or subdivision. Every exit either discharges
//! the cell against a tracker or pushes children onto the stack; soft
//! failures (approximation not good enough, trim over budget, singular
//! endgame) re-enter the subdivision loop rather than erroring.

use std::sync::Arc;

use super::linear::{LinearOutcome, LinearSolver};
use super::{SolveTask, WorkContext};
use crate::approximation::{ChebyshevApproximation, ChebyshevApproximator};
use crate::checking::IntervalChecker;
use crate::config::SolveOptions;
use crate::functions::RealFunction;
use crate::timing::Stage;
use crate::tracking::SolveMethod;
use crate::Result;

/// Per-thread solver for individual subcells
pub struct SubdivisionSolver {
    rank: usize,
    functions: Vec<Arc<dyn RealFunction>>,
    options: SolveOptions,
    approximator: ChebyshevApproximator,
    approximations: Vec<ChebyshevApproximation>,
    checker: IntervalChecker,
    linear_solver: LinearSolver,
    /// Effective absolute tolerance per function on the current cell
    abs_tols: Vec<f64>,
}

impl SubdivisionSolver {
    pub fn new(functions: Vec<Arc<dyn RealFunction>>, options: SolveOptions) -> Result<Self> {
        let rank = functions.len();
        let approximator = ChebyshevApproximator::new(rank, options.approximation_degree)?;
        Ok(Self {
            rank,
            functions,
            approximator,
            approximations: (0..rank).map(|_| ChebyshevApproximation::new(rank)).collect(),
            checker: IntervalChecker::new(rank),
            linear_solver: LinearSolver::new(rank),
            abs_tols: vec![0.0; rank],
            options,
        })
    }

    /// Process one subcell to completion
    pub fn solve(&mut self, task: &mut SolveTask, context: &mut WorkContext<'_>) -> Result<()> {
        if task.level > self.options.max_level {
            context.interval_tracker.store(
                context.thread_num,
                &task.interval,
                SolveMethod::TooDeep,
                0.0,
            );
            return Ok(());
        }

        let max_degree = self.approximator.max_degree();
        for i in 0..self.rank {
            // Error floor: never demand more accuracy than the expression
            // itself can be evaluated to
            let floor = if self.options.check_eval_error {
                let _guard = context.timer.start(Stage::EvalErrorEstimate);
                self.approximator
                    .abs_approx_tol(self.functions[i].as_ref(), &task.interval)
            } else {
                0.0
            };
            self.abs_tols[i] = self
                .options
                .abs_approx_tol
                .max(self.options.target_tol)
                .max(floor);

            let degree = task.good_degrees[i].clamp(1, max_degree);
            {
                let _guard = context.timer.start(Stage::Approximation);
                self.approximator.approximate(
                    self.functions[i].as_ref(),
                    &task.interval,
                    degree,
                    &mut self.approximations[i],
                )?;
            }

            if !self.approximations[i]
                .is_good_approximation(self.abs_tols[i], self.options.rel_approx_tol)
            {
                // Let the children try one degree higher
                task.good_degrees[i] = (task.good_degrees[i] + 1).min(max_degree);
                self.checker.run_subinterval_checks(
                    &mut self.approximations,
                    task,
                    i + 1,
                    context,
                );
                return Ok(());
            }

            if !self.approximations[i].has_sign_change()
                && self.checker.constant_term_excludes(&mut self.approximations[i])
            {
                context.interval_tracker.store(
                    context.thread_num,
                    &task.interval,
                    SolveMethod::ConstantTermCheck,
                    0.0,
                );
                return Ok(());
            }

            // Shrink toward the minimal degree that was observed sufficient
            task.good_degrees[i] = (self.approximations[i].good_degree() + 1).min(max_degree);
        }

        for i in 0..self.rank {
            let trimmed = self.approximations[i].trim_coefficients(
                self.abs_tols[i],
                self.options.rel_approx_tol,
                self.options.target_degree,
            );
            task.good_degrees[i] = (self.approximations[i].good_degree() + 1).min(max_degree);
            if !trimmed {
                self.checker.run_subinterval_checks(
                    &mut self.approximations,
                    task,
                    self.rank,
                    context,
                );
                return Ok(());
            }
        }

        let summed_error: f64 = self
            .approximations
            .iter()
            .map(ChebyshevApproximation::approximation_error)
            .sum();
        let good_zeros_tol = self
            .options
            .min_good_zeros_tol
            .max(self.options.good_zeros_factor * summed_error);

        if self.approximations.iter().all(ChebyshevApproximation::is_linear) {
            let outcome = {
                let _guard = context.timer.start(Stage::LinearSolve);
                self.linear_solver.solve(
                    &self.approximations,
                    &task.interval,
                    good_zeros_tol,
                    context,
                )?
            };
            if outcome == LinearOutcome::Singular {
                self.checker.run_subinterval_checks(
                    &mut self.approximations,
                    task,
                    self.rank,
                    context,
                );
            }
        } else {
            self.checker
                .run_subinterval_checks(&mut self.approximations, task, self.rank, context);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeOptions;
    use crate::functions::parser::parse_simple;
    use crate::interval::Interval;
    use crate::sync::{ConcurrentStack, ObjectPool};
    use crate::timing::SolveTimer;
    use crate::tracking::{IntervalTracker, RootTracker, VariableSubstitution};
    use approx::assert_relative_eq;

    struct Harness {
        stack: ConcurrentStack<SolveTask>,
        pool: ObjectPool<SolveTask>,
        interval_tracker: IntervalTracker,
        root_tracker: RootTracker,
        timer: SolveTimer,
    }

    impl Harness {
        fn new(functions: &[Arc<dyn RealFunction>], total_area: f64) -> Self {
            let rank = functions.len();
            Self {
                stack: ConcurrentStack::new(1),
                pool: ObjectPool::new(SolveTask::placeholder(rank), 64),
                interval_tracker: IntervalTracker::new(
                    rank,
                    1,
                    total_area,
                    &RuntimeOptions {
                        track_intervals: true,
                        track_progress: false,
                        ..RuntimeOptions::default()
                    },
                ),
                root_tracker: RootTracker::new(
                    1,
                    functions.to_vec(),
                    VariableSubstitution::identity(rank),
                    false,
                ),
                timer: SolveTimer::new(false),
            }
        }

        fn context(&mut self) -> WorkContext<'_> {
            WorkContext {
                thread_num: 0,
                stack: &self.stack,
                pool: &mut self.pool,
                interval_tracker: &self.interval_tracker,
                root_tracker: &self.root_tracker,
                timer: &self.timer,
            }
        }
    }

    fn functions_of(sources: &[&str], variables: &[&str]) -> Vec<Arc<dyn RealFunction>> {
        sources
            .iter()
            .map(|source| {
                Arc::new(parse_simple("f", source, variables).unwrap()) as Arc<dyn RealFunction>
            })
            .collect()
    }

    #[test]
    fn test_degree_one_system_solves_in_one_step() {
        // 2x + 3y - 1 = 0, x - y + 2 = 0: root (-1, 1), solvable without
        // any subdivision
        let functions = functions_of(&["2*x + 3*y - 1", "x - y + 2"], &["x", "y"]);
        let interval = Interval::new(vec![-2.0, -2.0], vec![2.0, 2.0]);
        let mut harness = Harness::new(&functions, interval.area());
        let mut solver = SubdivisionSolver::new(functions, SolveOptions::default()).unwrap();

        let mut task = SolveTask {
            interval,
            level: 0,
            good_degrees: vec![20, 20],
        };
        solver.solve(&mut task, &mut harness.context()).unwrap();

        // Nothing pushed back: the cell went straight to the linear endgame
        assert!(harness.stack.pop(0).is_none());
        let roots = harness.root_tracker.finalize();
        assert_eq!(roots.len(), 1);
        assert_relative_eq!(roots[0].coordinates[0], -1.0, epsilon = 1e-9);
        assert_relative_eq!(roots[0].coordinates[1], 1.0, epsilon = 1e-9);
        assert_eq!(
            harness.interval_tracker.results()[0].method,
            SolveMethod::LinearSolve
        );
    }

    #[test]
    fn test_rootless_cell_discharged_by_constant_check() {
        let functions = functions_of(&["x^2 + 5"], &["x"]);
        let interval = Interval::new(vec![-1.0], vec![1.0]);
        let mut harness = Harness::new(&functions, interval.area());
        let mut solver = SubdivisionSolver::new(functions, SolveOptions::default()).unwrap();

        let mut task = SolveTask {
            interval,
            level: 0,
            good_degrees: vec![20],
        };
        solver.solve(&mut task, &mut harness.context()).unwrap();
        assert!(harness.stack.pop(0).is_none());
        assert_eq!(
            harness.interval_tracker.results()[0].method,
            SolveMethod::ConstantTermCheck
        );
    }

    #[test]
    fn test_nonlinear_cell_subdivides_with_learned_degrees() {
        let functions = functions_of(&["sin(3*x) - x/4"], &["x"]);
        let interval = Interval::new(vec![-1.0], vec![1.0]);
        let mut harness = Harness::new(&functions, interval.area());
        let mut solver = SubdivisionSolver::new(functions, SolveOptions::default()).unwrap();

        let mut task = SolveTask {
            interval,
            level: 0,
            good_degrees: vec![20],
        };
        solver.solve(&mut task, &mut harness.context()).unwrap();

        // Children were pushed, inheriting a sensible starting degree
        let mut children = 0;
        while let Some(ptr) = harness.stack.pop(0) {
            let child = unsafe { &*ptr };
            assert_eq!(child.level, 1);
            assert!(child.good_degrees[0] >= 1);
            assert!(child.good_degrees[0] <= 20);
            children += 1;
            harness.pool.push(ptr);
        }
        assert!(children >= 1, "expected the cell to split or shrink");
    }

    #[test]
    fn test_too_deep_records_and_stops() {
        let functions = functions_of(&["x"], &["x"]);
        let interval = Interval::new(vec![-1.0], vec![1.0]);
        let mut harness = Harness::new(&functions, interval.area());
        let options = SolveOptions {
            max_level: 3,
            ..SolveOptions::default()
        };
        let mut solver = SubdivisionSolver::new(functions, options).unwrap();

        let mut task = SolveTask {
            interval,
            level: 4,
            good_degrees: vec![20],
        };
        solver.solve(&mut task, &mut harness.context()).unwrap();
        assert!(harness.stack.pop(0).is_none());
        assert_eq!(
            harness.interval_tracker.results()[0].method,
            SolveMethod::TooDeep
        );
    }
}
