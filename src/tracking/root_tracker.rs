//! Found-root accounting
//!
//! The linear endgame hands unit-coordinate candidates to [`RootTracker`],
//! which applies the acceptance test, maps the candidate back to world
//! coordinates, performs variable substitution for dimensions the user stated
//! as expressions, optionally evaluates residual bounds, and appends the root
//! to the calling thread's partition. Finalisation merges the partitions into
//! a sorted, deduplicated list, so the output is identical for every thread
//! count.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use super::SolveMethod;
use crate::functions::RealFunction;
use crate::interval::Interval;
use crate::{Result, RootfieldError};

/// One accepted root
#[derive(Debug, Clone)]
pub struct FoundRoot {
    /// Full user-coordinate vector (substituted dimensions included)
    pub coordinates: Vec<f64>,
    /// Subcell the root was extracted from
    pub interval: Interval,
    /// Endgame that produced it
    pub method: SolveMethod,
    /// Conditioning of the endgame's linear system
    pub condition_number: f64,
    /// Acceptance tolerance in force when the root was stored
    pub zero_tolerance: f64,
    /// Per-function `(residual, error bound)` pairs, when enabled
    pub residuals: Option<Vec<(f64, f64)>>,
}

/// How one output dimension of a root is produced
#[derive(Clone)]
pub enum OutputCoordinate {
    /// Take solver variable `i` directly
    Variable(usize),
    /// Evaluate an expression at the solver root; discard the root when the
    /// value leaves `[lower, upper]`
    Substituted {
        function: Arc<dyn RealFunction>,
        lower: f64,
        upper: f64,
    },
}

/// Mapping from solver coordinates to user coordinates
#[derive(Clone, Default)]
pub struct VariableSubstitution {
    outputs: Vec<OutputCoordinate>,
}

impl VariableSubstitution {
    /// Identity mapping over `rank` solver variables
    pub fn identity(rank: usize) -> Self {
        Self {
            outputs: (0..rank).map(OutputCoordinate::Variable).collect(),
        }
    }

    pub fn new(outputs: Vec<OutputCoordinate>) -> Self {
        Self { outputs }
    }

    /// The output mapping, one entry per user coordinate
    pub fn outputs(&self) -> &[OutputCoordinate] {
        &self.outputs
    }

    /// Whether any output dimension is substituted
    pub fn is_identity(&self) -> bool {
        self.outputs
            .iter()
            .all(|o| matches!(o, OutputCoordinate::Variable(_)))
    }

    /// Produce the user-coordinate vector, or `None` when a substituted
    /// value falls outside its stated bounds
    fn apply(&self, solver_root: &[f64]) -> Option<Vec<f64>> {
        let mut full = Vec::with_capacity(self.outputs.len());
        for output in &self.outputs {
            match output {
                OutputCoordinate::Variable(index) => full.push(solver_root[*index]),
                OutputCoordinate::Substituted {
                    function,
                    lower,
                    upper,
                } => {
                    let value = function.eval(solver_root);
                    if !(value >= *lower && value <= *upper) {
                        return None;
                    }
                    full.push(value);
                }
            }
        }
        Some(full)
    }
}

/// Thread-safe accumulator for accepted roots
pub struct RootTracker {
    functions: Vec<Arc<dyn RealFunction>>,
    substitution: VariableSubstitution,
    compute_residuals: bool,
    partitions: Vec<Mutex<Vec<FoundRoot>>>,
}

impl RootTracker {
    pub fn new(
        num_threads: usize,
        functions: Vec<Arc<dyn RealFunction>>,
        substitution: VariableSubstitution,
        compute_residuals: bool,
    ) -> Self {
        Self {
            functions,
            substitution,
            compute_residuals,
            partitions: (0..num_threads).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Validate and store a unit-coordinate candidate from `interval`.
    ///
    /// Returns whether the root was accepted. Residual evaluation that hits
    /// an unstable operation (division by an interval containing zero) is a
    /// fatal misuse.
    pub fn store_root(
        &self,
        thread_num: usize,
        unit_root: &[f64],
        interval: &Interval,
        method: SolveMethod,
        condition_number: f64,
        good_zeros_tol: f64,
    ) -> Result<bool> {
        // Inside the unit box, up to the tolerance earned by the
        // approximation errors. NaNs fail this test and are rejected.
        for &coordinate in unit_root {
            if !(coordinate.abs() <= 1.0 + good_zeros_tol) {
                return Ok(false);
            }
        }

        let solver_root = interval.point_from_unit(unit_root);
        let coordinates = match self.substitution.apply(&solver_root) {
            Some(full) => full,
            None => return Ok(false),
        };

        let residuals = if self.compute_residuals {
            let mut pairs = Vec::with_capacity(self.functions.len());
            for function in &self.functions {
                let tracked = function.eval_tracked(&solver_root);
                if tracked.is_poisoned() {
                    return Err(RootfieldError::misuse(format!(
                        "residual evaluation is unstable at root {:?}",
                        solver_root
                    )));
                }
                pairs.push((tracked.value, tracked.error));
            }
            Some(pairs)
        } else {
            None
        };

        let mut partition = self.partitions[thread_num]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        partition.push(FoundRoot {
            coordinates,
            interval: interval.clone(),
            method,
            condition_number,
            zero_tolerance: good_zeros_tol,
            residuals,
        });
        Ok(true)
    }

    /// Merge the partitions into a sorted list with near-duplicates removed.
    ///
    /// Adjacent subcells can both accept a root sitting near their shared
    /// boundary; two roots within the L∞ distance allowed by their zero
    /// tolerances are the same root, and the first (in sort order) wins.
    pub fn finalize(&self) -> Vec<FoundRoot> {
        let mut all: Vec<FoundRoot> = self
            .partitions
            .iter()
            .flat_map(|partition| {
                partition
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone()
            })
            .collect();
        all.sort_by(|a, b| {
            a.coordinates
                .partial_cmp(&b.coordinates)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut unique: Vec<FoundRoot> = Vec::with_capacity(all.len());
        for root in all {
            let duplicate = unique.iter().any(|kept| {
                let tolerance = kept.zero_tolerance.max(root.zero_tolerance);
                kept.coordinates
                    .iter()
                    .zip(root.coordinates.iter())
                    .all(|(a, b)| (a - b).abs() <= tolerance)
            });
            if !duplicate {
                unique.push(root);
            }
        }
        unique
    }

    /// Write `roots.csv`: one root per line, 17 significant digits
    pub fn write_roots(&self, dir: &Path, roots: &[FoundRoot]) -> Result<()> {
        let mut out = String::new();
        for root in roots {
            let line = root
                .coordinates
                .iter()
                .map(|v| format!("{:.16e}", v))
                .collect::<Vec<_>>()
                .join(",");
            out.push_str(&line);
            out.push('\n');
        }
        fs::write(dir.join("roots.csv"), out)?;
        Ok(())
    }

    /// Write `residuals.csv`: `(f_i(root), error_bound_i)` pairs per root
    pub fn write_residuals(&self, dir: &Path, roots: &[FoundRoot]) -> Result<()> {
        let mut out = String::new();
        for root in roots {
            if let Some(residuals) = &root.residuals {
                let line = residuals
                    .iter()
                    .map(|(value, error)| format!("{:.16e},{:.16e}", value, error))
                    .collect::<Vec<_>>()
                    .join(",");
                out.push_str(&line);
                out.push('\n');
            }
        }
        fs::write(dir.join("residuals.csv"), out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::parser::parse_simple;
    use approx::assert_relative_eq;

    fn function(source: &str, variables: &[&str]) -> Arc<dyn RealFunction> {
        Arc::new(parse_simple("f", source, variables).unwrap())
    }

    fn tracker(num_threads: usize) -> RootTracker {
        RootTracker::new(
            num_threads,
            vec![function("x - 0.25", &["x"])],
            VariableSubstitution::identity(1),
            true,
        )
    }

    #[test]
    fn test_acceptance_window() {
        let t = tracker(1);
        let cell = Interval::new(vec![0.0], vec![0.5]);
        // Unit coordinate 1.5 is far outside even with tolerance
        assert!(!t
            .store_root(0, &[1.5], &cell, SolveMethod::LinearSolve, 1.0, 1e-5)
            .unwrap());
        // Slightly outside but within tolerance
        assert!(t
            .store_root(0, &[1.0 + 1e-6], &cell, SolveMethod::LinearSolve, 1.0, 1e-5)
            .unwrap());
        // NaN candidates are rejected, not stored
        assert!(!t
            .store_root(0, &[f64::NAN], &cell, SolveMethod::LinearSolve, 1.0, 1e-5)
            .unwrap());
    }

    #[test]
    fn test_world_mapping_and_residuals() {
        let t = tracker(1);
        let cell = Interval::new(vec![0.0], vec![0.5]);
        // Unit 0 maps to world 0.25, the root of x - 0.25
        assert!(t
            .store_root(0, &[0.0], &cell, SolveMethod::LinearSolve, 1.0, 1e-5)
            .unwrap());
        let roots = t.finalize();
        assert_eq!(roots.len(), 1);
        assert_relative_eq!(roots[0].coordinates[0], 0.25);
        let residuals = roots[0].residuals.as_ref().unwrap();
        assert_relative_eq!(residuals[0].0, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_duplicate_roots_collapse_across_threads() {
        let t = tracker(2);
        let left = Interval::new(vec![-1.0], vec![0.0]);
        let right = Interval::new(vec![0.0], vec![1.0]);
        // The same world root 0.0 seen from both neighbouring cells
        assert!(t
            .store_root(0, &[1.0 - 1e-9], &left, SolveMethod::LinearSolve, 1.0, 1e-5)
            .unwrap());
        assert!(t
            .store_root(1, &[-1.0 + 1e-9], &right, SolveMethod::LinearSolve, 1.0, 1e-5)
            .unwrap());
        let roots = t.finalize();
        assert_eq!(roots.len(), 1);
        assert_relative_eq!(roots[0].coordinates[0], 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_finalize_sorts_lexicographically() {
        let t = RootTracker::new(
            1,
            vec![function("x*y", &["x", "y"])],
            VariableSubstitution::identity(2),
            false,
        );
        let cell = Interval::new(vec![-2.0, -2.0], vec![2.0, 2.0]);
        t.store_root(0, &[0.5, 0.5], &cell, SolveMethod::LinearSolve, 1.0, 1e-9)
            .unwrap();
        t.store_root(0, &[-0.5, 0.0], &cell, SolveMethod::LinearSolve, 1.0, 1e-9)
            .unwrap();
        let roots = t.finalize();
        assert_eq!(roots.len(), 2);
        assert!(roots[0].coordinates[0] < roots[1].coordinates[0]);
    }

    #[test]
    fn test_substitution_bounds_filter() {
        let substitution = VariableSubstitution::new(vec![
            OutputCoordinate::Variable(0),
            OutputCoordinate::Substituted {
                function: function("x^2", &["x"]),
                lower: 0.0,
                upper: 0.5,
            },
        ]);
        let t = RootTracker::new(1, vec![function("x", &["x"])], substitution, false);
        let cell = Interval::new(vec![-1.0], vec![1.0]);
        // Root at x = 0.9 gives x^2 = 0.81, outside [0, 0.5]: discarded
        assert!(!t
            .store_root(0, &[0.9], &cell, SolveMethod::LinearSolve, 1.0, 1e-9)
            .unwrap());
        // Root at x = 0.5 gives 0.25, inside: kept with both coordinates
        assert!(t
            .store_root(0, &[0.5], &cell, SolveMethod::LinearSolve, 1.0, 1e-9)
            .unwrap());
        let roots = t.finalize();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].coordinates.len(), 2);
        assert_relative_eq!(roots[0].coordinates[1], 0.25);
    }

    #[test]
    fn test_unstable_residual_is_misuse() {
        let t = RootTracker::new(
            1,
            vec![function("1/(x - 0.5)", &["x"])],
            VariableSubstitution::identity(1),
            true,
        );
        let cell = Interval::new(vec![0.0], vec![1.0]);
        // Root lands exactly on the pole: the divisor interval contains zero
        let result = t.store_root(0, &[0.0], &cell, SolveMethod::LinearSolve, 1.0, 1e-9);
        assert!(result.is_err());
    }
}
