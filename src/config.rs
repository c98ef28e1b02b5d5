//! Solver configuration
//!
//! Two option groups mirror the two halves of the input file's `PARAMETERS`
//! block: [`SolveOptions`] drives the subdivision algorithm itself, while
//! [`RuntimeOptions`] controls threading, tracking, and reporting. Defaults
//! here are the defaults of the input grammar.

/// Tolerances and degree limits for the subdivision solver
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Relative approximation tolerance, scaled by the infinity norm
    pub rel_approx_tol: f64,
    /// Absolute approximation tolerance
    pub abs_approx_tol: f64,
    /// Floor on the absolute error budget, effective when `abs_approx_tol`
    /// is driven below it
    pub target_tol: f64,
    /// Raise the per-function error budget to the observed evaluation error
    pub check_eval_error: bool,
    /// Multiplier on the summed approximation errors when accepting roots
    pub good_zeros_factor: f64,
    /// Lower bound on the root acceptance tolerance
    pub min_good_zeros_tol: f64,
    /// Starting approximation degree for the root cell, and the cap for
    /// degree bumps
    pub approximation_degree: usize,
    /// Degree that trimming drives toward (1 ⇒ linear endgame)
    pub target_degree: usize,
    /// Maximum subdivision depth before a cell is abandoned as too deep
    pub max_level: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            rel_approx_tol: 1e-10,
            abs_approx_tol: 1e-10,
            target_tol: 1e-15,
            check_eval_error: true,
            good_zeros_factor: 100.0,
            min_good_zeros_tol: 1e-5,
            approximation_degree: 20,
            target_degree: 1,
            max_level: 50,
        }
    }
}

/// Threading, tracking, and reporting switches
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Worker thread count; the parser maps `-1` to the hardware thread count
    pub num_threads: usize,
    /// Record every discharged interval and write `intervals.txt`
    pub track_intervals: bool,
    /// Render a progress bar while solving
    pub track_progress: bool,
    /// Collect per-stage timings and write `timing.txt`
    pub use_timer: bool,
    /// Evaluate residuals at every accepted root and write `residuals.csv`
    pub compute_residuals: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            num_threads: 1,
            track_intervals: false,
            track_progress: true,
            use_timer: false,
            compute_residuals: true,
        }
    }
}
