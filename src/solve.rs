//! End-to-end solve orchestration
//!
//! Ties the front end to the core: parse the input file, run the threaded
//! solver, write the result files. Timing state is created per solve and
//! passed down explicitly, so a process may run several solves concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::info;

use crate::input::parse_input_file;
use crate::solvers::ThreadedSolver;
use crate::timing::{SolveTimer, Stage};
use crate::tracking::FoundRoot;
use crate::Result;

/// Outcome of a file-driven solve
#[derive(Debug)]
pub struct SolveSummary {
    /// Sorted, deduplicated roots in user coordinates
    pub roots: Vec<FoundRoot>,
    /// Directory the result files were written into
    pub output_dir: PathBuf,
}

/// Solve the system described by `input_path`, writing `roots.csv` (and,
/// depending on the file's parameters, `residuals.csv`, `intervals.txt`,
/// and `timing.txt`) into `output_dir`.
pub fn solve_input_file(input_path: &Path, output_dir: &Path) -> Result<SolveSummary> {
    let parse_started = Instant::now();
    let input = parse_input_file(input_path)?;
    let parse_elapsed = parse_started.elapsed();

    let timer = Arc::new(SolveTimer::new(input.runtime.use_timer));
    timer.record_duration(Stage::InputParse, parse_elapsed);

    info!(
        "solving {} function(s) on {} with {} thread(s)",
        input.functions.len(),
        input.search_interval.display(),
        input.runtime.num_threads
    );

    let solver = ThreadedSolver::new(
        input.functions,
        input.search_interval,
        input.options,
        &input.runtime,
        input.substitution,
        Arc::clone(&timer),
    )?;
    let report = solver.solve()?;

    std::fs::create_dir_all(output_dir)?;
    report.root_tracker.write_roots(output_dir, &report.roots)?;
    if input.runtime.compute_residuals {
        report
            .root_tracker
            .write_residuals(output_dir, &report.roots)?;
    }
    if input.runtime.track_intervals {
        report.interval_tracker.write_report(output_dir)?;
    }
    if input.runtime.use_timer {
        timer.write_report(output_dir)?;
    }

    Ok(SolveSummary {
        roots: report.roots,
        output_dir: output_dir.to_path_buf(),
    })
}
