//! Per-stage timing
//!
//! A [`SolveTimer`] is created per solve and passed explicitly to the
//! components that want to be timed, so concurrent solves in one process
//! never share timing state. Accumulation is atomic; a disabled timer costs a
//! single branch per measurement.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::Result;

/// The measured stages of a solve, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InputParse,
    SolverSetup,
    Approximation,
    EvalErrorEstimate,
    QuadraticCheck,
    BoundingInterval,
    LinearSolve,
    Solve,
}

impl Stage {
    const ALL: [Stage; 8] = [
        Stage::InputParse,
        Stage::SolverSetup,
        Stage::Approximation,
        Stage::EvalErrorEstimate,
        Stage::QuadraticCheck,
        Stage::BoundingInterval,
        Stage::LinearSolve,
        Stage::Solve,
    ];

    fn name(self) -> &'static str {
        match self {
            Stage::InputParse => "Input Parser",
            Stage::SolverSetup => "Solver Setup",
            Stage::Approximation => "Approximation",
            Stage::EvalErrorEstimate => "Evaluation Error Estimate",
            Stage::QuadraticCheck => "Quadratic Check",
            Stage::BoundingInterval => "Bounding Interval",
            Stage::LinearSolve => "Linear Solve",
            Stage::Solve => "Main Solve",
        }
    }
}

#[derive(Default)]
struct StageDetails {
    nanos: AtomicU64,
    runs: AtomicU64,
}

/// Accumulated wall-clock time per stage
pub struct SolveTimer {
    enabled: bool,
    details: Vec<StageDetails>,
}

/// Guard that charges the elapsed time to its stage on drop
pub struct StageGuard<'a> {
    timer: &'a SolveTimer,
    stage: Stage,
    start: Instant,
}

impl SolveTimer {
    /// Create a timer; a disabled timer records nothing
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            details: Stage::ALL.iter().map(|_| StageDetails::default()).collect(),
        }
    }

    /// Whether measurements are being recorded
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Start measuring `stage`; the measurement ends when the guard drops
    pub fn start(&self, stage: Stage) -> Option<StageGuard<'_>> {
        if !self.enabled {
            return None;
        }
        Some(StageGuard {
            timer: self,
            stage,
            start: Instant::now(),
        })
    }

    fn record(&self, stage: Stage, nanos: u64) {
        let details = &self.details[stage as usize];
        details.nanos.fetch_add(nanos, Ordering::Relaxed);
        details.runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Charge an externally measured duration to a stage
    pub fn record_duration(&self, stage: Stage, duration: std::time::Duration) {
        if self.enabled {
            self.record(stage, duration.as_nanos() as u64);
        }
    }

    /// Format the timing report
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "TIMING RESULTS ({})",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        for stage in Stage::ALL {
            let details = &self.details[stage as usize];
            let runs = details.runs.load(Ordering::Relaxed);
            if runs == 0 {
                continue;
            }
            let nanos = details.nanos.load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "{}:\tRun Count: {}\tTotal Time: {}\tAverage Time: {}",
                stage.name(),
                runs,
                format_time_pretty(nanos as f64),
                format_time_pretty(nanos as f64 / runs as f64),
            );
        }
        out
    }

    /// Write the report to `timing.txt` under `dir`
    pub fn write_report(&self, dir: &Path) -> Result<()> {
        fs::write(dir.join("timing.txt"), self.report())?;
        Ok(())
    }
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        let nanos = self.start.elapsed().as_nanos() as u64;
        self.timer.record(self.stage, nanos);
    }
}

/// Human-readable duration from nanoseconds
fn format_time_pretty(nanoseconds: f64) -> String {
    const THOUSAND: f64 = 1000.0;
    const MILLION: f64 = THOUSAND * THOUSAND;
    const BILLION: f64 = MILLION * THOUSAND;

    if nanoseconds < THOUSAND {
        format!("{:.0}ns", nanoseconds)
    } else if nanoseconds < MILLION {
        format!("{:.3}us", nanoseconds / THOUSAND)
    } else if nanoseconds < BILLION {
        format!("{:.3}ms", nanoseconds / MILLION)
    } else {
        format!("{:.3}s", nanoseconds / BILLION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_timer_records_nothing() {
        let timer = SolveTimer::new(false);
        assert!(timer.start(Stage::Solve).is_none());
        assert!(!timer.report().contains("Main Solve"));
    }

    #[test]
    fn test_guard_accumulates() {
        let timer = SolveTimer::new(true);
        {
            let _g = timer.start(Stage::Approximation);
        }
        {
            let _g = timer.start(Stage::Approximation);
        }
        let report = timer.report();
        assert!(report.contains("Approximation:\tRun Count: 2"));
    }

    #[test]
    fn test_format_time_pretty_units() {
        assert_eq!(format_time_pretty(10.0), "10ns");
        assert!(format_time_pretty(2_500.0).ends_with("us"));
        assert!(format_time_pretty(2_500_000.0).ends_with("ms"));
        assert!(format_time_pretty(2_500_000_000.0).ends_with('s'));
    }
}
