//! Discharged-interval accounting and progress display
//!
//! Results land in per-thread partitions so workers never contend; the
//! partition mutexes are uncontended by construction. Solved area accumulates
//! per thread in atomic bit-cast doubles and drives a progress bar that is
//! serialised by a busy-flag gate: whoever finds the gate free repaints,
//! everyone else skips.

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use log::warn;

use super::{IntervalResult, SolveMethod};
use crate::config::RuntimeOptions;
use crate::interval::Interval;
use crate::Result;

/// Progress bar resolution: hundred-thousandths of the whole solve
const PROGRESS_TICKS: i64 = 100_000;

/// Thread-safe tracker for discharged subcells
pub struct IntervalTracker {
    track_intervals: bool,
    track_progress: bool,
    total_area: f64,
    /// Area of the unit box, `2ⁿ`
    unit_area: f64,
    partitions: Vec<Mutex<Vec<IntervalResult>>>,
    solved_area_bits: Vec<AtomicU64>,
    progress_gate: AtomicI32,
    last_ticks: AtomicI64,
    too_deep_warned: AtomicBool,
}

impl IntervalTracker {
    pub fn new(
        rank: usize,
        num_threads: usize,
        total_area: f64,
        runtime: &RuntimeOptions,
    ) -> Self {
        Self {
            track_intervals: runtime.track_intervals,
            track_progress: runtime.track_progress,
            total_area,
            unit_area: 2f64.powi(rank as i32),
            partitions: (0..num_threads).map(|_| Mutex::new(Vec::new())).collect(),
            solved_area_bits: (0..num_threads).map(|_| AtomicU64::new(0)).collect(),
            progress_gate: AtomicI32::new(0),
            last_ticks: AtomicI64::new(-1),
            too_deep_warned: AtomicBool::new(false),
        }
    }

    /// Record that `interval` was discharged by `method`, leaving
    /// `remaining_unit_area` of its unit-box image still queued (0 when the
    /// subcell is fully resolved).
    pub fn store(
        &self,
        thread_num: usize,
        interval: &Interval,
        method: SolveMethod,
        remaining_unit_area: f64,
    ) {
        if method == SolveMethod::TooDeep && !self.too_deep_warned.swap(true, Ordering::Relaxed) {
            warn!(
                "maximum subdivision depth reached on {}; the solve may be incomplete — \
                 try looser tolerances",
                interval.display()
            );
        }

        if self.track_intervals {
            let mut partition = self.partitions[thread_num]
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            partition.push(IntervalResult {
                interval: interval.clone(),
                method,
            });
        }

        if self.track_progress {
            let solved = (1.0 - remaining_unit_area / self.unit_area).max(0.0) * interval.area();
            let slot = &self.solved_area_bits[thread_num];
            // Single writer per slot; load-modify-store needs no CAS
            let current = f64::from_bits(slot.load(Ordering::Relaxed));
            slot.store((current + solved).to_bits(), Ordering::Relaxed);
            self.update_progress_bar();
        }
    }

    fn solved_total(&self) -> f64 {
        self.solved_area_bits
            .iter()
            .map(|bits| f64::from_bits(bits.load(Ordering::Relaxed)))
            .sum()
    }

    fn update_progress_bar(&self) {
        // One painter at a time; the rest drop their update
        if self.progress_gate.fetch_add(1, Ordering::AcqRel) == 0 {
            let ticks = ((PROGRESS_TICKS as f64) * self.solved_total() / self.total_area)
                .round()
                .clamp(0.0, PROGRESS_TICKS as f64) as i64;
            if ticks > self.last_ticks.swap(ticks, Ordering::Relaxed) {
                self.paint(ticks);
            }
        }
        self.progress_gate.fetch_sub(1, Ordering::AcqRel);
    }

    fn paint(&self, ticks: i64) {
        let columns = term_size::dimensions().map(|(w, _)| w).unwrap_or(80);
        let bar_width = columns.saturating_sub(12).clamp(10, 68);
        let filled = (bar_width as i64 * ticks / PROGRESS_TICKS) as usize;

        let mut line = String::with_capacity(bar_width + 12);
        line.push('\r');
        line.push('[');
        for i in 0..bar_width {
            line.push(match i.cmp(&filled) {
                std::cmp::Ordering::Less => '=',
                std::cmp::Ordering::Equal => '>',
                std::cmp::Ordering::Greater => ' ',
            });
        }
        let percent = ticks as f64 * 100.0 / PROGRESS_TICKS as f64;
        line.push_str(&format!("] {:6.3}%", percent));
        if ticks >= PROGRESS_TICKS {
            line.push('\n');
        }
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(line.as_bytes());
        let _ = stdout.flush();
    }

    /// Make sure an unfinished progress bar does not swallow the next line
    pub fn finish(&self) {
        if self.track_progress && self.last_ticks.load(Ordering::Relaxed) < PROGRESS_TICKS {
            println!();
        }
    }

    /// All recorded results, in thread then insertion order
    pub fn results(&self) -> Vec<IntervalResult> {
        self.partitions
            .iter()
            .flat_map(|partition| {
                partition
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone()
            })
            .collect()
    }

    /// Write `intervals.txt` under `dir`: one `[lo…],[hi…]\t<method>` line
    /// per discharged subcell
    pub fn write_report(&self, dir: &Path) -> Result<()> {
        let mut out = String::new();
        for result in self.results() {
            let join = |values: &[f64]| {
                values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            };
            out.push_str(&format!(
                "[{}],[{}]\t{}\n",
                join(result.interval.lower()),
                join(result.interval.upper()),
                result.method
            ));
        }
        fs::write(dir.join("intervals.txt"), out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tracker(track_intervals: bool) -> IntervalTracker {
        let runtime = RuntimeOptions {
            track_intervals,
            track_progress: false,
            ..RuntimeOptions::default()
        };
        IntervalTracker::new(2, 2, 16.0, &runtime)
    }

    #[test]
    fn test_results_merge_partitions() {
        let t = tracker(true);
        let cell = Interval::unit(2);
        t.store(0, &cell, SolveMethod::ConstantTermCheck, 0.0);
        t.store(1, &cell, SolveMethod::LinearSolve, 0.0);
        let results = t.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].method, SolveMethod::ConstantTermCheck);
        assert_eq!(results[1].method, SolveMethod::LinearSolve);
    }

    #[test]
    fn test_disabled_tracking_stores_nothing() {
        let t = tracker(false);
        t.store(0, &Interval::unit(2), SolveMethod::QuadraticCheck, 1.0);
        assert!(t.results().is_empty());
    }

    #[test]
    fn test_progress_area_accounting() {
        let runtime = RuntimeOptions {
            track_progress: true,
            ..RuntimeOptions::default()
        };
        let t = IntervalTracker::new(1, 1, 2.0, &runtime);
        let half = Interval::new(vec![-1.0], vec![0.0]);
        // Fully discharged: its whole area counts
        t.store(0, &half, SolveMethod::ConstantTermCheck, 0.0);
        assert_relative_eq!(t.solved_total(), 1.0);
        // Half the unit image still queued: half the area counts
        t.store(0, &half, SolveMethod::QuadraticCheck, 1.0);
        assert_relative_eq!(t.solved_total(), 1.5);
    }

    #[test]
    fn test_report_format() {
        let t = tracker(true);
        t.store(
            0,
            &Interval::new(vec![0.0, -1.0], vec![0.5, 1.0]),
            SolveMethod::BoundingInterval,
            0.0,
        );
        let dir = tempfile::tempdir().unwrap();
        t.write_report(dir.path()).unwrap();
        let text = std::fs::read_to_string(dir.path().join("intervals.txt")).unwrap();
        assert_eq!(text, "[0,-1],[0.5,1]\tBoundingInterval\n");
    }
}
