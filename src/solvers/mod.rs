//! Solvers
//!
//! [`ThreadedSolver`] drives the whole search: it owns the shared task stack
//! and trackers and runs one [`SubdivisionSolver`] per worker thread. Each
//! task is a subcell; the subdivision solver approximates the system on it
//! and either discharges it, solves it with the degree-1 endgame, or splits
//! it into children that go back on the stack.

pub mod linear;
pub mod subdivision;
pub mod threaded;

pub use linear::LinearSolver;
pub use subdivision::SubdivisionSolver;
pub use threaded::{SolveReport, ThreadedSolver};

use crate::interval::Interval;
use crate::sync::{ConcurrentStack, ObjectPool};
use crate::timing::SolveTimer;
use crate::tracking::{IntervalTracker, RootTracker};

/// One node of the work graph: a subcell plus what the parent learned
#[derive(Debug, Clone)]
pub struct SolveTask {
    pub interval: Interval,
    /// Subdivision depth; increases by one per split
    pub level: usize,
    /// Starting approximation degree per function, learned from the parent
    pub good_degrees: Vec<usize>,
}

impl SolveTask {
    /// Pool default: placeholder contents with pre-sized vectors
    pub fn placeholder(rank: usize) -> Self {
        Self {
            interval: Interval::unit(rank),
            level: 0,
            good_degrees: vec![1; rank],
        }
    }

    /// Overwrite this slot for a fresh subcell
    pub fn assign(&mut self, interval: Interval, level: usize, good_degrees: &[usize]) {
        self.interval = interval;
        self.level = level;
        self.good_degrees.clear();
        self.good_degrees.extend_from_slice(good_degrees);
    }
}

/// Per-worker handles a task runs against: the worker's identity, the shared
/// stack and trackers, and the worker-owned task pool
pub struct WorkContext<'a> {
    pub thread_num: usize,
    pub stack: &'a ConcurrentStack<SolveTask>,
    pub pool: &'a mut ObjectPool<SolveTask>,
    pub interval_tracker: &'a IntervalTracker,
    pub root_tracker: &'a RootTracker,
    pub timer: &'a SolveTimer,
}

impl WorkContext<'_> {
    /// Queue a child subcell
    pub fn push_task(&mut self, interval: Interval, level: usize, good_degrees: &[usize]) {
        let ptr = self.pool.pop();
        // The slot came out of a pool this worker owns (or was transferred
        // to); nothing else can reach it until it is pushed.
        unsafe { (*ptr).assign(interval, level, good_degrees) };
        self.stack.push(self.thread_num, ptr);
    }
}
