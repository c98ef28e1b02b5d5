//! Multi-threaded subdivision scheduler
//!
//! Worker threads share one lock-free LIFO of task pointers and cooperate by
//! stealing from it. Every worker owns its approximation engine (with its
//! transform plans) and its task pool; the trackers are shared and internally
//! partitioned per thread. Termination uses a running-worker count: a worker
//! that finds the stack empty retires from the count and exits once the count
//! is zero with the stack still empty — new work only ever appears while some
//! worker is mid-task, so that observation is final.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info};

use super::subdivision::SubdivisionSolver;
use super::{SolveTask, WorkContext};
use crate::config::{RuntimeOptions, SolveOptions};
use crate::functions::RealFunction;
use crate::interval::Interval;
use crate::sync::{ConcurrentStack, ObjectPool};
use crate::timing::{SolveTimer, Stage};
use crate::tracking::{FoundRoot, IntervalTracker, RootTracker, VariableSubstitution};
use crate::{Result, RootfieldError};

const TASK_POOL_INITIAL: usize = 1024;

/// Everything a finished solve hands back
pub struct SolveReport {
    /// Sorted, deduplicated roots
    pub roots: Vec<FoundRoot>,
    pub interval_tracker: IntervalTracker,
    pub root_tracker: RootTracker,
}

/// Owns the shared solve state and runs the worker fleet
pub struct ThreadedSolver {
    rank: usize,
    num_threads: usize,
    functions: Vec<Arc<dyn RealFunction>>,
    search_interval: Interval,
    options: SolveOptions,
    stack: ConcurrentStack<SolveTask>,
    interval_tracker: IntervalTracker,
    root_tracker: RootTracker,
    timer: Arc<SolveTimer>,
}

impl ThreadedSolver {
    pub fn new(
        functions: Vec<Arc<dyn RealFunction>>,
        search_interval: Interval,
        options: SolveOptions,
        runtime: &RuntimeOptions,
        substitution: VariableSubstitution,
        timer: Arc<SolveTimer>,
    ) -> Result<Self> {
        let rank = functions.len();
        if rank == 0 {
            return Err(RootfieldError::input("no functions to solve"));
        }
        if search_interval.rank() != rank {
            return Err(RootfieldError::input(format!(
                "number of functions ({}) must match interval dimension ({})",
                rank,
                search_interval.rank()
            )));
        }
        for function in &functions {
            if function.rank() != rank {
                return Err(RootfieldError::input(format!(
                    "function over {} variables in a rank-{} system",
                    function.rank(),
                    rank
                )));
            }
        }
        let num_threads = runtime.num_threads.max(1);
        Ok(Self {
            rank,
            num_threads,
            interval_tracker: IntervalTracker::new(
                rank,
                num_threads,
                search_interval.area(),
                runtime,
            ),
            root_tracker: RootTracker::new(
                num_threads,
                functions.clone(),
                substitution,
                runtime.compute_residuals,
            ),
            functions,
            search_interval,
            options,
            stack: ConcurrentStack::new(num_threads),
            timer,
        })
    }

    /// Run the search to completion and hand back the results
    pub fn solve(self) -> Result<SolveReport> {
        let ThreadedSolver {
            rank,
            num_threads,
            functions,
            search_interval,
            options,
            stack,
            interval_tracker,
            root_tracker,
            timer,
        } = self;

        // Per-worker task pools live here so the backing storage outlives
        // both the workers and any pointers left on the stack.
        let mut pools: Vec<ObjectPool<SolveTask>> = (0..num_threads)
            .map(|_| ObjectPool::new(SolveTask::placeholder(rank), TASK_POOL_INITIAL))
            .collect();

        // Seed the root cell
        let seed = pools[0].pop();
        unsafe {
            (*seed).assign(
                search_interval.clone(),
                0,
                &vec![options.approximation_degree; rank],
            );
        }
        stack.push(0, seed);

        let running = AtomicUsize::new(num_threads);
        let kill = AtomicBool::new(false);
        let failure: Mutex<Option<RootfieldError>> = Mutex::new(None);

        {
            let _guard = timer.start(Stage::Solve);
            std::thread::scope(|scope| {
                for (thread_num, pool) in pools.iter_mut().enumerate() {
                    let stack = &stack;
                    let interval_tracker = &interval_tracker;
                    let root_tracker = &root_tracker;
                    let running = &running;
                    let kill = &kill;
                    let failure = &failure;
                    let timer = timer.as_ref();
                    let functions = functions.clone();
                    let options = options.clone();
                    scope.spawn(move || {
                        worker_loop(
                            thread_num,
                            functions,
                            options,
                            stack,
                            pool,
                            interval_tracker,
                            root_tracker,
                            timer,
                            running,
                            kill,
                            failure,
                        );
                    });
                }
            });
        }

        // On an aborted solve, drop whatever is still queued; the pointers
        // stay valid because the pools are still alive here.
        while stack.pop(0).is_some() {}
        interval_tracker.finish();

        if let Some(error) = failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            return Err(error);
        }

        let roots = root_tracker.finalize();
        info!(
            "solve finished: {} root(s) in {} dimension(s)",
            roots.len(),
            rank
        );
        Ok(SolveReport {
            roots,
            interval_tracker,
            root_tracker,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    thread_num: usize,
    functions: Vec<Arc<dyn RealFunction>>,
    options: SolveOptions,
    stack: &ConcurrentStack<SolveTask>,
    pool: &mut ObjectPool<SolveTask>,
    interval_tracker: &IntervalTracker,
    root_tracker: &RootTracker,
    timer: &SolveTimer,
    running: &AtomicUsize,
    kill: &AtomicBool,
    failure: &Mutex<Option<RootfieldError>>,
) {
    let solver = {
        let _guard = timer.start(Stage::SolverSetup);
        SubdivisionSolver::new(functions, options)
    };
    let mut solver = match solver {
        Ok(solver) => solver,
        Err(error) => {
            abort(error, running, kill, failure);
            return;
        }
    };

    'work: loop {
        if kill.load(Ordering::Acquire) {
            running.fetch_sub(1, Ordering::SeqCst);
            break;
        }

        if let Some(ptr) = stack.pop(thread_num) {
            let task = unsafe { &mut *ptr };
            let mut context = WorkContext {
                thread_num,
                stack,
                pool: &mut *pool,
                interval_tracker,
                root_tracker,
                timer,
            };
            let outcome = solver.solve(task, &mut context);
            pool.push(ptr);
            if let Err(error) = outcome {
                abort(error, running, kill, failure);
                break;
            }
            continue;
        }

        // Nothing to pop: retire, then either rejoin for new work or exit
        // once everyone is idle and the stack is still empty.
        running.fetch_sub(1, Ordering::SeqCst);
        loop {
            if kill.load(Ordering::Acquire) {
                break 'work;
            }
            if !stack.is_empty() {
                running.fetch_add(1, Ordering::SeqCst);
                continue 'work;
            }
            if running.load(Ordering::SeqCst) == 0 {
                debug!("worker {} exiting: no work and no runners", thread_num);
                break 'work;
            }
            std::thread::yield_now();
        }
    }
}

fn abort(
    error: RootfieldError,
    running: &AtomicUsize,
    kill: &AtomicBool,
    failure: &Mutex<Option<RootfieldError>>,
) {
    let mut slot = failure
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    slot.get_or_insert(error);
    kill.store(true, Ordering::Release);
    running.fetch_sub(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::parser::parse_simple;
    use approx::assert_relative_eq;

    fn solve_system(
        sources: &[&str],
        variables: &[&str],
        lower: Vec<f64>,
        upper: Vec<f64>,
        num_threads: usize,
    ) -> Vec<FoundRoot> {
        let functions: Vec<Arc<dyn RealFunction>> = sources
            .iter()
            .map(|source| {
                Arc::new(parse_simple("f", source, variables).unwrap()) as Arc<dyn RealFunction>
            })
            .collect();
        let runtime = RuntimeOptions {
            num_threads,
            track_progress: false,
            ..RuntimeOptions::default()
        };
        let solver = ThreadedSolver::new(
            functions,
            Interval::new(lower, upper),
            SolveOptions::default(),
            &runtime,
            VariableSubstitution::identity(variables.len()),
            Arc::new(SolveTimer::new(false)),
        )
        .unwrap();
        solver.solve().unwrap().roots
    }

    #[test]
    fn test_single_linear_function() {
        let roots = solve_system(&["2*x - 1"], &["x"], vec![-1.0], vec![1.0], 1);
        assert_eq!(roots.len(), 1);
        assert_relative_eq!(roots[0].coordinates[0], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_cubic_roots_on_the_line() {
        // x·(x − ½)·(x + ½): roots −½, 0, ½
        let roots = solve_system(
            &["x*(x - 0.5)*(x + 0.5)"],
            &["x"],
            vec![-1.0],
            vec![1.0],
            1,
        );
        assert_eq!(roots.len(), 3);
        let expected = [-0.5, 0.0, 0.5];
        for (root, want) in roots.iter().zip(expected.iter()) {
            assert_relative_eq!(root.coordinates[0], want, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_rootless_system_returns_nothing() {
        let roots = solve_system(&["x^2 + 1"], &["x"], vec![-2.0], vec![2.0], 1);
        assert!(roots.is_empty());
    }

    #[test]
    fn test_rank_mismatch_rejected() {
        let functions: Vec<Arc<dyn RealFunction>> =
            vec![Arc::new(parse_simple("f", "x", &["x"]).unwrap())];
        let result = ThreadedSolver::new(
            functions,
            Interval::new(vec![-1.0, -1.0], vec![1.0, 1.0]),
            SolveOptions::default(),
            &RuntimeOptions::default(),
            VariableSubstitution::identity(1),
            Arc::new(SolveTimer::new(false)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_two_threads_find_the_same_roots() {
        let single = solve_system(
            &["x*(x - 0.5)*(x + 0.5)"],
            &["x"],
            vec![-1.0],
            vec![1.0],
            1,
        );
        let multi = solve_system(
            &["x*(x - 0.5)*(x + 0.5)"],
            &["x"],
            vec![-1.0],
            vec![1.0],
            2,
        );
        assert_eq!(single.len(), multi.len());
        for (a, b) in single.iter().zip(multi.iter()) {
            assert_relative_eq!(a.coordinates[0], b.coordinates[0], epsilon = 1e-9);
        }
    }
}
