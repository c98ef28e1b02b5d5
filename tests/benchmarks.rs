//! End-to-end benchmark systems
//!
//! Each case drives the full pipeline through an input file on disk and
//! checks the produced `roots.csv` against independently computed roots.

use std::fs;
use std::path::PathBuf;

use rootfield::solve_input_file;

/// Write an input file into a fresh temp dir and solve it there
fn solve(input: &str) -> (Vec<Vec<f64>>, PathBuf, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let input_path = dir.path().join("system.txt");
    fs::write(&input_path, input).expect("write input");
    let summary = solve_input_file(&input_path, dir.path()).expect("solve");
    let roots = summary
        .roots
        .iter()
        .map(|r| r.coordinates.clone())
        .collect();
    let out = dir.path().to_path_buf();
    (roots, out, dir)
}

fn assert_root_set(found: &[Vec<f64>], expected: &[Vec<f64>], tolerance: f64) {
    assert_eq!(
        found.len(),
        expected.len(),
        "expected {} roots, found {:?}",
        expected.len(),
        found
    );
    for want in expected {
        let hit = found.iter().any(|got| {
            got.iter()
                .zip(want.iter())
                .all(|(g, w)| (g - w).abs() <= tolerance)
        });
        assert!(hit, "no root near {:?} in {:?}", want, found);
    }
}

#[test]
fn test_sine_line_crossings() {
    // sin(3x) = x/4 has roots 0 and ±x*, with x* the positive solution
    let mut x_star: f64 = 0.9;
    for _ in 0..60 {
        x_star -= ((3.0 * x_star).sin() - x_star / 4.0) / (3.0 * (3.0 * x_star).cos() - 0.25);
    }

    let (roots, _, _guard) = solve(
        "PARAMETERS; trackProgress = no; PARAMETERS_END;
         INTERVAL; [-1, 1]; INTERVAL_END;
         FUNCTIONS;
         function f;
         variable_group x;
         f = sin(3*x) - x/4;
         FUNCTIONS_END;
         END;",
    );
    assert_root_set(
        &roots,
        &[vec![-x_star], vec![0.0], vec![x_star]],
        1e-8,
    );
}

#[test]
fn test_parabola_meets_cubic() {
    // The intersection at the origin is tangential (both curves are flat
    // there), which limits attainable accuracy to roughly the square root
    // of the approximation tolerance; widen the zero tolerance accordingly
    // so the root cluster at the origin collapses to one root.
    let (roots, _, _guard) = solve(
        "PARAMETERS; minGoodZerosTol = 1e-4; trackProgress = no; PARAMETERS_END;
         INTERVAL; [-2, 2]; [-2, 2]; INTERVAL_END;
         FUNCTIONS;
         function f, g;
         variable_group x, y;
         f = y - x^2;
         g = y - x^3;
         FUNCTIONS_END;
         END;",
    );
    assert_root_set(&roots, &[vec![0.0, 0.0], vec![1.0, 1.0]], 1e-4);
}

#[test]
fn test_circle_meets_diagonal() {
    let half_sqrt2 = std::f64::consts::SQRT_2 / 2.0;
    let (roots, _, _guard) = solve(
        "PARAMETERS; trackProgress = no; PARAMETERS_END;
         INTERVAL; [-2, 2]; [-2, 2]; INTERVAL_END;
         FUNCTIONS;
         function f, g;
         variable_group x, y;
         f = x^2 + y^2 - 1;
         g = x - y;
         FUNCTIONS_END;
         END;",
    );
    assert_root_set(
        &roots,
        &[
            vec![-half_sqrt2, -half_sqrt2],
            vec![half_sqrt2, half_sqrt2],
        ],
        1e-8,
    );
}

#[test]
fn test_trigonometric_fixed_point() {
    // The unique solution of y = cos(x), x = sin(y): iterate x -> sin(cos(x))
    let mut x_star: f64 = 0.7;
    for _ in 0..200 {
        x_star = x_star.cos().sin();
    }
    let y_star = x_star.cos();

    let (roots, _, _guard) = solve(
        "PARAMETERS; trackProgress = no; PARAMETERS_END;
         INTERVAL; [-pi, pi]; [-pi, pi]; INTERVAL_END;
         FUNCTIONS;
         function f, g;
         variable_group x, y;
         f = cos(x) - y;
         g = sin(y) - x;
         FUNCTIONS_END;
         END;",
    );
    assert_root_set(&roots, &[vec![x_star, y_star]], 1e-8);
}

#[test]
fn test_linear_system_solves_without_subdivision() {
    let (roots, out, _guard) = solve(
        "PARAMETERS; trackIntervals = yes; trackProgress = no; PARAMETERS_END;
         INTERVAL; [-3, 3]; [-3, 3]; INTERVAL_END;
         FUNCTIONS;
         function f, g;
         variable_group x, y;
         f = 2*x + 3*y - 1;
         g = x - y + 2;
         FUNCTIONS_END;
         END;",
    );
    assert_root_set(&roots, &[vec![-1.0, 1.0]], 1e-9);

    // One linear-solve step, no subdivision: the interval log has exactly
    // one entry and it is the whole search box
    let intervals = fs::read_to_string(out.join("intervals.txt")).expect("intervals.txt");
    let lines: Vec<&str> = intervals.lines().collect();
    assert_eq!(lines.len(), 1, "expected a single discharged interval");
    assert!(lines[0].ends_with("LinearSolve"), "got: {}", lines[0]);
    assert!(lines[0].starts_with("[-3,-3],[3,3]"), "got: {}", lines[0]);
}

#[test]
fn test_output_files_written() {
    let (_, out, _guard) = solve(
        "PARAMETERS; trackIntervals = yes; useTimer = yes; trackProgress = no; PARAMETERS_END;
         INTERVAL; [0, 1]; INTERVAL_END;
         FUNCTIONS;
         function f;
         variable_group x;
         f = x - 0.5;
         FUNCTIONS_END;
         END;",
    );
    let roots_csv = fs::read_to_string(out.join("roots.csv")).expect("roots.csv");
    assert_eq!(roots_csv.lines().count(), 1);
    let value: f64 = roots_csv.trim().parse().expect("single column roots.csv");
    assert!((value - 0.5).abs() < 1e-9);

    let residuals = fs::read_to_string(out.join("residuals.csv")).expect("residuals.csv");
    let parts: Vec<&str> = residuals.trim().split(',').collect();
    assert_eq!(parts.len(), 2, "one (residual, bound) pair per function");
    let residual: f64 = parts[0].parse().expect("residual value");
    assert!(residual.abs() < 1e-9);

    assert!(out.join("intervals.txt").exists());
    let timing = fs::read_to_string(out.join("timing.txt")).expect("timing.txt");
    assert!(timing.contains("TIMING RESULTS"));
    assert!(timing.contains("Main Solve"));
}

#[test]
fn test_thread_counts_agree() {
    let build = |threads: usize| {
        format!(
            "PARAMETERS; numThreads = {}; trackProgress = no; PARAMETERS_END;
             INTERVAL; [-1, 1]; INTERVAL_END;
             FUNCTIONS;
             function f;
             variable_group x;
             f = sin(3*x) - x/4;
             FUNCTIONS_END;
             END;",
            threads
        )
    };

    let (reference, _, _g1) = solve(&build(1));
    assert_eq!(reference.len(), 3);
    for threads in [2usize, 8] {
        let (roots, _, _g2) = solve(&build(threads));
        assert_eq!(
            roots.len(),
            reference.len(),
            "every root must appear exactly once with {} threads",
            threads
        );
        for (a, b) in roots.iter().zip(reference.iter()) {
            assert!(
                (a[0] - b[0]).abs() < 1e-8,
                "thread count {} shifted a root",
                threads
            );
        }
    }
}

#[test]
fn test_single_thread_determinism() {
    let input = "PARAMETERS; numThreads = 1; trackProgress = no; PARAMETERS_END;
         INTERVAL; [-1, 1]; INTERVAL_END;
         FUNCTIONS;
         function f;
         variable_group x;
         f = sin(3*x) - x/4;
         FUNCTIONS_END;
         END;";
    let (_, out_a, _ga) = solve(input);
    let (_, out_b, _gb) = solve(input);
    let a = fs::read_to_string(out_a.join("roots.csv")).expect("first run");
    let b = fs::read_to_string(out_b.join("roots.csv")).expect("second run");
    assert_eq!(a, b, "identical inputs must produce identical roots.csv");
}

#[test]
fn test_substituted_coordinate_in_output() {
    // Solve over x; report (x, x^2) and discard roots whose square leaves
    // its stated interval
    let (roots, _, _guard) = solve(
        "PARAMETERS; trackProgress = no; PARAMETERS_END;
         INTERVAL; [-1, 1]; [0, 0.5]; INTERVAL_END;
         FUNCTIONS;
         function f;
         variable_group x, s;
         s = x^2;
         f = (x - 0.9) * (x - 0.5);
         FUNCTIONS_END;
         END;",
    );
    // x = 0.9 gives s = 0.81 outside [0, 0.5]; only x = 0.5 survives
    assert_eq!(roots.len(), 1);
    assert!((roots[0][0] - 0.5).abs() < 1e-8);
    assert!((roots[0][1] - 0.25).abs() < 1e-8);
}

#[test]
fn test_parse_errors_surface_as_input_errors() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input_path = dir.path().join("system.txt");
    fs::write(&input_path, "INTERVAL; [0,1]; INTERVAL_END; END;").expect("write input");
    let error = solve_input_file(&input_path, dir.path()).unwrap_err();
    assert!(error.to_string().contains("FUNCTIONS"));
}
