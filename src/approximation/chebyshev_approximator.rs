//! Paired-degree approximation driver
//!
//! Builds the degree-d interpolant a subcell will actually use and a
//! degree-2d interpolant whose extra resolution serves three purposes: the
//! ℓ¹ difference of the two coefficient sets bounds the approximation error,
//! and the finer sample grid supplies the infinity norm and the sign-change
//! observation. Transform handlers for every degree up to twice the
//! configured maximum are planned once here, so subdivision never pays
//! planning cost.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::interval_approximator::{ApproximatorScratch, IntervalApproximator};
use super::{flat_index, for_each_index, ChebyshevApproximation};
use crate::functions::RealFunction;
use crate::interval::Interval;
use crate::{Result, RootfieldError};

/// Seed for the evaluation-error probe point; fixed so identical inputs
/// yield identical tolerances run to run.
const PROBE_SEED: u64 = 0x0c8e_b51d_a713_f00d;

/// Per-thread approximation engine for one rank and degree cap
pub struct ChebyshevApproximator {
    rank: usize,
    max_degree: usize,
    /// Approximators for degrees 1..=2·max, index `d - 1`
    approximators: Vec<IntervalApproximator>,
    scratch: ApproximatorScratch,
    /// Fixed pseudo-random unit-cube point for the evaluation-error floor
    probe_unit: Vec<f64>,
}

impl ChebyshevApproximator {
    pub fn new(rank: usize, max_degree: usize) -> Result<Self> {
        if max_degree == 0 {
            return Err(RootfieldError::misuse(
                "approximation degree must be at least 1",
            ));
        }
        let approximators = (1..=2 * max_degree)
            .map(|degree| IntervalApproximator::new(rank, degree))
            .collect::<Result<Vec<_>>>()?;
        let mut rng = StdRng::seed_from_u64(PROBE_SEED);
        let probe_unit = (0..rank).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Ok(Self {
            rank,
            max_degree,
            approximators,
            scratch: ApproximatorScratch::new(rank, 2 * max_degree),
            probe_unit,
        })
    }

    /// Degree cap for approximation requests
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Build the degree-`degree` approximation of `function` on `interval`
    /// into `approximation`, including its error estimate, infinity norm,
    /// and sign-change status.
    pub fn approximate<F: RealFunction + ?Sized>(
        &mut self,
        function: &F,
        interval: &Interval,
        degree: usize,
        approximation: &mut ChebyshevApproximation,
    ) -> Result<()> {
        if degree == 0 || degree > self.max_degree {
            return Err(RootfieldError::misuse(format!(
                "approximation degree {} outside capacity 1..={}",
                degree, self.max_degree
            )));
        }

        // Base interpolant at degree d, copied into the padded tensor
        self.approximators[degree - 1].approximate(
            function,
            interval,
            false,
            &mut self.scratch,
        )?;
        let side_length = 2 * degree;
        let partial = degree + 1;
        {
            let coefficients = approximation.prepare(degree);
            let partial_values = self.scratch.coefficients();
            for_each_index(self.rank, partial, |index| {
                coefficients[flat_index(index, side_length)] =
                    partial_values[flat_index(index, partial)];
            });
        }

        // Doubled-degree interpolant for error, norm, and sign observations
        let stats = self.approximators[2 * degree - 1].approximate(
            function,
            interval,
            true,
            &mut self.scratch,
        )?;

        let doubled_partial = 2 * degree + 1;
        let doubled_values = self.scratch.coefficients();
        let mut error = 0.0;
        for_each_index(self.rank, doubled_partial, |index| {
            let fine = doubled_values[flat_index(index, doubled_partial)];
            let coarse = if index.iter().all(|&k| k <= degree) {
                approximation.coefficient(index)
            } else {
                0.0
            };
            error += (fine - coarse).abs();
        });

        approximation.set_measurements(stats.inf_norm, stats.sign_change, error);
        Ok(())
    }

    /// Floating-point error budget for `function` on `interval`: ten times
    /// the tracked evaluation error at a fixed pseudo-random point of the
    /// box. Unstable evaluations yield no floor.
    pub fn abs_approx_tol<F: RealFunction + ?Sized>(
        &self,
        function: &F,
        interval: &Interval,
    ) -> f64 {
        let point = interval.point_from_unit(&self.probe_unit);
        let tracked = function.eval_tracked(&point);
        if tracked.error.is_finite() {
            10.0 * tracked.error
        } else {
            0.0
        }
    }
}
