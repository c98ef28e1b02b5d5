//! Chebyshev interpolation of one function on one box at one degree
//!
//! Samples the function on the Chebyshev–Gauss–Lobatto grid mapped onto the
//! box and recovers interpolation coefficients with a type-I discrete cosine
//! transform along each axis. The DCT of the `(d+1)ⁿ` sample grid is the same
//! quantity the even-reflected `(2d)ⁿ` real FFT would produce; the reflection
//! lives inside the transform handler, which is planned once per degree at
//! construction.
//!
//! Normalisation: samples are divided by `dⁿ` before the transform and the
//! boundary slabs (index 0 and d along each axis) are halved afterwards,
//! which yields the Chebyshev coefficients `c_k` of
//! `f ≈ Σ c_k T_{k₁}(x₁)…T_{kₙ}(xₙ)`.

use ndarray::{ArrayViewD, ArrayViewMutD, IxDyn};
use ndrustfft::{nddct1, DctHandler};

use crate::functions::RealFunction;
use crate::interval::Interval;
use crate::{Result, RootfieldError};

/// Norm and sign observations from a sample grid
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleStats {
    pub inf_norm: f64,
    pub sign_change: bool,
}

/// Shared scratch buffers, sized once for the largest degree in play
pub struct ApproximatorScratch {
    axes: Vec<Vec<f64>>,
    samples: Vec<f64>,
    transformed: Vec<f64>,
}

impl ApproximatorScratch {
    pub fn new(rank: usize, max_degree: usize) -> Self {
        let partial = max_degree + 1;
        let len = partial.pow(rank as u32);
        Self {
            axes: vec![Vec::with_capacity(partial); rank],
            samples: Vec::with_capacity(len),
            transformed: vec![0.0; len],
        }
    }

    /// Coefficients left behind by the last [`IntervalApproximator::approximate`]
    pub fn coefficients(&self) -> &[f64] {
        &self.transformed
    }
}

/// Degree-specific sampler and transform
pub struct IntervalApproximator {
    rank: usize,
    degree: usize,
    partial_side: usize,
    /// Gauss–Lobatto nodes `cos(jπ/d)`, descending from 1 to −1
    chebyshev_points: Vec<f64>,
    dct: DctHandler<f64>,
}

impl IntervalApproximator {
    pub fn new(rank: usize, degree: usize) -> Result<Self> {
        if rank == 0 || degree == 0 {
            return Err(RootfieldError::misuse(format!(
                "interval approximator needs rank >= 1 and degree >= 1, got rank {} degree {}",
                rank, degree
            )));
        }
        let partial_side = degree + 1;
        let chebyshev_points = (0..partial_side)
            .map(|j| (j as f64 * std::f64::consts::PI / degree as f64).cos())
            .collect();
        Ok(Self {
            rank,
            degree,
            partial_side,
            chebyshev_points,
            dct: DctHandler::new(partial_side),
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of samples per axis
    pub fn partial_side(&self) -> usize {
        self.partial_side
    }

    /// Sample `function` on the box and leave the Chebyshev coefficients of
    /// its degree-`d` interpolant in `scratch.transformed` (C order over the
    /// `(d+1)ⁿ` corner). Returns norm and sign observations of the raw
    /// samples when `find_inf_norm` is set.
    pub fn approximate<F: RealFunction + ?Sized>(
        &mut self,
        function: &F,
        interval: &Interval,
        find_inf_norm: bool,
        scratch: &mut ApproximatorScratch,
    ) -> Result<SampleStats> {
        if interval.rank() != self.rank {
            return Err(RootfieldError::misuse(format!(
                "interval rank {} does not match approximator rank {}",
                interval.rank(),
                self.rank
            )));
        }

        // Map the Lobatto nodes onto each axis of the box
        for (dim, axis) in scratch.axes.iter_mut().enumerate().take(self.rank) {
            axis.clear();
            axis.extend(
                self.chebyshev_points
                    .iter()
                    .map(|&x| interval.map_from_unit(dim, x)),
            );
        }

        function.eval_grid(&scratch.axes[..self.rank], &mut scratch.samples);

        let mut stats = SampleStats::default();
        if find_inf_norm {
            let mut positive = false;
            let mut negative = false;
            for &v in &scratch.samples {
                stats.inf_norm = stats.inf_norm.max(v.abs());
                positive |= v > 0.0;
                negative |= v < 0.0;
            }
            stats.sign_change = positive && negative;
        }

        // FFT normalisation
        let scale = 1.0 / (self.degree as f64).powi(self.rank as i32);
        for v in scratch.samples.iter_mut() {
            *v *= scale;
        }

        self.transform(scratch)?;
        self.halve_boundaries(&mut scratch.transformed);
        Ok(stats)
    }

    /// Run the DCT along every axis, ping-ponging between the two buffers so
    /// the result always ends in `transformed`.
    fn transform(&mut self, scratch: &mut ApproximatorScratch) -> Result<()> {
        let len = self.partial_side.pow(self.rank as u32);
        let shape = IxDyn(&vec![self.partial_side; self.rank]);
        scratch.transformed.resize(len, 0.0);

        for axis in 0..self.rank {
            {
                let input = ArrayViewD::from_shape(shape.clone(), &scratch.samples[..len])
                    .map_err(|e| RootfieldError::misuse(format!("bad sample layout: {}", e)))?;
                let mut output =
                    ArrayViewMutD::from_shape(shape.clone(), &mut scratch.transformed[..len])
                        .map_err(|e| {
                            RootfieldError::misuse(format!("bad coefficient layout: {}", e))
                        })?;
                nddct1(&input, &mut output, &mut self.dct, axis);
            }
            std::mem::swap(&mut scratch.samples, &mut scratch.transformed);
        }
        // The loop leaves the latest result in `samples`; put it back
        std::mem::swap(&mut scratch.samples, &mut scratch.transformed);
        Ok(())
    }

    /// Chebyshev normalisation: coefficients on the first and last slice of
    /// every axis carry a factor of ½.
    fn halve_boundaries(&self, coefficients: &mut [f64]) {
        let mut index = vec![0usize; self.rank];
        for value in coefficients.iter_mut() {
            let boundaries = index
                .iter()
                .filter(|&&k| k == 0 || k == self.degree)
                .count();
            *value *= 0.5f64.powi(boundaries as i32);

            let mut dim = self.rank;
            loop {
                if dim == 0 {
                    return;
                }
                dim -= 1;
                index[dim] += 1;
                if index[dim] < self.partial_side {
                    break;
                }
                index[dim] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::parser::parse_test_expression;
    use approx::assert_relative_eq;

    fn approximate_1d(source: &str, degree: usize, lo: f64, hi: f64) -> Vec<f64> {
        let f = parse_test_expression(source, &["x"]);
        let mut ia = IntervalApproximator::new(1, degree).unwrap();
        let mut scratch = ApproximatorScratch::new(1, degree);
        let interval = Interval::new(vec![lo], vec![hi]);
        ia.approximate(&f, &interval, false, &mut scratch).unwrap();
        scratch.coefficients()[..degree + 1].to_vec()
    }

    #[test]
    fn test_recovers_exact_chebyshev_coefficients_1d() {
        // f(x) = 2 + 3*T1(x) - 0.5*T3(x) on [-1, 1]
        let coeffs = approximate_1d("2 + 3*x - 0.5*(4*x^3 - 3*x)", 4, -1.0, 1.0);
        let expected = [2.0, 3.0, 0.0, -0.5, 0.0];
        for (got, want) in coeffs.iter().zip(expected.iter()) {
            assert_relative_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_affine_mapping_of_the_box() {
        // On [0, 2], x = t + 1 with t the unit variable, so f(x) = x has
        // Chebyshev coefficients [1, 1]
        let coeffs = approximate_1d("x", 3, 0.0, 2.0);
        let expected = [1.0, 1.0, 0.0, 0.0];
        for (got, want) in coeffs.iter().zip(expected.iter()) {
            assert_relative_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rank2_tensor_coefficients() {
        // f(x, y) = x*y = T1(x)·T1(y): a single tensor coefficient
        let f = parse_test_expression("x*y", &["x", "y"]);
        let degree = 3;
        let mut ia = IntervalApproximator::new(2, degree).unwrap();
        let mut scratch = ApproximatorScratch::new(2, degree);
        let interval = Interval::unit(2);
        ia.approximate(&f, &interval, false, &mut scratch).unwrap();

        let partial = degree + 1;
        for kx in 0..partial {
            for ky in 0..partial {
                let got = scratch.coefficients()[kx * partial + ky];
                let want = if kx == 1 && ky == 1 { 1.0 } else { 0.0 };
                assert_relative_eq!(got, want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_sample_stats() {
        let f = parse_test_expression("x", &["x"]);
        let mut ia = IntervalApproximator::new(1, 4).unwrap();
        let mut scratch = ApproximatorScratch::new(1, 4);

        let straddling = Interval::new(vec![-1.0], vec![1.0]);
        let stats = ia.approximate(&f, &straddling, true, &mut scratch).unwrap();
        assert!(stats.sign_change);
        assert_relative_eq!(stats.inf_norm, 1.0);

        let positive = Interval::new(vec![1.0], vec![2.0]);
        let stats = ia.approximate(&f, &positive, true, &mut scratch).unwrap();
        assert!(!stats.sign_change);
        assert_relative_eq!(stats.inf_norm, 2.0);
    }

    #[test]
    fn test_degree_zero_is_misuse() {
        assert!(IntervalApproximator::new(1, 0).is_err());
        assert!(IntervalApproximator::new(0, 3).is_err());
    }

    #[test]
    fn test_interpolates_at_the_nodes() {
        // Degree-8 interpolant of sin(3x) evaluated back at a node via the
        // coefficient expansion reproduces the sample value
        let coeffs = approximate_1d("sin(3*x)", 8, -1.0, 1.0);
        let x: f64 = (2.0 * std::f64::consts::PI / 8.0).cos();
        let value: f64 = coeffs
            .iter()
            .enumerate()
            .map(|(k, &c)| c * crate::functions::chebyshev_t(x, k))
            .sum();
        assert_relative_eq!(value, (3.0 * x).sin(), epsilon = 1e-10);
    }
}
