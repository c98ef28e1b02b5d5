//! Chebyshev approximations
//!
//! [`ChebyshevApproximation`] is the value object the rest of the solver
//! works on: a coefficient tensor in the padded `side_length = 2·degree`
//! layout, the working degree, the measured infinity norm and sign-change
//! status, and a running approximation-error bound. Trimming lowers the
//! working degree by absorbing whole total-degree shells of coefficients
//! into the error bound, so the remaining coefficients still interpolate the
//! sampled function to within `approximation_error`.

pub mod chebyshev_approximator;
pub mod interval_approximator;

use std::collections::HashMap;

pub use chebyshev_approximator::ChebyshevApproximator;
pub use interval_approximator::IntervalApproximator;

/// Flat position of a multi-index in a C-order tensor with equal side lengths
pub(crate) fn flat_index(index: &[usize], side_length: usize) -> usize {
    index.iter().fold(0, |acc, &k| acc * side_length + k)
}

/// Visit every multi-index of the `sideⁿ` cube in C order (last axis fastest)
pub(crate) fn for_each_index(rank: usize, side: usize, mut visit: impl FnMut(&[usize])) {
    let mut index = vec![0usize; rank];
    loop {
        visit(&index);
        let mut dim = rank;
        loop {
            if dim == 0 {
                return;
            }
            dim -= 1;
            index[dim] += 1;
            if index[dim] < side {
                break;
            }
            index[dim] = 0;
        }
    }
}

/// Tensor-product Chebyshev interpolant of one function on one subcell
#[derive(Debug, Clone)]
pub struct ChebyshevApproximation {
    rank: usize,
    /// Degree the approximation was built at; the shell cache is keyed by it
    built_degree: usize,
    /// Current working degree; trimming lowers this
    degree: usize,
    side_length: usize,
    coefficients: Vec<f64>,

    inf_norm: f64,
    sign_change: bool,
    approximation_error: f64,
    good_degree: usize,

    sum_abs: Option<f64>,
    /// Flat indices of the built corner grouped by total degree, per built
    /// degree. Group `g < built_degree` holds index-sum `g`; the top group
    /// holds everything with index-sum ≥ `built_degree`.
    shell_cache: HashMap<usize, Vec<Vec<usize>>>,
}

impl ChebyshevApproximation {
    /// An empty approximation for a rank-`rank` system
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            built_degree: 0,
            degree: 0,
            side_length: 0,
            coefficients: Vec::new(),
            inf_norm: 0.0,
            sign_change: false,
            approximation_error: 0.0,
            good_degree: 0,
            sum_abs: None,
            shell_cache: HashMap::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Working degree (total degree once trimming has run)
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Side length of the padded coefficient tensor
    pub fn side_length(&self) -> usize {
        self.side_length
    }

    /// Max |f| observed on the doubled-degree sample grid
    pub fn inf_norm(&self) -> f64 {
        self.inf_norm
    }

    /// Whether both signs appeared on the doubled-degree sample grid
    pub fn has_sign_change(&self) -> bool {
        self.sign_change
    }

    /// Upper bound on `‖f − Σ c_k T_k‖_∞` over the subcell
    pub fn approximation_error(&self) -> f64 {
        self.approximation_error
    }

    /// Lowest degree at which the tolerance was last observed to hold
    pub fn good_degree(&self) -> usize {
        self.good_degree
    }

    /// Prepare the tensor for a rebuild at `degree`, returning the buffer.
    ///
    /// Reuses the allocation when the shape is unchanged. Slots outside the
    /// `[0..=degree]ⁿ` corner are unused and left untouched.
    pub fn prepare(&mut self, degree: usize) -> &mut Vec<f64> {
        let side_length = 2 * degree;
        let len = side_length.pow(self.rank as u32);
        self.built_degree = degree;
        self.degree = degree;
        self.side_length = side_length;
        self.good_degree = degree;
        self.sum_abs = None;
        self.coefficients.resize(len, 0.0);
        &mut self.coefficients
    }

    /// Install measurement results after the tensor corner has been filled
    pub fn set_measurements(&mut self, inf_norm: f64, sign_change: bool, error: f64) {
        self.inf_norm = inf_norm;
        self.sign_change = sign_change;
        self.approximation_error = error;
        self.sum_abs = None;
    }

    /// Coefficient at a multi-index of the built corner
    pub fn coefficient(&self, index: &[usize]) -> f64 {
        debug_assert_eq!(index.len(), self.rank);
        self.coefficients[flat_index(index, self.side_length)]
    }

    /// Coefficient at a multi-index, zero outside the built corner (the
    /// padded slots there are unused, not necessarily zero)
    pub fn corner_coefficient(&self, index: &[usize]) -> f64 {
        if index.iter().any(|&k| k > self.built_degree) {
            0.0
        } else {
            self.coefficients[flat_index(index, self.side_length)]
        }
    }

    /// Degree the tensor was built at (upper bound for corner reads)
    pub fn built_degree(&self) -> usize {
        self.built_degree
    }

    /// Constant term `c₀`
    pub fn constant_term(&self) -> f64 {
        self.coefficients[0]
    }

    /// Coefficient of `T₁` in dimension `dim`
    pub fn linear_coefficient(&self, dim: usize) -> f64 {
        let stride = self.side_length.pow((self.rank - 1 - dim) as u32);
        self.coefficients[stride]
    }

    /// ℓ¹ norm of the active coefficients, memoised
    pub fn sum_abs_values(&mut self) -> f64 {
        if let Some(sum) = self.sum_abs {
            return sum;
        }
        let shells = shells_for(
            &mut self.shell_cache,
            self.rank,
            self.built_degree,
            self.side_length,
        );
        let mut sum = 0.0;
        for shell in shells.iter().take(self.degree + 1) {
            sum += shell
                .iter()
                .map(|&flat| self.coefficients[flat].abs())
                .sum::<f64>();
        }
        self.sum_abs = Some(sum);
        sum
    }

    /// `error < abs_tol + rel_tol·inf_norm`; a passing approximation records
    /// the current degree as its good degree.
    pub fn is_good_approximation(&mut self, abs_tol: f64, rel_tol: f64) -> bool {
        let good = self.approximation_error < abs_tol + rel_tol * self.inf_norm;
        if good {
            self.good_degree = self.degree;
        }
        good
    }

    /// Whether only constant and first-degree terms remain active
    pub fn is_linear(&self) -> bool {
        self.degree <= 1
    }

    /// Lower the working degree toward `target_degree`, absorbing each
    /// discarded shell's ℓ¹ mass into the approximation error.
    ///
    /// Stops and returns `false` when absorbing the next shell would push the
    /// error beyond `abs_tol + rel_tol·inf_norm`; the error never exceeds the
    /// budget on a `true` return. Never decreases the recorded error.
    pub fn trim_coefficients(
        &mut self,
        abs_tol: f64,
        rel_tol: f64,
        target_degree: usize,
    ) -> bool {
        let budget = abs_tol + rel_tol * self.inf_norm;
        while self.degree > target_degree {
            let shells = shells_for(
                &mut self.shell_cache,
                self.rank,
                self.built_degree,
                self.side_length,
            );
            let shell = &shells[self.degree];
            let shell_mass: f64 = shell
                .iter()
                .map(|&flat| self.coefficients[flat].abs())
                .sum();
            if self.approximation_error + shell_mass >= budget {
                return false;
            }
            for &flat in shell {
                self.coefficients[flat] = 0.0;
            }
            self.approximation_error += shell_mass;
            if let Some(sum) = self.sum_abs.as_mut() {
                *sum -= shell_mass;
            }
            self.degree -= 1;
            self.good_degree = self.degree;
        }
        true
    }
}

/// Shell index lists for a built degree, computed once per side length
fn shells_for<'a>(
    cache: &'a mut HashMap<usize, Vec<Vec<usize>>>,
    rank: usize,
    built_degree: usize,
    side_length: usize,
) -> &'a Vec<Vec<usize>> {
    cache.entry(built_degree).or_insert_with(|| {
        let mut shells = vec![Vec::new(); built_degree + 1];
        let mut index = vec![0usize; rank];
        loop {
            let total: usize = index.iter().sum();
            let group = total.min(built_degree);
            shells[group].push(flat_index(&index, side_length));

            // Advance over the (built_degree + 1)ⁿ corner
            let mut dim = rank;
            loop {
                if dim == 0 {
                    return shells;
                }
                dim -= 1;
                index[dim] += 1;
                if index[dim] <= built_degree {
                    break;
                }
                index[dim] = 0;
            }
        }
    })
}
