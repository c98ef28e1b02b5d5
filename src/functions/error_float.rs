//! Error-tracking floating point
//!
//! [`ErrorFloat`] carries a value together with a bound on its accumulated
//! rounding error. Function evaluation with this type yields the residual
//! error bounds reported next to each root, and the 10× evaluation-error
//! floor that keeps approximation tolerances honest near the noise level of
//! the expression itself.
//!
//! For an input `x` with error `e`, the error of `f(x)` is bounded by
//! `|f(x)|·ε + L·e` where `L` is a Lipschitz constant of `f` on
//! `[x-e, x+e]`; for the tiny `e` arising here the derivative at `x` is an
//! adequate `L`.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use num_traits::{One, Zero};

const MACHINE_EPSILON: f64 = f64::EPSILON;

/// A value with a running error bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorFloat {
    /// Best estimate of the quantity
    pub value: f64,
    /// Bound on the distance to the exact quantity
    pub error: f64,
}

impl ErrorFloat {
    /// A value with an explicit error bound
    pub fn with_error(value: f64, error: f64) -> Self {
        Self { value, error }
    }

    /// An exactly known value
    pub fn exact(value: f64) -> Self {
        Self { value, error: 0.0 }
    }

    /// Division by an interval containing zero, or an invalid power, leaves
    /// this poisoned marker: the value is meaningless and the error infinite.
    pub fn poisoned() -> Self {
        Self {
            value: f64::NAN,
            error: f64::INFINITY,
        }
    }

    /// Whether a poisoning operation happened anywhere upstream
    pub fn is_poisoned(&self) -> bool {
        self.value.is_nan() || !self.error.is_finite()
    }

    fn lipschitz(eval: f64, input_error: f64, lipschitz_constant: f64) -> Self {
        Self {
            value: eval,
            error: eval.abs() * MACHINE_EPSILON + input_error * lipschitz_constant,
        }
    }

    pub fn sin(self) -> Self {
        let eval = self.value.sin();
        Self::lipschitz(eval, self.error, self.value.cos().abs())
    }

    pub fn cos(self) -> Self {
        let eval = self.value.cos();
        Self::lipschitz(eval, self.error, self.value.sin().abs())
    }

    pub fn tan(self) -> Self {
        self.sin() / self.cos()
    }

    pub fn sinh(self) -> Self {
        let eval = self.value.sinh();
        Self::lipschitz(eval, self.error, self.value.cosh().abs())
    }

    pub fn cosh(self) -> Self {
        let eval = self.value.cosh();
        Self::lipschitz(eval, self.error, self.value.sinh().abs())
    }

    pub fn tanh(self) -> Self {
        self.sinh() / self.cosh()
    }

    pub fn exp(self) -> Self {
        let eval = self.value.exp();
        Self::lipschitz(eval, self.error, eval)
    }

    pub fn sqrt(self) -> Self {
        let eval = self.value.sqrt();
        Self::lipschitz(eval, self.error, 0.5 / eval)
    }

    pub fn ln(self) -> Self {
        let eval = self.value.ln();
        Self::lipschitz(eval, self.error, 1.0 / self.value)
    }

    pub fn log2(self) -> Self {
        let eval = self.value.log2();
        Self::lipschitz(eval, self.error, std::f64::consts::LN_2.recip() / self.value)
    }

    pub fn log10(self) -> Self {
        let eval = self.value.log10();
        Self::lipschitz(eval, self.error, std::f64::consts::LN_10.recip() / self.value)
    }

    /// Integer power, error bounded through the derivative `n·x^(n-1)`
    pub fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::exact(1.0);
        }
        let eval = self.value.powi(n);
        let lipschitz_constant = if self.value == 0.0 {
            0.0
        } else {
            (n as f64 * eval / self.value).abs()
        };
        Self::lipschitz(eval, self.error, lipschitz_constant)
    }

    /// General power. A negative base with an inexact exponent cannot be
    /// evaluated stably and poisons the result.
    pub fn powf(self, exponent: Self) -> Self {
        if self.value < 0.0 && exponent.error != 0.0 {
            return Self::poisoned();
        }
        let eval = self.value.powf(exponent.value);
        let lipschitz_x = if self.value == 0.0 {
            0.0
        } else {
            (exponent.value * eval / self.value).abs()
        };
        let error_y = if exponent.error == 0.0 {
            0.0
        } else {
            exponent.error * (self.value.ln() * eval).abs()
        };
        Self {
            value: eval,
            error: eval.abs() * MACHINE_EPSILON + self.error * lipschitz_x + error_y,
        }
    }
}

impl From<f64> for ErrorFloat {
    /// Doubles carry error in the last digit unless they are exact integers.
    fn from(value: f64) -> Self {
        let error = if value == value.trunc() && value.abs() < 2f64.powi(53) {
            0.0
        } else {
            value.abs() * MACHINE_EPSILON
        };
        Self { value, error }
    }
}

impl AddAssign for ErrorFloat {
    fn add_assign(&mut self, rhs: Self) {
        self.error = (self.value.abs().max(rhs.value.abs()) * MACHINE_EPSILON)
            .max(self.error.max(rhs.error));
        self.value += rhs.value;
    }
}

impl SubAssign for ErrorFloat {
    fn sub_assign(&mut self, rhs: Self) {
        self.error = (self.value.abs().max(rhs.value.abs()) * MACHINE_EPSILON)
            .max(self.error.max(rhs.error));
        self.value -= rhs.value;
    }
}

impl MulAssign for ErrorFloat {
    fn mul_assign(&mut self, rhs: Self) {
        self.error =
            self.value.abs() * rhs.error + self.error * rhs.value.abs() + self.error * rhs.error;
        self.value *= rhs.value;
    }
}

impl DivAssign for ErrorFloat {
    fn div_assign(&mut self, rhs: Self) {
        if rhs.error >= rhs.value.abs() {
            // Divisor interval straddles zero: nothing meaningful survives
            *self = Self::poisoned();
            return;
        }
        let v1 = (self.value + self.error) / (rhs.value + rhs.error);
        let v2 = (self.value + self.error) / (rhs.value - rhs.error);
        let v3 = (self.value - self.error) / (rhs.value + rhs.error);
        let v4 = (self.value - self.error) / (rhs.value - rhs.error);
        self.value /= rhs.value;
        self.error = (v1 - self.value)
            .abs()
            .max((v2 - self.value).abs())
            .max((v3 - self.value).abs())
            .max((v4 - self.value).abs());
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident, $assign:ident) => {
        impl $trait for ErrorFloat {
            type Output = ErrorFloat;
            fn $method(mut self, rhs: ErrorFloat) -> ErrorFloat {
                self.$assign(rhs);
                self
            }
        }
    };
}

forward_binop!(Add, add, add_assign);
forward_binop!(Sub, sub, sub_assign);
forward_binop!(Mul, mul, mul_assign);
forward_binop!(Div, div, div_assign);

impl Neg for ErrorFloat {
    type Output = ErrorFloat;
    fn neg(self) -> ErrorFloat {
        ErrorFloat {
            value: -self.value,
            error: self.error,
        }
    }
}

impl Zero for ErrorFloat {
    fn zero() -> Self {
        Self::exact(0.0)
    }

    fn is_zero(&self) -> bool {
        self.value == 0.0 && self.error == 0.0
    }
}

impl One for ErrorFloat {
    fn one() -> Self {
        Self::exact(1.0)
    }
}
