//! Function evaluation
//!
//! The solver core needs exactly two capabilities from a function: evaluate
//! it on a tensor-product grid into a caller-provided buffer, and evaluate it
//! at one point with an error-tracking number type. [`RealFunction`] captures
//! that contract; [`Expression`], built by [`parser`], is the implementation
//! used by the input-file front end. Expressions are immutable, so one tree
//! is shared by every worker thread.

pub mod error_float;
pub mod parser;

use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

pub use error_float::ErrorFloat;
pub use parser::{parse_expression, FunctionContext};

/// Number types an [`Expression`] can be evaluated with
pub trait Scalar:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn from_f64(value: f64) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn sinh(self) -> Self;
    fn cosh(self) -> Self;
    fn tanh(self) -> Self;
    fn exp(self) -> Self;
    fn sqrt(self) -> Self;
    fn ln(self) -> Self;
    fn log2(self) -> Self;
    fn log10(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn powf(self, rhs: Self) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
    fn sin(self) -> Self {
        f64::sin(self)
    }
    fn cos(self) -> Self {
        f64::cos(self)
    }
    fn tan(self) -> Self {
        f64::tan(self)
    }
    fn sinh(self) -> Self {
        f64::sinh(self)
    }
    fn cosh(self) -> Self {
        f64::cosh(self)
    }
    fn tanh(self) -> Self {
        f64::tanh(self)
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    fn ln(self) -> Self {
        f64::ln(self)
    }
    fn log2(self) -> Self {
        f64::log2(self)
    }
    fn log10(self) -> Self {
        f64::log10(self)
    }
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }
    fn powf(self, rhs: Self) -> Self {
        f64::powf(self, rhs)
    }
}

impl Scalar for ErrorFloat {
    fn from_f64(value: f64) -> Self {
        ErrorFloat::from(value)
    }
    fn sin(self) -> Self {
        ErrorFloat::sin(self)
    }
    fn cos(self) -> Self {
        ErrorFloat::cos(self)
    }
    fn tan(self) -> Self {
        ErrorFloat::tan(self)
    }
    fn sinh(self) -> Self {
        ErrorFloat::sinh(self)
    }
    fn cosh(self) -> Self {
        ErrorFloat::cosh(self)
    }
    fn tanh(self) -> Self {
        ErrorFloat::tanh(self)
    }
    fn exp(self) -> Self {
        ErrorFloat::exp(self)
    }
    fn sqrt(self) -> Self {
        ErrorFloat::sqrt(self)
    }
    fn ln(self) -> Self {
        ErrorFloat::ln(self)
    }
    fn log2(self) -> Self {
        ErrorFloat::log2(self)
    }
    fn log10(self) -> Self {
        ErrorFloat::log10(self)
    }
    fn powi(self, n: i32) -> Self {
        ErrorFloat::powi(self, n)
    }
    fn powf(self, rhs: Self) -> Self {
        ErrorFloat::powf(self, rhs)
    }
}

/// Chebyshev polynomial of the first kind, `T_k(x)`, in O(k/2) steps.
///
/// Uses the identities `T_2n(x) = 2·T_n(x)² − 1` and
/// `T_2n+1(x) = 2·T_{n+1}(x)·T_n(x) − x`: the linear recurrence runs only to
/// the half index and one identity finishes the job.
pub fn chebyshev_t<T: Scalar>(x: T, k: usize) -> T {
    match k {
        0 => return T::from_f64(1.0),
        1 => return x,
        _ => {}
    }

    let two = T::from_f64(2.0);
    let two_x = two * x;
    let mut t_prev = T::from_f64(1.0);
    let mut t_curr = x;

    if k % 2 == 0 {
        // Walk t_curr up to T_{k/2}
        for _ in 0..k / 2 - 1 {
            let next = two_x * t_curr - t_prev;
            t_prev = t_curr;
            t_curr = next;
        }
        two * t_curr * t_curr - T::from_f64(1.0)
    } else {
        // Walk t_curr up to T_{k/2 + 1}, t_prev trails at T_{k/2}
        for _ in 0..k / 2 {
            let next = two_x * t_curr - t_prev;
            t_prev = t_curr;
            t_curr = next;
        }
        two * t_curr * t_prev - x
    }
}

/// Unary functions of the expression grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryFn {
    Neg,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Sqrt,
    Log,
    Log2,
    Log10,
}

/// Expression tree node.
///
/// Named sub-functions appear as [`Expr::Shared`] nodes so a sub-expression
/// used by several functions is parsed and stored once.
#[derive(Debug, Clone)]
pub enum Expr {
    Constant(f64),
    Variable(usize),
    /// Terms with their signs: `true` means the term is subtracted
    Sum(Vec<(bool, Expr)>),
    /// Factors with their roles: `true` means the factor divides
    Product(Vec<(bool, Expr)>),
    /// General power `base ^ exponent`
    Power(Box<Expr>, Box<Expr>),
    /// Power with a small non-negative integer exponent
    IntPower(Box<Expr>, i32),
    Unary(UnaryFn, Box<Expr>),
    /// Chebyshev basis polynomial `T<k>(arg)`
    ChebyshevBasis(usize, Box<Expr>),
    Shared(Arc<Expr>),
}

impl Expr {
    /// Evaluate at a point given per-variable values
    pub fn eval<T: Scalar>(&self, vars: &[T]) -> T {
        match self {
            Expr::Constant(c) => T::from_f64(*c),
            Expr::Variable(i) => vars[*i],
            Expr::Sum(terms) => {
                let mut acc = T::from_f64(0.0);
                for (negate, term) in terms {
                    let v = term.eval(vars);
                    acc = if *negate { acc - v } else { acc + v };
                }
                acc
            }
            Expr::Product(factors) => {
                let mut acc = T::from_f64(1.0);
                for (invert, factor) in factors {
                    let v = factor.eval(vars);
                    acc = if *invert { acc / v } else { acc * v };
                }
                acc
            }
            Expr::Power(base, exponent) => base.eval(vars).powf(exponent.eval(vars)),
            Expr::IntPower(base, n) => base.eval(vars).powi(*n),
            Expr::Unary(f, arg) => {
                let v = arg.eval(vars);
                match f {
                    UnaryFn::Neg => -v,
                    UnaryFn::Sin => v.sin(),
                    UnaryFn::Cos => v.cos(),
                    UnaryFn::Tan => v.tan(),
                    UnaryFn::Sinh => v.sinh(),
                    UnaryFn::Cosh => v.cosh(),
                    UnaryFn::Tanh => v.tanh(),
                    UnaryFn::Exp => v.exp(),
                    UnaryFn::Sqrt => v.sqrt(),
                    UnaryFn::Log => v.ln(),
                    UnaryFn::Log2 => v.log2(),
                    UnaryFn::Log10 => v.log10(),
                }
            }
            Expr::ChebyshevBasis(k, arg) => chebyshev_t(arg.eval(vars), *k),
            Expr::Shared(inner) => inner.eval(vars),
        }
    }

    /// Whether the expression references any variable
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Constant(_) => true,
            Expr::Variable(_) => false,
            Expr::Sum(terms) => terms.iter().all(|(_, t)| t.is_constant()),
            Expr::Product(factors) => factors.iter().all(|(_, f)| f.is_constant()),
            Expr::Power(base, exponent) => base.is_constant() && exponent.is_constant(),
            Expr::IntPower(base, _) => base.is_constant(),
            Expr::Unary(_, arg) => arg.is_constant(),
            Expr::ChebyshevBasis(_, arg) => arg.is_constant(),
            Expr::Shared(inner) => inner.is_constant(),
        }
    }

    /// Fold a variable-free expression to its value
    pub fn constant_value(&self) -> Option<f64> {
        if self.is_constant() {
            Some(self.eval::<f64>(&[]))
        } else {
            None
        }
    }
}

/// A function the solver can approximate: grid evaluation into a caller
/// buffer, plus single-point evaluation with and without error tracking.
pub trait RealFunction: Send + Sync {
    /// Number of variables
    fn rank(&self) -> usize;

    /// Value at one point
    fn eval(&self, point: &[f64]) -> f64;

    /// Value and rounding-error bound at one point
    fn eval_tracked(&self, point: &[f64]) -> ErrorFloat;

    /// Evaluate on the tensor-product grid spanned by `axes`.
    ///
    /// `axes[d]` holds the sample coordinates along dimension `d`. Results
    /// are written in C order (last axis fastest): the value at multi-index
    /// `(j₀,…,j_{n−1})` lands at flat position `((j₀·len₁ + j₁)·len₂ + …)`.
    /// `out` is cleared and filled with the full grid.
    fn eval_grid(&self, axes: &[Vec<f64>], out: &mut Vec<f64>) {
        let rank = axes.len();
        let total: usize = axes.iter().map(Vec::len).product();
        out.clear();
        out.reserve(total);

        let mut index = vec![0usize; rank];
        let mut point: Vec<f64> = axes.iter().map(|a| a[0]).collect();
        loop {
            out.push(self.eval(&point));

            // Advance the multi-index, last axis fastest
            let mut dim = rank;
            loop {
                if dim == 0 {
                    return;
                }
                dim -= 1;
                index[dim] += 1;
                if index[dim] < axes[dim].len() {
                    point[dim] = axes[dim][index[dim]];
                    break;
                }
                index[dim] = 0;
                point[dim] = axes[dim][0];
            }
        }
    }
}

/// A parsed function of the input file
#[derive(Debug, Clone)]
pub struct Expression {
    name: String,
    rank: usize,
    expr: Expr,
}

impl Expression {
    pub fn new(name: impl Into<String>, rank: usize, expr: Expr) -> Self {
        Self {
            name: name.into(),
            rank,
            expr,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl RealFunction for Expression {
    fn rank(&self) -> usize {
        self.rank
    }

    fn eval(&self, point: &[f64]) -> f64 {
        self.expr.eval(point)
    }

    fn eval_tracked(&self, point: &[f64]) -> ErrorFloat {
        let tracked: Vec<ErrorFloat> = point.iter().map(|&x| ErrorFloat::from(x)).collect();
        self.expr.eval(&tracked)
    }
}
