//! Rootfield: real-root finding for systems of smooth multivariate functions
//!
//! This crate locates every real root of a system of n smooth functions
//! f₁,…,fₙ: [a,b]ⁿ → ℝ inside an axis-aligned search box. On each subcell the
//! functions are replaced by tensor-product Chebyshev interpolants; cheap
//! interval tests discard subcells that provably contain no zero, a bounding
//! procedure contracts subcells around potential zeros, and once every
//! surviving interpolant is linear a closed-form solve produces the root.
//!
//! The solver input is either an input file (see [`input`]) or a programmatic
//! system of [`functions::RealFunction`] implementations handed to
//! [`solvers::ThreadedSolver`].

use thiserror::Error;

pub mod approximation;
pub mod checking;
pub mod config;
pub mod functions;
pub mod input;
pub mod interval;
pub mod solve;
pub mod solvers;
pub mod sync;
pub mod timing;
pub mod tracking;

// Re-export commonly used types
pub use config::{RuntimeOptions, SolveOptions};
pub use interval::Interval;
pub use solve::{solve_input_file, SolveSummary};
pub use tracking::{FoundRoot, SolveMethod};

/// Main error type for the rootfield library
#[derive(Debug, Error)]
pub enum RootfieldError {
    /// Malformed input file, unknown parameter, bad literal, dimension
    /// mismatch, or name clash. The message names the offending construct.
    #[error("Input error: {0}")]
    Input(String),

    /// A component was driven outside its contract (approximation degree
    /// out of range, unstable residual evaluation). Fatal for the solve.
    #[error("Misuse error: {0}")]
    Misuse(String),

    /// I/O failure while reading input or writing result files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rootfield operations
pub type Result<T> = std::result::Result<T, RootfieldError>;

impl RootfieldError {
    /// Shorthand for an input error with a formatted message
    pub fn input(msg: impl Into<String>) -> Self {
        RootfieldError::Input(msg.into())
    }

    /// Shorthand for a misuse error with a formatted message
    pub fn misuse(msg: impl Into<String>) -> Self {
        RootfieldError::Misuse(msg.into())
    }
}
