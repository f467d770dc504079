//! Standard-form quadratic programs and the solver interface.
//!
//! ```text
//! minimize    0.5 xᵀ H x + gᵀ x
//! subject to  A x = b
//!             l <= x <= u
//! ```
//!
//! `H` is stored in full (both triangles). Infinite entries in `l`/`u` mean
//! the side is unbounded.

mod clarabel;

pub use self::clarabel::IqpSolver;

use serde::Serialize;
use sprs::CsMat;
use thiserror::Error;

use crate::sparse;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QpSolverError {
    #[error("{what} has dimension {got}, expected {expected}")]
    Dimension {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("solver setup failed: {0}")]
    Setup(String),

    #[error("solver stopped with status {status} after {iterations} iterations")]
    Failed { status: String, iterations: usize },
}

#[derive(Debug, Clone)]
pub struct QuadProblem {
    pub h: CsMat<f64>,
    pub g: Vec<f64>,
    pub a: CsMat<f64>,
    pub b: Vec<f64>,
    pub l: Vec<f64>,
    pub u: Vec<f64>,
}

impl QuadProblem {
    /// Build a QP, checking that every block conforms to `n = g.len()`.
    pub fn new(
        h: CsMat<f64>,
        g: Vec<f64>,
        a: CsMat<f64>,
        b: Vec<f64>,
        l: Vec<f64>,
        u: Vec<f64>,
    ) -> Result<Self, QpSolverError> {
        let n = g.len();
        let check = |what: &'static str, got: usize, expected: usize| {
            if got == expected {
                Ok(())
            } else {
                Err(QpSolverError::Dimension {
                    what,
                    expected,
                    got,
                })
            }
        };
        check("H rows", h.rows(), n)?;
        check("H cols", h.cols(), n)?;
        check("A cols", a.cols(), n)?;
        check("b", b.len(), a.rows())?;
        check("l", l.len(), n)?;
        check("u", u.len(), n)?;
        Ok(Self { h, g, a, b, l, u })
    }

    /// Number of variables
    pub fn n(&self) -> usize {
        self.g.len()
    }

    /// Number of equality rows
    pub fn m(&self) -> usize {
        self.b.len()
    }

    pub fn objective(&self, x: &[f64]) -> f64 {
        sparse::quadratic_form(&self.h, &self.g, x)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverStatus {
    #[default]
    Unknown,
    Solved,
    Error,
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SolverStatus::Unknown => "unknown",
            SolverStatus::Solved => "solved",
            SolverStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Multipliers of a QP solution, satisfying `H x + g - Aᵀλ + μ - π = 0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DualVariables {
    /// Equality constraints `A x = b`
    pub lam: Vec<f64>,
    /// General nonlinear constraints; a QP has none
    pub nu: Option<Vec<f64>>,
    /// Upper bounds `x <= u`
    pub mu: Vec<f64>,
    /// Lower bounds `l <= x`
    pub pi: Vec<f64>,
}

/// A QP solver that keeps the diagnostic state of its last run.
pub trait QpSolver {
    fn name(&self) -> &str;

    /// Solve `qp`. Status, iterations and the last iterate stay queryable
    /// after a failure.
    fn solve(&mut self, qp: &QuadProblem) -> Result<(), QpSolverError>;

    fn status(&self) -> SolverStatus;

    fn error_msg(&self) -> &str;

    fn iterations(&self) -> usize;

    fn primal_variables(&self) -> &[f64];

    fn dual_variables(&self) -> &DualVariables;
}
