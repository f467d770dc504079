use gridopt_core::{ConstraintKind, NetworkError};
use thiserror::Error;

use crate::qp::QpSolverError;

/// Structural defect found while building or checking a DC OPF QP.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("{got} bounded variables, expected {expected} (one per adjustable generator)")]
    BoundedCount { expected: usize, got: usize },

    #[error("{got} variables, expected {expected} (non-slack angles plus adjustable generators)")]
    VarCount { expected: usize, got: usize },

    #[error("problem has no {0:?} constraint")]
    MissingConstraint(ConstraintKind),

    #[error("variable bound matrix is {rows}x{cols}, expected {n}x{n}")]
    BoundMatrixShape { rows: usize, cols: usize, n: usize },

    #[error("variable bound matrix is not the identity")]
    BoundMatrixNotIdentity,

    #[error("flow matrix is {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    FlowMatrixShape {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("bound vectors have lengths {l} and {u}, expected {expected}")]
    BoundLength { l: usize, u: usize, expected: usize },

    #[error("bounds not strictly ordered at index {index}: {lower} >= {upper}")]
    BoundOrder { index: usize, lower: f64, upper: f64 },

    #[error("objective {direct} does not match quadratic form {reconstructed}")]
    ObjectiveMismatch { direct: f64, reconstructed: f64 },

    #[error("Hessian is {rows}x{cols}, expected {n}x{n}")]
    HessianShape { rows: usize, cols: usize, n: usize },

    #[error("equality matrix has {got} rows, expected {expected}")]
    EqualityRows { expected: usize, got: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpfError {
    /// Assembly defect: a precondition or invariant check failed
    #[error("{method}: bad problem: {violation}")]
    BadProblem {
        method: String,
        #[source]
        violation: InvariantViolation,
    },

    #[error("{method}: bad flow limits on branch {branch}: {lower} >= {upper}")]
    BadFlowLimits {
        method: String,
        branch: usize,
        lower: f64,
        upper: f64,
    },

    #[error("{method}: bad variable limits on variable {index}: {lower} >= {upper}")]
    BadVarLimits {
        method: String,
        index: usize,
        lower: f64,
        upper: f64,
    },

    #[error("{method}: solver error")]
    Solver {
        method: String,
        #[source]
        source: QpSolverError,
    },

    #[error("no solved problem available")]
    NoProblem,

    #[error("{what} has {got} entries, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl OpfError {
    pub(crate) fn bad_problem(method: &str, violation: InvariantViolation) -> Self {
        OpfError::BadProblem {
            method: method.to_string(),
            violation,
        }
    }
}
