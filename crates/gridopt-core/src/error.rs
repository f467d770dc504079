//! Errors raised by the network model and problem construction.

use thiserror::Error;

use crate::flags::{ObjectType, VarKind};

/// Errors from network queries, variable flagging and problem analysis.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    /// A generator, load or branch references a bus that is not in the graph
    #[error("{element} references unknown bus {bus}")]
    UnknownBus { element: String, bus: usize },

    /// Two buses share an id, so rows and angles cannot be told apart
    #[error("bus id {0} is used by more than one bus")]
    DuplicateBus(usize),

    /// Per-unit conversions need a positive, finite system base
    #[error("base power must be positive and finite, got {0} MVA")]
    InvalidBasePower(f64),

    /// DC flow is undefined for a branch without series reactance
    #[error("branch {0} has zero or near-zero reactance")]
    ZeroReactance(String),

    /// The QP objective only supports costs up to second order
    #[error("generator {name} has a cost polynomial of degree {degree}; at most 2 is supported")]
    UnsupportedCost { name: String, degree: usize },

    /// Variable kind does not belong to the object type being flagged
    #[error("variable kind {kind:?} cannot be flagged on {object:?} objects")]
    FlagMismatch { object: ObjectType, kind: VarKind },

    /// A value vector does not match the number of flagged variables
    #[error("expected {expected} variable values, got {got}")]
    VarCount { expected: usize, got: usize },

    /// Sensitivity vectors do not match the network dimensions
    #[error("sensitivity block '{block}' has {got} entries, expected {expected}")]
    SensitivityShape {
        block: &'static str,
        expected: usize,
        got: usize,
    },

    /// The problem was evaluated before [`crate::problem::Problem::analyze`]
    #[error("problem has not been analyzed")]
    NotAnalyzed,
}

/// Convenience alias for results carrying a [`NetworkError`].
pub type NetworkResult<T> = Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::ZeroReactance("line 1-2".into());
        assert!(err.to_string().contains("line 1-2"));

        let err = NetworkError::FlagMismatch {
            object: ObjectType::Gen,
            kind: VarKind::BusAngle,
        };
        assert!(err.to_string().contains("BusAngle"));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> NetworkResult<()> {
            Err(NetworkError::VarCount {
                expected: 2,
                got: 3,
            })
        }

        fn outer() -> NetworkResult<()> {
            inner()?;
            Ok(())
        }

        assert_eq!(
            outer().unwrap_err(),
            NetworkError::VarCount {
                expected: 2,
                got: 3
            }
        );
    }
}
