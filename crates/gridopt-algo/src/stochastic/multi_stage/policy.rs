use thiserror::Error;
use tracing::debug;

use crate::opf::OpfError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("stage {t} is outside 0..{num_stages}")]
    StageOutOfRange { t: usize, num_stages: usize },

    #[error("stage {t} needs {expected} realizations, got {got}")]
    HistoryLength {
        t: usize,
        expected: usize,
        got: usize,
    },

    #[error("stage {t} solve failed")]
    Stage {
        t: usize,
        #[source]
        source: OpfError,
    },

    #[error("stage {t} solve returned {got} decisions, expected 1")]
    UnexpectedDecisionCount { t: usize, got: usize },

    #[error("{policy}: decision for stage {t} is infeasible")]
    Infeasible { policy: String, t: usize },
}

/// Maps the observed uncertainty to a stage decision.
pub trait Policy {
    fn name(&self) -> &str;

    fn num_stages(&self) -> usize;

    /// Decision for stage `t` after `x_prev`, given the realizations
    /// `history[0..=t]` observed so far.
    fn apply(&self, t: usize, x_prev: &[f64], history: &[Vec<f64>]) -> Result<Vec<f64>, PolicyError>;
}

/// Run `policy` along `realizations`, feeding each decision back as the next
/// stage's `x_prev`. Returns one decision per stage.
pub fn run_policy<P: Policy + ?Sized>(
    policy: &P,
    x0: &[f64],
    realizations: &[Vec<f64>],
) -> Result<Vec<Vec<f64>>, PolicyError> {
    let mut decisions: Vec<Vec<f64>> = Vec::with_capacity(realizations.len());
    for t in 0..realizations.len() {
        let x_prev = decisions.last().map_or(x0, Vec::as_slice);
        let x = policy.apply(t, x_prev, &realizations[..=t])?;
        debug!(policy = policy.name(), stage = t, "stage decision");
        decisions.push(x);
    }
    Ok(decisions)
}
