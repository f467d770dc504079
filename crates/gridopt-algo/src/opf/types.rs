use gridopt_core::{NetworkProperties, Problem};
use serde::Serialize;

use crate::qp::{DualVariables, SolverStatus};

/// Outcome of the last `solve` call of a method.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MethodResults {
    pub status: SolverStatus,
    pub error_msg: String,
    pub iterations: usize,
    /// Solver variables `(x, z)`
    pub primal_variables: Vec<f64>,
    pub dual_variables: DualVariables,
    pub net_properties: Option<NetworkProperties>,
    #[serde(skip)]
    pub problem: Option<Problem>,
    pub solve_time_ms: u128,
}

impl MethodResults {
    pub fn is_solved(&self) -> bool {
        self.status == SolverStatus::Solved
    }
}
