//! Greedy (myopic) policy.
//!
//! At stage `t` the policy solves stage `t` alone with the realization just
//! observed, ignoring every later stage, and checks the result for
//! feasibility before returning it.

use gridopt_core::Network;
use tracing::info;

use super::policy::{Policy, PolicyError};
use super::problem::{Forecast, MsDcOpfProblem, RampConstraint};
use super::{MultiStageMethod, MultiStageProblem};
use crate::config::{MsDcOpfParams, ParamOverrides};
use crate::opf::OpfError;

pub struct GreedyPolicy<P> {
    problem: P,
}

impl<P: MultiStageProblem> GreedyPolicy<P> {
    pub const NAME: &'static str = "greedy";

    pub fn new(problem: P) -> Self {
        Self { problem }
    }
}

impl<P: MultiStageProblem> Policy for GreedyPolicy<P> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn num_stages(&self) -> usize {
        self.problem.num_stages()
    }

    fn apply(&self, t: usize, x_prev: &[f64], history: &[Vec<f64>]) -> Result<Vec<f64>, PolicyError> {
        let num_stages = self.problem.num_stages();
        if t >= num_stages {
            return Err(PolicyError::StageOutOfRange { t, num_stages });
        }
        if history.len() != t + 1 {
            return Err(PolicyError::HistoryLength {
                t,
                expected: t + 1,
                got: history.len(),
            });
        }
        let w = &history[t];

        let mut solution = self
            .problem
            .solve_stages(t, std::slice::from_ref(w), x_prev, Some(t))
            .map_err(|source| PolicyError::Stage { t, source })?;
        if solution.decisions.len() != 1 {
            return Err(PolicyError::UnexpectedDecisionCount {
                t,
                got: solution.decisions.len(),
            });
        }
        let x = solution.decisions.swap_remove(0);

        if !self.problem.is_point_feasible(t, &x, x_prev, w) {
            return Err(PolicyError::Infeasible {
                policy: Self::NAME.into(),
                t,
            });
        }
        Ok(x)
    }
}

/// Greedy method for the multi-stage DC OPF.
pub struct MsDcOpfGreedy {
    params: MsDcOpfParams,
    ramps: Vec<RampConstraint>,
    stage_hours: f64,
}

impl Default for MsDcOpfGreedy {
    fn default() -> Self {
        Self::new()
    }
}

impl MsDcOpfGreedy {
    pub const NAME: &'static str = "MS-DCOPF-greedy";

    pub fn new() -> Self {
        Self::with_params(MsDcOpfParams::default())
    }

    pub fn with_params(params: MsDcOpfParams) -> Self {
        Self {
            params,
            ramps: Vec::new(),
            stage_hours: 1.0,
        }
    }

    pub fn with_overrides(overrides: &ParamOverrides) -> Self {
        Self::with_params(MsDcOpfParams::resolve(overrides))
    }

    pub fn with_ramps(mut self, ramps: Vec<RampConstraint>) -> Self {
        self.ramps = ramps;
        self
    }

    pub fn with_stage_hours(mut self, hours: f64) -> Self {
        self.stage_hours = hours;
        self
    }

    pub fn params(&self) -> &MsDcOpfParams {
        &self.params
    }

    pub fn create_problem(&self, net: &Network, forecast: Forecast) -> Result<MsDcOpfProblem, OpfError> {
        Ok(
            MsDcOpfProblem::new(net, forecast, self.ramps.clone(), self.params.clone())?
                .with_stage_hours(self.stage_hours),
        )
    }
}

impl MultiStageMethod for MsDcOpfGreedy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn solve(&self, net: &Network, forecast: Forecast) -> Result<Box<dyn Policy>, OpfError> {
        let problem = self.create_problem(net, forecast)?;
        if !self.params.quiet {
            info!(method = Self::NAME, "\n{}", problem);
        }
        Ok(Box::new(GreedyPolicy::new(problem)))
    }
}
