//! Multi-stage stochastic DC OPF.
//!
//! A [`MultiStageProblem`] is a sequence of `T` single-stage problems coupled
//! through the previous stage's decision. A [`Policy`] turns the uncertainty
//! observed so far into the current stage decision; [`run_policy`] drives a
//! policy through a full realization path.
//!
//! Methods implementing [`MultiStageMethod`] build the problem from a network
//! and a [`Forecast`] and return a policy.

mod greedy;
mod policy;
mod problem;
mod sha;

pub use greedy::{GreedyPolicy, MsDcOpfGreedy};
pub use policy::{run_policy, Policy, PolicyError};
pub use problem::{Forecast, MsDcOpfProblem, RampConstraint};
pub use sha::MsDcOpfSha;

use gridopt_core::Network;

use crate::opf::OpfError;

/// Output of [`MultiStageProblem::solve_stages`], one entry per solved stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSolution {
    /// Stage decisions
    pub decisions: Vec<Vec<f64>>,
    /// Stage cost at each decision ($/h)
    pub values: Vec<f64>,
    /// Gradient of each stage cost with respect to its decision
    pub gradients: Vec<Vec<f64>>,
}

pub trait MultiStageProblem {
    fn num_stages(&self) -> usize;

    /// Solve stages `t..=stop_stage` in order, each using the previous
    /// stage's decision (starting from `x_prev`). `realizations[i]` is the
    /// uncertainty of stage `t + i`. `None` runs to the last stage.
    fn solve_stages(
        &self,
        t: usize,
        realizations: &[Vec<f64>],
        x_prev: &[f64],
        stop_stage: Option<usize>,
    ) -> Result<StageSolution, OpfError>;

    /// Whether `x` is a feasible stage-`t` decision after `x_prev` under `w`.
    fn is_point_feasible(&self, t: usize, x: &[f64], x_prev: &[f64], w: &[f64]) -> bool;
}

impl<P: MultiStageProblem + ?Sized> MultiStageProblem for &P {
    fn num_stages(&self) -> usize {
        (**self).num_stages()
    }

    fn solve_stages(
        &self,
        t: usize,
        realizations: &[Vec<f64>],
        x_prev: &[f64],
        stop_stage: Option<usize>,
    ) -> Result<StageSolution, OpfError> {
        (**self).solve_stages(t, realizations, x_prev, stop_stage)
    }

    fn is_point_feasible(&self, t: usize, x: &[f64], x_prev: &[f64], w: &[f64]) -> bool {
        (**self).is_point_feasible(t, x, x_prev, w)
    }
}

/// A multi-stage solution method producing a policy.
pub trait MultiStageMethod {
    fn name(&self) -> &str;

    fn solve(&self, net: &Network, forecast: Forecast) -> Result<Box<dyn Policy>, OpfError>;
}
