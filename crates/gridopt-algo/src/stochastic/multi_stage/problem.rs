//! Multi-stage DC OPF problem.
//!
//! Every stage is a DC OPF on a copy of the base network with the stage's
//! realized loads. Stages couple through generator ramp limits: the output
//! window of a ramp-limited generator at stage `t` is centered on its output
//! in the previous stage decision.
//!
//! A stage decision has the DC OPF variable layout: non-slack bus angles
//! (radians) followed by adjustable generator outputs (per unit).

use std::fmt;

use gridopt_core::{ConstraintKind, Megawatts, Network, NodeIndex, VarKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MultiStageProblem, StageSolution};
use crate::config::MsDcOpfParams;
use crate::opf::{DcOpf, InvariantViolation, OpfError, PowerFlowMethod};
use crate::sparse;

/// Expected load of every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// `loads_mw[t][k]`: active power of the `k`-th load (graph order) at stage `t`
    pub loads_mw: Vec<Vec<f64>>,
}

impl Forecast {
    pub fn new(loads_mw: Vec<Vec<f64>>) -> Self {
        Self { loads_mw }
    }

    /// Parse a forecast such as `{"loads_mw": [[50.0, 20.0], [55.0, 21.0]]}`.
    pub fn from_json_str(text: &str) -> Result<Self, OpfError> {
        serde_json::from_str(text).map_err(|e| OpfError::InvalidInput(format!("forecast: {e}")))
    }

    pub fn num_stages(&self) -> usize {
        self.loads_mw.len()
    }

    pub fn validate(&self, num_loads: usize) -> Result<(), OpfError> {
        if self.loads_mw.is_empty() {
            return Err(OpfError::InvalidInput("forecast has no stages".into()));
        }
        for (t, row) in self.loads_mw.iter().enumerate() {
            if row.len() != num_loads {
                return Err(OpfError::InvalidInput(format!(
                    "forecast stage {t} has {} loads, network has {num_loads}",
                    row.len()
                )));
            }
            if row.iter().any(|p| !p.is_finite()) {
                return Err(OpfError::InvalidInput(format!(
                    "forecast stage {t} has a non-finite load"
                )));
            }
        }
        Ok(())
    }
}

/// Generator ramp rate limit between consecutive stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampConstraint {
    /// Generator name (must match a P-adjustable generator in the network)
    pub gen_name: String,

    /// Ramp-up limit (MW/hr).
    /// P(t) ≤ P(t-1) + ramp_up_mw_hr × Δt
    pub ramp_up_mw_hr: f64,

    /// Ramp-down limit (MW/hr).
    /// P(t) ≥ P(t-1) - ramp_down_mw_hr × Δt
    pub ramp_down_mw_hr: f64,
}

impl RampConstraint {
    /// Same limit in both directions.
    pub fn symmetric(gen_name: impl Into<String>, ramp_mw_hr: f64) -> Self {
        Self {
            gen_name: gen_name.into(),
            ramp_up_mw_hr: ramp_mw_hr,
            ramp_down_mw_hr: ramp_mw_hr,
        }
    }

    pub fn asymmetric(gen_name: impl Into<String>, up_mw_hr: f64, down_mw_hr: f64) -> Self {
        Self {
            gen_name: gen_name.into(),
            ramp_up_mw_hr: up_mw_hr,
            ramp_down_mw_hr: down_mw_hr,
        }
    }

    /// Output window `(pmin, pmax)` in MW after `prev_p_mw`, intersected
    /// with the physical limits.
    pub fn effective_bounds(
        &self,
        prev_p_mw: f64,
        dt_hr: f64,
        pmin_mw: f64,
        pmax_mw: f64,
    ) -> (f64, f64) {
        let ramp_limited_min = prev_p_mw - self.ramp_down_mw_hr * dt_hr;
        let ramp_limited_max = prev_p_mw + self.ramp_up_mw_hr * dt_hr;
        (ramp_limited_min.max(pmin_mw), ramp_limited_max.min(pmax_mw))
    }
}

/// A ramp constraint resolved against the flagged base network.
#[derive(Debug, Clone)]
struct BoundRamp {
    var: usize,
    node: NodeIndex,
    ramp: RampConstraint,
}

pub struct MsDcOpfProblem {
    base: Network,
    forecast: Forecast,
    ramps: Vec<BoundRamp>,
    params: MsDcOpfParams,
    stage_hours: f64,
    nx: usize,
}

impl MsDcOpfProblem {
    pub fn new(
        net: &Network,
        forecast: Forecast,
        ramps: Vec<RampConstraint>,
        params: MsDcOpfParams,
    ) -> Result<Self, OpfError> {
        let mut base = net.clone();
        DcOpf::with_params(params.stage.clone()).create_problem(&mut base)?;
        forecast.validate(base.num_loads())?;

        let ramps = ramps
            .into_iter()
            .map(|ramp| {
                let (node, _) = base.gen_by_name(&ramp.gen_name).ok_or_else(|| {
                    OpfError::InvalidInput(format!("unknown generator {}", ramp.gen_name))
                })?;
                let var = base
                    .var_index(VarKind::GenActivePower, node)
                    .ok_or_else(|| {
                        OpfError::InvalidInput(format!(
                            "generator {} is not adjustable",
                            ramp.gen_name
                        ))
                    })?;
                if !(ramp.ramp_up_mw_hr >= 0.0 && ramp.ramp_down_mw_hr >= 0.0) {
                    return Err(OpfError::InvalidInput(format!(
                        "ramp limits of {} must be non-negative",
                        ramp.gen_name
                    )));
                }
                Ok(BoundRamp { var, node, ramp })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let nx = base.num_vars();
        Ok(Self {
            base,
            forecast,
            ramps,
            params,
            stage_hours: 1.0,
            nx,
        })
    }

    /// Stage duration used to turn ramp rates into ramp windows.
    pub fn with_stage_hours(mut self, hours: f64) -> Self {
        self.stage_hours = hours;
        self
    }

    pub fn num_vars(&self) -> usize {
        self.nx
    }

    pub fn forecast(&self) -> &Forecast {
        &self.forecast
    }

    pub fn network(&self) -> &Network {
        &self.base
    }

    pub fn params(&self) -> &MsDcOpfParams {
        &self.params
    }

    /// The base network's operating point in decision layout.
    pub fn initial_decision(&self) -> Vec<f64> {
        self.base.var_values()
    }

    /// Base network with stage loads `w` and ramp windows around `x_prev`.
    pub fn stage_network(&self, w: &[f64], x_prev: &[f64]) -> Result<Network, OpfError> {
        let num_loads = self.base.num_loads();
        if w.len() != num_loads {
            return Err(OpfError::ShapeMismatch {
                what: "realization",
                expected: num_loads,
                got: w.len(),
            });
        }
        if x_prev.len() != self.nx {
            return Err(OpfError::ShapeMismatch {
                what: "previous decision",
                expected: self.nx,
                got: x_prev.len(),
            });
        }

        let mut net = self.base.clone();
        for (node, &p) in net.load_nodes().into_iter().zip(w) {
            if let Some(load) = net.load_mut(node) {
                load.active_power = Megawatts(p);
            }
        }

        let base_mva = net.base_power;
        for r in &self.ramps {
            if let Some(gen) = net.gen_mut(r.node) {
                let prev_mw = x_prev[r.var] * base_mva;
                let (lo, hi) = r.ramp.effective_bounds(
                    prev_mw,
                    self.stage_hours,
                    gen.pmin.value(),
                    gen.pmax.value(),
                );
                gen.pmin = Megawatts(lo);
                gen.pmax = Megawatts(hi);
            }
        }

        net.set_var_values(x_prev)?;
        Ok(net)
    }

    /// Solve one stage; returns the decision, its cost and cost gradient.
    fn solve_stage(
        &self,
        t: usize,
        w: &[f64],
        x_prev: &[f64],
    ) -> Result<(Vec<f64>, f64, Vec<f64>), OpfError> {
        let mut net = self.stage_network(w, x_prev)?;
        let mut method = DcOpf::with_params(self.params.stage.clone());
        method.solve(&mut net)?;

        let results = method.results();
        let x = results
            .primal_variables
            .get(..self.nx)
            .ok_or(OpfError::ShapeMismatch {
                what: "primal variables",
                expected: self.nx,
                got: results.primal_variables.len(),
            })?
            .to_vec();
        let mut problem = results.problem.clone().ok_or(OpfError::NoProblem)?;
        problem.eval(&x)?;

        debug!(
            stage = t,
            cost = problem.phi,
            iterations = results.iterations,
            "stage solved"
        );
        Ok((x, problem.phi, problem.gphi))
    }

    fn check_point(&self, x: &[f64], x_prev: &[f64], w: &[f64]) -> Result<bool, OpfError> {
        if x.len() != self.nx {
            return Ok(false);
        }
        let mut net = self.stage_network(w, x_prev)?;
        let problem = DcOpf::with_params(self.params.stage.clone()).create_problem(&mut net)?;
        let tol = self.params.feas_tol;
        let find = |kind| {
            problem.find_constraint(kind).ok_or_else(|| {
                OpfError::bad_problem(DcOpf::NAME, InvariantViolation::MissingConstraint(kind))
            })
        };

        let bounds = find(ConstraintKind::VariableBounds)?;
        let within = |v: f64, lo: f64, hi: f64| v >= lo - tol && v <= hi + tol;
        if !(0..self.nx).all(|j| within(x[j], bounds.l[j], bounds.u[j])) {
            return Ok(false);
        }

        let balance = find(ConstraintKind::DcPowerBalance)?;
        let ax = sparse::mat_vec(&balance.a, x);
        if ax.iter().zip(&balance.b).any(|(lhs, rhs)| (lhs - rhs).abs() > tol) {
            return Ok(false);
        }

        let flows = find(ConstraintKind::DcFlowLimit)?;
        let gx = sparse::mat_vec(&flows.g, x);
        Ok(gx
            .iter()
            .enumerate()
            .all(|(k, &f)| within(f, flows.l[k], flows.u[k])))
    }
}

impl MultiStageProblem for MsDcOpfProblem {
    fn num_stages(&self) -> usize {
        self.forecast.num_stages()
    }

    fn solve_stages(
        &self,
        t: usize,
        realizations: &[Vec<f64>],
        x_prev: &[f64],
        stop_stage: Option<usize>,
    ) -> Result<StageSolution, OpfError> {
        let num_stages = self.num_stages();
        let stop = stop_stage.unwrap_or(num_stages.saturating_sub(1));
        if t > stop || stop >= num_stages {
            return Err(OpfError::InvalidInput(format!(
                "stages {t}..={stop} outside 0..{num_stages}"
            )));
        }
        if realizations.len() < stop - t + 1 {
            return Err(OpfError::ShapeMismatch {
                what: "realizations",
                expected: stop - t + 1,
                got: realizations.len(),
            });
        }

        let mut solution = StageSolution::default();
        let mut prev = x_prev.to_vec();
        for (s, w) in (t..=stop).zip(realizations) {
            let (x, value, gradient) = self.solve_stage(s, w, &prev)?;
            prev.clone_from(&x);
            solution.decisions.push(x);
            solution.values.push(value);
            solution.gradients.push(gradient);
        }
        Ok(solution)
    }

    fn is_point_feasible(&self, t: usize, x: &[f64], x_prev: &[f64], w: &[f64]) -> bool {
        if t >= self.num_stages() {
            return false;
        }
        match self.check_point(x, x_prev, w) {
            Ok(feasible) => feasible,
            Err(err) => {
                debug!(stage = t, error = %err, "feasibility check failed");
                false
            }
        }
    }
}

impl fmt::Display for MsDcOpfProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Multi-stage DC OPF")?;
        writeln!(f, "  stages:      {}", self.num_stages())?;
        writeln!(f, "  stage hours: {}", self.stage_hours)?;
        writeln!(f, "  variables:   {}", self.nx)?;
        writeln!(f, "  buses:       {}", self.base.num_buses())?;
        writeln!(f, "  branches:    {}", self.base.num_branches())?;
        writeln!(f, "  loads:       {}", self.base.num_loads())?;
        write!(f, "  ramps:       {}", self.ramps.len())
    }
}
