//! DC optimal power flow.
//!
//! Minimizes the generation cost of adjustable generators subject to the
//! linearized power balance at every bus, branch flow limits and generator
//! output limits. Decision variables:
//!
//! - voltage angle of every non-slack bus (radians)
//! - active power of every in-service adjustable generator (per unit)
//!
//! The problem is turned into a standard-form QP (see [`assemble_qp`]) and
//! handed to a [`QpSolver`], by default the interior-point [`IqpSolver`].

use gridopt_core::{
    ConstraintKind, Flags, FunctionKind, Network, ObjectType, Problem, Selector, Sensitivities,
    VarKind,
};
use tracing::{debug, info, warn};
use web_time::Instant;

use super::error::{InvariantViolation, OpfError};
use super::qp_form::assemble_qp;
use super::types::MethodResults;
use super::PowerFlowMethod;
use crate::config::{DcOpfParams, ParamOverrides};
use crate::qp::{IqpSolver, QpSolver};

pub struct DcOpf {
    params: DcOpfParams,
    solver: Box<dyn QpSolver>,
    results: MethodResults,
}

impl Default for DcOpf {
    fn default() -> Self {
        Self::new()
    }
}

impl DcOpf {
    pub const NAME: &'static str = "DCOPF";

    /// DC OPF with default parameters and the interior-point solver.
    pub fn new() -> Self {
        Self::with_params(DcOpfParams::default())
    }

    pub fn with_params(params: DcOpfParams) -> Self {
        let solver = Box::new(IqpSolver::new(params.solver.clone()));
        Self {
            params,
            solver,
            results: MethodResults::default(),
        }
    }

    /// Defaults overridden by `overrides`.
    pub fn with_overrides(overrides: &ParamOverrides) -> Self {
        Self::with_params(DcOpfParams::resolve(overrides))
    }

    /// Replace the QP solver.
    pub fn with_solver(mut self, solver: Box<dyn QpSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn params(&self) -> &DcOpfParams {
        &self.params
    }

    /// Flag the DC OPF variables on `net`, check the resulting layout and
    /// build the analyzed problem.
    pub fn create_problem(&self, net: &mut Network) -> Result<Problem, OpfError> {
        net.clear_flags();
        net.set_flags(
            ObjectType::Bus,
            Flags::VARS,
            Selector::BusNotSlack,
            VarKind::BusAngle,
        )?;
        net.set_flags(
            ObjectType::Gen,
            Flags::VARS | Flags::BOUNDED,
            Selector::GenPAdjust,
            VarKind::GenActivePower,
        )?;

        let num_adjust = net.num_p_adjust_gens();
        if net.num_bounded() != num_adjust {
            return Err(OpfError::bad_problem(
                Self::NAME,
                InvariantViolation::BoundedCount {
                    expected: num_adjust,
                    got: net.num_bounded(),
                },
            ));
        }
        let expected_vars = net.num_buses() - net.num_slack_buses() + num_adjust;
        if net.num_vars() != expected_vars {
            return Err(OpfError::bad_problem(
                Self::NAME,
                InvariantViolation::VarCount {
                    expected: expected_vars,
                    got: net.num_vars(),
                },
            ));
        }

        let mut problem = Problem::new();
        problem.add_constraint(ConstraintKind::DcPowerBalance);
        problem.add_constraint(ConstraintKind::DcFlowLimit);
        problem.add_constraint(ConstraintKind::VariableBounds);
        problem.add_function(FunctionKind::GenCost, 1.0);
        problem.analyze(net)?;
        Ok(problem)
    }
}

impl PowerFlowMethod for DcOpf {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn solve(&mut self, net: &mut Network) -> Result<(), OpfError> {
        self.results = MethodResults::default();
        let start = Instant::now();

        let mut problem = self.create_problem(net)?;
        if !self.params.quiet {
            info!(method = Self::NAME, "\n{}", problem);
        }

        let qp = assemble_qp(net, &mut problem)?;
        debug!(
            method = Self::NAME,
            solver = self.solver.name(),
            n = qp.qp.n(),
            m = qp.qp.m(),
            "solving"
        );

        let outcome = self.solver.solve(&qp.qp);

        self.results = MethodResults {
            status: self.solver.status(),
            error_msg: self.solver.error_msg().to_string(),
            iterations: self.solver.iterations(),
            primal_variables: self.solver.primal_variables().to_vec(),
            dual_variables: self.solver.dual_variables().clone(),
            net_properties: Some(net.properties()),
            problem: Some(problem),
            solve_time_ms: start.elapsed().as_millis(),
        };

        outcome.map_err(|source| {
            warn!(
                method = Self::NAME,
                iterations = self.results.iterations,
                error = %source,
                "QP solve failed"
            );
            OpfError::Solver {
                method: Self::NAME.into(),
                source,
            }
        })
    }

    fn results(&self) -> &MethodResults {
        &self.results
    }

    fn update_network(&self, net: &mut Network) -> Result<(), OpfError> {
        let results = &self.results;
        let problem = match (&results.problem, results.is_solved()) {
            (Some(problem), true) => problem,
            _ => return Err(OpfError::NoProblem),
        };

        let nx = problem.num_vars();
        let nbus = problem.num_buses();
        let nz = problem.num_branches();
        let n = nx + nz;

        let expect = |what: &'static str, got: usize, expected: usize| {
            if got == expected {
                Ok(())
            } else {
                Err(OpfError::ShapeMismatch {
                    what,
                    expected,
                    got,
                })
            }
        };
        let duals = &results.dual_variables;
        expect("network variables", net.num_vars(), nx)?;
        expect("primal variables", results.primal_variables.len(), n)?;
        expect("equality multipliers", duals.lam.len(), nbus + nz)?;
        expect(
            "nonlinear multipliers",
            duals.nu.as_ref().map_or(0, Vec::len),
            0,
        )?;
        expect("upper bound multipliers", duals.mu.len(), n)?;
        expect("lower bound multipliers", duals.pi.len(), n)?;

        // z is an encoding artifact and stays out of the network
        net.set_var_values(&results.primal_variables[..nx])?;

        // QP multipliers are per-unit cost; sensitivities are $/h per p.u.
        let base = net.base_power;
        let scaled = |v: &[f64]| v.iter().map(|x| x * base).collect::<Vec<_>>();
        let sens = Sensitivities {
            bus_p_balance: scaled(&duals.lam[..nbus]),
            branch_flow_upper: scaled(&duals.mu[nx..]),
            branch_flow_lower: scaled(&duals.pi[nx..]),
            var_upper: scaled(&duals.mu[..nx]),
            var_lower: scaled(&duals.pi[..nx]),
        };
        net.clear_sensitivities();
        net.store_sensitivities(&sens)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridopt_core::*;

    #[test]
    fn test_create_problem_layout() {
        let mut net = Network::new();
        net.add_bus(Bus::new(BusId::new(1), "b1").as_slack());
        net.add_bus(Bus::new(BusId::new(2), "b2"));
        net.add_bus(Bus::new(BusId::new(3), "b3"));
        net.add_gen(Gen::new(GenId::new(1), "g1", BusId::new(1)).with_p_limits(0.0, 10.0));
        net.add_gen(
            Gen::new(GenId::new(2), "g2", BusId::new(3))
                .with_p_limits(0.0, 10.0)
                .out_of_service(),
        );
        for (k, (f, t)) in [(1, 2), (2, 3)].into_iter().enumerate() {
            net.add_branch(Branch::new(
                BranchId::new(k),
                format!("{f}-{t}"),
                BusId::new(f),
                BusId::new(t),
                0.05,
            ))
            .unwrap();
        }

        let problem = DcOpf::new().create_problem(&mut net).unwrap();
        assert_eq!(net.num_vars(), 3);
        assert_eq!(net.num_bounded(), 1);
        assert_eq!(problem.num_vars(), 3);
        assert_eq!(problem.num_buses(), 3);
        assert_eq!(problem.num_branches(), 2);
    }

    #[test]
    fn test_update_network_before_solve() {
        let mut net = Network::new();
        let method = DcOpf::new();
        assert_eq!(method.update_network(&mut net), Err(OpfError::NoProblem));
    }

    #[test]
    fn test_overrides_reach_solver_params() {
        let overrides = ParamOverrides::default().quiet(true).max_iter(7);
        let method = DcOpf::with_overrides(&overrides);
        assert!(method.params().quiet);
        assert_eq!(method.params().solver.max_iter, 7);
        assert_eq!(method.name(), "DCOPF");
    }
}
