//! Multi-stage DC OPF and greedy policy tests

use std::cell::RefCell;

use gridopt_algo::{
    run_policy, Forecast, GreedyPolicy, MsDcOpfGreedy, MsDcOpfParams, MsDcOpfProblem,
    MsDcOpfSha, MultiStageMethod, MultiStageProblem, OpfError, ParamOverrides, Policy,
    PolicyError, RampConstraint, StageSolution,
};
use gridopt_core::{Branch, BranchId, Bus, BusId, CostModel, Gen, GenId, Load, LoadId, Network};

/// Arguments of one `solve_stages` call
#[derive(Debug, Clone, PartialEq)]
struct StageCall {
    t: usize,
    realizations: Vec<Vec<f64>>,
    x_prev: Vec<f64>,
    stop_stage: Option<usize>,
}

/// Scripted problem: the stage-t decision is `x_prev[0] + w[0]`.
struct MockProblem {
    num_stages: usize,
    feasible: bool,
    decisions_per_call: usize,
    fail_solve: bool,
    calls: RefCell<Vec<StageCall>>,
}

impl MockProblem {
    fn new(num_stages: usize) -> Self {
        Self {
            num_stages,
            feasible: true,
            decisions_per_call: 1,
            fail_solve: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn num_calls(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl MultiStageProblem for MockProblem {
    fn num_stages(&self) -> usize {
        self.num_stages
    }

    fn solve_stages(
        &self,
        t: usize,
        realizations: &[Vec<f64>],
        x_prev: &[f64],
        stop_stage: Option<usize>,
    ) -> Result<StageSolution, OpfError> {
        self.calls.borrow_mut().push(StageCall {
            t,
            realizations: realizations.to_vec(),
            x_prev: x_prev.to_vec(),
            stop_stage,
        });
        if self.fail_solve {
            return Err(OpfError::InvalidInput("scripted failure".into()));
        }
        let x = vec![x_prev[0] + realizations[0][0]];
        Ok(StageSolution {
            decisions: vec![x.clone(); self.decisions_per_call],
            values: vec![0.0; self.decisions_per_call],
            gradients: vec![vec![0.0]; self.decisions_per_call],
        })
    }

    fn is_point_feasible(&self, _t: usize, _x: &[f64], _x_prev: &[f64], _w: &[f64]) -> bool {
        self.feasible
    }
}

fn history(n: usize) -> Vec<Vec<f64>> {
    (0..n).map(|t| vec![t as f64 + 1.0]).collect()
}

#[test]
fn test_greedy_solves_only_current_stage() {
    let problem = MockProblem::new(3);
    let policy = GreedyPolicy::new(&problem);

    let x = policy.apply(1, &[10.0], &history(2)).unwrap();
    assert_eq!(x, vec![12.0]);

    let calls = problem.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        StageCall {
            t: 1,
            realizations: vec![vec![2.0]],
            x_prev: vec![10.0],
            stop_stage: Some(1),
        }
    );
}

#[test]
fn test_greedy_rejects_short_history_before_solving() {
    let problem = MockProblem::new(3);
    let policy = GreedyPolicy::new(&problem);

    let err = policy.apply(1, &[0.0], &history(1)).unwrap_err();
    assert_eq!(
        err,
        PolicyError::HistoryLength {
            t: 1,
            expected: 2,
            got: 1
        }
    );
    assert_eq!(problem.num_calls(), 0);
}

#[test]
fn test_greedy_rejects_stage_out_of_range() {
    let problem = MockProblem::new(3);
    let policy = GreedyPolicy::new(&problem);

    let err = policy.apply(3, &[0.0], &history(4)).unwrap_err();
    assert_eq!(err, PolicyError::StageOutOfRange { t: 3, num_stages: 3 });
    assert_eq!(problem.num_calls(), 0);
}

#[test]
fn test_greedy_reports_infeasible_decision() {
    let problem = MockProblem {
        feasible: false,
        ..MockProblem::new(3)
    };
    let policy = GreedyPolicy::new(&problem);

    let err = policy.apply(0, &[0.0], &history(1)).unwrap_err();
    assert_eq!(
        err,
        PolicyError::Infeasible {
            policy: "greedy".into(),
            t: 0
        }
    );
    assert_eq!(err.to_string(), "greedy: decision for stage 0 is infeasible");
    assert_eq!(problem.num_calls(), 1);
}

#[test]
fn test_greedy_rejects_multiple_decisions() {
    let problem = MockProblem {
        decisions_per_call: 2,
        ..MockProblem::new(2)
    };
    let policy = GreedyPolicy::new(&problem);
    assert_eq!(
        policy.apply(0, &[0.0], &history(1)),
        Err(PolicyError::UnexpectedDecisionCount { t: 0, got: 2 })
    );
}

#[test]
fn test_greedy_wraps_stage_errors() {
    let problem = MockProblem {
        fail_solve: true,
        ..MockProblem::new(2)
    };
    let policy = GreedyPolicy::new(&problem);
    let err = policy.apply(0, &[0.0], &history(1)).unwrap_err();
    assert!(matches!(
        err,
        PolicyError::Stage {
            t: 0,
            source: OpfError::InvalidInput(_)
        }
    ));
}

#[test]
fn test_run_policy_chains_decisions() {
    let problem = MockProblem::new(3);
    let policy = GreedyPolicy::new(&problem);

    let decisions = run_policy(&policy, &[0.5], &history(3)).unwrap();
    // 0.5 + 1, then + 2, then + 3
    assert_eq!(decisions, vec![vec![1.5], vec![3.5], vec![6.5]]);

    let prevs: Vec<Vec<f64>> = problem
        .calls
        .borrow()
        .iter()
        .map(|c| c.x_prev.clone())
        .collect();
    assert_eq!(prevs, vec![vec![0.5], vec![1.5], vec![3.5]]);
}

/// 3-bus triangle with a cheap ramp-limited unit and an expensive peaker.
/// Bus 1: slack, gen1 (0-100 MW, $10/MWh, starts at 20 MW)
/// Bus 2: gen2 (0-100 MW, $30/MWh)
/// Bus 3: load
fn create_ramp_network() -> Network {
    let mut net = Network::new();
    net.add_bus(Bus::new(BusId::new(1), "bus1").as_slack());
    net.add_bus(Bus::new(BusId::new(2), "bus2"));
    net.add_bus(Bus::new(BusId::new(3), "bus3"));

    net.add_gen(
        Gen::new(GenId::new(1), "gen1", BusId::new(1))
            .with_p_limits(0.0, 100.0)
            .with_output(20.0)
            .with_cost(CostModel::quadratic(0.0, 10.0, 0.001)),
    );
    net.add_gen(
        Gen::new(GenId::new(2), "gen2", BusId::new(2))
            .with_p_limits(0.0, 100.0)
            .with_output(20.0)
            .with_cost(CostModel::quadratic(0.0, 30.0, 0.001)),
    );
    net.add_load(Load::new(LoadId::new(1), "load3", BusId::new(3), 40.0));

    for (k, (f, t)) in [(1, 2), (2, 3), (1, 3)].into_iter().enumerate() {
        net.add_branch(
            Branch::new(
                BranchId::new(k),
                format!("line{f}_{t}"),
                BusId::new(f),
                BusId::new(t),
                0.1,
            )
            .with_rating(100.0),
        )
        .unwrap();
    }
    net
}

fn quiet_greedy() -> MsDcOpfGreedy {
    MsDcOpfGreedy::with_overrides(&ParamOverrides::default().quiet(true))
        .with_ramps(vec![RampConstraint::symmetric("gen1", 15.0)])
}

// decision layout: theta_2, theta_3, P_gen1, P_gen2
const GEN1: usize = 2;
const GEN2: usize = 3;

#[test]
fn test_greedy_dispatch_respects_ramps() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let net = create_ramp_network();
    let forecast = Forecast::new(vec![vec![40.0], vec![70.0], vec![90.0]]);
    let method = quiet_greedy();

    let problem = method.create_problem(&net, forecast.clone()).unwrap();
    let x0 = problem.initial_decision();
    assert_eq!(x0.len(), 4);
    assert!((x0[GEN1] - 0.2).abs() < 1e-12);

    let policy = method.solve(&net, forecast.clone()).unwrap();
    assert_eq!(policy.name(), "greedy");
    assert_eq!(policy.num_stages(), 3);

    let decisions = run_policy(policy.as_ref(), &x0, &forecast.loads_mw).unwrap();
    assert_eq!(decisions.len(), 3);

    // gen1 climbs 15 MW per stage; gen2 covers the rest
    let expected = [(35.0, 5.0), (50.0, 20.0), (65.0, 25.0)];
    let mut prev = x0[GEN1];
    for (t, (x, (p1, p2))) in decisions.iter().zip(expected).enumerate() {
        let gen1_mw = x[GEN1] * 100.0;
        let gen2_mw = x[GEN2] * 100.0;
        assert!((gen1_mw - p1).abs() < 1e-3, "stage {t}: gen1 at {gen1_mw} MW");
        assert!((gen2_mw - p2).abs() < 1e-3, "stage {t}: gen2 at {gen2_mw} MW");
        assert!(
            (x[GEN1] - prev).abs() <= 0.15 + 1e-6,
            "stage {t}: ramp violated"
        );
        prev = x[GEN1];
    }
}

#[test]
fn test_feasibility_check_catches_ramp_violation() {
    let net = create_ramp_network();
    let forecast = Forecast::new(vec![vec![40.0], vec![70.0]]);
    let problem = quiet_greedy().create_problem(&net, forecast).unwrap();
    let x0 = problem.initial_decision();

    let solution = problem
        .solve_stages(0, &problem.forecast().loads_mw[..1], &x0, Some(0))
        .unwrap();
    let x = &solution.decisions[0];
    assert!(problem.is_point_feasible(0, x, &x0, &[40.0]));

    // without ramps gen1 covers the whole 40 MW load: a point that satisfies
    // balance, flow and physical limits, but sits 5 MW above gen1's window
    let unramped = MsDcOpfProblem::new(
        &net,
        problem.forecast().clone(),
        Vec::new(),
        problem.params().clone(),
    )
    .unwrap();
    let free = unramped
        .solve_stages(0, &problem.forecast().loads_mw[..1], &x0, Some(0))
        .unwrap();
    let jumped = &free.decisions[0];
    assert!((jumped[GEN1] - 0.4).abs() < 1e-5, "gen1 at {}", jumped[GEN1]);
    assert!(unramped.is_point_feasible(0, jumped, &x0, &[40.0]));
    assert!(!problem.is_point_feasible(0, jumped, &x0, &[40.0]));

    // wrong length or stage
    assert!(!problem.is_point_feasible(0, &x[..2], &x0, &[40.0]));
    assert!(!problem.is_point_feasible(2, x, &x0, &[40.0]));
}

#[test]
fn test_solve_stages_to_horizon() {
    let net = create_ramp_network();
    let forecast = Forecast::new(vec![vec![40.0], vec![70.0], vec![90.0]]);
    let problem = MsDcOpfProblem::new(
        &net,
        forecast.clone(),
        vec![RampConstraint::symmetric("gen1", 15.0)],
        MsDcOpfParams::default(),
    )
    .unwrap();
    let x0 = problem.initial_decision();

    let solution = problem.solve_stages(0, &forecast.loads_mw, &x0, None).unwrap();
    assert_eq!(solution.decisions.len(), 3);
    assert_eq!(solution.values.len(), 3);
    assert!(solution.gradients.iter().all(|g| g.len() == 4));
    assert!(solution.values.windows(2).all(|v| v[1] > v[0]));

    // stage 0 cost: 10*35 + 0.001*35^2 + 30*5 + 0.001*5^2
    assert!((solution.values[0] - 501.25).abs() < 1e-2);

    let err = problem
        .solve_stages(2, &forecast.loads_mw, &x0, Some(1))
        .unwrap_err();
    assert!(matches!(err, OpfError::InvalidInput(_)));

    let err = problem
        .solve_stages(0, &forecast.loads_mw[..1], &x0, None)
        .unwrap_err();
    assert!(matches!(
        err,
        OpfError::ShapeMismatch {
            what: "realizations",
            ..
        }
    ));
}

#[test]
fn test_problem_construction_errors() {
    let net = create_ramp_network();
    let forecast = Forecast::new(vec![vec![40.0]]);

    let unknown = MsDcOpfGreedy::new().with_ramps(vec![RampConstraint::symmetric("gen9", 5.0)]);
    assert!(matches!(
        unknown.solve(&net, forecast.clone()),
        Err(OpfError::InvalidInput(_))
    ));

    let negative =
        MsDcOpfGreedy::new().with_ramps(vec![RampConstraint::asymmetric("gen1", 5.0, -1.0)]);
    assert!(negative.create_problem(&net, forecast.clone()).is_err());

    let wrong_width = Forecast::new(vec![vec![40.0, 10.0]]);
    assert!(matches!(
        MsDcOpfGreedy::new().solve(&net, wrong_width),
        Err(OpfError::InvalidInput(_))
    ));
}

#[test]
fn test_forecast_from_json() {
    let net = create_ramp_network();
    let forecast = Forecast::from_json_str(r#"{"loads_mw": [[40.0], [45.0]]}"#).unwrap();
    let problem = quiet_greedy().create_problem(&net, forecast).unwrap();
    assert_eq!(problem.num_stages(), 2);
    assert_eq!(problem.num_vars(), 4);
    assert!(problem.to_string().contains("stages:      2"));
}

#[test]
fn test_sha_is_not_implemented() {
    let net = create_ramp_network();
    let method = MsDcOpfSha::new();
    assert_eq!(method.name(), "MS-DCOPF-SHA");
    assert!(matches!(
        method.solve(&net, Forecast::new(vec![vec![40.0]])),
        Err(OpfError::NotImplemented(_))
    ));
}
