//! # gridopt-algo: DC Optimal Power Flow
//!
//! Optimization methods over [`gridopt_core::Network`]:
//!
//! | Method | Description | Problem Class |
//! |--------|-------------|---------------|
//! | [`DcOpf`] | Single-stage DC OPF | Convex QP |
//! | [`MsDcOpfGreedy`] | Multi-stage DC OPF, myopic policy | Sequence of QPs |
//! | [`MsDcOpfSha`] | Multi-stage DC OPF, stochastic hybrid approximation | Not implemented |
//!
//! ### Architecture
//!
//! - **[`opf::assemble_qp`]**: turns the network problem into a standard-form QP
//!   and runs [`opf::check_invariants`] on it
//! - **[`qp::QpSolver`]**: solves the QP; [`qp::IqpSolver`] is an interior-point
//!   method backed by Clarabel
//! - **[`PowerFlowMethod`]**: orchestrates a solve and keeps the results
//! - **[`stochastic::multi_stage`]**: multi-stage problems and policies built on
//!   the single-stage method
//!
//! ## Example
//!
//! ```ignore
//! use gridopt_algo::{DcOpf, PowerFlowMethod};
//!
//! let mut method = DcOpf::new();
//! method.solve(&mut network)?;
//! println!("status: {}", method.results().status);
//! method.update_network(&mut network)?;
//! ```

pub mod config;
pub mod opf;
pub mod qp;
pub mod sparse;
pub mod stochastic;

pub use config::{ConfigError, DcOpfParams, MsDcOpfParams, ParamOverrides, QpSolverParams};
pub use opf::{DcOpf, MethodResults, OpfError, PowerFlowMethod};
pub use qp::{DualVariables, IqpSolver, QpSolver, QpSolverError, QuadProblem, SolverStatus};
pub use stochastic::multi_stage::{
    run_policy, Forecast, GreedyPolicy, MsDcOpfGreedy, MsDcOpfProblem, MsDcOpfSha,
    MultiStageMethod, MultiStageProblem, Policy, PolicyError, RampConstraint, StageSolution,
};
