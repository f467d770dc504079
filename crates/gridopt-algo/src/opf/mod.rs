//! Optimal power flow methods
//!
//! - [`DcOpf`]: DC OPF as a standard-form QP solved by an interior-point method
//!
//! A method takes a mutable [`Network`] because building its problem resets the
//! network's variable flags. The physical state is only written by
//! [`PowerFlowMethod::update_network`].

mod dc_opf;
mod error;
mod qp_form;
mod types;

pub use dc_opf::DcOpf;
pub use error::{InvariantViolation, OpfError};
pub use qp_form::{assemble_qp, check_invariants, DcOpfQp, NetworkDims, OBJECTIVE_TOL};
pub use types::MethodResults;

use gridopt_core::Network;

/// A power flow method with results that outlive the `solve` call.
pub trait PowerFlowMethod {
    fn name(&self) -> &str;

    /// Solve for `net`, overwriting the previous results.
    fn solve(&mut self, net: &mut Network) -> Result<(), OpfError>;

    fn results(&self) -> &MethodResults;

    /// Write the last solution and its sensitivities into `net`.
    fn update_network(&self, net: &mut Network) -> Result<(), OpfError>;
}
