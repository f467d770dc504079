//! DC OPF problem to standard-form QP.
//!
//! Variables are `y = (x, z)`: the flagged network variables `x` (non-slack
//! angles, adjustable generator outputs) and one slack `z` per branch carrying
//! its flow. The branch inequality `lz <= Gz x <= uz` becomes
//!
//! ```text
//! Gz x - z = 0,   lz <= z <= uz
//! ```
//!
//! so the QP only has equalities and box bounds:
//!
//! ```text
//! H = blkdiag(Hx, 0) / base      A = [ Ax   0 ]     b = [ bx ]
//! g = [gx; 0] / base                 [ Gz  -I ]         [ 0  ]
//! l = [lx; lz]                   u = [ux; uz]
//! ```
//!
//! The objective is divided by the system base so the QP works in per-unit
//! cost; `base * (0.5 yᵀHy + gᵀy)` recovers $/h.

use gridopt_core::{ConstraintKind, Network, Problem};
use sprs::CsMat;
use tracing::debug;

use super::dc_opf::DcOpf;
use super::error::{InvariantViolation, OpfError};
use crate::qp::QuadProblem;
use crate::sparse;

/// Absolute tolerance ($/h) of the objective reconstruction check.
pub const OBJECTIVE_TOL: f64 = 1e-8;

/// A DC OPF QP together with the blocks its invariants refer to.
#[derive(Debug, Clone)]
pub struct DcOpfQp {
    pub qp: QuadProblem,
    pub nx: usize,
    pub nz: usize,
    /// Initial point the objective was expanded around
    pub x0: Vec<f64>,
    /// Objective evaluated directly at `x0` ($/h)
    pub phi: f64,
    pub base_power: f64,
    /// Variable bound matrix, expected to be the identity
    pub gx: CsMat<f64>,
    /// Branch flow matrix
    pub gz: CsMat<f64>,
}

/// Network dimensions the QP must conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkDims {
    pub num_buses: usize,
    pub num_branches: usize,
}

impl NetworkDims {
    pub fn of(net: &Network) -> Self {
        Self {
            num_buses: net.num_buses(),
            num_branches: net.num_branches(),
        }
    }
}

/// Build the standard-form QP for an analyzed DC OPF problem and check it.
pub fn assemble_qp(net: &Network, problem: &mut Problem) -> Result<DcOpfQp, OpfError> {
    let x0 = problem.init_point().to_vec();
    problem.eval(&x0)?;

    let hx = sparse::symmetrize(&problem.hphi);
    let hx_x0 = sparse::mat_vec(&hx, &x0);
    let gx: Vec<f64> = problem
        .gphi
        .iter()
        .zip(&hx_x0)
        .map(|(g, hx0)| g - hx0)
        .collect();

    let analyzed: &Problem = problem;
    let find = move |kind| {
        analyzed.find_constraint(kind).ok_or_else(|| {
            OpfError::bad_problem(DcOpf::NAME, InvariantViolation::MissingConstraint(kind))
        })
    };
    let balance = find(ConstraintKind::DcPowerBalance)?;
    let flows = find(ConstraintKind::DcFlowLimit)?;
    let bounds = find(ConstraintKind::VariableBounds)?;

    if let Some(branch) = (0..flows.l.len()).find(|&k| flows.l[k] >= flows.u[k]) {
        return Err(OpfError::BadFlowLimits {
            method: DcOpf::NAME.into(),
            branch,
            lower: flows.l[branch],
            upper: flows.u[branch],
        });
    }
    if let Some(index) = (0..bounds.l.len()).find(|&j| bounds.l[j] >= bounds.u[j]) {
        return Err(OpfError::BadVarLimits {
            method: DcOpf::NAME.into(),
            index,
            lower: bounds.l[index],
            upper: bounds.u[index],
        });
    }

    let nx = x0.len();
    let nz = flows.g.rows();
    let n = nx + nz;
    let nbus = balance.a.rows();
    let base = net.base_power;

    let h = sparse::assemble((n, n), &[(0, 0, &sparse::scale(&hx, 1.0 / base))]);
    let mut g: Vec<f64> = gx.iter().map(|v| v / base).collect();
    g.resize(n, 0.0);

    let minus_eye = sparse::scaled_identity(nz, -1.0);
    let a = sparse::assemble(
        (nbus + nz, n),
        &[(0, 0, &balance.a), (nbus, 0, &flows.g), (nbus, nx, &minus_eye)],
    );
    let mut b = balance.b.clone();
    b.resize(nbus + nz, 0.0);

    let l: Vec<f64> = bounds.l.iter().chain(&flows.l).copied().collect();
    let u: Vec<f64> = bounds.u.iter().chain(&flows.u).copied().collect();

    let qp = QuadProblem::new(h, g, a, b, l, u).map_err(|e| OpfError::Solver {
        method: DcOpf::NAME.into(),
        source: e,
    })?;

    let assembled = DcOpfQp {
        qp,
        nx,
        nz,
        x0,
        phi: analyzed.phi,
        base_power: base,
        gx: bounds.g.clone(),
        gz: flows.g.clone(),
    };

    debug!(nx, nz, rows = nbus + nz, "assembled DC OPF QP");

    check_invariants(&assembled, NetworkDims::of(net))
        .map_err(|violation| OpfError::bad_problem(DcOpf::NAME, violation))?;
    Ok(assembled)
}

/// Structural and numerical checks on an assembled QP. Pure; reports the
/// first violated invariant.
pub fn check_invariants(q: &DcOpfQp, dims: NetworkDims) -> Result<(), InvariantViolation> {
    let nx = q.nx;
    let nz = q.nz;
    let n = nx + nz;

    if q.gx.shape() != (nx, nx) {
        return Err(InvariantViolation::BoundMatrixShape {
            rows: q.gx.rows(),
            cols: q.gx.cols(),
            n: nx,
        });
    }
    if !sparse::is_identity(&q.gx) {
        return Err(InvariantViolation::BoundMatrixNotIdentity);
    }
    if q.gz.shape() != (dims.num_branches, nx) {
        return Err(InvariantViolation::FlowMatrixShape {
            rows: q.gz.rows(),
            cols: q.gz.cols(),
            expected_rows: dims.num_branches,
            expected_cols: nx,
        });
    }

    let (l, u) = (&q.qp.l, &q.qp.u);
    if l.len() != n || u.len() != n {
        return Err(InvariantViolation::BoundLength {
            l: l.len(),
            u: u.len(),
            expected: n,
        });
    }
    if let Some(index) = (0..n).find(|&i| !(l[i] < u[i])) {
        return Err(InvariantViolation::BoundOrder {
            index,
            lower: l[index],
            upper: u[index],
        });
    }

    if q.qp.h.shape() != (n, n) {
        return Err(InvariantViolation::HessianShape {
            rows: q.qp.h.rows(),
            cols: q.qp.h.cols(),
            n,
        });
    }
    if q.qp.a.rows() != dims.num_buses + nz {
        return Err(InvariantViolation::EqualityRows {
            expected: dims.num_buses + nz,
            got: q.qp.a.rows(),
        });
    }

    let mut y = q.x0.clone();
    y.resize(n, 0.0);
    let reconstructed = q.base_power * q.qp.objective(&y);
    if !((q.phi - reconstructed).abs() < OBJECTIVE_TOL) {
        return Err(InvariantViolation::ObjectiveMismatch {
            direct: q.phi,
            reconstructed,
        });
    }

    Ok(())
}
