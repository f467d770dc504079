//! Interior-point QP solver backed by Clarabel.
//!
//! Clarabel solves conic programs
//!
//! ```text
//! minimize    0.5 xᵀ P x + qᵀ x
//! subject to  A x + s = b,  s ∈ K
//! ```
//!
//! A standard-form QP maps onto it with
//! - the equality rows `A x = b` in a zero cone
//! - one nonnegative-cone row `x_j + s = u_j` per finite upper bound
//! - one nonnegative-cone row `-x_j + s = -l_j` per finite lower bound
//!
//! `P` must be upper triangular. With Clarabel's dual `z`, the multipliers
//! in our convention are `λ = -z_eq`, `μ = z_upper`, `π = z_lower`.

use ::clarabel::algebra::CscMatrix;
use ::clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus as ClarabelStatus,
    SupportedConeT,
};
use sprs::CsMat;
use tracing::debug;

use super::{DualVariables, QpSolver, QpSolverError, QuadProblem, SolverStatus};
use crate::config::QpSolverParams;
use crate::sparse;

/// Interior-point QP solver.
pub struct IqpSolver {
    params: QpSolverParams,
    status: SolverStatus,
    error_msg: String,
    iterations: usize,
    x: Vec<f64>,
    duals: DualVariables,
}

impl Default for IqpSolver {
    fn default() -> Self {
        Self::new(QpSolverParams::default())
    }
}

impl IqpSolver {
    pub fn new(params: QpSolverParams) -> Self {
        Self {
            params,
            status: SolverStatus::Unknown,
            error_msg: String::new(),
            iterations: 0,
            x: Vec::new(),
            duals: DualVariables::default(),
        }
    }

    pub fn params(&self) -> &QpSolverParams {
        &self.params
    }

    fn reset(&mut self) {
        self.status = SolverStatus::Unknown;
        self.error_msg.clear();
        self.iterations = 0;
        self.x.clear();
        self.duals = DualVariables::default();
    }

    fn fail(&mut self, err: QpSolverError) -> QpSolverError {
        self.status = SolverStatus::Error;
        self.error_msg = err.to_string();
        err
    }
}

/// CSC conversion for Clarabel, whatever the storage order of `m`.
fn to_csc(m: &CsMat<f64>) -> CscMatrix<f64> {
    let mut cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); m.cols()];
    for (&v, (i, j)) in m.iter() {
        cols[j].push((i, v));
    }

    let mut col_ptr = Vec::with_capacity(m.cols() + 1);
    let mut row_idx = Vec::with_capacity(m.nnz());
    let mut values = Vec::with_capacity(m.nnz());
    for col in &mut cols {
        col_ptr.push(row_idx.len());
        // Clarabel requires sorted row indices within a column
        col.sort_by_key(|(r, _)| *r);
        for &(r, v) in col.iter() {
            row_idx.push(r);
            values.push(v);
        }
    }
    col_ptr.push(row_idx.len());

    CscMatrix::new(m.rows(), m.cols(), col_ptr, row_idx, values)
}

/// Constraint rows and cones for Clarabel, plus which bound each
/// inequality row came from.
struct ConicRows {
    a: CsMat<f64>,
    b: Vec<f64>,
    cones: Vec<SupportedConeT<f64>>,
    upper_rows: Vec<(usize, usize)>,
    lower_rows: Vec<(usize, usize)>,
}

fn conic_rows(qp: &QuadProblem) -> ConicRows {
    let n = qp.n();
    let m = qp.m();
    let mut triplets: Vec<(usize, usize, f64)> =
        qp.a.iter().map(|(&v, (i, j))| (i, j, v)).collect();
    let mut b = qp.b.clone();
    let mut upper_rows = Vec::new();
    let mut lower_rows = Vec::new();

    for j in 0..n {
        if qp.u[j].is_finite() {
            let row = b.len();
            triplets.push((row, j, 1.0));
            b.push(qp.u[j]);
            upper_rows.push((row, j));
        }
    }
    for j in 0..n {
        if qp.l[j].is_finite() {
            let row = b.len();
            triplets.push((row, j, -1.0));
            b.push(-qp.l[j]);
            lower_rows.push((row, j));
        }
    }

    let mut tri = sprs::TriMat::new((b.len(), n));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }

    let mut cones = Vec::new();
    if m > 0 {
        cones.push(SupportedConeT::ZeroConeT(m));
    }
    let num_ineq = upper_rows.len() + lower_rows.len();
    if num_ineq > 0 {
        cones.push(SupportedConeT::NonnegativeConeT(num_ineq));
    }

    ConicRows {
        a: tri.to_csc(),
        b,
        cones,
        upper_rows,
        lower_rows,
    }
}

impl QpSolver for IqpSolver {
    fn name(&self) -> &str {
        "iqp"
    }

    fn solve(&mut self, qp: &QuadProblem) -> Result<(), QpSolverError> {
        self.reset();

        let n = qp.n();
        let m = qp.m();
        let p = to_csc(&sparse::triu(&qp.h));
        let rows = conic_rows(qp);
        let a = to_csc(&rows.a);

        debug!(
            n,
            m,
            inequalities = rows.upper_rows.len() + rows.lower_rows.len(),
            "clarabel QP"
        );

        let settings = DefaultSettingsBuilder::default()
            .verbose(self.params.verbose)
            .max_iter(self.params.max_iter)
            .tol_gap_abs(self.params.tol)
            .tol_gap_rel(self.params.tol)
            .tol_feas(self.params.tol)
            .build()
            .map_err(|e| self.fail(QpSolverError::Setup(format!("{:?}", e))))?;

        let mut solver = DefaultSolver::new(&p, &qp.g, &a, &rows.b, &rows.cones, settings)
            .map_err(|e| self.fail(QpSolverError::Setup(format!("{:?}", e))))?;

        solver.solve();

        let sol = solver.solution;
        self.iterations = sol.iterations as usize;
        self.x = sol.x.clone();

        let z = &sol.z;
        let mut mu = vec![0.0; n];
        let mut pi = vec![0.0; n];
        for &(row, j) in &rows.upper_rows {
            mu[j] = z[row];
        }
        for &(row, j) in &rows.lower_rows {
            pi[j] = z[row];
        }
        self.duals = DualVariables {
            lam: z[..m].iter().map(|v| -v).collect(),
            nu: None,
            mu,
            pi,
        };

        match sol.status {
            ClarabelStatus::Solved | ClarabelStatus::AlmostSolved => {
                self.status = SolverStatus::Solved;
                Ok(())
            }
            status => Err(self.fail(QpSolverError::Failed {
                status: format!("{:?}", status),
                iterations: self.iterations,
            })),
        }
    }

    fn status(&self) -> SolverStatus {
        self.status
    }

    fn error_msg(&self) -> &str {
        &self.error_msg
    }

    fn iterations(&self) -> usize {
        self.iterations
    }

    fn primal_variables(&self) -> &[f64] {
        &self.x
    }

    fn dual_variables(&self) -> &DualVariables {
        &self.duals
    }
}
