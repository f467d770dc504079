//! Sparse matrix helpers for QP assembly.
//!
//! Matrices coming out of `gridopt-core` may be stored in either CSR or CSC
//! order, so everything here walks entries through `CsMat::iter` and rebuilds
//! through `TriMat`.

use sprs::{CsMat, TriMat};

/// `y = M x`
pub fn mat_vec(m: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; m.rows()];
    for (&v, (i, j)) in m.iter() {
        y[i] += v * x[j];
    }
    y
}

/// Full symmetric matrix from a triangle-stored one: `M + Mᵀ - triu(M)`.
///
/// With `M` holding the lower triangle (diagonal included), `triu(M)` is the
/// diagonal, so it is counted once.
pub fn symmetrize(m: &CsMat<f64>) -> CsMat<f64> {
    let mut tri = TriMat::new((m.rows(), m.cols()));
    for (&v, (i, j)) in m.iter() {
        tri.add_triplet(i, j, v);
        tri.add_triplet(j, i, v);
        if i <= j {
            tri.add_triplet(i, j, -v);
        }
    }
    drop_zeros(&tri.to_csc())
}

/// Upper triangle (diagonal included).
pub fn triu(m: &CsMat<f64>) -> CsMat<f64> {
    let mut tri = TriMat::new((m.rows(), m.cols()));
    for (&v, (i, j)) in m.iter() {
        if i <= j {
            tri.add_triplet(i, j, v);
        }
    }
    tri.to_csc()
}

/// `alpha * M`
pub fn scale(m: &CsMat<f64>, alpha: f64) -> CsMat<f64> {
    m.map(|v| v * alpha)
}

/// `alpha * I` of size `n`
pub fn scaled_identity(n: usize, alpha: f64) -> CsMat<f64> {
    let mut tri = TriMat::new((n, n));
    for i in 0..n {
        tri.add_triplet(i, i, alpha);
    }
    tri.to_csc()
}

/// Assemble a `shape` matrix from blocks placed at `(row, col)` offsets.
pub fn assemble(shape: (usize, usize), blocks: &[(usize, usize, &CsMat<f64>)]) -> CsMat<f64> {
    let mut tri = TriMat::new(shape);
    for &(r0, c0, block) in blocks {
        for (&v, (i, j)) in block.iter() {
            tri.add_triplet(r0 + i, c0 + j, v);
        }
    }
    tri.to_csc()
}

/// True if `m` is square and has exactly the unit diagonal as its nonzeros.
pub fn is_identity(m: &CsMat<f64>) -> bool {
    if m.rows() != m.cols() {
        return false;
    }
    let mut seen = vec![false; m.rows()];
    for (&v, (i, j)) in m.iter() {
        if v == 0.0 {
            continue;
        }
        if i != j || v != 1.0 || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    seen.into_iter().all(|s| s)
}

/// Copy of `m` without explicitly stored zeros.
pub fn drop_zeros(m: &CsMat<f64>) -> CsMat<f64> {
    let mut tri = TriMat::new((m.rows(), m.cols()));
    for (&v, (i, j)) in m.iter() {
        if v != 0.0 {
            tri.add_triplet(i, j, v);
        }
    }
    tri.to_csc()
}

/// `0.5 yᵀ H y + gᵀ y` for a full symmetric `H`.
pub fn quadratic_form(h: &CsMat<f64>, g: &[f64], y: &[f64]) -> f64 {
    let hy = mat_vec(h, y);
    let quad: f64 = hy.iter().zip(y).map(|(a, b)| a * b).sum();
    let lin: f64 = g.iter().zip(y).map(|(a, b)| a * b).sum();
    0.5 * quad + lin
}
