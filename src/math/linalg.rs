//! Small dense linear algebra for fit covariances.
//!
//! After a minimisation we estimate the parameter covariance as the inverse of
//! the finite-difference Hessian of the NLL:
//!
//! ```text
//! C = H^{-1},   H_ij = ∂²NLL / ∂θ_i ∂θ_j
//! ```
//!
//! Randomized restarts then draw `θ = θ̂ + L z` with `C = L Lᵀ` and `z ~ N(0, 1)`.
//!
//! Implementation choices:
//! - Cholesky is both the positive-definiteness check and the factorization we
//!   need for sampling; a Hessian that is not positive definite yields `None`
//!   and callers fall back to a diagonal width.
//! - Parameter dimensions are tiny (≤ 7), so dense nalgebra matrices are fine.

use nalgebra::DMatrix;

fn to_matrix(rows: &[Vec<f64>]) -> Option<DMatrix<f64>> {
    let n = rows.len();
    if n == 0 || rows.iter().any(|r| r.len() != n) {
        return None;
    }
    Some(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}

fn to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

/// Invert a symmetric positive-definite Hessian into a covariance matrix.
///
/// Returns `None` if the matrix is not positive definite or the inverse is not finite.
pub fn covariance_from_hessian(hessian: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let h = to_matrix(hessian)?;
    // Symmetrize away finite-difference noise.
    let h = (&h + h.transpose()) * 0.5;
    let chol = h.cholesky()?;
    let cov = chol.inverse();
    if cov.iter().all(|v| v.is_finite()) {
        Some(to_rows(&cov))
    } else {
        None
    }
}

/// Lower-triangular Cholesky factor `L` of a covariance matrix.
pub fn cholesky_lower(cov: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let c = to_matrix(cov)?;
    let chol = c.cholesky()?;
    Some(to_rows(&chol.l()))
}
