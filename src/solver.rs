//! Gauss–Newton direction from the regularized normal equations.
//!
//!   (JᵀJ + εI) δ = Jᵀr
//!
//! The configuration is then moved along −δ by the line search.

use crate::assembly::{mul_vec, norm, Residual};
use crate::types::{Factorization, RodError};
use sprs::{CsMat, TriMat};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GaussNewtonStep {
    pub delta: Vec<f64>,
    /// ‖(JᵀJ + εI)δ − Jᵀr‖
    pub solve_residual: f64,
}

/// JᵀJ + εI  (CSC, symmetric).
pub fn normal_matrix(jacobian: &CsMat<f64>, regularization: f64) -> CsMat<f64> {
    let n = jacobian.cols();
    let jt = jacobian.transpose_view().to_csc();
    let jtj = &jt * jacobian;

    let mut tri = TriMat::new((n, n));
    for (&val, (row, col)) in jtj.iter() {
        tri.add_triplet(row, col, val);
    }
    for i in 0..n {
        tri.add_triplet(i, i, regularization);
    }
    tri.to_csc()
}

/// Solve the regularized normal equations for the descent direction.
///
/// A non-positive-definite system is fatal for the step: the error is
/// returned and no direction is produced.
pub fn gauss_newton_step(residual: &Residual, regularization: f64) -> Result<GaussNewtonStep, RodError> {
    if residual.layout.total == 0 {
        return Ok(GaussNewtonStep { delta: Vec::new(), solve_residual: 0.0 });
    }

    let mat = normal_matrix(&residual.jacobian, regularization);
    let rhs = residual.gradient();

    let factorization = Factorization::new(mat.view())?;
    let delta = factorization.solve(&rhs);

    let mut lhs = mul_vec(&mat, &delta);
    for (l, b) in lhs.iter_mut().zip(&rhs) {
        *l -= b;
    }
    let solve_residual = norm(&lhs);
    debug!(dofs = delta.len(), solve_residual, "solved normal equations");

    Ok(GaussNewtonStep { delta, solve_residual })
}
