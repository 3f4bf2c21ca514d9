//! Global residual vector and sparse Jacobian.
//!
//! Rows are stacked rod by rod (stretching, bending, twisting, anchoring),
//! followed by all constraint rows.  Columns follow [`DofLayout`].

use crate::config::RodConfig;
use crate::constraints::constraint_residuals;
use crate::energy::rod_residuals;
use crate::types::{ResidualBlock, Rod};
use sprs::{CsMat, TriMat};

// ─────────────────────────────────────────────────────────────
//  Degree-of-freedom layout
// ─────────────────────────────────────────────────────────────

/// First global column of each rod, plus the total DOF count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofLayout {
    pub offsets: Vec<usize>,
    pub total: usize,
}

impl DofLayout {
    pub fn new(rods: &[Rod]) -> Self {
        let mut offsets = Vec::with_capacity(rods.len());
        let mut total = 0;
        for rod in rods {
            offsets.push(total);
            total += rod.num_dofs();
        }
        Self { offsets, total }
    }
}

// ─────────────────────────────────────────────────────────────
//  Stacked residual
// ─────────────────────────────────────────────────────────────

/// r and J = ∂r/∂q for a whole configuration.
#[derive(Debug, Clone)]
pub struct Residual {
    pub values: Vec<f64>,
    /// CSC, len(values) × layout.total
    pub jacobian: CsMat<f64>,
    pub layout: DofLayout,
}

impl Residual {
    /// ½‖r‖²
    pub fn objective(&self) -> f64 {
        0.5 * self.values.iter().map(|r| r * r).sum::<f64>()
    }

    /// ∇(½‖r‖²) = Jᵀr
    pub fn gradient(&self) -> Vec<f64> {
        transpose_mul(&self.jacobian, &self.values)
    }
}

/// Evaluate every residual block of `config` and stack them.
pub fn assemble(config: &RodConfig) -> Residual {
    let layout = DofLayout::new(&config.rods);

    let mut blocks: Vec<ResidualBlock> = Vec::with_capacity(config.rods.len() + 1);
    let mut row = 0;
    for (rod, &col) in config.rods.iter().zip(&layout.offsets) {
        let block = rod_residuals(rod, &rod.cur_state, row, col);
        row += block.len();
        blocks.push(block);
    }
    let block = constraint_residuals(
        &config.rods,
        config.constraints(),
        config.constraint_stiffness,
        &layout.offsets,
        row,
    );
    row += block.len();
    blocks.push(block);

    let mut values = Vec::with_capacity(row);
    let mut tri = TriMat::new((row, layout.total));
    for block in &blocks {
        values.extend_from_slice(&block.residuals);
        for &(r, c, v) in &block.triplets {
            tri.add_triplet(r, c, v);
        }
    }

    Residual { values, jacobian: tri.to_csc(), layout }
}

// ─────────────────────────────────────────────────────────────
//  Sparse × dense helpers
// ─────────────────────────────────────────────────────────────

/// out = A x
pub fn mul_vec(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.rows()];
    for (&val, (row, col)) in a.iter() {
        out[row] += val * x[col];
    }
    out
}

/// out = Aᵀ x
pub fn transpose_mul(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.cols()];
    for (&val, (row, col)) in a.iter() {
        out[col] += val * x[row];
    }
    out
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
