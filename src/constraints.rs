//! Penalty energy coupling pairs of rod segments.
//!
//! Each constraint contributes three residual rows √kc (p₁ − p₂), where pₖ is
//! the barycentric point on its segment.  Twist angles do not enter.

use crate::types::{Constraint, ResidualBlock, Rod, TermKind};
use nalgebra::Vector3;

/// Point on segment `seg` of `rod` at parameter `bary`, with the two end
/// vertices and their interpolation weights.
fn interpolate(rod: &Rod, seg: usize, bary: f64) -> (Vector3<f64>, [(usize, f64); 2]) {
    let (v0, v1) = rod.segment_vertices(seg);
    let s = &rod.cur_state;
    let p = s.vertex(v0) * (1.0 - bary) + s.vertex(v1) * bary;
    (p, [(v0, 1.0 - bary), (v1, bary)])
}

/// Residual rows of all constraints at the rods' current states.
///
/// `dof_offsets[k]` is the first global column of rod `k`.
pub fn constraint_residuals(
    rods: &[Rod],
    constraints: &[Constraint],
    stiffness: f64,
    dof_offsets: &[usize],
    row_offset: usize,
) -> ResidualBlock {
    let mut block = ResidualBlock::new(row_offset);
    let coeff = stiffness.sqrt();

    block.section(TermKind::Constraint, |block| {
        for c in constraints {
            let (p1, w1) = interpolate(&rods[c.rod1], c.seg1, c.bary1);
            let (p2, w2) = interpolate(&rods[c.rod2], c.seg2, c.bary2);
            let diff = p1 - p2;
            for d in 0..3 {
                let row = block.push(coeff * diff[d]);
                for &(v, w) in &w1 {
                    block.add(row, dof_offsets[c.rod1] + 3 * v + d, coeff * w);
                }
                for &(v, w) in &w2 {
                    block.add(row, dof_offsets[c.rod2] + 3 * v + d, -coeff * w);
                }
            }
        }
    });

    block
}

/// Total constraint energy with per-rod gradients.
#[derive(Debug, Clone)]
pub struct ConstraintEnergy {
    pub total: f64,
    /// Per rod: ∂E/∂centerline  (3·nv)
    pub d_centerline: Vec<Vec<f64>>,
    /// Per rod: ∂E/∂θ  (ns, always zero)
    pub d_theta: Vec<Vec<f64>>,
}

pub fn constraint_energy(rods: &[Rod], constraints: &[Constraint], stiffness: f64) -> ConstraintEnergy {
    let layout = crate::assembly::DofLayout::new(rods);
    let block = constraint_residuals(rods, constraints, stiffness, &layout.offsets, 0);
    let grad = block.gradient(0, layout.total);

    let mut d_centerline = Vec::with_capacity(rods.len());
    let mut d_theta = Vec::with_capacity(rods.len());
    for (rod, &off) in rods.iter().zip(&layout.offsets) {
        let nx = 3 * rod.num_vertices();
        d_centerline.push(grad[off..off + nx].to_vec());
        d_theta.push(grad[off + nx..off + rod.num_dofs()].to_vec());
    }

    ConstraintEnergy { total: block.energy(), d_centerline, d_theta }
}
