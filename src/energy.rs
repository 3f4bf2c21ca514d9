//! Discrete elastic rod energy, written as least-squares residual rows.
//!
//! Every stretching, bending, twisting and anchoring term is one (or a few)
//! residual rows r with energy ½r².  Derivatives are hand-coded:
//!
//!   stretching   r = √(ks·w/L) (|e| − L)
//!   bending      r = √(kb·w̄/2l̄) (κb·m₂ − κ̄, −κb·m₁ − κ̄)   per adjacent edge
//!   twisting     r = √(kt·w̄/l̄) (θ₊ − θ₋ + ψ − m̄)
//!   anchoring    r = √ka n·(x − c)
//!
//! Centerline derivatives assume each director follows its edge by
//! time-parallel transport, which is exactly how the line search moves them.
//! Under that rule the material frame of edge j varies as ∂m/∂e = −t mᵀ/|e|,
//! and since κb ⊥ t the frame terms drop out of the bending derivative.

use crate::types::{row3, RestShape, ResidualBlock, Rod, RodState, TermKind};
use nalgebra::{Rotation3, Unit, Vector3};
use std::f64::consts::PI;

/// Tangents shorter than this are treated as degenerate.
const DEGENERATE: f64 = 1e-14;

// ─────────────────────────────────────────────────────────────
//  Frames and discrete curvature
// ─────────────────────────────────────────────────────────────

/// Rotate `v` by the minimal rotation that takes direction `e1` to `e2`.
///
/// Zero-length or (anti)parallel tangents leave `v` unchanged.
pub fn parallel_transport(v: &Vector3<f64>, e1: &Vector3<f64>, e2: &Vector3<f64>) -> Vector3<f64> {
    let n1 = e1.norm();
    let n2 = e2.norm();
    if n1 < DEGENERATE || n2 < DEGENERATE {
        return *v;
    }
    let t1 = e1 / n1;
    let t2 = e2 / n2;
    let axis = t1.cross(&t2);
    let s = axis.norm();
    if s < DEGENERATE {
        return *v;
    }
    let angle = s.atan2(t1.dot(&t2));
    Rotation3::from_axis_angle(&Unit::new_unchecked(axis / s), angle).transform_vector(v)
}

/// Material frame of one segment.
#[derive(Debug, Clone, Copy)]
pub struct MaterialFrame {
    pub tangent: Vector3<f64>,
    /// Material normal  d cosθ + (t × d) sinθ.
    pub m1: Vector3<f64>,
    /// Material binormal  −d sinθ + (t × d) cosθ.
    pub m2: Vector3<f64>,
}

pub fn material_frame(edge: &Vector3<f64>, director: &Vector3<f64>, theta: f64) -> MaterialFrame {
    let n = edge.norm();
    let tangent = if n > 0.0 { edge / n } else { Vector3::zeros() };
    let u = tangent.cross(director);
    let (s, c) = theta.sin_cos();
    MaterialFrame {
        tangent,
        m1: director * c + u * s,
        m2: -director * s + u * c,
    }
}

/// Discrete curvature binormal  κb = 2 (a × b) / (|a||b| + a·b).
pub fn curvature_binormal(a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64> {
    let denom = a.norm() * b.norm() + a.dot(b);
    a.cross(b) * (2.0 / denom)
}

/// Signed angle about the next tangent from the transported previous
/// director to the next director (holonomy of the reference frame).
pub fn reference_twist(
    d_prev: &Vector3<f64>,
    e_prev: &Vector3<f64>,
    d_next: &Vector3<f64>,
    e_next: &Vector3<f64>,
) -> f64 {
    let transported = parallel_transport(d_prev, e_prev, e_next);
    let n = e_next.norm();
    if n < DEGENERATE {
        return 0.0;
    }
    let t = e_next / n;
    transported.cross(d_next).dot(&t).atan2(transported.dot(d_next))
}

/// Wrap an angle to (−π, π].
pub fn wrap_angle(x: f64) -> f64 {
    let y = (x + PI).rem_euclid(2.0 * PI) - PI;
    if y <= -PI { y + 2.0 * PI } else { y }
}

fn segment_vectors(state: &RodState, ns: usize) -> Vec<Vector3<f64>> {
    let nv = state.centerline.nrows();
    (0..ns).map(|i| state.vertex((i + 1) % nv) - state.vertex(i)).collect()
}

/// Material curvature of bending vertex (prev, next) as
/// `[prev.0, prev.1, next.0, next.1]`.
fn material_curvatures(state: &RodState, edges: &[Vector3<f64>], prev: usize, next: usize) -> [f64; 4] {
    let kb = curvature_binormal(&edges[prev], &edges[next]);
    let fp = material_frame(&edges[prev], &state.director(prev), state.thetas[prev]);
    let fn_ = material_frame(&edges[next], &state.director(next), state.thetas[next]);
    [kb.dot(&fp.m2), -kb.dot(&fp.m1), kb.dot(&fn_.m2), -kb.dot(&fn_.m1)]
}

fn twist(state: &RodState, edges: &[Vector3<f64>], prev: usize, next: usize) -> f64 {
    let psi = reference_twist(&state.director(prev), &edges[prev], &state.director(next), &edges[next]);
    state.thetas[next] - state.thetas[prev] + psi
}

/// Derive the rest shape of a rod from its start state.
pub fn rest_shape(state: &RodState, closed: bool) -> RestShape {
    let nv = state.centerline.nrows();
    let ns = crate::types::segment_count(nv, closed);
    let edges = segment_vectors(state, ns);
    let lengths: Vec<f64> = edges.iter().map(|e| e.norm()).collect();

    let bending: Vec<(usize, usize)> = if closed {
        (0..nv).map(|v| ((v + ns - 1) % ns, v)).collect()
    } else {
        (1..nv.saturating_sub(1)).map(|v| (v - 1, v)).collect()
    };

    RestShape {
        curvatures: bending.iter().map(|&(p, n)| material_curvatures(state, &edges, p, n)).collect(),
        twists: bending.iter().map(|&(p, n)| twist(state, &edges, p, n)).collect(),
        voronoi_lengths: bending.iter().map(|&(p, n)| 0.5 * (lengths[p] + lengths[n])).collect(),
        lengths,
    }
}

// ─────────────────────────────────────────────────────────────
//  Residual rows + Jacobian
// ─────────────────────────────────────────────────────────────

/// Residual rows of one rod evaluated at `state`.
///
/// Rows start at `row_offset`; centerline coordinate `(v, d)` maps to column
/// `col_offset + 3v + d` and twist angle `i` to `col_offset + 3nv + i`.
pub fn rod_residuals(rod: &Rod, state: &RodState, row_offset: usize, col_offset: usize) -> ResidualBlock {
    let nv = rod.num_vertices();
    let ns = rod.num_segments();
    let rest = rod.rest();
    let p = rod.params;
    let edges = segment_vectors(state, ns);
    let xcol = |v: usize| col_offset + 3 * v;
    let tcol = |s: usize| col_offset + 3 * nv + s;

    let mut block = ResidualBlock::new(row_offset);

    block.section(TermKind::Stretching, |block| {
        for i in 0..ns {
            let l = edges[i].norm();
            let rest_l = rest.lengths[i];
            let coeff = (p.kstretching * rod.widths[i] / rest_l).sqrt();
            let row = block.push(coeff * (l - rest_l));
            if l > 0.0 {
                let g = edges[i] * (coeff / l);
                let (v0, v1) = rod.segment_vertices(i);
                block.add_vec3(row, xcol(v1), &g);
                block.add_vec3(row, xcol(v0), &-g);
            }
        }
    });

    block.section(TermKind::Bending, |block| {
        for (k, (v, prev, next)) in rod.bending_vertices().enumerate() {
            let (a, b) = (edges[prev], edges[next]);
            let (la, lb) = (a.norm(), b.norm());
            let denom = la * lb + a.dot(&b);
            let kb = a.cross(&b) * (2.0 / denom);
            let wbar = 0.5 * (rod.widths[prev] + rod.widths[next]);
            let coeff = (p.kbending * wbar / (2.0 * rest.voronoi_lengths[k])).sqrt();
            let (vp, vn) = (prev, (v + 1) % nv);

            for (slot, seg) in [prev, next].into_iter().enumerate() {
                let frame = material_frame(&edges[seg], &state.director(seg), state.thetas[seg]);
                // (direction m with κ = κb·m, ∂κ/∂θ)
                let components = [
                    (frame.m2, -kb.dot(&frame.m1)),
                    (-frame.m1, -kb.dot(&frame.m2)),
                ];
                for (c, (m, dtheta)) in components.into_iter().enumerate() {
                    let kappa = kb.dot(&m);
                    let row = block.push(coeff * (kappa - rest.curvatures[k][2 * slot + c]));
                    let ga = (b.cross(&m) * 2.0 - (a * (lb / la) + b) * kappa) / denom;
                    let gb = (-a.cross(&m) * 2.0 - (b * (la / lb) + a) * kappa) / denom;
                    block.add_vec3(row, xcol(vp), &(-ga * coeff));
                    block.add_vec3(row, xcol(v), &((ga - gb) * coeff));
                    block.add_vec3(row, xcol(vn), &(gb * coeff));
                    block.add(row, tcol(seg), coeff * dtheta);
                }
            }
        }
    });

    block.section(TermKind::Twisting, |block| {
        for (k, (v, prev, next)) in rod.bending_vertices().enumerate() {
            let (a, b) = (edges[prev], edges[next]);
            let kb = curvature_binormal(&a, &b);
            let wbar = 0.5 * (rod.widths[prev] + rod.widths[next]);
            let coeff = (p.ktwist * wbar / rest.voronoi_lengths[k]).sqrt();
            let m = twist(state, &edges, prev, next);
            let row = block.push(coeff * wrap_angle(m - rest.twists[k]));

            let ga = kb / (2.0 * a.norm());
            let gb = kb / (2.0 * b.norm());
            block.add_vec3(row, xcol(prev), &(-ga * coeff));
            block.add_vec3(row, xcol(v), &((ga - gb) * coeff));
            block.add_vec3(row, xcol((v + 1) % nv), &(gb * coeff));
            block.add(row, tcol(next), coeff);
            block.add(row, tcol(prev), -coeff);
        }
    });

    if p.kanchor > 0.0 {
        if let (Some(normals), Some(centroids)) =
            (&state.closest_face_normals, &state.closest_face_centroids)
        {
            block.section(TermKind::Anchoring, |block| {
                let coeff = p.kanchor.sqrt();
                for v in 0..nv {
                    let n = row3(normals, v);
                    let c = row3(centroids, v);
                    let row = block.push(coeff * n.dot(&(state.vertex(v) - c)));
                    block.add_vec3(row, xcol(v), &(n * coeff));
                }
            });
        }
    }

    block
}

// ─────────────────────────────────────────────────────────────
//  Scalar energy + gradients
// ─────────────────────────────────────────────────────────────

/// Energy breakdown of one rod with gradients of the total.
#[derive(Debug, Clone)]
pub struct RodEnergy {
    pub total: f64,
    pub stretching: f64,
    pub bending: f64,
    pub twisting: f64,
    pub anchoring: f64,
    /// ∂E/∂centerline  (3·nv, vertex-major)
    pub d_centerline: Vec<f64>,
    /// ∂E/∂θ  (ns)
    pub d_theta: Vec<f64>,
}

/// Elastic energy of `rod` at `state`.
pub fn rod_energy(rod: &Rod, state: &RodState) -> RodEnergy {
    let block = rod_residuals(rod, state, 0, 0);
    let nx = 3 * rod.num_vertices();
    let grad = block.gradient(0, rod.num_dofs());
    RodEnergy {
        total: block.energy(),
        stretching: block.energy_of(TermKind::Stretching),
        bending: block.energy_of(TermKind::Bending),
        twisting: block.energy_of(TermKind::Twisting),
        anchoring: block.energy_of(TermKind::Anchoring),
        d_centerline: grad[..nx].to_vec(),
        d_theta: grad[nx..].to_vec(),
    }
}
