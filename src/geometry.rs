//! Ribbon surfaces for export.
//!
//! Each centerline vertex becomes two vertices offset by ± half the width
//! along the material binormal; each segment becomes two triangles.

use crate::energy::material_frame;
use crate::types::{Rod, RodState};
use nalgebra::Vector3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RibbonMesh {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[usize; 3]>,
}

/// Material binormal of every segment of `rod` at `state`.
pub fn material_binormals(rod: &Rod, state: &RodState) -> Vec<Vector3<f64>> {
    (0..rod.num_segments())
        .map(|i| {
            let (v0, v1) = rod.segment_vertices(i);
            let edge = state.vertex(v1) - state.vertex(v0);
            material_frame(&edge, &state.director(i), state.thetas[i]).m2
        })
        .collect()
}

pub fn ribbon_mesh(rod: &Rod, state: &RodState) -> RibbonMesh {
    let nv = rod.num_vertices();
    let ns = rod.num_segments();
    let binormals = material_binormals(rod, state);

    let mut vertices = Vec::with_capacity(2 * nv);
    for v in 0..nv {
        let adjacent: Vec<usize> = if rod.is_closed() {
            vec![(v + ns - 1) % ns, v]
        } else if v == 0 {
            vec![0]
        } else if v == nv - 1 {
            vec![ns - 1]
        } else {
            vec![v - 1, v]
        };

        let sum: Vector3<f64> = adjacent.iter().map(|&s| binormals[s]).sum();
        let b = sum.try_normalize(0.0).unwrap_or(binormals[adjacent[0]]);
        let half = adjacent.iter().map(|&s| rod.widths[s]).sum::<f64>() / (2 * adjacent.len()) as f64;

        let x = state.vertex(v);
        let lo = x - b * half;
        let hi = x + b * half;
        vertices.push([lo.x, lo.y, lo.z]);
        vertices.push([hi.x, hi.y, hi.z]);
    }

    let mut faces = Vec::with_capacity(2 * ns);
    for i in 0..ns {
        let (a, b) = rod.segment_vertices(i);
        faces.push([2 * a, 2 * a + 1, 2 * b]);
        faces.push([2 * b, 2 * a + 1, 2 * b + 1]);
    }

    RibbonMesh { vertices, faces }
}
