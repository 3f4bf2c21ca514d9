//! Closest-face queries against a static target surface.
//!
//! Faces are indexed by a bounding-volume hierarchy (median split on the
//! longest centroid axis).  Queries descend nearer children first and prune
//! any node whose box is farther than the best face found so far.

use crate::obj::read_obj;
use crate::types::{set_row3, RodError, RodState};
use nalgebra::{Point3, Vector3};
use ndarray::Array2;
use std::path::Path;

const LEAF_SIZE: usize = 4;

// ─────────────────────────────────────────────────────────────
//  Bounding boxes
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    fn expand_point(&mut self, p: &Point3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    fn expand(&mut self, other: &Self) {
        self.expand_point(&other.min);
        self.expand_point(&other.max);
    }

    fn longest_axis(&self) -> usize {
        (self.max - self.min).imax()
    }

    /// Squared distance from `p` to the box (0 inside).
    fn distance_squared(&self, p: &Point3<f64>) -> f64 {
        let mut d = 0.0;
        for k in 0..3 {
            let excess = (self.min[k] - p[k]).max(p[k] - self.max[k]).max(0.0);
            d += excess * excess;
        }
        d
    }
}

#[derive(Debug)]
enum BvhNode {
    Leaf { bbox: Aabb, faces: Vec<usize> },
    Internal { bbox: Aabb, left: Box<BvhNode>, right: Box<BvhNode> },
}

impl BvhNode {
    fn bbox(&self) -> &Aabb {
        match self {
            Self::Leaf { bbox, .. } | Self::Internal { bbox, .. } => bbox,
        }
    }

    fn build(faces: &mut [usize], boxes: &[Aabb], centroids: &[Point3<f64>]) -> Self {
        let mut bbox = Aabb::empty();
        let mut spread = Aabb::empty();
        for &f in faces.iter() {
            bbox.expand(&boxes[f]);
            spread.expand_point(&centroids[f]);
        }
        if faces.len() <= LEAF_SIZE {
            return Self::Leaf { bbox, faces: faces.to_vec() };
        }

        let axis = spread.longest_axis();
        let mid = faces.len() / 2;
        faces.select_nth_unstable_by(mid, |&a, &b| centroids[a][axis].total_cmp(&centroids[b][axis]));
        let (lo, hi) = faces.split_at_mut(mid);
        Self::Internal {
            bbox,
            left: Box::new(Self::build(lo, boxes, centroids)),
            right: Box::new(Self::build(hi, boxes, centroids)),
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Target surface
// ─────────────────────────────────────────────────────────────

/// Result of a closest-face query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestFace {
    pub face: usize,
    pub point: Point3<f64>,
    pub distance_squared: f64,
}

/// Immutable triangle mesh with its face hierarchy.
#[derive(Debug)]
pub struct TargetSurface {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
    normals: Vec<Vector3<f64>>,
    centroids: Vec<Point3<f64>>,
    root: BvhNode,
}

impl TargetSurface {
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<[usize; 3]>) -> Result<Self, RodError> {
        if faces.is_empty() {
            return Err(RodError::Mesh("target mesh has no faces".into()));
        }
        if let Some(f) = faces.iter().position(|f| f.iter().any(|&v| v >= vertices.len())) {
            return Err(RodError::Mesh(format!("face {f} references a missing vertex")));
        }

        let vertices: Vec<Point3<f64>> = vertices.into_iter().map(Point3::from).collect();
        let corners = |f: &[usize; 3]| (vertices[f[0]], vertices[f[1]], vertices[f[2]]);

        let normals = faces
            .iter()
            .map(|f| {
                let (a, b, c) = corners(f);
                (b - a).cross(&(c - a)).try_normalize(0.0).unwrap_or_else(Vector3::zeros)
            })
            .collect();
        let centroids: Vec<Point3<f64>> = faces
            .iter()
            .map(|f| {
                let (a, b, c) = corners(f);
                Point3::from((a.coords + b.coords + c.coords) / 3.0)
            })
            .collect();
        let boxes: Vec<Aabb> = faces
            .iter()
            .map(|f| {
                let mut bb = Aabb::empty();
                for &v in f {
                    bb.expand_point(&vertices[v]);
                }
                bb
            })
            .collect();

        let mut order: Vec<usize> = (0..faces.len()).collect();
        let root = BvhNode::build(&mut order, &boxes, &centroids);

        Ok(Self { vertices, faces, normals, centroids, root })
    }

    /// Read an OBJ file and index it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RodError> {
        let mesh = read_obj(path)?;
        Self::new(mesh.vertices, mesh.faces)
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Unit normal of face `f` (zero for degenerate faces).
    pub fn face_normal(&self, f: usize) -> Vector3<f64> {
        self.normals[f]
    }

    pub fn face_centroid(&self, f: usize) -> Point3<f64> {
        self.centroids[f]
    }

    /// `None` only for a query point with non-finite coordinates.
    pub fn closest_face(&self, p: &Point3<f64>) -> Option<ClosestFace> {
        let mut best = ClosestFace { face: usize::MAX, point: *p, distance_squared: f64::INFINITY };
        self.search(&self.root, p, &mut best);
        (best.face != usize::MAX).then_some(best)
    }

    fn search(&self, node: &BvhNode, p: &Point3<f64>, best: &mut ClosestFace) {
        if node.bbox().distance_squared(p) >= best.distance_squared {
            return;
        }
        match node {
            BvhNode::Leaf { faces, .. } => {
                for &f in faces {
                    let [a, b, c] = self.faces[f];
                    let q = closest_point_on_triangle(p, &self.vertices[a], &self.vertices[b], &self.vertices[c]);
                    let d = (q - p).norm_squared();
                    if d < best.distance_squared {
                        *best = ClosestFace { face: f, point: q, distance_squared: d };
                    }
                }
            }
            BvhNode::Internal { left, right, .. } => {
                let (near, far) = if left.bbox().distance_squared(p) <= right.bbox().distance_squared(p) {
                    (left, right)
                } else {
                    (right, left)
                };
                self.search(near, p, best);
                self.search(far, p, best);
            }
        }
    }
}

/// Closest point to `p` on triangle (a, b, c), by Voronoi region.
pub fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Cache, for every vertex of `state`, the normal and centroid of its
/// closest target face.
pub fn project_state(state: &mut RodState, surface: &TargetSurface) {
    let nv = state.centerline.nrows();
    let mut normals = Array2::zeros((nv, 3));
    let mut centroids = Array2::zeros((nv, 3));
    for v in 0..nv {
        if let Some(hit) = surface.closest_face(&Point3::from(state.vertex(v))) {
            set_row3(&mut normals, v, &surface.face_normal(hit.face));
            set_row3(&mut centroids, v, &surface.face_centroid(hit.face).coords);
        }
    }
    state.closest_face_normals = Some(normals);
    state.closest_face_centroids = Some(centroids);
}
