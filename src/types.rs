use nalgebra::Vector3;
use ndarray::Array2;
use sprs::{CsMatView, FillInReduction, SymmetryCheck};
use sprs_ldl::{Ldl, LdlNumeric};
use std::ops::Range;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────
//  Error type
// ─────────────────────────────────────────────────────────────

/// Unified error type for all fallible operations in the crate.
///
/// Malformed constraints are not represented here: they are caller defects
/// and are rejected by assertions in [`crate::config::RodConfig::add_constraint`].
#[derive(Debug, Error)]
pub enum RodError {
    /// Sparse factorization failure (structurally singular matrix, etc.).
    #[error("linear algebra error: {0}")]
    Linalg(#[from] sprs::errors::LinalgError),
    /// The regularized normal equations have a non-positive pivot.
    #[error("normal equations are not positive definite (pivot {index} = {pivot:e})")]
    NotPositiveDefinite { index: usize, pivot: f64 },
    /// Inconsistent array sizes in rod or state data.
    #[error("shape error: {0}")]
    Shape(String),
    /// Malformed or unusable target surface.
    #[error("target mesh error: {0}")]
    Mesh(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ─────────────────────────────────────────────────────────────
//  Elastic parameters
// ─────────────────────────────────────────────────────────────

/// Material constants of one rod.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RodParams {
    /// Cross-section thickness (used for export only).
    pub thickness: f64,
    pub kstretching: f64,
    pub kbending: f64,
    pub ktwist: f64,
    /// Weight of the attraction toward the cached target-surface plane.
    pub kanchor: f64,
}

impl Default for RodParams {
    fn default() -> Self {
        Self {
            thickness: 1e-2,
            kstretching: 1.0,
            kbending: 1.0,
            ktwist: 1.0,
            kanchor: 0.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Kinematic state
// ─────────────────────────────────────────────────────────────

/// Centerline, reference directors and twist angles of one rod.
#[derive(Debug, Clone, PartialEq)]
pub struct RodState {
    /// Vertex positions (nv × 3).
    pub centerline: Array2<f64>,
    /// Unit reference director per segment (ns × 3).
    pub directors: Array2<f64>,
    /// Material-frame rotation about each segment, relative to its director.
    pub thetas: Vec<f64>,
    /// Unit normal of the closest target face, per vertex (nv × 3).
    pub closest_face_normals: Option<Array2<f64>>,
    /// Centroid of the closest target face, per vertex (nv × 3).
    pub closest_face_centroids: Option<Array2<f64>>,
}

impl RodState {
    pub fn new(centerline: Array2<f64>, directors: Array2<f64>, thetas: Vec<f64>) -> Self {
        Self {
            centerline,
            directors,
            thetas,
            closest_face_normals: None,
            closest_face_centroids: None,
        }
    }

    /// Build a twist-free state from vertex positions alone.
    ///
    /// The first director is an arbitrary unit vector perpendicular to the
    /// first segment; every following director is its predecessor carried
    /// along the centerline by parallel transport.
    pub fn from_centerline(centerline: Array2<f64>, closed: bool) -> Result<Self, RodError> {
        if centerline.ncols() != 3 {
            return Err(RodError::Shape(format!(
                "centerline must have 3 columns, got {}",
                centerline.ncols()
            )));
        }
        let nv = centerline.nrows();
        let ns = segment_count(nv, closed);
        if ns == 0 {
            return Err(RodError::Shape(format!("{nv} vertices do not form a segment")));
        }

        let edge = |i: usize| row3(&centerline, (i + 1) % nv) - row3(&centerline, i);
        let mut directors = Array2::zeros((ns, 3));

        let t0 = edge(0);
        if t0.norm() == 0.0 {
            return Err(RodError::Shape("first segment has zero length".into()));
        }
        let t0 = t0.normalize();
        // Cross with the axis least aligned with the tangent.
        let axis = t0.iamin();
        let mut seed = Vector3::zeros();
        seed[axis] = 1.0;
        let mut d = t0.cross(&seed).normalize();
        set_row3(&mut directors, 0, &d);

        for i in 1..ns {
            let t = edge(i);
            d = crate::energy::parallel_transport(&d, &edge(i - 1), &t);
            let tn = t.norm();
            if tn > 0.0 {
                let t = t / tn;
                d -= t * d.dot(&t);
            }
            d.normalize_mut();
            set_row3(&mut directors, i, &d);
        }

        Ok(Self::new(centerline, directors, vec![0.0; ns]))
    }

    pub fn vertex(&self, i: usize) -> Vector3<f64> {
        row3(&self.centerline, i)
    }

    pub fn director(&self, i: usize) -> Vector3<f64> {
        row3(&self.directors, i)
    }

    pub fn set_vertex(&mut self, i: usize, v: &Vector3<f64>) {
        set_row3(&mut self.centerline, i, v);
    }

    pub fn set_director(&mut self, i: usize, d: &Vector3<f64>) {
        set_row3(&mut self.directors, i, d);
    }

    pub fn has_projection(&self) -> bool {
        self.closest_face_normals.is_some() && self.closest_face_centroids.is_some()
    }
}

/// Row `i` of an n × 3 array as a vector.
#[inline]
pub fn row3(a: &Array2<f64>, i: usize) -> Vector3<f64> {
    Vector3::new(a[[i, 0]], a[[i, 1]], a[[i, 2]])
}

#[inline]
pub fn set_row3(a: &mut Array2<f64>, i: usize, v: &Vector3<f64>) {
    for d in 0..3 {
        a[[i, d]] = v[d];
    }
}

/// Number of segments of a chain with `nv` vertices.
#[inline]
pub fn segment_count(nv: usize, closed: bool) -> usize {
    if closed {
        if nv >= 3 { nv } else { 0 }
    } else {
        nv.saturating_sub(1)
    }
}

// ─────────────────────────────────────────────────────────────
//  Rest shape  (derived once from the start state)
// ─────────────────────────────────────────────────────────────

/// Reference quantities the elastic energy measures deviation from.
#[derive(Debug, Clone, PartialEq)]
pub struct RestShape {
    /// Rest length per segment.
    pub lengths: Vec<f64>,
    /// Per bending vertex: material curvature seen from the previous and the
    /// next segment, `[prev.0, prev.1, next.0, next.1]`.
    pub curvatures: Vec<[f64; 4]>,
    /// Per bending vertex: rest twist (unwrapped).
    pub twists: Vec<f64>,
    /// Per bending vertex: mean length of the two adjacent rest segments.
    pub voronoi_lengths: Vec<f64>,
}

// ─────────────────────────────────────────────────────────────
//  Rod  (topology + parameters + states)
// ─────────────────────────────────────────────────────────────

/// One discrete elastic rod.  Owns its rest and working states.
#[derive(Debug, Clone)]
pub struct Rod {
    /// Rest / initial configuration, restored by `reset`.
    pub start_state: RodState,
    /// Working configuration, advanced by the solver.
    pub cur_state: RodState,
    /// Rest width per segment.
    pub widths: Vec<f64>,
    pub params: RodParams,
    closed: bool,
    rest: RestShape,
}

impl Rod {
    /// Validate shapes and derive the rest shape from `start_state`.
    pub fn new(
        start_state: RodState,
        widths: Vec<f64>,
        params: RodParams,
        closed: bool,
    ) -> Result<Self, RodError> {
        let nv = start_state.centerline.nrows();
        let ns = segment_count(nv, closed);
        if ns == 0 {
            return Err(RodError::Shape(format!(
                "{} rod needs at least {} vertices, got {nv}",
                if closed { "closed" } else { "open" },
                if closed { 3 } else { 2 },
            )));
        }
        if start_state.centerline.ncols() != 3 || start_state.directors.ncols() != 3 {
            return Err(RodError::Shape("centerline and directors must have 3 columns".into()));
        }
        if start_state.directors.nrows() != ns {
            return Err(RodError::Shape(format!(
                "expected {ns} directors, got {}",
                start_state.directors.nrows()
            )));
        }
        if start_state.thetas.len() != ns {
            return Err(RodError::Shape(format!(
                "expected {ns} twist angles, got {}",
                start_state.thetas.len()
            )));
        }
        if widths.len() != ns {
            return Err(RodError::Shape(format!("expected {ns} widths, got {}", widths.len())));
        }

        let rest = crate::energy::rest_shape(&start_state, closed);
        if let Some(i) = rest.lengths.iter().position(|&l| !(l > 0.0)) {
            return Err(RodError::Shape(format!("segment {i} has zero rest length")));
        }

        Ok(Self {
            cur_state: start_state.clone(),
            start_state,
            widths,
            params,
            closed,
            rest,
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.start_state.centerline.nrows()
    }

    pub fn num_segments(&self) -> usize {
        segment_count(self.num_vertices(), self.closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Degrees of freedom: all centerline coordinates, then all twist angles.
    pub fn num_dofs(&self) -> usize {
        3 * self.num_vertices() + self.num_segments()
    }

    pub fn rest(&self) -> &RestShape {
        &self.rest
    }

    /// End vertices of segment `i`.
    pub fn segment_vertices(&self, i: usize) -> (usize, usize) {
        (i, (i + 1) % self.num_vertices())
    }

    /// `(vertex, previous segment, next segment)` for every vertex where the
    /// rod can bend: interior vertices of an open rod, all vertices of a
    /// closed one.
    pub fn bending_vertices(&self) -> impl Iterator<Item = (usize, usize, usize)> {
        let nv = self.num_vertices();
        let ns = self.num_segments();
        let range = if self.closed { 0..nv } else { 1..nv.saturating_sub(1) };
        range.map(move |v| (v, (v + ns - 1) % ns, v))
    }
}

// ─────────────────────────────────────────────────────────────
//  Constraints
// ─────────────────────────────────────────────────────────────

/// Point-to-point coupling between a point on one segment and a point on
/// another (possibly of the same rod).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub rod1: usize,
    pub rod2: usize,
    pub seg1: usize,
    pub seg2: usize,
    /// Position along `seg1`: 0 at its first vertex, 1 at its second.
    pub bary1: f64,
    pub bary2: f64,
}

impl Constraint {
    /// The same coupling with its two ends exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            rod1: self.rod2,
            rod2: self.rod1,
            seg1: self.seg2,
            seg2: self.seg1,
            bary1: self.bary2,
            bary2: self.bary1,
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Residual blocks
// ─────────────────────────────────────────────────────────────

/// Kind of an energy term, used to label residual rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermKind {
    Stretching,
    Bending,
    Twisting,
    Anchoring,
    Constraint,
}

/// Residual rows produced by one energy component, with their Jacobian
/// contributions as `(row, col, value)` triplets in global indices.
#[derive(Debug, Clone, Default)]
pub struct ResidualBlock {
    /// Global index of the first row of this block.
    pub row_offset: usize,
    pub residuals: Vec<f64>,
    pub triplets: Vec<(usize, usize, f64)>,
    /// Local row ranges per term kind, in emission order.
    pub sections: Vec<(TermKind, Range<usize>)>,
}

impl ResidualBlock {
    pub fn new(row_offset: usize) -> Self {
        Self { row_offset, ..Self::default() }
    }

    pub fn len(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residuals.is_empty()
    }

    /// Append a residual and return its global row.
    pub fn push(&mut self, value: f64) -> usize {
        self.residuals.push(value);
        self.row_offset + self.residuals.len() - 1
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.triplets.push((row, col, value));
        }
    }

    /// Three entries at columns `col..col + 3`.
    pub fn add_vec3(&mut self, row: usize, col: usize, v: &Vector3<f64>) {
        for d in 0..3 {
            self.add(row, col + d, v[d]);
        }
    }

    /// Label the rows appended by `f` as `kind`.
    pub fn section<F: FnOnce(&mut Self)>(&mut self, kind: TermKind, f: F) {
        let start = self.len();
        f(self);
        let end = self.len();
        if end > start {
            self.sections.push((kind, start..end));
        }
    }

    /// ½ Σ r² over the whole block.
    pub fn energy(&self) -> f64 {
        0.5 * self.residuals.iter().map(|r| r * r).sum::<f64>()
    }

    /// ½ Σ r² over the rows of one term kind.
    pub fn energy_of(&self, kind: TermKind) -> f64 {
        self.sections
            .iter()
            .filter(|(k, _)| *k == kind)
            .flat_map(|(_, range)| self.residuals[range.clone()].iter())
            .map(|r| 0.5 * r * r)
            .sum()
    }

    /// Jᵀr restricted to columns `col_offset..col_offset + ncols`.
    pub fn gradient(&self, col_offset: usize, ncols: usize) -> Vec<f64> {
        let mut g = vec![0.0; ncols];
        for &(row, col, val) in &self.triplets {
            if col >= col_offset && col < col_offset + ncols {
                g[col - col_offset] += val * self.residuals[row - self.row_offset];
            }
        }
        g
    }
}

// ─────────────────────────────────────────────────────────────
//  Solver options
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Tikhonov term ε added to the diagonal of JᵀJ.
    pub regularization: f64,
    /// Sufficient-decrease constant c1.
    pub sufficient_decrease: f64,
    /// Curvature constant c2.
    pub curvature: f64,
    /// Bracket width below which the line search stops refining.
    pub bracket_tolerance: f64,
    /// Hard cap on line-search trial evaluations.
    pub max_trials: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            regularization: 1e-6,
            sufficient_decrease: 0.1,
            curvature: 0.9,
            bracket_tolerance: 1e-8,
            max_trials: 100,
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Factorisation
// ─────────────────────────────────────────────────────────────

/// Numeric LDLᵀ factorization of a symmetric positive-definite matrix.
///
/// Uses `sprs-ldl` with reverse Cuthill–McKee fill-in reduction and
/// validates D > 0.
pub struct Factorization {
    ldl: LdlNumeric<f64, usize>,
}

impl std::fmt::Debug for Factorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Factorization(n = {})", self.ldl.d().len())
    }
}

impl Factorization {
    pub fn new(a: CsMatView<f64>) -> Result<Self, RodError> {
        let ldl = Ldl::new()
            .fill_in_reduction(FillInReduction::ReverseCuthillMcKee)
            .check_symmetry(SymmetryCheck::DontCheckSymmetry)
            .numeric(a)?;
        // A NaN pivot fails this test too.
        for (index, &pivot) in ldl.d().iter().enumerate() {
            if !(pivot > 0.0) {
                return Err(RodError::NotPositiveDefinite { index, pivot });
            }
        }
        Ok(Self { ldl })
    }

    /// Solve A x = rhs using the stored factorization.
    pub fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        self.ldl.solve(rhs)
    }
}

// ─────────────────────────────────────────────────────────────
//  Step reports
// ─────────────────────────────────────────────────────────────

/// Decision taken after one line-search trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    /// Sufficient decrease failed: bisect toward `alpha`.
    Shrinking,
    /// Decrease held but the slope is still steep, no upper bracket: double.
    Growing,
    /// Decrease held but the slope is still steep: bisect toward `beta`.
    Bisecting,
    /// Both conditions hold.
    Accepted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchTrial {
    pub t: f64,
    /// Bracket at the time `t` was evaluated.
    pub alpha: f64,
    pub beta: f64,
    pub objective: f64,
    pub phase: SearchPhase,
}

/// How the line search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearchOutcome {
    /// A trial satisfied both Wolfe conditions.
    Accepted,
    /// The bracket collapsed below tolerance; the last good trial was kept.
    BracketCollapsed,
    /// Trial budget exhausted; the last good trial was kept.
    TrialLimit,
    /// The direction is not a descent direction; nothing moved.
    NoDescent,
}

#[derive(Debug, Clone)]
pub struct LineSearchReport {
    /// Committed step length (0 if the state did not move).
    pub step: f64,
    pub initial_objective: f64,
    /// Objective at the committed state.
    pub objective: f64,
    /// d/dt of ½‖r‖² along −δ at t = 0.
    pub directional_derivative: f64,
    pub trials: Vec<LineSearchTrial>,
    pub outcome: LineSearchOutcome,
}

/// Diagnostics of one Gauss–Newton iteration.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub initial_objective: f64,
    pub final_objective: f64,
    pub step_length: f64,
    /// ‖δ‖ of the Gauss–Newton direction.
    pub delta_norm: f64,
    /// ‖(JᵀJ + εI)δ − Jᵀr‖.
    pub solve_residual: f64,
    pub line_search: LineSearchReport,
}
