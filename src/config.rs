//! The rod network: rods, couplings, target surface, and the outer loop.
//!
//! One step is strictly sequential:
//!
//!   1. assemble r, J          (`assembly`)
//!   2. solve for δ            (`solver`)
//!   3. line search along −δ   (`linesearch`), which commits the new state

use crate::assembly::{assemble, norm, Residual};
use crate::constraints::{constraint_energy, ConstraintEnergy};
use crate::geometry::ribbon_mesh;
use crate::linesearch::line_search;
use crate::obj::write_obj;
use crate::projection::{project_state, TargetSurface};
use crate::solver::gauss_newton_step;
use crate::types::{Constraint, Rod, RodError, SolverOptions, StepReport};
use std::path::Path;
use tracing::{info, warn};

/// Rods and constraints built by an external loader, plus the optional
/// target surface every rod is attracted to.
#[derive(Debug)]
pub struct RodConfig {
    pub rods: Vec<Rod>,
    constraints: Vec<Constraint>,
    /// Penalty weight of every constraint.
    pub constraint_stiffness: f64,
    pub options: SolverOptions,
    target: Option<TargetSurface>,
}

impl Default for RodConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RodConfig {
    pub fn new() -> Self {
        Self {
            rods: Vec::new(),
            constraints: Vec::new(),
            constraint_stiffness: 1.0,
            options: SolverOptions::default(),
            target: None,
        }
    }

    pub fn num_rods(&self) -> usize {
        self.rods.len()
    }

    /// Take ownership of `rod` and return its index.
    pub fn add_rod(&mut self, rod: Rod) -> usize {
        self.rods.push(rod);
        self.rods.len() - 1
    }

    /// Couplings registered through [`Self::add_constraint`].
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Register a coupling between two existing segments.
    ///
    /// # Panics
    /// If a rod or segment index is out of range or a barycentric parameter
    /// lies outside [0, 1].
    pub fn add_constraint(&mut self, c: Constraint) {
        assert!(c.rod1 < self.num_rods(), "constraint rod1 {} out of range", c.rod1);
        assert!(c.rod2 < self.num_rods(), "constraint rod2 {} out of range", c.rod2);
        assert!(c.seg1 < self.rods[c.rod1].num_segments(), "constraint seg1 {} out of range", c.seg1);
        assert!(c.seg2 < self.rods[c.rod2].num_segments(), "constraint seg2 {} out of range", c.seg2);
        assert!((0.0..=1.0).contains(&c.bary1), "constraint bary1 {} outside [0, 1]", c.bary1);
        assert!((0.0..=1.0).contains(&c.bary2), "constraint bary2 {} outside [0, 1]", c.bary2);
        self.constraints.push(c);
    }

    /// Restore every rod's working state from its start state.
    pub fn reset(&mut self) {
        for rod in &mut self.rods {
            rod.cur_state = rod.start_state.clone();
        }
    }

    // ─────────────────────────────────────────────────────────
    //  Target surface
    // ─────────────────────────────────────────────────────────

    /// Load and index a target mesh, then project every rod onto it.
    ///
    /// Returns `false` and leaves the configuration untouched if the file
    /// cannot be read or is not a 3D triangle mesh.
    pub fn load_target_mesh<P: AsRef<Path>>(&mut self, path: P) -> bool {
        match TargetSurface::load(path.as_ref()) {
            Ok(surface) => {
                info!(
                    path = %path.as_ref().display(),
                    vertices = surface.num_vertices(),
                    faces = surface.num_faces(),
                    "loaded target mesh"
                );
                self.set_target_surface(surface);
                true
            }
            Err(e) => {
                warn!(path = %path.as_ref().display(), error = %e, "couldn't load target mesh");
                false
            }
        }
    }

    /// Install an already-built surface and project every rod onto it.
    ///
    /// The projection cache is copied into each start state, so `reset`
    /// keeps it.
    pub fn set_target_surface(&mut self, surface: TargetSurface) {
        self.target = Some(surface);
        self.reproject();
        for rod in &mut self.rods {
            rod.start_state.closest_face_normals = rod.cur_state.closest_face_normals.clone();
            rod.start_state.closest_face_centroids = rod.cur_state.closest_face_centroids.clone();
        }
    }

    pub fn target_surface(&self) -> Option<&TargetSurface> {
        self.target.as_ref()
    }

    /// Refresh the projection cache of every working state.
    ///
    /// `step` never calls this: the cache is a fixed anchor taken at load
    /// time.  Callers wanting a moving anchor call it between steps.
    pub fn reproject(&mut self) {
        if let Some(surface) = &self.target {
            for rod in &mut self.rods {
                project_state(&mut rod.cur_state, surface);
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    //  Energy
    // ─────────────────────────────────────────────────────────

    pub fn residual(&self) -> Residual {
        assemble(self)
    }

    /// ½‖r‖² at the current states.
    pub fn objective(&self) -> f64 {
        self.residual().objective()
    }

    pub fn constraint_energy(&self) -> ConstraintEnergy {
        constraint_energy(&self.rods, &self.constraints, self.constraint_stiffness)
    }

    // ─────────────────────────────────────────────────────────
    //  Simulation
    // ─────────────────────────────────────────────────────────

    /// One Gauss–Newton iteration.
    ///
    /// A factorization failure is returned as an error with all states
    /// untouched; the run cannot continue from such a configuration.
    pub fn step(&mut self) -> Result<StepReport, RodError> {
        let start = self.residual();
        let gn = gauss_newton_step(&start, self.options.regularization)?;
        let search = line_search(self, &start, &gn.delta);

        let report = StepReport {
            initial_objective: search.initial_objective,
            final_objective: search.objective,
            step_length: search.step,
            delta_norm: norm(&gn.delta),
            solve_residual: gn.solve_residual,
            line_search: search,
        };
        info!(
            before = report.initial_objective,
            after = report.final_objective,
            t = report.step_length,
            trials = report.line_search.trials.len(),
            "gauss-newton step"
        );
        Ok(report)
    }

    /// Run one step and report whether iteration should continue.
    ///
    /// Always `Ok(true)` on success; deciding convergence is left to the
    /// caller.
    pub fn simulate_one_step(&mut self) -> Result<bool, RodError> {
        self.step()?;
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────
    //  Export
    // ─────────────────────────────────────────────────────────

    /// Write one ribbon mesh per rod to `{prefix}{index}.obj`.
    pub fn save_rod_geometry(&self, prefix: &str) -> Result<(), RodError> {
        for (i, rod) in self.rods.iter().enumerate() {
            let mesh = ribbon_mesh(rod, &rod.cur_state);
            write_obj(format!("{prefix}{i}.obj"), &mesh.vertices, &mesh.faces)?;
        }
        Ok(())
    }
}
