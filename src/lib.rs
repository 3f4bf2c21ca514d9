//! **Ariadne**: quasi-static equilibrium of coupled discrete elastic rods.
//!
//! Rod energies are written as least-squares residuals and minimised with
//! a sparse Gauss–Newton loop:
//!
//! 1. **Energy** (`energy`, `constraints`): stretching, bending, twisting and
//!    target-anchoring rows per rod, penalty rows per coupling.
//! 2. **Assembly** (`assembly`): stacked residual r and sparse Jacobian J.
//! 3. **Solve** (`solver`): (JᵀJ + εI) δ = Jᵀr via sparse LDLᵀ.
//! 4. **Line search** (`linesearch`): bracketing Wolfe search along −δ with
//!    parallel-transported directors.
//! 5. **Surface** (`projection`, `obj`): closest-face cache against a target
//!    mesh.
//! 6. **Export** (`geometry`): ribbon meshes per rod.
//!
//! [`config::RodConfig`] ties these together.

pub mod types;
pub mod energy;
pub mod constraints;
pub mod obj;
pub mod projection;
pub mod assembly;
pub mod solver;
pub mod linesearch;
pub mod config;
pub mod geometry;

pub use config::RodConfig;
pub use types::{Constraint, Rod, RodError, RodParams, RodState, SolverOptions};
