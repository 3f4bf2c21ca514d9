//! Finite-difference Jacobian tests for every residual term kind.
//!
//! Each configuration is moved to a generic (non-rest) state, the analytic
//! Jacobian is assembled, and every column is compared against a central
//! difference
//!
//!     ∂r/∂q_k  ≈  [ r(q + h e_k) − r(q − h e_k) ] / 2h
//!
//! Perturbations go through `apply_step`, so directors follow their edges
//! by parallel transport exactly as they do during the line search.

use ariadne::assembly::assemble;
use ariadne::linesearch::apply_step;
use ariadne::projection::TargetSurface;
use ariadne::types::*;
use ariadne::RodConfig;
use ndarray::Array2;

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

/// Deterministic pseudo-random value in [-1, 1).
fn wiggle(k: usize) -> f64 {
    let x = ((k as f64 + 1.0) * 12.9898).sin() * 43758.5453;
    2.0 * (x - x.floor()) - 1.0
}

/// Helix with `n` vertices.
fn helix(n: usize, radius: f64, pitch: f64, step: f64) -> Array2<f64> {
    let mut c = Array2::zeros((n, 3));
    for i in 0..n {
        let s = i as f64 * step;
        c[[i, 0]] = radius * s.cos();
        c[[i, 1]] = radius * s.sin();
        c[[i, 2]] = pitch * s;
    }
    c
}

/// Slightly irregular closed ring.
fn ring(n: usize, radius: f64) -> Array2<f64> {
    let mut c = Array2::zeros((n, 3));
    for i in 0..n {
        let s = i as f64 * 2.0 * std::f64::consts::PI / n as f64;
        let r = radius * (1.0 + 0.1 * wiggle(100 + i));
        c[[i, 0]] = r * s.cos();
        c[[i, 1]] = r * s.sin();
        c[[i, 2]] = 0.2 * wiggle(200 + i);
    }
    c
}

fn make_rod(centerline: Array2<f64>, closed: bool, params: RodParams) -> Rod {
    let state = RodState::from_centerline(centerline, closed).unwrap();
    let ns = state.thetas.len();
    let widths = (0..ns).map(|i| 0.5 + 0.1 * i as f64).collect();
    Rod::new(state, widths, params, closed).unwrap()
}

fn stiff_params() -> RodParams {
    RodParams {
        thickness: 0.05,
        kstretching: 3.0,
        kbending: 2.0,
        ktwist: 1.5,
        kanchor: 0.7,
    }
}

/// Move every rod away from rest by a fixed pseudo-random step.
fn deform(config: &mut RodConfig, scale: f64) {
    let layout = assemble(config).layout;
    let start: Vec<RodState> = config.rods.iter().map(|r| r.cur_state.clone()).collect();
    let delta: Vec<f64> = (0..layout.total).map(|k| scale * wiggle(k)).collect();
    apply_step(&mut config.rods, &start, &layout, &delta, 1.0);
}

// ─────────────────────────────────────────────────────────────
//  Core FD test driver
// ─────────────────────────────────────────────────────────────

fn fd_jacobian_check(config: &mut RodConfig, h: f64, tol_abs: f64, tol_rel: f64) {
    let base = assemble(config);
    let layout = base.layout.clone();
    let m = base.values.len();
    let n = layout.total;
    assert!(m > 0, "configuration has no residual rows");

    let mut analytic = Array2::<f64>::zeros((m, n));
    for (&val, (row, col)) in base.jacobian.iter() {
        analytic[[row, col]] += val;
    }

    let start: Vec<RodState> = config.rods.iter().map(|r| r.cur_state.clone()).collect();
    let mut max_abs = 0.0_f64;
    let mut worst = (0, 0);
    let mut failures = Vec::new();

    for k in 0..n {
        let mut delta = vec![0.0; n];
        delta[k] = -h;

        apply_step(&mut config.rods, &start, &layout, &delta, 1.0);
        let r_plus = assemble(config).values;
        apply_step(&mut config.rods, &start, &layout, &delta, -1.0);
        let r_minus = assemble(config).values;
        assert_eq!(r_plus.len(), m, "row count changed under perturbation");

        for i in 0..m {
            let fd = (r_plus[i] - r_minus[i]) / (2.0 * h);
            let a = analytic[[i, k]];
            let abs_err = (a - fd).abs();
            let rel_err = abs_err / fd.abs().max(a.abs()).max(1e-14);
            if abs_err > max_abs {
                max_abs = abs_err;
                worst = (i, k);
            }
            if abs_err > tol_abs && rel_err > tol_rel {
                failures.push((i, k, a, fd));
            }
        }
    }

    for (rod, s) in config.rods.iter_mut().zip(start) {
        rod.cur_state = s;
    }

    eprintln!("──────────────────────────────────────────────");
    eprintln!("FD Jacobian check  (h = {h:.1e}, {m} rows × {n} cols)");
    eprintln!("  max |J_a - J_fd|  = {max_abs:.3e}  at (row {}, col {})", worst.0, worst.1);
    for &(i, k, a, fd) in failures.iter().take(20) {
        eprintln!("  ({i:>3},{k:>3})  analytic={a:+12.6e}  fd={fd:+12.6e}  <<<");
    }
    eprintln!("──────────────────────────────────────────────");

    assert!(
        failures.is_empty(),
        "{} Jacobian entries disagree with finite differences (first: {:?})",
        failures.len(),
        failures[0],
    );
}

// ─────────────────────────────────────────────────────────────
//  Tests
// ─────────────────────────────────────────────────────────────

/// Stretching, bending and twisting on an open helix.
#[test]
fn fd_open_rod() {
    let mut config = RodConfig::new();
    config.add_rod(make_rod(helix(8, 1.0, 0.3, 0.6), false, stiff_params()));
    deform(&mut config, 0.05);

    fd_jacobian_check(&mut config, 1e-6, 1e-6, 1e-4);
}

/// Closed rods have bending and twisting at every vertex, with wrap-around
/// segment indices.
#[test]
fn fd_closed_rod() {
    let mut config = RodConfig::new();
    config.add_rod(make_rod(ring(7, 1.5), true, stiff_params()));
    deform(&mut config, 0.05);

    fd_jacobian_check(&mut config, 1e-6, 1e-6, 1e-4);
}

/// Non-zero twist angles at rest and in the current state.
#[test]
fn fd_twisted_rest_state() {
    let mut state = RodState::from_centerline(helix(6, 0.8, 0.5, 0.7), false).unwrap();
    for (i, th) in state.thetas.iter_mut().enumerate() {
        *th = 0.3 * i as f64 - 0.4;
    }
    let rod = Rod::new(state, vec![1.0; 5], stiff_params(), false).unwrap();

    let mut config = RodConfig::new();
    config.add_rod(rod);
    deform(&mut config, 0.08);

    fd_jacobian_check(&mut config, 1e-6, 1e-6, 1e-4);
}

/// Constraint rows between two rods and within one rod.
#[test]
fn fd_constraints() {
    let mut config = RodConfig::new();
    config.add_rod(make_rod(helix(6, 1.0, 0.2, 0.5), false, stiff_params()));
    config.add_rod(make_rod(ring(5, 1.2), true, stiff_params()));
    config.constraint_stiffness = 4.0;
    config.add_constraint(Constraint { rod1: 0, rod2: 1, seg1: 2, seg2: 4, bary1: 0.3, bary2: 0.8 });
    config.add_constraint(Constraint { rod1: 1, rod2: 0, seg1: 0, seg2: 0, bary1: 0.0, bary2: 1.0 });
    config.add_constraint(Constraint { rod1: 0, rod2: 0, seg1: 1, seg2: 4, bary1: 0.5, bary2: 0.5 });
    deform(&mut config, 0.05);

    fd_jacobian_check(&mut config, 1e-6, 1e-6, 1e-4);
}

/// Anchoring rows against a cached target-surface projection.
#[test]
fn fd_anchoring() {
    let mut config = RodConfig::new();
    config.add_rod(make_rod(helix(6, 1.0, 0.2, 0.5), false, stiff_params()));

    let vertices = vec![
        [-5.0, -5.0, -1.0],
        [5.0, -5.0, -1.0],
        [5.0, 5.0, -0.5],
        [-5.0, 5.0, -1.5],
    ];
    let faces = vec![[0, 1, 2], [0, 2, 3]];
    config.set_target_surface(TargetSurface::new(vertices, faces).unwrap());
    assert!(config.rods[0].cur_state.has_projection());
    deform(&mut config, 0.05);

    fd_jacobian_check(&mut config, 1e-6, 1e-6, 1e-4);
}

/// The per-rod gradient reported by `rod_energy` equals Jᵀr.
#[test]
fn rod_energy_gradient_matches_fd() {
    let mut config = RodConfig::new();
    config.add_rod(make_rod(helix(7, 1.0, 0.4, 0.5), false, stiff_params()));
    deform(&mut config, 0.05);

    let rod = &config.rods[0];
    let energy = ariadne::energy::rod_energy(rod, &rod.cur_state);
    let nv = rod.num_vertices();

    let layout = assemble(&config).layout;
    let start = vec![rod.cur_state.clone()];
    let h = 1e-6;
    let mut rods = config.rods.clone();
    for k in 0..layout.total {
        let mut delta = vec![0.0; layout.total];
        delta[k] = -h;
        apply_step(&mut rods, &start, &layout, &delta, 1.0);
        let e_plus = ariadne::energy::rod_energy(&rods[0], &rods[0].cur_state).total;
        apply_step(&mut rods, &start, &layout, &delta, -1.0);
        let e_minus = ariadne::energy::rod_energy(&rods[0], &rods[0].cur_state).total;
        let fd = (e_plus - e_minus) / (2.0 * h);

        let analytic = if k < 3 * nv { energy.d_centerline[k] } else { energy.d_theta[k - 3 * nv] };
        assert!(
            (analytic - fd).abs() < 1e-6 + 1e-4 * fd.abs(),
            "component {k}: analytic={analytic:.8e}, fd={fd:.8e}",
        );
    }
}
