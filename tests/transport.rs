//! Properties of parallel transport, material frames and reference twist.

use approx::assert_abs_diff_eq;
use ariadne::energy::*;
use ariadne::types::RodState;
use nalgebra::Vector3;
use ndarray::Array2;
use std::f64::consts::PI;

fn v(x: f64, y: f64, z: f64) -> Vector3<f64> {
    Vector3::new(x, y, z)
}

#[test]
fn transport_is_an_isometry() {
    let e1 = v(1.0, 0.2, -0.3);
    let e2 = v(-0.4, 1.0, 0.5);
    let a = v(0.3, -1.2, 0.7);
    let b = v(2.0, 0.1, -0.4);

    let ta = parallel_transport(&a, &e1, &e2);
    let tb = parallel_transport(&b, &e1, &e2);
    assert_abs_diff_eq!(ta.norm(), a.norm(), epsilon = 1e-12);
    assert_abs_diff_eq!(ta.dot(&tb), a.dot(&b), epsilon = 1e-12);
    // Orientation is preserved as well.
    assert_abs_diff_eq!((ta.cross(&tb) - parallel_transport(&a.cross(&b), &e1, &e2)).norm(), 0.0, epsilon = 1e-12);
}

#[test]
fn transport_maps_tangent_to_tangent() {
    let e1 = v(0.0, 0.0, 2.0);
    let e2 = v(1.0, 1.0, 0.5);
    let t = parallel_transport(&e1.normalize(), &e1, &e2);
    assert_abs_diff_eq!((t - e2.normalize()).norm(), 0.0, epsilon = 1e-12);

    // Vectors along the rotation axis are fixed.
    let axis = e1.cross(&e2);
    assert_abs_diff_eq!((parallel_transport(&axis, &e1, &e2) - axis).norm(), 0.0, epsilon = 1e-12);
}

#[test]
fn degenerate_transport_is_identity() {
    let d = v(0.0, 1.0, 0.0);
    let e = v(1.0, 0.0, 0.0);
    assert_eq!(parallel_transport(&d, &e, &(e * 3.0)), d);
    assert_eq!(parallel_transport(&d, &e, &Vector3::zeros()), d);
    assert_eq!(parallel_transport(&d, &Vector3::zeros(), &e), d);
    assert_eq!(parallel_transport(&d, &e, &(-e)), d);
}

#[test]
fn material_frame_is_orthonormal() {
    let edge = v(0.3, -2.0, 1.0);
    let t = edge.normalize();
    let d = t.cross(&v(1.0, 0.0, 0.0)).normalize();

    for &theta in &[0.0, 0.4, -1.3, PI] {
        let f = material_frame(&edge, &d, theta);
        assert_abs_diff_eq!(f.m1.norm(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.m2.norm(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.m1.dot(&f.m2), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.m1.dot(&f.tangent), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!((f.tangent.cross(&f.m1) - f.m2).norm(), 0.0, epsilon = 1e-12);
    }

    let f0 = material_frame(&edge, &d, 0.0);
    assert_abs_diff_eq!((f0.m1 - d).norm(), 0.0, epsilon = 1e-14);
}

#[test]
fn curvature_binormal_magnitude() {
    // |κb| = 2 tan(φ/2) for turning angle φ.
    for &phi in &[0.1_f64, 0.7, 1.5, 2.5] {
        let a = v(1.0, 0.0, 0.0);
        let b = v(phi.cos(), phi.sin(), 0.0) * 2.5;
        let kb = curvature_binormal(&a, &b);
        assert_abs_diff_eq!(kb.norm(), 2.0 * (phi / 2.0).tan(), epsilon = 1e-12);
        assert!(kb.z > 0.0);
    }
    assert_eq!(curvature_binormal(&v(1.0, 0.0, 0.0), &v(3.0, 0.0, 0.0)), Vector3::zeros());
}

#[test]
fn wrap_angle_range() {
    assert_abs_diff_eq!(wrap_angle(0.3), 0.3, epsilon = 1e-15);
    assert_abs_diff_eq!(wrap_angle(0.3 + 4.0 * PI), 0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(wrap_angle(-0.3 - 2.0 * PI), -0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(wrap_angle(PI), PI, epsilon = 1e-15);
    assert_abs_diff_eq!(wrap_angle(-PI), PI, epsilon = 1e-15);
    for k in -20..20 {
        let w = wrap_angle(0.37 * k as f64);
        assert!(w > -PI && w <= PI);
    }
}

#[test]
fn reference_twist_of_transported_director_is_zero() {
    let e1 = v(1.0, 0.0, 0.0);
    let e2 = v(0.6, 0.8, 0.3);
    let d1 = v(0.0, 0.0, 1.0);
    let d2 = parallel_transport(&d1, &e1, &e2);
    assert_abs_diff_eq!(reference_twist(&d1, &e1, &d2, &e2), 0.0, epsilon = 1e-12);

    // Rotating the next director about its tangent shows up as twist.
    let t2 = e2.normalize();
    let rotated = d2 * 0.5_f64.cos() + t2.cross(&d2) * 0.5_f64.sin();
    assert_abs_diff_eq!(reference_twist(&d1, &e1, &rotated, &e2), 0.5, epsilon = 1e-12);
}

#[test]
fn from_centerline_gives_orthonormal_twist_free_directors() {
    let n = 9;
    let mut c = Array2::zeros((n, 3));
    for i in 0..n {
        let s = i as f64 * 0.5;
        c[[i, 0]] = s.cos();
        c[[i, 1]] = s.sin();
        c[[i, 2]] = 0.3 * s;
    }

    for closed in [false, true] {
        let state = RodState::from_centerline(c.clone(), closed).unwrap();
        let ns = state.thetas.len();
        assert_eq!(ns, if closed { n } else { n - 1 });
        assert!(state.thetas.iter().all(|&t| t == 0.0));

        for i in 0..ns {
            let e = state.vertex((i + 1) % n) - state.vertex(i);
            let d = state.director(i);
            assert_abs_diff_eq!(d.norm(), 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(d.dot(&e.normalize()), 0.0, epsilon = 1e-12);
        }
        // Consecutive directors are related by transport, so the twist
        // between them vanishes.
        for i in 1..ns {
            let ep = state.vertex(i) - state.vertex(i - 1);
            let en = state.vertex((i + 1) % n) - state.vertex(i);
            let psi = reference_twist(&state.director(i - 1), &ep, &state.director(i), &en);
            assert_abs_diff_eq!(psi, 0.0, epsilon = 1e-10);
        }
    }
}
