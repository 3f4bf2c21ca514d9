//! Bracketing line search along −δ.
//!
//! Every trial rebuilds the candidate configuration from the step's starting
//! states: vertices and twist angles move by −tδ, and each director is
//! parallel-transported from its starting edge to the trial edge.
//!
//! The search keeps a bracket [alpha, beta] (beta = +∞ until a trial fails
//! sufficient decrease) and reacts to each trial with one [`SearchPhase`]:
//!
//!   objective NaN or above  f₀ + c₁·t·f₀'     → Shrinking   beta = t
//!   slope still below       c₂·f₀'            → Growing     alpha = t  (beta = ∞)
//!                                              → Bisecting   alpha = t
//!   otherwise                                  → Accepted

use crate::assembly::{assemble, dot, DofLayout, Residual};
use crate::config::RodConfig;
use crate::energy::parallel_transport;
use crate::types::{LineSearchOutcome, LineSearchReport, LineSearchTrial, Rod, RodState, SearchPhase};
use nalgebra::Vector3;
use tracing::{debug, warn};

/// Set every rod's working state to `start − t·delta`, re-transporting the
/// directors from the starting edges.
pub fn apply_step(rods: &mut [Rod], start: &[RodState], layout: &DofLayout, delta: &[f64], t: f64) {
    for ((rod, from), &off) in rods.iter_mut().zip(start).zip(&layout.offsets) {
        let nv = rod.num_vertices();
        let ns = rod.num_segments();
        let moved = |v: usize| {
            let d = Vector3::new(delta[off + 3 * v], delta[off + 3 * v + 1], delta[off + 3 * v + 2]);
            from.vertex(v) - d * t
        };

        let state = &mut rod.cur_state;
        for i in 0..ns {
            let (v0, v1) = (i, (i + 1) % nv);
            let old_edge = from.vertex(v1) - from.vertex(v0);
            let new_edge = moved(v1) - moved(v0);
            state.set_director(i, &parallel_transport(&from.director(i), &old_edge, &new_edge));
        }
        for v in 0..nv {
            state.set_vertex(v, &moved(v));
        }
        for i in 0..ns {
            state.thetas[i] = from.thetas[i] - t * delta[off + 3 * nv + i];
        }
    }
}

/// Search for a step length along −δ and commit the resulting state.
///
/// `start` must be the residual of the current configuration.
pub fn line_search(config: &mut RodConfig, start: &Residual, delta: &[f64]) -> LineSearchReport {
    let opts = config.options.clone();
    let layout = start.layout.clone();
    let start_states: Vec<RodState> = config.rods.iter().map(|r| r.cur_state.clone()).collect();

    let initial = start.objective();
    let deriv = -dot(&start.gradient(), delta);

    let mut report = LineSearchReport {
        step: 0.0,
        initial_objective: initial,
        objective: initial,
        directional_derivative: deriv,
        trials: Vec::new(),
        outcome: LineSearchOutcome::NoDescent,
    };

    if !(deriv < 0.0) {
        debug!(deriv, "direction is not a descent direction, skipping line search");
        return report;
    }

    let mut alpha = 0.0;
    let mut beta = f64::INFINITY;
    let mut t = 1.0;
    // Objective at alpha, the last trial that passed sufficient decrease.
    let mut alpha_objective = initial;

    let outcome = loop {
        if report.trials.len() >= opts.max_trials {
            break LineSearchOutcome::TrialLimit;
        }

        apply_step(&mut config.rods, &start_states, &layout, delta, t);
        let trial = assemble(config);
        let objective = trial.objective();
        let slope = -dot(&trial.gradient(), delta);

        let phase = if objective.is_nan() || objective > initial + opts.sufficient_decrease * t * deriv {
            SearchPhase::Shrinking
        } else if slope < opts.curvature * deriv {
            if beta == f64::INFINITY {
                SearchPhase::Growing
            } else {
                SearchPhase::Bisecting
            }
        } else {
            SearchPhase::Accepted
        };

        report.trials.push(LineSearchTrial { t, alpha, beta, objective, phase });
        debug!(t, objective, slope, ?phase, "line search trial");

        match phase {
            SearchPhase::Accepted => {
                report.step = t;
                report.objective = objective;
                report.outcome = LineSearchOutcome::Accepted;
                return report;
            }
            SearchPhase::Shrinking => beta = t,
            SearchPhase::Growing | SearchPhase::Bisecting => {
                alpha = t;
                alpha_objective = objective;
            }
        }

        if beta - alpha < opts.bracket_tolerance {
            break LineSearchOutcome::BracketCollapsed;
        }
        t = if beta == f64::INFINITY { 2.0 * alpha } else { 0.5 * (alpha + beta) };
    };

    warn!(?outcome, alpha, beta, trials = report.trials.len(), "line search did not satisfy both Wolfe conditions");

    // Commit alpha unless it is already the evaluated state.
    let last_t = report.trials.last().map(|tr| tr.t);
    if last_t != Some(alpha) {
        if alpha > 0.0 {
            apply_step(&mut config.rods, &start_states, &layout, delta, alpha);
        } else {
            for (rod, s) in config.rods.iter_mut().zip(start_states) {
                rod.cur_state = s;
            }
        }
    }

    report.step = alpha;
    report.objective = alpha_objective;
    report.outcome = outcome;
    report
}
