//! Stage 1: deterministic multi-start search.
//!
//! A coarse grid over the wrapped angle domain plus seeded random restarts,
//! each refined by Nelder–Mead (gradient-free; the cost surface is cheap but
//! not differentiable in any usable closed form). Starts are refined in
//! parallel; the winner is selected deterministically by (cost, start index)
//! so the result does not depend on worker count.
//!
//! The surface is often multi-modal, so besides the global best we retain the
//! top-K minima that are mutually separated by a configurable misorientation.
//! Those seed the Stage-2 walkers.

use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::{Orientation, PointEstimate, Stage1Config};
use crate::error::AppError;
use crate::fit::cache::EvalCache;
use crate::math::TWO_PI;
use crate::model::misorientation_deg;
use crate::objective::Objective;
use crate::progress::{ProgressEvent, ProgressSink, Stage};

/// Stage-1 output: the global best plus well-separated runner-up minima.
#[derive(Debug, Clone)]
pub struct Stage1Outcome {
    pub best: PointEstimate,
    /// Top-K minima (best first), mutually separated per config; always
    /// contains `best` as its first element.
    pub minima: Vec<PointEstimate>,
}

/// Multi-start point estimation.
///
/// Fails with `NoFeasibleOrientation` when no start reaches a finite cost
/// (e.g. every configuration's predicted spectrum is degenerate everywhere).
pub fn fit_point_estimate(
    objective: &Objective,
    config: &Stage1Config,
    seed: u64,
    cache: &EvalCache,
    sink: &dyn ProgressSink,
) -> Result<Stage1Outcome, AppError> {
    let starts = build_starts(config, seed);
    let total = starts.len();

    // Refine every start in parallel. Each refinement only reads the shared
    // objective and writes its own result.
    let refined: Vec<(usize, [f64; 3], f64)> = starts
        .par_iter()
        .enumerate()
        .map(|(idx, &start)| {
            let (angles, cost) = nelder_mead(objective, start, config.local_iters, config.local_tol);
            (idx, angles, cost)
        })
        .collect();

    // Record evaluations for the Stage-3 surrogate: the coarse starts give
    // domain coverage, the refined minima give depth. Sequential append keeps
    // cache order deterministic.
    for &start in &starts {
        cache.push(start, objective.cost(&Orientation::from_array(start)));
    }
    for &(_, angles, cost) in &refined {
        cache.push(angles, cost);
    }

    // Deterministic selection: sort by (cost, start index).
    let mut ranked: Vec<&(usize, [f64; 3], f64)> =
        refined.iter().filter(|(_, _, cost)| cost.is_finite()).collect();
    ranked.sort_by(|a, b| {
        a.2.partial_cmp(&b.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    if ranked.is_empty() {
        return Err(AppError::no_feasible(
            "No feasible orientation: every start produced a non-finite cost.",
        ));
    }

    // Keep the top-K minima that are mutually separated, so a multi-modal
    // surface seeds Stage 2 with more than one basin.
    let mut minima: Vec<PointEstimate> = Vec::with_capacity(config.top_k);
    for &&(_, angles, cost) in &ranked {
        let candidate = PointEstimate {
            orientation: Orientation::from_array(angles),
            cost,
        };
        let separated = minima.iter().all(|kept| {
            misorientation_deg(&kept.orientation, &candidate.orientation) >= config.separation_deg
        });
        if minima.is_empty() || separated {
            minima.push(candidate);
        }
        if minima.len() >= config.top_k {
            break;
        }
    }

    sink.emit(ProgressEvent {
        stage: Stage::Search,
        iteration: total,
        total,
        best_cost: minima[0].cost,
    });

    Ok(Stage1Outcome {
        best: minima[0],
        minima,
    })
}

fn build_starts(config: &Stage1Config, seed: u64) -> Vec<[f64; 3]> {
    let steps = config.grid_steps.max(2);
    let delta = TWO_PI / steps as f64;
    let mut starts = Vec::with_capacity(steps * steps * steps + config.random_restarts);

    // Cell-centered grid: avoids stacking starts on the 0/2π seam.
    for i in 0..steps {
        for j in 0..steps {
            for k in 0..steps {
                starts.push([
                    (i as f64 + 0.5) * delta,
                    (j as f64 + 0.5) * delta,
                    (k as f64 + 0.5) * delta,
                ]);
            }
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..config.random_restarts {
        starts.push([
            rng.gen_range(0.0..TWO_PI),
            rng.gen_range(0.0..TWO_PI),
            rng.gen_range(0.0..TWO_PI),
        ]);
    }

    starts
}

/// Nelder–Mead in 3 dimensions with standard coefficients
/// (reflection 1, expansion 2, contraction 0.5, shrink 0.5).
///
/// Coordinates are left unwrapped during the search; the objective is
/// periodic, and `Orientation::from_array` wraps on construction.
fn nelder_mead(
    objective: &Objective,
    start: [f64; 3],
    max_iters: usize,
    tol: f64,
) -> ([f64; 3], f64) {
    const DIM: usize = 3;
    const STEP: f64 = 0.15;

    let eval = |x: &[f64; 3]| objective.cost(&Orientation::from_array(*x));

    let mut simplex: Vec<([f64; 3], f64)> = Vec::with_capacity(DIM + 1);
    simplex.push((start, eval(&start)));
    for d in 0..DIM {
        let mut v = start;
        v[d] += STEP;
        simplex.push((v, eval(&v)));
    }

    for _ in 0..max_iters {
        simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let best = simplex[0].1;
        let worst = simplex[DIM].1;
        if best.is_finite() && worst.is_finite() && (worst - best) < tol {
            break;
        }

        // Centroid of all but the worst vertex.
        let mut centroid = [0.0; 3];
        for (v, _) in &simplex[..DIM] {
            for d in 0..DIM {
                centroid[d] += v[d] / DIM as f64;
            }
        }

        let worst_v = simplex[DIM].0;
        let reflect = combine(&centroid, &worst_v, 1.0);
        let f_reflect = eval(&reflect);

        if f_reflect < simplex[0].1 {
            let expand = combine(&centroid, &worst_v, 2.0);
            let f_expand = eval(&expand);
            simplex[DIM] = if f_expand < f_reflect {
                (expand, f_expand)
            } else {
                (reflect, f_reflect)
            };
        } else if f_reflect < simplex[DIM - 1].1 {
            simplex[DIM] = (reflect, f_reflect);
        } else {
            let contract = combine(&centroid, &worst_v, -0.5);
            let f_contract = eval(&contract);
            if f_contract < simplex[DIM].1 {
                simplex[DIM] = (contract, f_contract);
            } else {
                // Shrink toward the best vertex.
                let best_v = simplex[0].0;
                for entry in simplex.iter_mut().skip(1) {
                    for d in 0..DIM {
                        entry.0[d] = best_v[d] + 0.5 * (entry.0[d] - best_v[d]);
                    }
                    entry.1 = eval(&entry.0);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    simplex[0]
}

/// `centroid + coeff * (centroid - worst)`; negative `coeff` contracts inside.
fn combine(centroid: &[f64; 3], worst: &[f64; 3], coeff: f64) -> [f64; 3] {
    let mut out = [0.0; 3];
    for d in 0..3 {
        out[d] = centroid[d] + coeff * (centroid[d] - worst[d]);
    }
    out
}
