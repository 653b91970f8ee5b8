//! Stage 3: Gaussian-process surrogate refinement.
//!
//! A GP regressor is trained on the (orientation, cost) pairs accumulated by
//! Stages 1–2, then used to pick further orientations worth a true-objective
//! evaluation (expected-improvement acquisition over a seeded candidate
//! pool). After a fixed round budget the best true evaluation is reconciled
//! with the Stage-2 posterior mean into the final refined estimate.
//!
//! Modeling choices (stated, not hidden):
//! - squared-exponential kernel on the (cos, sin) embedding of the Euler
//!   angles, which is positive definite on the torus (a naive SE kernel on
//!   wrapped angle differences is not);
//! - costs are regressed as `ln(1 + cost)` to tame their dynamic range; the
//!   transform is monotone, so minimizing either scale is equivalent;
//! - expected improvement, fixed round budget.
//!
//! This stage only ever annotates the earlier results: it can fail
//! soft (too few cached points, Cholesky breakdown) and the pipeline still
//! reports Stage 1/2 outputs.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{
    CredibleInterval, Orientation, Posterior, RefinedEstimate, SurrogateConfig,
};
use crate::error::AppError;
use crate::fit::cache::{EvalCache, EvaluatedPoint};
use crate::math::{
    TWO_PI, deg_to_rad, normal_cdf, normal_pdf, wrap_angle, wrap_signed,
};
use crate::model::misorientation_deg;
use crate::objective::Objective;
use crate::progress::{CancelToken, ProgressEvent, ProgressSink, Stage};

/// Stage-3 output.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub refined: RefinedEstimate,
    /// Posterior and surrogate optimum disagree beyond the threshold.
    pub ambiguous: bool,
    pub cancelled: bool,
    /// Acquisition rounds actually executed (for diagnostics).
    pub rounds_run: usize,
}

/// Torus embedding: (cos, sin) per angle, so Euclidean distance in the
/// embedding respects wrap-around.
fn embed(angles: &[f64; 3]) -> [f64; 6] {
    [
        angles[0].cos(),
        angles[0].sin(),
        angles[1].cos(),
        angles[1].sin(),
        angles[2].cos(),
        angles[2].sin(),
    ]
}

fn sq_dist(a: &[f64; 6], b: &[f64; 6]) -> f64 {
    let mut s = 0.0;
    for d in 0..6 {
        let diff = a[d] - b[d];
        s += diff * diff;
    }
    s
}

/// A fitted GP over embedded orientations.
struct Gp {
    train_x: Vec<[f64; 6]>,
    alpha: DVector<f64>,
    chol: Cholesky<f64, Dyn>,
    signal_var: f64,
    length_scale: f64,
    y_mean: f64,
}

impl Gp {
    /// Fit on transformed costs. Returns `None` when the kernel matrix stays
    /// non-positive-definite even after jitter escalation.
    fn fit(points: &[([f64; 6], f64)], length_scale: f64, noise: f64) -> Option<Self> {
        let n = points.len();
        let y_mean = points.iter().map(|(_, y)| y).sum::<f64>() / n as f64;
        let signal_var = (points
            .iter()
            .map(|(_, y)| (y - y_mean) * (y - y_mean))
            .sum::<f64>()
            / n as f64)
            .max(1e-12);

        let mut base = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                let k = signal_var
                    * (-sq_dist(&points[i].0, &points[j].0)
                        / (2.0 * length_scale * length_scale))
                        .exp();
                base[(i, j)] = k;
                base[(j, i)] = k;
            }
        }

        // Escalate jitter on Cholesky failure; clustered training points
        // (dense posterior draws) routinely make the kernel near-singular.
        let mut jitter = noise.max(1e-10);
        for _ in 0..4 {
            let mut k = base.clone();
            for i in 0..n {
                k[(i, i)] += jitter;
            }
            if let Some(chol) = Cholesky::new(k) {
                let y_centered =
                    DVector::from_iterator(n, points.iter().map(|(_, y)| y - y_mean));
                let alpha = chol.solve(&y_centered);
                return Some(Self {
                    train_x: points.iter().map(|(x, _)| *x).collect(),
                    alpha,
                    chol,
                    signal_var,
                    length_scale,
                    y_mean,
                });
            }
            jitter *= 100.0;
        }
        None
    }

    /// Predictive mean and standard deviation at an embedded point.
    fn predict(&self, x: &[f64; 6]) -> (f64, f64) {
        let n = self.train_x.len();
        let k_star = DVector::from_iterator(
            n,
            self.train_x.iter().map(|t| {
                self.signal_var
                    * (-sq_dist(t, x) / (2.0 * self.length_scale * self.length_scale)).exp()
            }),
        );
        let mean = self.y_mean + k_star.dot(&self.alpha);
        let v = self.chol.solve(&k_star);
        let var = (self.signal_var - k_star.dot(&v)).max(0.0);
        (mean, var.sqrt())
    }
}

/// Expected improvement of predicted `(mu, sd)` over the incumbent `y_best`
/// (minimization).
fn expected_improvement(mu: f64, sd: f64, y_best: f64) -> f64 {
    if sd < 1e-12 {
        return (y_best - mu).max(0.0);
    }
    let u = (y_best - mu) / sd;
    (y_best - mu) * normal_cdf(u) + sd * normal_pdf(u)
}

fn transform_cost(cost: f64) -> f64 {
    cost.max(0.0).ln_1p()
}

/// Surrogate-guided refinement, reconciled with the Stage-2 posterior.
pub fn refine(
    objective: &Objective,
    config: &SurrogateConfig,
    cache: &EvalCache,
    posterior: &Posterior,
    seed: u64,
    emit_every: usize,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<RefineOutcome, AppError> {
    let snapshot = cache.snapshot();
    if snapshot.len() < 4 {
        return Err(AppError::invalid_input(
            "Stage 3 needs at least 4 cached evaluations to train a surrogate.",
        ));
    }

    // Incumbent: best true evaluation seen anywhere so far.
    let mut incumbent = best_point(&snapshot);

    // Deterministic thinning down to the training cap, always keeping the
    // incumbent in the training set.
    let mut train: Vec<([f64; 6], f64)> = thin(&snapshot, config.max_train)
        .into_iter()
        .map(|p| (embed(&p.angles), transform_cost(p.cost)))
        .collect();
    train.push((embed(&incumbent.angles), transform_cost(incumbent.cost)));

    let mut rng = StdRng::seed_from_u64(seed);
    let jitter_dist = Normal::new(0.0, 0.15)
        .map_err(|e| AppError::numerical(format!("Invalid jitter distribution: {e}")))?;

    let mut rounds_run = 0usize;
    let mut cancelled = false;

    for round in 0..config.rounds {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let Some(gp) = Gp::fit(&train, config.length_scale, config.noise) else {
            // Surrogate breakdown is soft: keep whatever rounds we got.
            break;
        };

        let y_best = train
            .iter()
            .map(|(_, y)| *y)
            .fold(f64::INFINITY, f64::min);

        // Candidate pool: half uniform exploration, half jitter around the
        // incumbent. All draws are sequential and seeded.
        let candidates: Vec<[f64; 3]> = (0..config.candidates)
            .map(|i| {
                if i % 2 == 0 {
                    [
                        rng.gen_range(0.0..TWO_PI),
                        rng.gen_range(0.0..TWO_PI),
                        rng.gen_range(0.0..TWO_PI),
                    ]
                } else {
                    [
                        incumbent.angles[0] + jitter_dist.sample(&mut rng),
                        incumbent.angles[1] + jitter_dist.sample(&mut rng),
                        incumbent.angles[2] + jitter_dist.sample(&mut rng),
                    ]
                }
            })
            .collect();

        let mut best_ei = f64::NEG_INFINITY;
        let mut best_candidate = candidates[0];
        for candidate in &candidates {
            let (mu, sd) = gp.predict(&embed(candidate));
            let ei = expected_improvement(mu, sd, y_best);
            if ei > best_ei {
                best_ei = ei;
                best_candidate = *candidate;
            }
        }

        let cost = objective.cost(&Orientation::from_array(best_candidate));
        cache.push(best_candidate, cost);
        if cost.is_finite() {
            train.push((embed(&best_candidate), transform_cost(cost)));
            if cost < incumbent.cost {
                incumbent = EvaluatedPoint {
                    angles: best_candidate,
                    cost,
                };
            }
        }

        rounds_run = round + 1;
        if round % emit_every == 0 {
            sink.emit(ProgressEvent {
                stage: Stage::Refinement,
                iteration: round,
                total: config.rounds,
                best_cost: incumbent.cost,
            });
        }
    }

    let outcome = reconcile(objective, config, cache, posterior, incumbent, cancelled, rounds_run);
    sink.emit(ProgressEvent {
        stage: Stage::Refinement,
        iteration: rounds_run,
        total: config.rounds,
        best_cost: outcome.refined.cost,
    });
    Ok(outcome)
}

fn best_point(points: &[EvaluatedPoint]) -> EvaluatedPoint {
    let mut best = points[0];
    for p in &points[1..] {
        if p.cost < best.cost {
            best = *p;
        }
    }
    best
}

/// Every-k-th thinning preserving snapshot order; deterministic.
fn thin(points: &[EvaluatedPoint], cap: usize) -> Vec<EvaluatedPoint> {
    if points.len() <= cap {
        return points.to_vec();
    }
    let stride = points.len().div_ceil(cap);
    points.iter().step_by(stride).copied().collect()
}

/// Blend the surrogate optimum with the posterior mean along the shortest
/// arc per angle, evaluate the blend, and keep whichever is truly better.
fn reconcile(
    objective: &Objective,
    config: &SurrogateConfig,
    cache: &EvalCache,
    posterior: &Posterior,
    incumbent: EvaluatedPoint,
    cancelled: bool,
    rounds_run: usize,
) -> RefineOutcome {
    let surrogate_opt = Orientation::from_array(incumbent.angles);
    let disagreement_deg_val = misorientation_deg(&posterior.mean, &surrogate_opt);
    let ambiguous = disagreement_deg_val > config.disagreement_deg;

    let w = config.posterior_weight;
    let post = posterior.mean.to_array();
    let base = surrogate_opt.to_array();
    let blended = [
        wrap_angle(base[0] + w * wrap_signed(post[0] - base[0])),
        wrap_angle(base[1] + w * wrap_signed(post[1] - base[1])),
        wrap_angle(base[2] + w * wrap_signed(post[2] - base[2])),
    ];
    let blend_cost = objective.cost(&Orientation::from_array(blended));
    cache.push(blended, blend_cost);

    let (final_angles, final_cost) = if blend_cost <= incumbent.cost {
        (blended, blend_cost)
    } else {
        (incumbent.angles, incumbent.cost)
    };
    let final_orientation = Orientation::from_array(final_angles);

    // Confidence interval: the posterior credible half-width per angle,
    // widened by the posterior/surrogate disagreement.
    let extra = deg_to_rad(disagreement_deg_val);
    let mut confidence = [CredibleInterval { lo: 0.0, hi: 0.0 }; 3];
    let center = final_orientation.to_array();
    for i in 0..3 {
        let width = wrap_angle(posterior.credible[i].hi - posterior.credible[i].lo);
        let half = width / 2.0 + extra;
        confidence[i] = CredibleInterval {
            lo: wrap_angle(center[i] - half),
            hi: wrap_angle(center[i] + half),
        };
    }

    RefineOutcome {
        refined: RefinedEstimate {
            orientation: final_orientation,
            cost: final_cost,
            confidence,
        },
        ambiguous,
        cancelled,
        rounds_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{rotation_series, synthesize, test_modes};
    use crate::domain::{CrystalSymmetry, Normalization};
    use crate::progress::NullSink;

    #[test]
    fn gp_interpolates_training_data() {
        // y = cos(alpha): smooth on the torus, easy for the SE kernel.
        let points: Vec<([f64; 6], f64)> = (0..24)
            .map(|i| {
                let a = i as f64 * TWO_PI / 24.0;
                (embed(&[a, 0.0, 0.0]), a.cos())
            })
            .collect();
        let gp = Gp::fit(&points, 0.5, 1e-8).unwrap();

        for i in 0..24 {
            let a = i as f64 * TWO_PI / 24.0;
            let (mu, _) = gp.predict(&embed(&[a, 0.0, 0.0]));
            assert!((mu - a.cos()).abs() < 1e-2, "a={a}: mu={mu}");
        }

        // Uncertainty grows away from the training slice.
        let (_, sd_on) = gp.predict(&embed(&[0.1, 0.0, 0.0]));
        let (_, sd_off) = gp.predict(&embed(&[0.1, 2.0, 2.0]));
        assert!(sd_off > sd_on);
    }

    #[test]
    fn expected_improvement_behaves() {
        // A point predicted well below the incumbent has high EI.
        assert!(expected_improvement(0.0, 0.1, 1.0) > expected_improvement(1.0, 0.1, 1.0));
        // Zero spread and no improvement: zero EI.
        assert_eq!(expected_improvement(2.0, 0.0, 1.0), 0.0);
        assert!(expected_improvement(2.0, 5.0, 1.0) > 0.0);
    }

    #[test]
    fn thinning_respects_cap() {
        let points: Vec<EvaluatedPoint> = (0..100)
            .map(|i| EvaluatedPoint {
                angles: [i as f64, 0.0, 0.0],
                cost: i as f64,
            })
            .collect();
        let thinned = thin(&points, 30);
        assert!(thinned.len() <= 30);
        assert_eq!(thinned[0].cost, 0.0);
    }

    fn fitted_problem() -> (Objective, Orientation) {
        let modes = test_modes(CrystalSymmetry::Orthorhombic);
        let configs = rotation_series(3);
        let truth = Orientation::from_degrees(25.0, 40.0, 55.0);
        let obs = synthesize(&modes, &configs, &truth, 0.0, 0.02, 5).unwrap();
        let objective = Objective::new(&modes, &configs, &obs, Normalization::Auto).unwrap();
        (objective, truth)
    }

    fn posterior_around(center: Orientation, objective: &Objective) -> Posterior {
        let samples: Vec<crate::domain::PosteriorSample> = (0..50)
            .map(|i| {
                let d = (i as f64 - 25.0) * 1e-3;
                let o = Orientation::new(center.alpha + d, center.beta + d, center.gamma + d);
                crate::domain::PosteriorSample {
                    orientation: o,
                    log_likelihood: objective.log_likelihood(&o),
                }
            })
            .collect();
        let credible = [
            CredibleInterval {
                lo: wrap_angle(center.alpha - 0.03),
                hi: wrap_angle(center.alpha + 0.03),
            },
            CredibleInterval {
                lo: wrap_angle(center.beta - 0.03),
                hi: wrap_angle(center.beta + 0.03),
            },
            CredibleInterval {
                lo: wrap_angle(center.gamma - 0.03),
                hi: wrap_angle(center.gamma + 0.03),
            },
        ];
        Posterior {
            samples,
            acceptance_rate: 0.4,
            effective_sample_size: 30.0,
            mean: center,
            credible,
        }
    }

    #[test]
    fn refine_improves_or_keeps_the_incumbent() {
        let (objective, truth) = fitted_problem();
        let cache = EvalCache::new();

        // Seed the cache with coarse evaluations plus a decent point.
        for i in 0..40 {
            let o = Orientation::new(
                i as f64 * 0.157,
                (i as f64 * 0.21) % TWO_PI,
                (i as f64 * 0.33) % TWO_PI,
            );
            cache.push(o.to_array(), objective.cost(&o));
        }
        let near = Orientation::new(truth.alpha + 0.02, truth.beta - 0.02, truth.gamma + 0.02);
        cache.push(near.to_array(), objective.cost(&near));
        let incumbent_cost = cache
            .snapshot()
            .iter()
            .map(|p| p.cost)
            .fold(f64::INFINITY, f64::min);

        let posterior = posterior_around(truth, &objective);
        let outcome = refine(
            &objective,
            &SurrogateConfig::default(),
            &cache,
            &posterior,
            13,
            usize::MAX - 1,
            &NullSink,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(!outcome.cancelled);
        assert!(outcome.rounds_run > 0);
        assert!(outcome.refined.cost <= incumbent_cost);
        // Truth and posterior agree here; no ambiguity flag expected.
        assert!(!outcome.ambiguous);
        for interval in &outcome.refined.confidence {
            assert!(interval.lo.is_finite() && interval.hi.is_finite());
        }
    }

    #[test]
    fn disagreement_flags_ambiguity() {
        let (objective, truth) = fitted_problem();
        let cache = EvalCache::new();
        for i in 0..20 {
            let o = Orientation::new(i as f64 * 0.3, i as f64 * 0.5, i as f64 * 0.7);
            cache.push(o.to_array(), objective.cost(&o));
        }
        cache.push(truth.to_array(), objective.cost(&truth));

        // A posterior parked far from the surrogate optimum.
        let far = Orientation::from_degrees(160.0, 100.0, 10.0);
        let posterior = posterior_around(far, &objective);

        let outcome = refine(
            &objective,
            &SurrogateConfig::default(),
            &cache,
            &posterior,
            13,
            usize::MAX - 1,
            &NullSink,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(outcome.ambiguous);
    }

    #[test]
    fn refine_with_tiny_cache_is_rejected() {
        let (objective, truth) = fitted_problem();
        let cache = EvalCache::new();
        cache.push(truth.to_array(), objective.cost(&truth));
        let posterior = posterior_around(truth, &objective);

        let err = refine(
            &objective,
            &SurrogateConfig::default(),
            &cache,
            &posterior,
            13,
            usize::MAX - 1,
            &NullSink,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn cancelled_refine_still_reconciles() {
        let (objective, truth) = fitted_problem();
        let cache = EvalCache::new();
        for i in 0..10 {
            let o = Orientation::new(i as f64 * 0.6, i as f64 * 0.4, i as f64 * 0.2);
            cache.push(o.to_array(), objective.cost(&o));
        }
        let cancel = CancelToken::new();
        cancel.cancel();

        let posterior = posterior_around(truth, &objective);
        let outcome = refine(
            &objective,
            &SurrogateConfig::default(),
            &cache,
            &posterior,
            13,
            usize::MAX - 1,
            &NullSink,
            &cancel,
        )
        .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.rounds_run, 0);
        assert!(outcome.refined.cost.is_finite());
    }
}
