//! Stage 2: affine-invariant ensemble MCMC over orientation.
//!
//! Goodman–Weare stretch moves with the standard two-half ensemble update:
//! each walker proposes a move along the line to a partner drawn from the
//! complementary half, scaled by `z ~ g(z) ∝ 1/√z` on `[1/a, a]`, and accepts
//! with probability `min(1, z^{d-1} · exp(Δ log L))`.
//!
//! Determinism: every random draw (partner index, stretch factor, accept
//! threshold) comes from one seeded `StdRng` in a fixed order; only the
//! log-likelihood evaluations run in parallel. A fixed seed, walker count and
//! step count therefore reproduce byte-identical samples regardless of the
//! number of worker threads.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use rayon::prelude::*;

use crate::domain::{
    CredibleInterval, McmcConfig, Orientation, PointEstimate, Posterior, PosteriorSample,
};
use crate::error::AppError;
use crate::fit::cache::{EvalCache, EvaluatedPoint};
use crate::math::{circular_mean, circular_quantile, effective_sample_size};
use crate::objective::Objective;
use crate::progress::{CancelToken, ProgressEvent, ProgressSink, Stage};

/// Stage-2 output.
#[derive(Debug, Clone)]
pub struct McmcOutcome {
    pub posterior: Posterior,
    /// Acceptance rate fell outside the configured healthy band.
    pub poor_mixing: bool,
    /// The run was cancelled; `posterior` holds the partial draws.
    pub cancelled: bool,
}

/// Sample the orientation posterior, seeded by Stage-1 minima.
pub fn sample_posterior(
    objective: &Objective,
    config: &McmcConfig,
    seeds: &[PointEstimate],
    seed: u64,
    cache: &EvalCache,
    emit_every: usize,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<McmcOutcome, AppError> {
    if seeds.is_empty() {
        return Err(AppError::invalid_input(
            "Stage 2 needs at least one Stage-1 seed point.",
        ));
    }

    let n_walkers = config.n_walkers;
    let half = n_walkers / 2;
    let mut rng = StdRng::seed_from_u64(seed);
    let ball = Normal::new(0.0, config.seed_ball_sigma)
        .map_err(|e| AppError::invalid_input(format!("Invalid seed_ball_sigma: {e}")))?;

    // Scatter walkers in Gaussian balls around the seeds, cycling over the
    // retained minima so every basin gets walkers.
    let mut positions: Vec<[f64; 3]> = (0..n_walkers)
        .map(|w| {
            let anchor = seeds[w % seeds.len()].orientation.to_array();
            [
                anchor[0] + ball.sample(&mut rng),
                anchor[1] + ball.sample(&mut rng),
                anchor[2] + ball.sample(&mut rng),
            ]
        })
        .collect();
    let mut log_liks: Vec<f64> = positions
        .par_iter()
        .map(|p| objective.log_likelihood(&Orientation::from_array(*p)))
        .collect();

    let burn_in = ((config.n_steps as f64) * config.burn_in_frac).floor() as usize;
    let mut samples: Vec<PosteriorSample> = Vec::new();
    let mut step_mean_ll: Vec<f64> = Vec::new();
    let mut accepted = 0usize;
    let mut proposed = 0usize;
    let mut completed_steps = 0usize;
    let mut cancelled = false;

    for step in 0..config.n_steps {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        // Two-half update: move the first half against the second, then the
        // second against the (already moved) first.
        for half_idx in 0..2 {
            let (active_start, active_end, other_start) = if half_idx == 0 {
                (0, half, half)
            } else {
                (half, n_walkers, 0)
            };

            // All randomness is drawn sequentially, in walker order.
            let draws: Vec<(usize, f64, f64)> = (active_start..active_end)
                .map(|_| {
                    let partner = other_start + rng.gen_range(0..half);
                    let u: f64 = rng.gen_range(0.0..1.0);
                    let a = config.stretch_a;
                    let z = ((a - 1.0) * u + 1.0).powi(2) / a;
                    let accept_u: f64 = rng.gen_range(0.0..1.0);
                    (partner, z, accept_u)
                })
                .collect();

            let proposals: Vec<[f64; 3]> = (active_start..active_end)
                .zip(&draws)
                .map(|(w, &(partner, z, _))| {
                    let x = positions[w];
                    let c = positions[partner];
                    [
                        c[0] + z * (x[0] - c[0]),
                        c[1] + z * (x[1] - c[1]),
                        c[2] + z * (x[2] - c[2]),
                    ]
                })
                .collect();

            // Likelihood evaluation is the expensive part; fan it out.
            let proposal_lls: Vec<f64> = proposals
                .par_iter()
                .map(|p| objective.log_likelihood(&Orientation::from_array(*p)))
                .collect();

            // Sequential accept/reject in walker order.
            for (offset, w) in (active_start..active_end).enumerate() {
                let (_, z, accept_u) = draws[offset];
                let proposal_ll = proposal_lls[offset];
                proposed += 1;

                // d-1 = 2 for three orientation angles.
                let log_accept = 2.0 * z.ln() + proposal_ll - log_liks[w];
                if proposal_ll > f64::NEG_INFINITY && accept_u.ln() < log_accept {
                    positions[w] = proposals[offset];
                    log_liks[w] = proposal_ll;
                    accepted += 1;
                }
            }
        }

        completed_steps = step + 1;

        if step >= burn_in {
            for w in 0..n_walkers {
                samples.push(PosteriorSample {
                    orientation: Orientation::from_array(positions[w]),
                    log_likelihood: log_liks[w],
                });
            }
            step_mean_ll.push(log_liks.iter().sum::<f64>() / n_walkers as f64);

            if (step - burn_in) % config.cache_thin == 0 {
                cache.extend((0..n_walkers).map(|w| EvaluatedPoint {
                    angles: positions[w],
                    cost: objective.cost_from_log_likelihood(log_liks[w]),
                }));
            }
        }

        if step % emit_every == 0 {
            let best = log_liks
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            sink.emit(ProgressEvent {
                stage: Stage::Sampling,
                iteration: step,
                total: config.n_steps,
                best_cost: objective.cost_from_log_likelihood(best),
            });
        }
    }

    let acceptance_rate = if proposed > 0 {
        accepted as f64 / proposed as f64
    } else {
        0.0
    };
    // Mixing can only be judged when proposals were actually made; a run
    // cancelled before its first step is incomplete, not poorly mixed.
    let poor_mixing = proposed > 0
        && (acceptance_rate < config.acceptance_min || acceptance_rate > config.acceptance_max);

    sink.emit(ProgressEvent {
        stage: Stage::Sampling,
        iteration: completed_steps,
        total: config.n_steps,
        best_cost: objective.cost_from_log_likelihood(
            log_liks.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ),
    });

    let posterior = summarize(samples, step_mean_ll, acceptance_rate, seeds[0].orientation);

    Ok(McmcOutcome {
        posterior,
        poor_mixing,
        cancelled,
    })
}

/// Build the posterior summary: circular means and 95% credible intervals
/// from sample quantiles. Falls back to the Stage-1 seed when there are no
/// post-burn-in draws (e.g. cancelled during burn-in).
fn summarize(
    samples: Vec<PosteriorSample>,
    step_mean_ll: Vec<f64>,
    acceptance_rate: f64,
    fallback: Orientation,
) -> Posterior {
    let ess = effective_sample_size(&step_mean_ll);

    let mut mean = fallback;
    let mut credible = [CredibleInterval { lo: 0.0, hi: 0.0 }; 3];

    if !samples.is_empty() {
        let per_angle: [Vec<f64>; 3] = [
            samples.iter().map(|s| s.orientation.alpha).collect(),
            samples.iter().map(|s| s.orientation.beta).collect(),
            samples.iter().map(|s| s.orientation.gamma).collect(),
        ];
        let mut centers = [0.0; 3];
        for (i, angles) in per_angle.iter().enumerate() {
            let center = circular_mean(angles).unwrap_or(match i {
                0 => fallback.alpha,
                1 => fallback.beta,
                _ => fallback.gamma,
            });
            centers[i] = center;
            credible[i] = CredibleInterval {
                lo: circular_quantile(angles, center, 0.025).unwrap_or(center),
                hi: circular_quantile(angles, center, 0.975).unwrap_or(center),
            };
        }
        mean = Orientation::new(centers[0], centers[1], centers[2]);
    }

    Posterior {
        samples,
        acceptance_rate,
        effective_sample_size: ess,
        mean,
        credible,
    }
}
