//! The shared fit pipeline used by the CLI front-end and by library callers.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! validate -> objective -> stage 1 search -> stage 2 posterior -> stage 3
//! refinement -> aggregate.
//!
//! Front-ends focus on presentation; all stage sequencing, cancellation
//! checkpoints, and seed derivation live here.

use crate::domain::{
    FitConfig, FitResult, ObservedPeak, PolarizationConfiguration, VibrationalMode,
};
use crate::error::AppError;
use crate::fit::cache::EvalCache;
use crate::fit::{aggregate, fit_point_estimate, refine, sample_posterior};
use crate::objective::Objective;
use crate::progress::{CancelToken, ProgressSink};

/// Execute the full fitting pipeline and return the aggregated result.
///
/// Stage sequencing:
/// - Stage 1 always runs; it is the only stage that may hard-fail on a
///   feasibility problem.
/// - Stages 2 and 3 run when enabled and not yet cancelled. Cancellation
///   between stages (or inside one) degrades the outcome ladder and flags
///   the result `Incomplete`; it never discards completed stages.
///
/// All randomness derives from `config.seed`; each stage gets its own
/// sub-seed so enabling or disabling a later stage never changes an earlier
/// stage's draws.
pub fn run_fit(
    modes: &[VibrationalMode],
    configs: &[PolarizationConfiguration],
    observations: &[ObservedPeak],
    config: &FitConfig,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<FitResult, AppError> {
    config.validate()?;
    let objective = Objective::new(modes, configs, observations, config.normalization)?;
    let cache = EvalCache::new();

    let stage1 = fit_point_estimate(&objective, &config.stage1, config.seed, &cache, sink)?;

    let stage2 = if config.run_mcmc && !cancel.is_cancelled() {
        Some(sample_posterior(
            &objective,
            &config.mcmc,
            &stage1.minima,
            config.seed.wrapping_add(1),
            &cache,
            config.emit_every,
            sink,
            cancel,
        )?)
    } else {
        None
    };

    // Stage 3 only ever annotates the earlier stages: a refine failure
    // (e.g. too few cached evaluations to train a surrogate) degrades the
    // outcome to the Stage-2 ladder instead of aborting a run that already
    // holds valid results.
    let stage3 = match &stage2 {
        Some(m) if config.run_refine && !m.cancelled && !cancel.is_cancelled() => refine(
            &objective,
            &config.surrogate,
            &cache,
            &m.posterior,
            config.seed.wrapping_add(2),
            config.emit_every,
            sink,
            cancel,
        )
        .ok(),
        _ => None,
    };

    let run_cancelled = cancel.is_cancelled();
    let cached = cache.len();
    Ok(aggregate(stage1, stage2, stage3, run_cancelled, cached))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{rotation_series, synthesize, test_modes};
    use crate::domain::{
        CrystalSymmetry, FitOutcome, Orientation, QualityFlag,
    };
    use crate::progress::NullSink;

    fn small_config(run_mcmc: bool, run_refine: bool) -> FitConfig {
        let mut config = FitConfig {
            run_mcmc,
            run_refine,
            ..FitConfig::default()
        };
        config.stage1.grid_steps = 5;
        config.stage1.random_restarts = 8;
        config.mcmc.n_walkers = 12;
        config.mcmc.n_steps = 120;
        config.surrogate.rounds = 6;
        config.surrogate.candidates = 64;
        config
    }

    #[test]
    fn stage1_only_run_produces_point_only() {
        let modes = test_modes(CrystalSymmetry::Orthorhombic);
        let configs = rotation_series(3);
        let truth = Orientation::from_degrees(15.0, 35.0, 60.0);
        let obs = synthesize(&modes, &configs, &truth, 0.0, 0.02, 1).unwrap();

        let result = run_fit(
            &modes,
            &configs,
            &obs,
            &small_config(false, false),
            &NullSink,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(matches!(result.outcome, FitOutcome::PointOnly { .. }));
        assert!(result.flags.is_empty());
        assert!(result.diagnostics.cached_evaluations > 0);
    }

    #[test]
    fn full_ladder_recovers_a_well_posed_orientation() {
        let modes = test_modes(CrystalSymmetry::Orthorhombic);
        let configs = rotation_series(4);
        let truth = Orientation::from_degrees(20.0, 45.0, 70.0);
        let obs = synthesize(&modes, &configs, &truth, 0.01, 0.02, 11).unwrap();

        let result = run_fit(
            &modes,
            &configs,
            &obs,
            &small_config(true, true),
            &NullSink,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(matches!(result.outcome, FitOutcome::FullyRefined { .. }));
        let best = result.outcome.best_estimate();
        // Orthorhombic diagonal tensors leave a 222 orientation ambiguity;
        // accept any equivalent of the truth.
        let rf = crate::model::rotation_matrix(&best.orientation);
        let rt = crate::model::rotation_matrix(&truth);
        let equivalents = [
            nalgebra::Matrix3::identity(),
            nalgebra::Matrix3::new(1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0),
            nalgebra::Matrix3::new(-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0),
            nalgebra::Matrix3::new(-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0),
        ];
        let err = equivalents
            .iter()
            .map(|s| crate::model::misorientation_matrices_deg(&rf, &(rt * s)))
            .fold(f64::INFINITY, f64::min);
        assert!(err < 5.0, "misorientation from truth: {err:.2} deg");
        assert!(result.diagnostics.stage2_acceptance.is_some());
        assert!(result.diagnostics.stage3_rounds.is_some());
    }

    #[test]
    fn surrogate_failure_degrades_to_posterior_outcome() {
        // The same stage composition run_fit performs, with an evaluation
        // cache too small to train a surrogate on: Stage 3 fails, and the
        // run keeps its Stage 1/2 results rather than erroring.
        let modes = test_modes(CrystalSymmetry::Orthorhombic);
        let configs = rotation_series(3);
        let truth = Orientation::from_degrees(15.0, 35.0, 60.0);
        let obs = synthesize(&modes, &configs, &truth, 0.0, 0.02, 4).unwrap();
        let config = small_config(true, true);
        let objective = crate::objective::Objective::new(
            &modes,
            &configs,
            &obs,
            config.normalization,
        )
        .unwrap();
        let sink = NullSink;
        let cancel = CancelToken::new();

        let scratch = crate::fit::cache::EvalCache::new();
        let stage1 =
            fit_point_estimate(&objective, &config.stage1, config.seed, &scratch, &sink).unwrap();
        let stage2 = sample_posterior(
            &objective,
            &config.mcmc,
            &stage1.minima,
            config.seed.wrapping_add(1),
            &scratch,
            config.emit_every,
            &sink,
            &cancel,
        )
        .unwrap();

        let starved = crate::fit::cache::EvalCache::new();
        starved.push(stage1.best.orientation.to_array(), stage1.best.cost);
        let stage3 = refine(
            &objective,
            &config.surrogate,
            &starved,
            &stage2.posterior,
            config.seed.wrapping_add(2),
            config.emit_every,
            &sink,
            &cancel,
        )
        .ok();
        assert!(stage3.is_none());

        let cached = starved.len();
        let result = aggregate(stage1, Some(stage2), stage3, false, cached);
        assert!(matches!(result.outcome, FitOutcome::PointWithPosterior { .. }));
        assert!(!result.flags.contains(&QualityFlag::Incomplete));
    }

    #[test]
    fn pre_cancelled_run_degrades_to_point_only_with_incomplete_flag() {
        let modes = test_modes(CrystalSymmetry::Orthorhombic);
        let configs = rotation_series(3);
        let truth = Orientation::from_degrees(30.0, 50.0, 80.0);
        let obs = synthesize(&modes, &configs, &truth, 0.0, 0.02, 2).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = run_fit(
            &modes,
            &configs,
            &obs,
            &small_config(true, true),
            &NullSink,
            &cancel,
        )
        .unwrap();

        assert!(matches!(result.outcome, FitOutcome::PointOnly { .. }));
        assert!(result.flags.contains(&QualityFlag::Incomplete));
    }

    #[test]
    fn empty_observations_fail_validation_with_exit_code_2() {
        let modes = test_modes(CrystalSymmetry::Orthorhombic);
        let configs = rotation_series(3);
        let err = run_fit(
            &modes,
            &configs,
            &[],
            &small_config(false, false),
            &NullSink,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn refine_without_mcmc_is_rejected_before_any_work() {
        let modes = test_modes(CrystalSymmetry::Orthorhombic);
        let configs = rotation_series(3);
        let truth = Orientation::from_degrees(10.0, 10.0, 10.0);
        let obs = synthesize(&modes, &configs, &truth, 0.0, 0.02, 3).unwrap();
        let err = run_fit(
            &modes,
            &configs,
            &obs,
            &small_config(false, true),
            &NullSink,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
