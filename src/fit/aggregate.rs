//! Result aggregation.
//!
//! A pure merge of whatever the stages produced into one `FitResult`.
//! Stages may be skipped (by configuration or cancellation); the outcome
//! variant reflects exactly which stages completed, and diagnostics become
//! quality flags, never errors.

use crate::domain::{
    FitOutcome, FitResult, QualityFlag, RunDiagnostics,
};
use crate::fit::mcmc::McmcOutcome;
use crate::fit::stage1::Stage1Outcome;
use crate::fit::surrogate::RefineOutcome;

/// Merge stage outputs into the final result.
///
/// `cached_evaluations` is the shared cache length at the end of the run.
pub fn aggregate(
    stage1: Stage1Outcome,
    stage2: Option<McmcOutcome>,
    stage3: Option<RefineOutcome>,
    cancelled: bool,
    cached_evaluations: usize,
) -> FitResult {
    let mut flags = Vec::new();

    let stage2_acceptance = stage2.as_ref().map(|m| m.posterior.acceptance_rate);
    let stage3_rounds = stage3.as_ref().map(|r| r.rounds_run);

    if let Some(m) = &stage2 {
        if m.poor_mixing {
            flags.push(QualityFlag::PoorMixing);
        }
    }
    if let Some(r) = &stage3 {
        if r.ambiguous {
            flags.push(QualityFlag::Ambiguous);
        }
    }
    let any_partial =
        cancelled
            || stage2.as_ref().is_some_and(|m| m.cancelled)
            || stage3.as_ref().is_some_and(|r| r.cancelled);
    if any_partial {
        flags.push(QualityFlag::Incomplete);
    }

    let stage1_best_cost = stage1.best.cost;
    let outcome = match (stage2, stage3) {
        (None, _) => FitOutcome::PointOnly { point: stage1.best },
        (Some(m), None) => FitOutcome::PointWithPosterior {
            point: stage1.best,
            posterior: m.posterior,
        },
        (Some(m), Some(r)) => FitOutcome::FullyRefined {
            point: stage1.best,
            posterior: m.posterior,
            refined: r.refined,
        },
    };

    FitResult {
        outcome,
        flags,
        diagnostics: RunDiagnostics {
            cached_evaluations,
            stage1_best_cost,
            stage2_acceptance,
            stage3_rounds,
        },
    }
}
