//! Formatted terminal output for a fit run.

use crate::domain::{
    CredibleInterval, FitConfig, FitOutcome, FitResult, Orientation, QualityFlag,
};
use crate::math::rad_to_deg;

/// Format one orientation as degrees for terminal output.
pub fn format_orientation(o: &Orientation) -> String {
    let deg = o.to_degrees();
    format!(
        "alpha={:7.2}deg  beta={:7.2}deg  gamma={:7.2}deg",
        deg[0], deg[1], deg[2]
    )
}

fn format_interval(iv: &CredibleInterval) -> String {
    format!("[{:7.2}, {:7.2}]deg", rad_to_deg(iv.lo), rad_to_deg(iv.hi))
}

fn flag_label(flag: QualityFlag) -> &'static str {
    match flag {
        QualityFlag::PoorMixing => "poor-mixing",
        QualityFlag::Ambiguous => "ambiguous",
        QualityFlag::Incomplete => "incomplete",
    }
}

/// Format the full run summary (outcome ladder + diagnostics + flags).
pub fn format_run_summary(result: &FitResult, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== raman-orient - Crystal Orientation Fit ===\n");
    out.push_str(&format!(
        "Run: {} | seed={}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        config.seed
    ));

    let stages = match &result.outcome {
        FitOutcome::PointOnly { .. } => "search",
        FitOutcome::PointWithPosterior { .. } => "search + posterior",
        FitOutcome::FullyRefined { .. } => "search + posterior + refinement",
    };
    out.push_str(&format!("Stages: {stages}\n"));

    let best = result.outcome.best_estimate();
    out.push_str(&format!(
        "\nBest orientation: {}\n",
        format_orientation(&best.orientation)
    ));
    out.push_str(&format!("Cost: {:.6e}\n", best.cost));

    if let Some(posterior) = result.outcome.posterior() {
        out.push_str("\nPosterior:\n");
        out.push_str(&format!(
            "  mean: {}\n",
            format_orientation(&posterior.mean)
        ));
        for (name, iv) in ["alpha", "beta", "gamma"].iter().zip(&posterior.credible) {
            out.push_str(&format!("  95% {name}: {}\n", format_interval(iv)));
        }
        out.push_str(&format!(
            "  draws={} | acceptance={:.3} | ESS={:.1}\n",
            posterior.samples.len(),
            posterior.acceptance_rate,
            posterior.effective_sample_size
        ));
    }

    if let FitOutcome::FullyRefined { refined, .. } = &result.outcome {
        out.push_str("\nRefined estimate:\n");
        out.push_str(&format!(
            "  {}\n",
            format_orientation(&refined.orientation)
        ));
        for (name, iv) in ["alpha", "beta", "gamma"].iter().zip(&refined.confidence) {
            out.push_str(&format!("  conf {name}: {}\n", format_interval(iv)));
        }
    }

    out.push_str("\nDiagnostics:\n");
    out.push_str(&format!(
        "  objective evaluations cached: {}\n",
        result.diagnostics.cached_evaluations
    ));
    out.push_str(&format!(
        "  stage-1 best cost: {:.6e}\n",
        result.diagnostics.stage1_best_cost
    ));
    if let Some(acc) = result.diagnostics.stage2_acceptance {
        out.push_str(&format!("  stage-2 acceptance: {acc:.3}\n"));
    }
    if let Some(rounds) = result.diagnostics.stage3_rounds {
        out.push_str(&format!("  stage-3 rounds: {rounds}\n"));
    }

    if result.flags.is_empty() {
        out.push_str("Flags: none\n");
    } else {
        let labels: Vec<&str> = result.flags.iter().map(|f| flag_label(*f)).collect();
        out.push_str(&format!("Flags: {}\n", labels.join(", ")));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PointEstimate, RunDiagnostics};

    fn point_result(flags: Vec<QualityFlag>) -> FitResult {
        FitResult {
            outcome: FitOutcome::PointOnly {
                point: PointEstimate {
                    orientation: Orientation::from_degrees(10.0, 20.0, 30.0),
                    cost: 1.25e-3,
                },
            },
            flags,
            diagnostics: RunDiagnostics {
                cached_evaluations: 321,
                stage1_best_cost: 1.25e-3,
                stage2_acceptance: None,
                stage3_rounds: None,
            },
        }
    }

    #[test]
    fn summary_contains_key_fields() {
        let summary = format_run_summary(&point_result(Vec::new()), &FitConfig::default());
        assert!(summary.contains("Best orientation"));
        assert!(summary.contains("alpha=  10.00deg"));
        assert!(summary.contains("Stages: search"));
        assert!(summary.contains("Flags: none"));
        assert!(summary.contains("evaluations cached: 321"));
    }

    #[test]
    fn flags_are_listed() {
        let summary = format_run_summary(
            &point_result(vec![QualityFlag::PoorMixing, QualityFlag::Incomplete]),
            &FitConfig::default(),
        );
        assert!(summary.contains("Flags: poor-mixing, incomplete"));
    }
}
