//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - builds the synthetic demo scenario
//! - runs the fit pipeline
//! - prints the report

use clap::Parser;

use crate::cli::{Command, DemoArgs};
use crate::domain::{FitConfig, Orientation};
use crate::error::AppError;
use crate::progress::{CancelToken, NullSink, ProgressSink, StderrSink};

pub mod pipeline;

/// Entry point for the `raman-orient` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Demo(args) => handle_demo(args),
    }
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let truth = Orientation::from_degrees(args.alpha, args.beta, args.gamma);
    let modes = crate::data::synthetic::test_modes(args.symmetry);
    let configs = crate::data::synthetic::rotation_series(args.series.max(1));
    let observations = crate::data::synthetic::synthesize(
        &modes,
        &configs,
        &truth,
        args.noise,
        0.02,
        args.seed,
    )?;

    let config = fit_config_from_args(&args);
    let sink: Box<dyn ProgressSink> = if args.quiet {
        Box::new(NullSink)
    } else {
        Box::new(StderrSink)
    };
    let cancel = CancelToken::new();

    let result = pipeline::run_fit(&modes, &configs, &observations, &config, sink.as_ref(), &cancel)?;

    println!("{}", crate::report::format_run_summary(&result, &config));

    let best = result.outcome.best_estimate();
    let error_deg = crate::model::misorientation_deg(&best.orientation, &truth);
    println!(
        "Ground truth: {}",
        crate::report::format_orientation(&truth)
    );
    println!("Recovery error: {error_deg:.3} deg (before symmetry reduction)");

    Ok(())
}

fn fit_config_from_args(args: &DemoArgs) -> FitConfig {
    let mut config = FitConfig {
        seed: args.seed,
        run_mcmc: !args.no_mcmc,
        run_refine: !args.no_mcmc && !args.no_refine,
        normalization: args.normalization,
        ..FitConfig::default()
    };
    config.mcmc.n_walkers = args.walkers;
    config.mcmc.n_steps = args.steps;
    config
}
