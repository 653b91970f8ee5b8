//! Command-line parsing for the orientation fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the modeling/math code.

use clap::{Parser, Subcommand};

use crate::domain::{CrystalSymmetry, Normalization};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "raman-orient",
    version,
    about = "Crystal orientation fitting from polarized Raman intensities"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a seeded synthetic scenario end-to-end and print the run summary.
    ///
    /// This exercises the same pipeline a GUI caller would use, with
    /// observations generated from a known ground-truth orientation so the
    /// recovery error can be printed alongside the fit.
    Demo(DemoArgs),
}

/// Options for the synthetic demo run.
#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Crystal symmetry class of the synthetic modes.
    #[arg(long, value_enum, default_value_t = CrystalSymmetry::Orthorhombic)]
    pub symmetry: CrystalSymmetry,

    /// Ground-truth alpha (degrees, ZYZ).
    #[arg(long, default_value_t = 25.0)]
    pub alpha: f64,

    /// Ground-truth beta (degrees, ZYZ).
    #[arg(long, default_value_t = 40.0)]
    pub beta: f64,

    /// Ground-truth gamma (degrees, ZYZ).
    #[arg(long, default_value_t = 55.0)]
    pub gamma: f64,

    /// Sample-rotation steps in the synthetic experiment design.
    #[arg(long, default_value_t = 4)]
    pub series: usize,

    /// Relative measurement noise applied to synthetic intensities.
    #[arg(long, default_value_t = 0.02)]
    pub noise: f64,

    /// Master RNG seed (synthesis and all fit stages).
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Intensity normalization scheme.
    #[arg(long, value_enum, default_value_t = Normalization::Auto)]
    pub normalization: Normalization,

    /// Skip Stage 2 (posterior sampling) and Stage 3.
    #[arg(long)]
    pub no_mcmc: bool,

    /// Skip Stage 3 (surrogate refinement).
    #[arg(long)]
    pub no_refine: bool,

    /// MCMC walkers (even, >= 6).
    #[arg(long, default_value_t = 32)]
    pub walkers: usize,

    /// MCMC steps per walker.
    #[arg(long, default_value_t = 400)]
    pub steps: usize,

    /// Suppress progress output on stderr.
    #[arg(long)]
    pub quiet: bool,
}
