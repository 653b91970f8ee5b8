//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - crystal symmetry classes and measurement inputs (`CrystalSymmetry`,
//!   `VibrationalMode`, `PolarizationConfiguration`, `ObservedPeak`)
//! - the orientation being estimated (`Orientation`)
//! - per-stage configuration structs (`Stage1Config`, `McmcConfig`,
//!   `SurrogateConfig`, bundled in `FitConfig`)
//! - fit outputs (`FitResult`, `FitOutcome`, `Posterior`, etc.)

pub mod types;

pub use types::*;
