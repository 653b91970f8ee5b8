//! `raman-orient` library crate.
//!
//! Crystal-orientation fitting from polarized Raman peak intensities: a
//! symmetry-constrained tensor forward model, a whitened least-squares
//! objective, and a three-stage estimation pipeline (deterministic search,
//! ensemble MCMC, GP-surrogate refinement).
//!
//! The binary (`raman-orient`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the pipeline is reusable from a GUI or service front-end
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod model;
pub mod objective;
pub mod progress;
pub mod report;
