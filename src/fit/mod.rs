//! The three-stage fitting pipeline.
//!
//! Stage 1 (`stage1`): deterministic global search + Nelder–Mead polish.
//! Stage 2 (`mcmc`): affine-invariant ensemble posterior sampling.
//! Stage 3 (`surrogate`): GP-guided refinement reconciled with the posterior.
//!
//! All stages share one true-objective evaluation cache (`cache`) and the
//! aggregator (`aggregate`) merges their outputs into the final `FitResult`.

pub mod aggregate;
pub mod cache;
pub mod mcmc;
pub mod stage1;
pub mod surrogate;

pub use aggregate::aggregate;
pub use cache::{EvalCache, EvaluatedPoint};
pub use mcmc::{McmcOutcome, sample_posterior};
pub use stage1::{Stage1Outcome, fit_point_estimate};
pub use surrogate::{RefineOutcome, refine};
