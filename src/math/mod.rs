//! Mathematical utilities: angle arithmetic and sample statistics.

pub mod angles;
pub mod stats;

pub use angles::*;
pub use stats::*;
