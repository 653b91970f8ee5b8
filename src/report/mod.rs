//! Terminal reporting.
//!
//! Formatting lives in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized (important for future snapshot tests)

pub mod format;

pub use format::*;
