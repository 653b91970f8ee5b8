//! Input construction helpers.
//!
//! The fitting pipeline takes its modes, configurations, and observations
//! from the caller; this module provides the canonical builders the demo
//! binary and the tests share, plus seeded synthetic observation generation.

pub mod synthetic;
