//! Progress events and cooperative cancellation.
//!
//! Long fits (Stage 2/3 especially) report coarse progress to a sink at a
//! bounded stride, never per-evaluation, so a UI thread is not overwhelmed.
//! Cancellation is checked between walker steps / surrogate rounds; a
//! cancelled run returns its best partial result flagged incomplete rather
//! than erroring.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Pipeline stage, for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Search,
    Sampling,
    Refinement,
}

impl Stage {
    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Search => "stage 1 (search)",
            Stage::Sampling => "stage 2 (sampling)",
            Stage::Refinement => "stage 3 (refinement)",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub iteration: usize,
    pub total: usize,
    pub best_cost: f64,
}

/// Receiver of progress events. Implementations must be cheap and
/// thread-safe; stages may emit from worker contexts.
pub trait ProgressSink: Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards all events. The default when no UI is attached.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Prints events to stderr; used by the CLI.
pub struct StderrSink;

impl ProgressSink for StderrSink {
    fn emit(&self, event: ProgressEvent) {
        eprintln!(
            "[{}] iteration {}/{} best cost {:.6e}",
            event.stage.display_name(),
            event.iteration,
            event.total,
            event.best_cost
        );
    }
}

/// Cooperative cancellation flag, shared between the caller and the run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
