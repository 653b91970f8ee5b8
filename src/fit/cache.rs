//! Shared evaluated-points cache.
//!
//! Stages 1 and 2 record (orientation, cost) pairs here; Stage 3 trains its
//! surrogate on a snapshot. The cache is append-only within a run and
//! lock-protected so concurrent evaluations can feed it safely. Snapshot
//! order is deterministic because every appender pushes in a deterministic
//! order outside its parallel sections.

use std::sync::Mutex;

/// One recorded true-objective evaluation. Angles are stored unwrapped-free
/// as a plain array so the surrogate can embed them without conversions.
#[derive(Debug, Clone, Copy)]
pub struct EvaluatedPoint {
    pub angles: [f64; 3],
    pub cost: f64,
}

#[derive(Debug, Default)]
pub struct EvalCache {
    inner: Mutex<Vec<EvaluatedPoint>>,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finite-cost evaluation. Non-finite costs are dropped: the
    /// surrogate cannot regress on infinities.
    pub fn push(&self, angles: [f64; 3], cost: f64) {
        if !cost.is_finite() {
            return;
        }
        self.inner
            .lock()
            .expect("eval cache lock poisoned")
            .push(EvaluatedPoint { angles, cost });
    }

    pub fn extend(&self, points: impl IntoIterator<Item = EvaluatedPoint>) {
        let mut guard = self.inner.lock().expect("eval cache lock poisoned");
        guard.extend(points.into_iter().filter(|p| p.cost.is_finite()));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("eval cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<EvaluatedPoint> {
        self.inner.lock().expect("eval cache lock poisoned").clone()
    }
}
