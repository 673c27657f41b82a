//! The divergence measure contract.

use std::sync::Arc;

use dv_core::Result;
use dv_tensor::{DataTensor, IndexRange};

/// A divergence measure over the window/background partition of a dataset.
///
/// Lifecycle: `init(data)` binds the measure (and its owned estimator) to a
/// dataset exactly once, then `score` is called once per candidate window;
/// `reset` clears per-run incremental estimator state between unrelated
/// search passes. Cached shape-derived scalars survive a `reset` — they
/// depend only on the bound dataset, not on any particular window.
///
/// The search layer parallelizes by giving each worker its own `clone_box`
/// copy; clones share the read-only dataset and nothing else.
pub trait Divergence: Send + Sync {
    /// Bind the measure to a dataset. Must be called before `score`.
    fn init(&mut self, data: Arc<DataTensor>) -> Result<()>;

    /// Fit the owned estimator to `range` and return the divergence between
    /// the window and the background. No side effects beyond the
    /// estimator's `fit`.
    fn score(&mut self, range: &IndexRange) -> Result<f64>;

    /// Clear per-run incremental state in the owned estimator.
    fn reset(&mut self);

    /// Produce a fully independent copy (deep-copies the owned estimator).
    fn clone_box(&self) -> Box<dyn Divergence>;
}

impl Clone for Box<dyn Divergence> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
