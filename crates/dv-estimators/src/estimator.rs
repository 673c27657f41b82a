//! The density estimator contract.
//!
//! This trait is the seam between the scoring layer and concrete density
//! models: scoring code never names a concrete estimator, it only consumes
//! this contract (plus the optional Gaussian capability view).

use std::sync::Arc;

use dv_core::Result;
use dv_tensor::{DataTensor, IndexRange};

use crate::gaussian::GaussianEstimator;

/// A probability model fit separately to a window of the data ("inner") and
/// to everything outside it ("outer").
///
/// Lifecycle: `init` binds the estimator to a dataset once, `fit` re-fits
/// both partial models for one candidate range, `reset` clears per-run
/// state so the estimator can be reused for an unrelated search pass.
///
/// All likelihood pairs are `(under inner model, under outer model)`.
pub trait DensityEstimator: Send + Sync {
    /// Bind the estimator to a dataset. Must be called before `fit`.
    fn init(&mut self, data: Arc<DataTensor>) -> Result<()>;

    /// Fit the inner model to `range` and the outer model to its complement.
    fn fit(&mut self, range: &IndexRange) -> Result<()>;

    /// Clear fitted per-run state, keeping the dataset binding.
    fn reset(&mut self);

    /// Produce an independently owned deep copy.
    ///
    /// Clones share the read-only dataset but no mutable fitted state, so
    /// each parallel worker can fit its own copy concurrently.
    fn clone_box(&self) -> Box<dyn DensityEstimator>;

    /// Sum of log-densities of the samples *inside* `range`, under the
    /// inner and outer models.
    fn log_likelihood(&self, range: &IndexRange) -> Result<(f64, f64)>;

    /// Sum of log-densities of the samples *outside* `range`, under the
    /// inner and outer models.
    fn log_likelihood_outside(&self, range: &IndexRange) -> Result<(f64, f64)>;

    /// Sampled densities for every sample position: a 2-attribute tensor of
    /// `(density under inner model, density under outer model)` pairs, in
    /// the dataset's canonical sample order.
    fn pdf(&self) -> Result<DataTensor>;

    /// Capability query for the Gaussian closed-form fast path.
    fn as_gaussian(&self) -> Option<&GaussianEstimator> {
        None
    }
}

impl Clone for Box<dyn DensityEstimator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
