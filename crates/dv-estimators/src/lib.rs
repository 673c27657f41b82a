//! # dv-estimators
//!
//! Pluggable density models for divergence scoring. An estimator is fit
//! separately to a candidate window and to the rest of the data, and exposes
//! log-likelihoods and sampled densities under both partial models.
//!
//! The scoring layer (`dv-divergence`) depends only on the
//! [`DensityEstimator`] trait; the Gaussian closed-form fast path is reached
//! through the `as_gaussian` capability query.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// The estimator contract consumed by the scoring layer.
pub mod estimator;
/// Parametric Gaussian estimator with closed-form accessors.
pub mod gaussian;
/// Nonparametric kernel density estimator.
pub mod kde;

pub use estimator::DensityEstimator;
pub use gaussian::{CovMode, GaussianEstimator};
pub use kde::KernelDensityEstimator;
