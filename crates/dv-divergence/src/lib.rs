//! # dv-divergence
//!
//! The scoring primitive of DivScan: a divergence measure fits a density
//! estimator to a candidate window ("inner") and the remaining data
//! ("outer") and reduces their difference to one comparable scalar. Higher
//! magnitude means a more anomalous window.
//!
//! Two concrete measures are provided:
//! - [`KlDivergence`]: Kullback-Leibler divergence with four directional
//!   modes, a closed-form fast path for Gaussian estimators and a general
//!   nonparametric fallback.
//! - [`JsDivergence`]: symmetric Jensen-Shannon divergence over sampled
//!   pointwise densities.
//!
//! Measures are stateless across scoring calls except through the owned
//! estimator: repeated calls with different ranges on the same initialized
//! measure are independent and order-insensitive.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// The divergence measure contract.
pub mod divergence;
/// Jensen-Shannon divergence.
pub mod js;
/// Kullback-Leibler divergence.
pub mod kl;

pub use divergence::Divergence;
pub use js::JsDivergence;
pub use kl::{KlDivergence, KlMode};
