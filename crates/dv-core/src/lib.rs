//! # dv-core
//!
//! Shared foundation for the DivScan workspace: the error type, the
//! `Detection` result record, and the documented performance tunables.
//!
//! Higher-level crates (`dv-tensor`, `dv-estimators`, `dv-divergence`,
//! `dv-search`) depend on this crate only; nothing here depends on them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::Detection;
