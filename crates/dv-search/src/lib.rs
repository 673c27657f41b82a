//! # dv-search
//!
//! The interval search driver: generates candidate windows, scores them in
//! parallel with worker-local divergence clones, and keeps the best
//! non-overlapping detections.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Non-maximum suppression of scored ranges.
pub mod nms;
/// Candidate window generation.
pub mod proposals;
/// The parallel scoring scan.
pub mod search;

pub use nms::non_maximum_suppression;
pub use proposals::{DenseProposals, PointwiseProposals, ProposalGenerator};
pub use search::IntervalSearch;
