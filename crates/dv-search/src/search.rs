//! The parallel scoring scan.
//!
//! One divergence measure is configured per search; each rayon worker
//! scores candidates against its own `clone_box` copy, so no fitted
//! estimator state is ever shared between threads. The data tensor itself
//! is shared read-only behind an `Arc`.

use std::sync::Arc;

use rayon::prelude::*;

use dv_core::{Detection, Result};
use dv_divergence::Divergence;
use dv_tensor::{DataTensor, IndexRange};

use crate::nms::non_maximum_suppression;
use crate::proposals::{DenseProposals, ProposalGenerator};

/// Maximum-divergence interval search over a data tensor.
pub struct IntervalSearch {
    divergence: Box<dyn Divergence>,
    proposals: ProposalGenerator,
    overlap_th: f64,
    max_detections: Option<usize>,
}

impl IntervalSearch {
    /// Create a search around a divergence measure, with dense proposals
    /// of any size, zero overlap tolerance and no detection limit.
    pub fn new(divergence: Box<dyn Divergence>) -> Self {
        Self {
            divergence,
            proposals: ProposalGenerator::Dense(DenseProposals::new(1, None)),
            overlap_th: 0.0,
            max_detections: None,
        }
    }

    /// Replace the proposal generator.
    pub fn with_proposals(mut self, proposals: ProposalGenerator) -> Self {
        self.proposals = proposals;
        self
    }

    /// Set the IoU above which two detections count as overlapping.
    pub fn with_overlap_threshold(mut self, overlap_th: f64) -> Self {
        self.overlap_th = overlap_th;
        self
    }

    /// Keep at most this many detections.
    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = Some(max_detections);
        self
    }

    /// Score every proposed window of `data` and return the best
    /// non-overlapping detections, highest score first.
    pub fn run(&mut self, data: Arc<DataTensor>) -> Result<Vec<Detection>> {
        self.divergence.reset();
        self.divergence.init(data.clone())?;

        let proposals = self.proposals.generate(&data)?;
        log::debug!("scoring {} candidate ranges", proposals.len());
        if proposals.is_empty() {
            return Ok(Vec::new());
        }

        let divergence = &self.divergence;
        let scored: Vec<(IndexRange, f64)> = proposals
            .par_iter()
            .map_init(
                || divergence.clone_box(),
                |measure, range| match measure.score(range) {
                    Ok(score) => Some((range.clone(), score)),
                    Err(e) => {
                        log::warn!("skipping range {:?}: {}", range, e);
                        None
                    }
                },
            )
            .flatten_iter()
            .collect();

        Ok(non_maximum_suppression(scored, self.overlap_th, self.max_detections))
    }
}
