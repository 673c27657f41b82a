//! Common data types for DivScan

use serde::{Deserialize, Serialize};

/// A detected sub-block of the data tensor together with its divergence score.
///
/// `start`/`end` are half-open bounds over the four non-attribute axes
/// (time, x, y, z). Higher scores indicate more divergent (more anomalous)
/// ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// First point of the sub-block along (time, x, y, z).
    pub start: [usize; 4],
    /// One past the last point of the sub-block along (time, x, y, z).
    pub end: [usize; 4],
    /// Divergence score of the sub-block (higher is more anomalous).
    pub score: f64,
}

impl Detection {
    /// Create a new detection.
    pub fn new(start: [usize; 4], end: [usize; 4], score: f64) -> Self {
        Self { start, end, score }
    }

    /// Number of samples covered by the sub-block.
    pub fn num_points(&self) -> usize {
        self.start
            .iter()
            .zip(self.end.iter())
            .map(|(&s, &e)| e.saturating_sub(s))
            .product()
    }

    /// Sort detections by score, highest first. Non-finite scores sort last.
    pub fn sort_by_score(detections: &mut [Detection]) {
        detections.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or_else(|| b.score.is_finite().cmp(&a.score.is_finite()))
        });
    }
}
