//! Non-maximum suppression of scored ranges.
//!
//! Two variants with the same contract: keep the highest-scoring ranges
//! such that no kept pair overlaps by more than `overlap_th` (intersection
//! over union). The offline variant sorts all scores globally; since the
//! number of scored ranges grows quadratically with the data size, an
//! online bounded-insertion variant takes over above
//! [`NMS_OFFLINE_LIMIT`] candidates. The online output can depend on the
//! order scores arrive in.

use dv_core::config::NMS_OFFLINE_LIMIT;
use dv_core::Detection;
use dv_tensor::IndexRange;

/// Keep the best non-overlapping detections among `scored` ranges.
///
/// Picks the offline or online variant based on the candidate count.
/// Non-finite scores are dropped. Results are sorted by score, highest
/// first, and truncated to `max_detections` when given.
pub fn non_maximum_suppression(
    scored: Vec<(IndexRange, f64)>,
    overlap_th: f64,
    max_detections: Option<usize>,
) -> Vec<Detection> {
    if scored.len() <= NMS_OFFLINE_LIMIT {
        suppress_offline(scored, overlap_th, max_detections)
    } else {
        suppress_online(scored, overlap_th, max_detections)
    }
}

fn drop_non_finite(scored: Vec<(IndexRange, f64)>) -> Vec<(IndexRange, f64)> {
    let before = scored.len();
    let kept: Vec<_> = scored.into_iter().filter(|(_, s)| s.is_finite()).collect();
    if kept.len() < before {
        log::warn!("dropped {} non-finite scores before suppression", before - kept.len());
    }
    kept
}

/// Offline variant: global sort, then greedy selection.
pub fn suppress_offline(
    scored: Vec<(IndexRange, f64)>,
    overlap_th: f64,
    max_detections: Option<usize>,
) -> Vec<Detection> {
    let mut scored = drop_non_finite(scored);
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let limit = max_detections.unwrap_or(usize::MAX);
    let mut kept: Vec<(IndexRange, f64)> = Vec::new();
    for (range, score) in scored {
        if kept.len() >= limit {
            break;
        }
        if kept.iter().all(|(k, _)| k.iou(&range) <= overlap_th) {
            kept.push((range, score));
        }
    }
    kept.into_iter().map(|(r, s)| Detection::new(r.start, r.end, s)).collect()
}

/// Online variant: bounded insertion without materializing the global sort.
///
/// A candidate is dropped when it overlaps an already-kept range with an
/// equal or higher score; otherwise it evicts the overlapped lower-scoring
/// ranges and is inserted in score order.
pub fn suppress_online(
    scored: Vec<(IndexRange, f64)>,
    overlap_th: f64,
    max_detections: Option<usize>,
) -> Vec<Detection> {
    let limit = max_detections.unwrap_or(usize::MAX);
    let mut kept: Vec<(IndexRange, f64)> = Vec::new();

    for (range, score) in scored {
        if !score.is_finite() {
            continue;
        }
        if kept.iter().any(|(k, s)| *s >= score && k.iou(&range) > overlap_th) {
            continue;
        }
        kept.retain(|(k, s)| *s >= score || k.iou(&range) <= overlap_th);

        let pos = kept.partition_point(|(_, s)| *s > score);
        kept.insert(pos, (range, score));
        kept.truncate(limit);
    }

    kept.into_iter().map(|(r, s)| Detection::new(r.start, r.end, s)).collect()
}
