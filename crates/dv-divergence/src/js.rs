//! Jensen-Shannon divergence between the window and background models.
//!
//! The score is assembled from the estimator's sampled density tensor: for
//! every sample position the pointwise mixture `m = (p_inner + p_outer) / 2`
//! is compared against the density of the partition the position belongs
//! to. The result is normalized to base 2, so it lies in `[0, 1]` under
//! ideal density estimates; the epsilon stabilization can push it slightly
//! outside that range at pathological densities, which callers must
//! tolerate.
//!
//! Invariant: the density tensor is enumerated in the dataset's canonical
//! sample order, which is the same order `IndexRange::contains` coordinates
//! are generated in by the index iterator.

use std::sync::Arc;

use dv_core::{Error, Result};
use dv_estimators::DensityEstimator;
use dv_tensor::{DataTensor, IndexRange};

use crate::divergence::Divergence;

/// JS divergence measure over an owned density estimator.
pub struct JsDivergence {
    estimator: Box<dyn DensityEstimator>,
    num_samples: usize,
}

impl JsDivergence {
    /// Create an unbound measure owning `estimator`.
    pub fn new(estimator: Box<dyn DensityEstimator>) -> Self {
        Self { estimator, num_samples: 0 }
    }

    /// Create a measure and bind it to `data` in one step.
    pub fn with_data(estimator: Box<dyn DensityEstimator>, data: Arc<DataTensor>) -> Result<Self> {
        let mut measure = Self::new(estimator);
        measure.init(data)?;
        Ok(measure)
    }
}

impl Divergence for JsDivergence {
    fn init(&mut self, data: Arc<DataTensor>) -> Result<()> {
        if data.num_attrib() == 0 {
            return Err(Error::Validation(
                "data must have at least one attribute".to_string(),
            ));
        }
        self.estimator.init(data.clone())?;
        self.num_samples = data.num_samples();
        Ok(())
    }

    fn score(&mut self, range: &IndexRange) -> Result<f64> {
        if self.num_samples == 0 {
            return Err(Error::Computation("measure has not been initialized".to_string()));
        }
        let num_extremes = range.num_points();
        if num_extremes == 0 {
            return Err(Error::Validation("window is empty".to_string()));
        }
        if num_extremes >= self.num_samples {
            return Err(Error::Validation(
                "window must leave at least one background sample".to_string(),
            ));
        }
        let num_non_extremes = self.num_samples - num_extremes;

        self.estimator.fit(range)?;
        let pdf = self.estimator.pdf()?;
        if pdf.num_attrib() != 2 || pdf.num_samples() != self.num_samples {
            return Err(Error::Computation(format!(
                "estimator pdf has shape {:?}, expected {} samples with 2 attributes",
                pdf.shape(),
                self.num_samples
            )));
        }

        let eps = f64::EPSILON;
        let mut score_inner = 0.0;
        let mut score_outer = 0.0;
        for (i, idx) in pdf.index_vector().enumerate() {
            let s = pdf.sample(i);
            let combined = (0.5 * (s[0] + s[1]) + eps).ln();
            if range.contains(&idx) {
                score_inner += (s[0] + eps).ln() - combined;
            } else {
                score_outer += (s[1] + eps).ln() - combined;
            }
        }

        Ok((score_inner / num_extremes as f64 + score_outer / num_non_extremes as f64)
            / (2.0 * std::f64::consts::LN_2))
    }

    fn reset(&mut self) {
        self.estimator.reset();
    }

    fn clone_box(&self) -> Box<dyn Divergence> {
        Box::new(Self { estimator: self.estimator.clone_box(), num_samples: self.num_samples })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_estimators::{CovMode, GaussianEstimator, KernelDensityEstimator};

    fn tensor_1d(values: &[f64]) -> Arc<DataTensor> {
        let rows: Vec<Vec<f64>> = values.iter().map(|&v| vec![v]).collect();
        Arc::new(DataTensor::from_rows(&rows).unwrap())
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        let d = (a - b).abs();
        assert!(d <= tol, "a={} b={} |diff|={}", a, b, d);
    }

    /// Estimator with a preset density table, for pinning the score
    /// assembly independently of any real density fit.
    #[derive(Debug, Clone)]
    struct StubEstimator {
        data: Option<Arc<DataTensor>>,
        densities: Vec<(f64, f64)>,
    }

    impl StubEstimator {
        fn new(densities: Vec<(f64, f64)>) -> Self {
            Self { data: None, densities }
        }
    }

    impl DensityEstimator for StubEstimator {
        fn init(&mut self, data: Arc<DataTensor>) -> Result<()> {
            self.data = Some(data);
            Ok(())
        }

        fn fit(&mut self, _range: &IndexRange) -> Result<()> {
            Ok(())
        }

        fn reset(&mut self) {}

        fn clone_box(&self) -> Box<dyn DensityEstimator> {
            Box::new(self.clone())
        }

        fn log_likelihood(&self, _range: &IndexRange) -> Result<(f64, f64)> {
            Err(Error::Computation("stub has no likelihood".to_string()))
        }

        fn log_likelihood_outside(&self, _range: &IndexRange) -> Result<(f64, f64)> {
            Err(Error::Computation("stub has no likelihood".to_string()))
        }

        fn pdf(&self) -> Result<DataTensor> {
            let data = self
                .data
                .as_ref()
                .ok_or_else(|| Error::Computation("stub not initialized".to_string()))?;
            let shape = data.sample_shape();
            let mut out = DataTensor::new([shape[0], shape[1], shape[2], shape[3], 2])?;
            for (i, &(a, b)) in self.densities.iter().enumerate() {
                let s = out.sample_mut(i);
                s[0] = a;
                s[1] = b;
            }
            Ok(out)
        }
    }

    #[test]
    fn test_identical_densities_score_zero() {
        let data = tensor_1d(&[0.0; 6]);
        let densities = vec![(0.3, 0.3); 6];
        let mut js = JsDivergence::with_data(Box::new(StubEstimator::new(densities)), data.clone())
            .unwrap();
        let score = js.score(&IndexRange::temporal(&data, 0, 2)).unwrap();
        assert_close(score, 0.0, 1e-14);
    }

    #[test]
    fn test_symmetric_under_partition_swap() {
        // Swapping which model is "inner" and which is "outer" while also
        // swapping the partition must not change the score.
        let data = tensor_1d(&[0.0; 6]);
        let densities = vec![(0.9, 0.1), (0.7, 0.2), (0.3, 0.8), (0.2, 0.6), (0.1, 0.5), (0.4, 0.4)];
        let swapped: Vec<(f64, f64)> = densities.iter().map(|&(a, b)| (b, a)).collect();

        let mut js = JsDivergence::with_data(Box::new(StubEstimator::new(densities)), data.clone())
            .unwrap();
        let mut js_swapped =
            JsDivergence::with_data(Box::new(StubEstimator::new(swapped)), data.clone()).unwrap();

        let forward = js.score(&IndexRange::temporal(&data, 0, 2)).unwrap();
        let backward = js_swapped.score(&IndexRange::temporal(&data, 2, 6)).unwrap();
        assert_close(forward, backward, 1e-12);
    }

    #[test]
    fn test_disjoint_densities_approach_one() {
        // Perfectly separated partitions: each position has all its density
        // under its own model. The base-2 normalized score tends to 1.
        let data = tensor_1d(&[0.0; 4]);
        let densities = vec![(0.8, 0.0), (0.8, 0.0), (0.0, 0.8), (0.0, 0.8)];
        let mut js = JsDivergence::with_data(Box::new(StubEstimator::new(densities)), data.clone())
            .unwrap();
        let score = js.score(&IndexRange::temporal(&data, 0, 2)).unwrap();
        assert_close(score, 1.0, 1e-9);
    }

    #[test]
    fn test_shifted_window_scores_in_unit_interval() {
        let values: Vec<f64> = (0..60)
            .map(|i| {
                let noise = (((i * 7919) % 101) as f64 / 101.0 - 0.5) * 0.4;
                if (20..30).contains(&i) {
                    noise + 5.0
                } else {
                    noise
                }
            })
            .collect();
        let data = tensor_1d(&values);
        let range = IndexRange::temporal(&data, 20, 30);

        let mut js = JsDivergence::with_data(
            Box::new(GaussianEstimator::new(CovMode::Full)),
            data.clone(),
        )
        .unwrap();
        let score = js.score(&range).unwrap();
        assert!(score > 0.5, "separated window should score high, got {}", score);
        assert!(score <= 1.0 + 1e-6, "score must stay near the unit interval, got {}", score);
    }

    #[test]
    fn test_similar_partitions_score_near_zero() {
        let values: Vec<f64> =
            (0..80).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let data = tensor_1d(&values);
        let mut js = JsDivergence::with_data(
            Box::new(GaussianEstimator::new(CovMode::Full)),
            data.clone(),
        )
        .unwrap();
        let score = js.score(&IndexRange::temporal(&data, 10, 20)).unwrap();
        assert!(score.abs() < 0.01, "identical partitions should score ~0, got {}", score);
    }

    #[test]
    fn test_works_with_kde() {
        let values: Vec<f64> = (0..40)
            .map(|i| if (15..25).contains(&i) { 8.0 + (i % 3) as f64 * 0.1 } else { (i % 5) as f64 * 0.2 })
            .collect();
        let data = tensor_1d(&values);
        let mut js = JsDivergence::with_data(
            Box::new(KernelDensityEstimator::new(0.5).unwrap()),
            data.clone(),
        )
        .unwrap();
        let anomalous = js.score(&IndexRange::temporal(&data, 15, 25)).unwrap();
        let ordinary = js.score(&IndexRange::temporal(&data, 0, 10)).unwrap();
        assert!(anomalous > ordinary, "anomalous={} ordinary={}", anomalous, ordinary);
    }

    #[test]
    fn test_reset_roundtrip() {
        let values: Vec<f64> = (0..40).map(|i| (i % 7) as f64).collect();
        let data = tensor_1d(&values);
        let range = IndexRange::temporal(&data, 10, 20);
        let mut js = JsDivergence::with_data(
            Box::new(GaussianEstimator::new(CovMode::Full)),
            data.clone(),
        )
        .unwrap();
        let first = js.score(&range).unwrap();
        js.reset();
        assert_close(js.score(&range).unwrap(), first, 1e-12);
    }

    #[test]
    fn test_whole_dataset_window_rejected() {
        let data = tensor_1d(&[1.0, 2.0, 3.0]);
        let mut js = JsDivergence::with_data(
            Box::new(GaussianEstimator::new(CovMode::Full)),
            data.clone(),
        )
        .unwrap();
        assert!(js.score(&IndexRange::temporal(&data, 0, 3)).is_err());
    }

    #[test]
    fn test_score_before_init_rejected() {
        let data = tensor_1d(&[1.0, 2.0, 3.0]);
        let mut js = JsDivergence::new(Box::new(GaussianEstimator::new(CovMode::Full)));
        assert!(js.score(&IndexRange::temporal(&data, 0, 1)).is_err());
    }
}
