//! Nonparametric kernel density estimator.
//!
//! Uses an isotropic Gaussian kernel with variance `kernel_sigma_sq`. The
//! inner model averages kernels anchored at the window samples, the outer
//! model kernels anchored at the complement.
//!
//! For purely temporal data with at most [`KDE_CUMULATIVE_SAMPLE_LIMIT`]
//! samples, cumulative sums of kernel rows make each window sum O(1); the
//! kernel matrix is quadratic in the sample count, so beyond the limit
//! sums are recomputed directly.

use std::sync::Arc;

use dv_core::config::KDE_CUMULATIVE_SAMPLE_LIMIT;
use dv_core::{Error, Result};
use dv_tensor::{DataTensor, IndexRange};

use crate::estimator::DensityEstimator;

/// Natural log of `2π`.
const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Kernel density estimator over the window/background partition.
#[derive(Debug, Clone)]
pub struct KernelDensityEstimator {
    sigma_sq: f64,
    cumulative_limit: usize,
    data: Option<Arc<DataTensor>>,
    /// `-d/2 * ln(2π σ²)`, the log normalization of one kernel.
    log_norm: f64,
    /// Row-cumulative kernel sums, `n` rows of `n+1` prefixes.
    cum_rows: Option<Vec<f64>>,
    /// Membership flags of the fitted window, one per sample.
    in_window: Option<Vec<bool>>,
    /// The fitted window itself (temporal bounds feed the cumulative path).
    fitted: Option<IndexRange>,
    num_extremes: usize,
}

impl KernelDensityEstimator {
    /// Create an unbound estimator with the given kernel variance.
    pub fn new(kernel_sigma_sq: f64) -> Result<Self> {
        if !kernel_sigma_sq.is_finite() || kernel_sigma_sq <= 0.0 {
            return Err(Error::Validation(format!(
                "kernel_sigma_sq must be finite and > 0, got {}",
                kernel_sigma_sq
            )));
        }
        Ok(Self {
            sigma_sq: kernel_sigma_sq,
            cumulative_limit: KDE_CUMULATIVE_SAMPLE_LIMIT,
            data: None,
            log_norm: 0.0,
            cum_rows: None,
            in_window: None,
            fitted: None,
            num_extremes: 0,
        })
    }

    /// Override the sample-count ceiling for cumulative kernel sums.
    ///
    /// `0` disables the cumulative fast path entirely.
    pub fn with_cumulative_limit(mut self, limit: usize) -> Self {
        self.cumulative_limit = limit;
        self
    }

    fn data(&self) -> Result<&Arc<DataTensor>> {
        self.data
            .as_ref()
            .ok_or_else(|| Error::Computation("estimator has not been initialized".to_string()))
    }

    fn membership(&self) -> Result<&[bool]> {
        self.in_window
            .as_deref()
            .ok_or_else(|| Error::Computation("estimator has not been fitted".to_string()))
    }

    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        let dist_sq: f64 = a.iter().zip(b.iter()).map(|(&x, &y)| (x - y) * (x - y)).sum();
        (self.log_norm - dist_sq / (2.0 * self.sigma_sq)).exp()
    }

    /// Density of sample `i` under the inner and outer models.
    fn density_pair(&self, i: usize) -> Result<(f64, f64)> {
        let data = self.data()?;
        let members = self.membership()?;
        let n = data.num_samples();
        let m = self.num_extremes;

        let (win_sum, total_sum) = match (&self.cum_rows, &self.fitted) {
            (Some(cum), Some(range)) => {
                // Temporal data: the window is contiguous, so one prefix
                // difference covers it.
                let row = &cum[i * (n + 1)..(i + 1) * (n + 1)];
                let (t0, t1) = (range.start[0], range.end[0]);
                (row[t1] - row[t0], row[n])
            }
            _ => {
                let xi = data.sample(i);
                let mut win = 0.0;
                let mut total = 0.0;
                for j in 0..n {
                    let k = self.kernel(xi, data.sample(j));
                    total += k;
                    if members[j] {
                        win += k;
                    }
                }
                (win, total)
            }
        };

        let inner = win_sum / m as f64;
        let outer = (total_sum - win_sum) / (n - m) as f64;
        Ok((inner, outer))
    }

    fn log_likelihood_over(&self, range: &IndexRange, inside: bool) -> Result<(f64, f64)> {
        let data = self.data()?;
        let mut ll_inner = 0.0;
        let mut ll_outer = 0.0;
        for (i, idx) in data.index_vector().enumerate() {
            if range.contains(&idx) == inside {
                let (di, do_) = self.density_pair(i)?;
                // Guard exact underflow of far-away densities.
                ll_inner += di.max(f64::MIN_POSITIVE).ln();
                ll_outer += do_.max(f64::MIN_POSITIVE).ln();
            }
        }
        Ok((ll_inner, ll_outer))
    }
}

impl DensityEstimator for KernelDensityEstimator {
    fn init(&mut self, data: Arc<DataTensor>) -> Result<()> {
        let n = data.num_samples();
        let d = data.num_attrib();
        if n < 2 {
            return Err(Error::Validation("need at least 2 samples".to_string()));
        }
        self.log_norm = -0.5 * d as f64 * (LN_2PI + self.sigma_sq.ln());

        self.cum_rows = if data.is_temporal() && n <= self.cumulative_limit {
            let mut cum = vec![0.0; n * (n + 1)];
            for i in 0..n {
                let xi = data.sample(i);
                for j in 0..n {
                    let k = self.kernel(xi, data.sample(j));
                    cum[i * (n + 1) + j + 1] = cum[i * (n + 1) + j] + k;
                }
            }
            Some(cum)
        } else {
            None
        };

        self.data = Some(data);
        self.in_window = None;
        self.fitted = None;
        self.num_extremes = 0;
        Ok(())
    }

    fn fit(&mut self, range: &IndexRange) -> Result<()> {
        let data = self.data()?.clone();
        range.validate(&data)?;

        let n = data.num_samples();
        let m = range.num_points();
        if m >= n {
            return Err(Error::Validation(
                "window must leave at least one background sample".to_string(),
            ));
        }

        let mut members = vec![false; n];
        for (i, idx) in data.index_vector().enumerate() {
            members[i] = range.contains(&idx);
        }
        self.in_window = Some(members);
        self.fitted = Some(range.clone());
        self.num_extremes = m;
        Ok(())
    }

    fn reset(&mut self) {
        self.in_window = None;
        self.fitted = None;
        self.num_extremes = 0;
    }

    fn clone_box(&self) -> Box<dyn DensityEstimator> {
        Box::new(self.clone())
    }

    fn log_likelihood(&self, range: &IndexRange) -> Result<(f64, f64)> {
        self.log_likelihood_over(range, true)
    }

    fn log_likelihood_outside(&self, range: &IndexRange) -> Result<(f64, f64)> {
        self.log_likelihood_over(range, false)
    }

    fn pdf(&self) -> Result<DataTensor> {
        let data = self.data()?;
        let shape = data.sample_shape();
        let mut out = DataTensor::new([shape[0], shape[1], shape[2], shape[3], 2])?;
        for i in 0..data.num_samples() {
            let (di, do_) = self.density_pair(i)?;
            let s = out.sample_mut(i);
            s[0] = di;
            s[1] = do_;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor_1d(values: &[f64]) -> Arc<DataTensor> {
        let rows: Vec<Vec<f64>> = values.iter().map(|&v| vec![v]).collect();
        Arc::new(DataTensor::from_rows(&rows).unwrap())
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        let d = (a - b).abs();
        assert!(d <= tol, "a={} b={} |diff|={}", a, b, d);
    }

    #[test]
    fn test_invalid_sigma_rejected() {
        assert!(KernelDensityEstimator::new(0.0).is_err());
        assert!(KernelDensityEstimator::new(-1.0).is_err());
        assert!(KernelDensityEstimator::new(f64::NAN).is_err());
    }

    #[test]
    fn test_cumulative_matches_direct() {
        let values: Vec<f64> = (0..40).map(|i| ((i * 13) % 7) as f64 * 0.5).collect();
        let data = tensor_1d(&values);
        let range = IndexRange::temporal(&data, 10, 25);

        let mut fast = KernelDensityEstimator::new(1.0).unwrap();
        fast.init(data.clone()).unwrap();
        fast.fit(&range).unwrap();

        let mut direct = KernelDensityEstimator::new(1.0).unwrap().with_cumulative_limit(0);
        direct.init(data.clone()).unwrap();
        direct.fit(&range).unwrap();

        let pdf_fast = fast.pdf().unwrap();
        let pdf_direct = direct.pdf().unwrap();
        for i in 0..data.num_samples() {
            assert_close(pdf_fast.sample(i)[0], pdf_direct.sample(i)[0], 1e-12);
            assert_close(pdf_fast.sample(i)[1], pdf_direct.sample(i)[1], 1e-12);
        }

        let (a0, a1) = fast.log_likelihood(&range).unwrap();
        let (b0, b1) = direct.log_likelihood(&range).unwrap();
        assert_close(a0, b0, 1e-9);
        assert_close(a1, b1, 1e-9);
    }

    #[test]
    fn test_cluster_is_denser_under_inner_model() {
        // Tight cluster in the window, spread-out background.
        let data = tensor_1d(&[0.0, 10.0, 20.0, 5.0, 5.1, 4.9, 30.0, 40.0]);
        let range = IndexRange::temporal(&data, 3, 6);
        let mut est = KernelDensityEstimator::new(0.5).unwrap();
        est.init(data.clone()).unwrap();
        est.fit(&range).unwrap();

        let pdf = est.pdf().unwrap();
        // The cluster centre is much denser under the inner model.
        assert!(pdf.sample(4)[0] > pdf.sample(4)[1] * 10.0);
    }

    #[test]
    fn test_densities_are_positive() {
        let data = tensor_1d(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let mut est = KernelDensityEstimator::new(1.0).unwrap();
        est.init(data.clone()).unwrap();
        est.fit(&IndexRange::temporal(&data, 1, 3)).unwrap();
        let pdf = est.pdf().unwrap();
        for i in 0..5 {
            assert!(pdf.sample(i)[0] > 0.0);
            assert!(pdf.sample(i)[1] > 0.0);
        }
    }

    #[test]
    fn test_not_gaussian_capable() {
        let est = KernelDensityEstimator::new(1.0).unwrap();
        assert!(est.as_gaussian().is_none());
    }

    #[test]
    fn test_whole_window_rejected() {
        let data = tensor_1d(&[1.0, 2.0]);
        let mut est = KernelDensityEstimator::new(1.0).unwrap();
        est.init(data.clone()).unwrap();
        assert!(est.fit(&IndexRange::temporal(&data, 0, 2)).is_err());
    }

    #[test]
    fn test_clone_box_is_independent() {
        let data = tensor_1d(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut est = KernelDensityEstimator::new(1.0).unwrap();
        est.init(data.clone()).unwrap();
        est.fit(&IndexRange::temporal(&data, 0, 3)).unwrap();
        let before = est.pdf().unwrap();

        let mut cloned = est.clone_box();
        cloned.fit(&IndexRange::temporal(&data, 3, 6)).unwrap();

        let after = est.pdf().unwrap();
        for i in 0..6 {
            assert_close(before.sample(i)[0], after.sample(i)[0], 1e-15);
        }
    }
}
