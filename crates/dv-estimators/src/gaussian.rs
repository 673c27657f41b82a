//! Parametric Gaussian density estimator.
//!
//! Fits `N(mu, Sigma)` separately to the window and its complement and
//! exposes the closed-form quantities the KL fast path needs: means,
//! covariances, Cholesky factorizations, log-determinants and Mahalanobis
//! distances.
//!
//! For purely temporal data, window moments come from cumulative sums of
//! the samples and of their outer products in O(1) per window; the
//! outer-product table is only built while it stays under
//! [`GAUSSIAN_CUMULATIVE_BYTE_LIMIT`] bytes.

use std::sync::Arc;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use dv_core::config::GAUSSIAN_CUMULATIVE_BYTE_LIMIT;
use dv_core::{Error, Result};
use dv_tensor::{DataTensor, IndexRange};

use crate::estimator::DensityEstimator;

/// Natural log of `2π` (precomputed to keep log-pdf evaluation const-friendly).
const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// How the covariance matrices of the two partitions are estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovMode {
    /// Separate full covariance matrix per partition.
    Full,
    /// One covariance matrix estimated from the whole dataset, shared by
    /// both partitions.
    Shared,
    /// The identity matrix as covariance (Mahalanobis degenerates to
    /// squared Euclidean distance).
    Identity,
}

/// Fitted parameters of one partition.
#[derive(Debug, Clone)]
struct GaussianParams {
    mean: DVector<f64>,
    cov: DMatrix<f64>,
    chol: Cholesky<f64, Dyn>,
    log_det: f64,
}

impl GaussianParams {
    /// Build from first/second moments, ridging and finally degrading to the
    /// diagonal if the covariance is not positive definite.
    fn from_moments(mean: DVector<f64>, mut cov: DMatrix<f64>) -> Result<Self> {
        let d = cov.nrows();
        if let Some(chol) = cov.clone().cholesky() {
            let log_det = log_det_from_cholesky(&chol);
            return Ok(Self { mean, cov, chol, log_det });
        }

        let ridge = 1e-9 * (1.0 + cov.trace().abs() / d as f64);
        for i in 0..d {
            cov[(i, i)] += ridge;
        }
        if let Some(chol) = cov.clone().cholesky() {
            log::warn!("covariance not positive definite, ridged diagonal by {:.3e}", ridge);
            let log_det = log_det_from_cholesky(&chol);
            return Ok(Self { mean, cov, chol, log_det });
        }

        log::warn!("covariance not positive definite after ridging, using its diagonal");
        let mut diag = DMatrix::zeros(d, d);
        for i in 0..d {
            diag[(i, i)] = cov[(i, i)].max(ridge);
        }
        let chol = diag
            .clone()
            .cholesky()
            .ok_or_else(|| Error::Computation("covariance factorization failed".to_string()))?;
        let log_det = log_det_from_cholesky(&chol);
        Ok(Self { mean, cov: diag, chol, log_det })
    }

    /// Partition parameters with a covariance fixed by the mode (shared or
    /// identity): only the mean is partition-specific.
    fn with_fixed_cov(mean: DVector<f64>, template: &GaussianParams) -> Self {
        Self {
            mean,
            cov: template.cov.clone(),
            chol: template.chol.clone(),
            log_det: template.log_det,
        }
    }

    /// `log N(x; mu, Sigma)`.
    fn log_pdf(&self, x: &[f64]) -> f64 {
        let diff = DVector::from_column_slice(x) - &self.mean;
        let solved = self.chol.solve(&diff);
        let maha = diff.dot(&solved);
        -0.5 * (maha + self.mean.len() as f64 * LN_2PI + self.log_det)
    }
}

fn log_det_from_cholesky(chol: &Cholesky<f64, Dyn>) -> f64 {
    2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>()
}

/// Cumulative sums of samples and of their outer products along the time
/// axis, for O(1) window moments on purely temporal data.
#[derive(Debug, Clone)]
struct CumulativeMoments {
    d: usize,
    /// `(n+1) * d` prefix sums of samples.
    sum: Vec<f64>,
    /// `(n+1) * d * d` prefix sums of outer products.
    outer: Vec<f64>,
}

impl CumulativeMoments {
    fn build(data: &DataTensor) -> Self {
        let n = data.num_samples();
        let d = data.num_attrib();
        let mut sum = vec![0.0; (n + 1) * d];
        let mut outer = vec![0.0; (n + 1) * d * d];
        for i in 0..n {
            let s = data.sample(i);
            let (prev_s, cur_s) = (i * d, (i + 1) * d);
            let (prev_o, cur_o) = (i * d * d, (i + 1) * d * d);
            for a in 0..d {
                sum[cur_s + a] = sum[prev_s + a] + s[a];
                for b in 0..d {
                    outer[cur_o + a * d + b] = outer[prev_o + a * d + b] + s[a] * s[b];
                }
            }
        }
        Self { d, sum, outer }
    }

    /// Moments of the window `[t0, t1)` of linear sample indices.
    fn window(&self, t0: usize, t1: usize) -> (DVector<f64>, DMatrix<f64>) {
        let d = self.d;
        let mut s = DVector::zeros(d);
        let mut o = DMatrix::zeros(d, d);
        for a in 0..d {
            s[a] = self.sum[t1 * d + a] - self.sum[t0 * d + a];
            for b in 0..d {
                o[(a, b)] = self.outer[t1 * d * d + a * d + b] - self.outer[t0 * d * d + a * d + b];
            }
        }
        (s, o)
    }
}

/// Moments accumulated by direct summation over a range.
fn accumulate_range(data: &DataTensor, range: &IndexRange) -> (DVector<f64>, DMatrix<f64>) {
    let d = data.num_attrib();
    let mut sum = DVector::zeros(d);
    let mut outer = DMatrix::zeros(d, d);
    for t in range.start[0]..range.end[0] {
        for x in range.start[1]..range.end[1] {
            for y in range.start[2]..range.end[2] {
                for z in range.start[3]..range.end[3] {
                    let s = data.sample(data.sample_index(&[t, x, y, z]));
                    for a in 0..d {
                        sum[a] += s[a];
                        for b in 0..d {
                            outer[(a, b)] += s[a] * s[b];
                        }
                    }
                }
            }
        }
    }
    (sum, outer)
}

/// Dataset-wide state computed once at `init`.
#[derive(Debug, Clone)]
struct InitState {
    data: Arc<DataTensor>,
    total_sum: DVector<f64>,
    total_outer: DMatrix<f64>,
    /// Covariance template for `Shared`/`Identity` modes; `None` for `Full`.
    fixed_cov: Option<GaussianParams>,
    cumulative: Option<CumulativeMoments>,
}

/// Gaussian density estimator over the window/background partition.
#[derive(Debug, Clone)]
pub struct GaussianEstimator {
    cov_mode: CovMode,
    cumulative_byte_limit: usize,
    state: Option<InitState>,
    inner: Option<GaussianParams>,
    outer: Option<GaussianParams>,
}

impl GaussianEstimator {
    /// Create an unbound estimator with the given covariance mode.
    pub fn new(cov_mode: CovMode) -> Self {
        Self {
            cov_mode,
            cumulative_byte_limit: GAUSSIAN_CUMULATIVE_BYTE_LIMIT,
            state: None,
            inner: None,
            outer: None,
        }
    }

    /// Override the ceiling on the cumulative outer-product table.
    ///
    /// `0` disables the cumulative fast path entirely.
    pub fn with_cumulative_byte_limit(mut self, bytes: usize) -> Self {
        self.cumulative_byte_limit = bytes;
        self
    }

    /// The covariance mode this estimator was configured with.
    pub fn mode(&self) -> CovMode {
        self.cov_mode
    }

    fn state(&self) -> Result<&InitState> {
        self.state
            .as_ref()
            .ok_or_else(|| Error::Computation("estimator has not been initialized".to_string()))
    }

    fn inner_params(&self) -> Result<&GaussianParams> {
        self.inner
            .as_ref()
            .ok_or_else(|| Error::Computation("estimator has not been fitted".to_string()))
    }

    fn outer_params(&self) -> Result<&GaussianParams> {
        self.outer
            .as_ref()
            .ok_or_else(|| Error::Computation("estimator has not been fitted".to_string()))
    }

    /// Mean of the window partition.
    pub fn inner_mean(&self) -> Result<&DVector<f64>> {
        Ok(&self.inner_params()?.mean)
    }

    /// Mean of the background partition.
    pub fn outer_mean(&self) -> Result<&DVector<f64>> {
        Ok(&self.outer_params()?.mean)
    }

    /// Covariance of the window partition.
    pub fn inner_cov(&self) -> Result<&DMatrix<f64>> {
        Ok(&self.inner_params()?.cov)
    }

    /// Covariance of the background partition.
    pub fn outer_cov(&self) -> Result<&DMatrix<f64>> {
        Ok(&self.outer_params()?.cov)
    }

    /// Cholesky factorization of the window covariance.
    pub fn inner_chol(&self) -> Result<&Cholesky<f64, Dyn>> {
        Ok(&self.inner_params()?.chol)
    }

    /// Cholesky factorization of the background covariance.
    pub fn outer_chol(&self) -> Result<&Cholesky<f64, Dyn>> {
        Ok(&self.outer_params()?.chol)
    }

    /// Log-determinant of the window covariance.
    pub fn inner_cov_log_det(&self) -> Result<f64> {
        Ok(self.inner_params()?.log_det)
    }

    /// Log-determinant of the background covariance.
    pub fn outer_cov_log_det(&self) -> Result<f64> {
        Ok(self.outer_params()?.log_det)
    }

    /// Mahalanobis distance `(a-b)^T Sigma^-1 (a-b)` under the covariance of
    /// the background (`use_outer_cov`) or window partition.
    pub fn mahalanobis_distance(
        &self,
        a: &DVector<f64>,
        b: &DVector<f64>,
        use_outer_cov: bool,
    ) -> Result<f64> {
        if a.len() != b.len() {
            return Err(Error::Validation(format!(
                "mean dimensions differ: {} vs {}",
                a.len(),
                b.len()
            )));
        }
        let params = if use_outer_cov { self.outer_params()? } else { self.inner_params()? };
        let diff = a - b;
        let solved = params.chol.solve(&diff);
        Ok(diff.dot(&solved))
    }

    /// Log-likelihood pair of one sample under the fitted partial models.
    fn log_pdf_pair(&self, x: &[f64]) -> Result<(f64, f64)> {
        Ok((self.inner_params()?.log_pdf(x), self.outer_params()?.log_pdf(x)))
    }

    fn log_likelihood_over(
        &self,
        range: &IndexRange,
        inside: bool,
    ) -> Result<(f64, f64)> {
        let state = self.state()?;
        let data = &state.data;
        let mut ll_inner = 0.0;
        let mut ll_outer = 0.0;
        for (i, idx) in data.index_vector().enumerate() {
            if range.contains(&idx) == inside {
                let (li, lo) = self.log_pdf_pair(data.sample(i))?;
                ll_inner += li;
                ll_outer += lo;
            }
        }
        Ok((ll_inner, ll_outer))
    }
}

impl DensityEstimator for GaussianEstimator {
    fn init(&mut self, data: Arc<DataTensor>) -> Result<()> {
        let n = data.num_samples();
        let d = data.num_attrib();
        if n < 2 {
            return Err(Error::Validation("need at least 2 samples".to_string()));
        }

        let full = IndexRange::new([0, 0, 0, 0], data.sample_shape());
        let (total_sum, total_outer) = accumulate_range(&data, &full);

        let fixed_cov = match self.cov_mode {
            CovMode::Full => None,
            CovMode::Shared => {
                let mean = &total_sum / n as f64;
                let cov = &total_outer / n as f64 - &mean * mean.transpose();
                Some(GaussianParams::from_moments(mean, cov)?)
            }
            CovMode::Identity => {
                let identity = DMatrix::identity(d, d);
                Some(GaussianParams::from_moments(DVector::zeros(d), identity)?)
            }
        };

        let table_bytes = (n + 1) * d * d * std::mem::size_of::<f64>();
        let cumulative = if data.is_temporal() && table_bytes <= self.cumulative_byte_limit {
            Some(CumulativeMoments::build(&data))
        } else {
            None
        };

        self.state = Some(InitState { data, total_sum, total_outer, fixed_cov, cumulative });
        self.inner = None;
        self.outer = None;
        Ok(())
    }

    fn fit(&mut self, range: &IndexRange) -> Result<()> {
        let state = self.state()?;
        let data = &state.data;
        range.validate(data)?;

        let n = data.num_samples();
        let m = range.num_points();
        if m >= n {
            return Err(Error::Validation(
                "window must leave at least one background sample".to_string(),
            ));
        }

        let (win_sum, win_outer) = match &state.cumulative {
            // Temporal data: the window is a contiguous run of sample indices.
            Some(cum) => cum.window(range.start[0], range.end[0]),
            None => accumulate_range(data, range),
        };

        let k = n - m;
        let inner_mean = &win_sum / m as f64;
        let outer_mean = (&state.total_sum - &win_sum) / k as f64;

        let (inner, outer) = match &state.fixed_cov {
            Some(template) => (
                GaussianParams::with_fixed_cov(inner_mean, template),
                GaussianParams::with_fixed_cov(outer_mean, template),
            ),
            None => {
                let inner_cov = &win_outer / m as f64 - &inner_mean * inner_mean.transpose();
                let outer_cov = (&state.total_outer - &win_outer) / k as f64
                    - &outer_mean * outer_mean.transpose();
                (
                    GaussianParams::from_moments(inner_mean, inner_cov)?,
                    GaussianParams::from_moments(outer_mean, outer_cov)?,
                )
            }
        };

        self.inner = Some(inner);
        self.outer = Some(outer);
        Ok(())
    }

    fn reset(&mut self) {
        self.inner = None;
        self.outer = None;
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
        let state = self.state()?;
        let data = &state.data;
        let shape = data.sample_shape();
        let mut out = DataTensor::new([shape[0], shape[1], shape[2], shape[3], 2])?;
        for i in 0..data.num_samples() {
            let (li, lo) = self.log_pdf_pair(data.sample(i))?;
            let s = out.sample_mut(i);
            s[0] = li.exp();
            s[1] = lo.exp();
        }
        Ok(out)
    }

    fn as_gaussian(&self) -> Option<&GaussianEstimator> {
        Some(self)
    }
}
