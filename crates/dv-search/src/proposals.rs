//! Candidate window generation.
//!
//! Proposals are temporal windows covering the full spatial extent of the
//! data. `Dense` proposes every window within the size bounds; `Pointwise`
//! first scores individual time steps with Hotelling's T² against a global
//! Gaussian fit and only proposes windows whose endpoints both look
//! anomalous, which cuts the candidate set from quadratic to roughly the
//! square of the number of peaks.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use dv_core::{Error, Result};
use dv_tensor::{DataTensor, IndexRange};

/// Generator of candidate windows for the search.
#[derive(Debug, Clone)]
pub enum ProposalGenerator {
    /// Every temporal window within the size bounds.
    Dense(DenseProposals),
    /// Windows anchored at pointwise-anomalous time steps.
    Pointwise(PointwiseProposals),
}

impl ProposalGenerator {
    /// Generate candidate ranges for `data`.
    pub fn generate(&self, data: &DataTensor) -> Result<Vec<IndexRange>> {
        match self {
            ProposalGenerator::Dense(g) => g.generate(data),
            ProposalGenerator::Pointwise(g) => g.generate(data),
        }
    }
}

/// Clamp size bounds against the extent of the time axis; windows covering
/// the whole series are excluded (they have no background partition).
fn size_bounds(min_size: usize, max_size: Option<usize>, t_len: usize) -> (usize, usize) {
    let lo = min_size.max(1);
    let hi = max_size.unwrap_or(t_len - 1).min(t_len - 1);
    (lo, hi)
}

/// Every temporal window within the size bounds.
#[derive(Debug, Clone)]
pub struct DenseProposals {
    /// Minimum window length along the time axis.
    pub min_size: usize,
    /// Maximum window length; `None` means no limit.
    pub max_size: Option<usize>,
}

impl DenseProposals {
    /// Create a dense generator with the given size bounds.
    pub fn new(min_size: usize, max_size: Option<usize>) -> Self {
        Self { min_size, max_size }
    }

    fn generate(&self, data: &DataTensor) -> Result<Vec<IndexRange>> {
        let t_len = data.shape()[0];
        if t_len < 2 {
            return Err(Error::Validation("need at least 2 time steps".to_string()));
        }
        let (lo, hi) = size_bounds(self.min_size, self.max_size, t_len);

        let mut out = Vec::new();
        for t0 in 0..t_len {
            for len in lo..=hi {
                let t1 = t0 + len;
                if t1 > t_len {
                    break;
                }
                out.push(IndexRange::temporal(data, t0, t1));
            }
        }
        Ok(out)
    }
}

/// Windows whose endpoints both exceed a pointwise anomaly threshold.
///
/// Time steps are scored with Hotelling's T² (Mahalanobis distance to the
/// global mean under the global covariance). The threshold is either
/// `location + sd_th * spread` of the scores (mean/sd, or median/MAD when
/// `mad` is set) or a chi-squared quantile when a significance level is
/// given.
#[derive(Debug, Clone)]
pub struct PointwiseProposals {
    /// Minimum window length along the time axis.
    pub min_size: usize,
    /// Maximum window length; `None` means no limit.
    pub max_size: Option<usize>,
    sd_th: f64,
    mad: bool,
    significance: Option<f64>,
}

impl PointwiseProposals {
    /// Create a pointwise generator with the given size bounds.
    pub fn new(min_size: usize, max_size: Option<usize>) -> Self {
        Self { min_size, max_size, sd_th: 1.5, mad: false, significance: None }
    }

    /// Set the threshold to `location + sd_th * spread` of the scores.
    pub fn with_sd_threshold(mut self, sd_th: f64) -> Self {
        self.sd_th = sd_th;
        self.significance = None;
        self
    }

    /// Use median absolute deviation instead of mean/sd for the threshold,
    /// making it robust against the anomalies being searched for.
    pub fn with_mad(mut self, mad: bool) -> Self {
        self.mad = mad;
        self
    }

    /// Set the threshold to the `1 - alpha` quantile of the chi-squared
    /// distribution of T² under the global Gaussian.
    pub fn with_significance(mut self, alpha: f64) -> Result<Self> {
        if !(0.0 < alpha && alpha < 1.0) {
            return Err(Error::Validation(format!("alpha must be in (0,1), got {}", alpha)));
        }
        self.significance = Some(alpha);
        Ok(self)
    }

    /// Hotelling's T² of every time step against the global Gaussian fit.
    fn pointwise_scores(&self, data: &DataTensor) -> Result<Vec<f64>> {
        let n = data.num_samples();
        let d = data.num_attrib();

        let mut mean = DVector::<f64>::zeros(d);
        for i in 0..n {
            for (a, &v) in data.sample(i).iter().enumerate() {
                mean[a] += v;
            }
        }
        mean /= n as f64;

        let mut cov = DMatrix::<f64>::zeros(d, d);
        for i in 0..n {
            let s = data.sample(i);
            for a in 0..d {
                for b in 0..d {
                    cov[(a, b)] += (s[a] - mean[a]) * (s[b] - mean[b]);
                }
            }
        }
        cov /= n as f64;

        let chol = match cov.clone().cholesky() {
            Some(c) => c,
            None => {
                let ridge = 1e-9 * (1.0 + cov.trace().abs() / d as f64);
                for i in 0..d {
                    cov[(i, i)] += ridge;
                }
                cov.cholesky().ok_or_else(|| {
                    Error::Computation("global covariance factorization failed".to_string())
                })?
            }
        };

        let mut scores = Vec::with_capacity(n);
        for i in 0..n {
            let diff = DVector::from_column_slice(data.sample(i)) - &mean;
            let solved = chol.solve(&diff);
            scores.push(diff.dot(&solved));
        }
        Ok(scores)
    }

    fn threshold(&self, scores: &[f64], d: usize) -> Result<f64> {
        if let Some(alpha) = self.significance {
            let chi = ChiSquared::new(d as f64).map_err(|e| {
                Error::Computation(format!("chi-squared distribution: {}", e))
            })?;
            return Ok(chi.inverse_cdf(1.0 - alpha));
        }

        let n = scores.len() as f64;
        if self.mad {
            let mut sorted = scores.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let median = sorted[sorted.len() / 2];
            let mut dev: Vec<f64> = scores.iter().map(|s| (s - median).abs()).collect();
            dev.sort_by(|a, b| a.total_cmp(b));
            // 1.4826 makes the MAD consistent with the sd of a normal.
            let spread = 1.4826 * dev[dev.len() / 2];
            Ok(median + self.sd_th * spread)
        } else {
            let mean: f64 = scores.iter().sum::<f64>() / n;
            let var: f64 = scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
            Ok(mean + self.sd_th * var.sqrt())
        }
    }

    fn generate(&self, data: &DataTensor) -> Result<Vec<IndexRange>> {
        if !data.is_temporal() {
            return Err(Error::Validation(
                "pointwise proposals require purely temporal data".to_string(),
            ));
        }
        let t_len = data.shape()[0];
        if t_len < 2 {
            return Err(Error::Validation("need at least 2 time steps".to_string()));
        }

        let scores = self.pointwise_scores(data)?;
        let th = self.threshold(&scores, data.num_attrib())?;
        let peaks: Vec<usize> =
            (0..t_len).filter(|&t| scores[t] > th).collect();
        log::debug!("pointwise proposals: {} of {} time steps above threshold", peaks.len(), t_len);

        let (lo, hi) = size_bounds(self.min_size, self.max_size, t_len);
        let mut out = Vec::new();
        for &a in &peaks {
            for &b in &peaks {
                if b < a {
                    continue;
                }
                let len = b - a + 1;
                if len >= lo && len <= hi {
                    out.push(IndexRange::temporal(data, a, b + 1));
                }
            }
        }
        Ok(out)
    }
}
