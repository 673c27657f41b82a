//! Per-attribute normalization.
//!
//! Divergence scores compare fitted densities, so wildly different attribute
//! scales can let one attribute dominate every covariance. Normalizing each
//! attribute by its maximum absolute value or its standard deviation before
//! the search keeps attributes comparable.

use dv_core::{Error, Result};

use crate::tensor::DataTensor;

/// Normalization mode applied per attribute across all samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Leave the data unchanged.
    #[default]
    None,
    /// Divide by the maximum absolute value.
    Max,
    /// Divide by the standard deviation.
    Sd,
}

/// Normalize `data` in place according to `mode`.
///
/// Attributes that are constant (zero spread) are left unchanged.
pub fn normalize(data: &mut DataTensor, mode: Normalization) -> Result<()> {
    let n = data.num_samples();
    let d = data.num_attrib();
    if n == 0 || d == 0 {
        return Err(Error::Validation("cannot normalize an empty tensor".to_string()));
    }
    if mode == Normalization::None {
        return Ok(());
    }

    let mut scale = vec![0.0f64; d];
    match mode {
        Normalization::None => unreachable!(),
        Normalization::Max => {
            for i in 0..n {
                for (a, &v) in data.sample(i).iter().enumerate() {
                    scale[a] = scale[a].max(v.abs());
                }
            }
        }
        Normalization::Sd => {
            let mut mean = vec![0.0f64; d];
            for i in 0..n {
                for (a, &v) in data.sample(i).iter().enumerate() {
                    mean[a] += v;
                }
            }
            for m in &mut mean {
                *m /= n as f64;
            }
            for i in 0..n {
                for (a, &v) in data.sample(i).iter().enumerate() {
                    let c = v - mean[a];
                    scale[a] += c * c;
                }
            }
            for s in &mut scale {
                *s = (*s / n as f64).sqrt();
            }
        }
    }

    for i in 0..n {
        let sample = data.sample_mut(i);
        for (a, v) in sample.iter_mut().enumerate() {
            if scale[a] > 0.0 {
                *v /= scale[a];
            }
        }
    }
    Ok(())
}
