//! Dense row-major rank-5 data tensor.

use dv_core::{Error, Result};

use crate::index::IndexVector;

/// Number of axes of a [`DataTensor`]: time, x, y, z, attribute.
pub const TENSOR_RANK: usize = 5;

/// Number of sample axes (all axes except the trailing attribute axis).
pub const SAMPLE_AXES: usize = 4;

/// A dense tensor of `f64` samples over (time, x, y, z, attribute).
///
/// Memory is row-major with the attribute axis changing fastest, so the
/// attribute values of one sample are contiguous. A *sample* is one point of
/// the four sample axes; its linear index follows the canonical row-major
/// order over (time, x, y, z), the same order [`IndexVector`] iterates in.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTensor {
    shape: [usize; TENSOR_RANK],
    num_samples: usize,
    data: Vec<f64>,
}

impl DataTensor {
    /// Create a zero-filled tensor with the given shape.
    ///
    /// Every extent must be at least 1.
    pub fn new(shape: [usize; TENSOR_RANK]) -> Result<Self> {
        Self::validate_shape(&shape)?;
        let num_samples: usize = shape[..SAMPLE_AXES].iter().product();
        let len = num_samples * shape[SAMPLE_AXES];
        Ok(Self { shape, num_samples, data: vec![0.0; len] })
    }

    /// Create a tensor from raw row-major data.
    pub fn from_vec(shape: [usize; TENSOR_RANK], data: Vec<f64>) -> Result<Self> {
        Self::validate_shape(&shape)?;
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::Validation(format!(
                "data length {} does not match shape product {}",
                data.len(),
                expected
            )));
        }
        let num_samples: usize = shape[..SAMPLE_AXES].iter().product();
        Ok(Self { shape, num_samples, data })
    }

    /// Create a purely temporal tensor (spatial extents 1) from time-major
    /// rows, one row of attribute values per time step.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::Validation("rows must not be empty".to_string()));
        }
        let d = rows[0].len();
        if d == 0 {
            return Err(Error::Validation("rows must have at least one attribute".to_string()));
        }
        let mut data = Vec::with_capacity(rows.len() * d);
        for (t, row) in rows.iter().enumerate() {
            if row.len() != d {
                return Err(Error::Validation(format!(
                    "row {} has {} attributes, expected {}",
                    t,
                    row.len(),
                    d
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_vec([rows.len(), 1, 1, 1, d], data)
    }

    fn validate_shape(shape: &[usize; TENSOR_RANK]) -> Result<()> {
        if shape.iter().any(|&e| e == 0) {
            return Err(Error::Validation(format!(
                "all tensor extents must be >= 1, got {:?}",
                shape
            )));
        }
        Ok(())
    }

    /// Full shape (time, x, y, z, attribute).
    pub fn shape(&self) -> [usize; TENSOR_RANK] {
        self.shape
    }

    /// Extents of the four sample axes.
    pub fn sample_shape(&self) -> [usize; SAMPLE_AXES] {
        [self.shape[0], self.shape[1], self.shape[2], self.shape[3]]
    }

    /// Total number of samples (product of the four sample-axis extents).
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Number of attributes per sample.
    pub fn num_attrib(&self) -> usize {
        self.shape[SAMPLE_AXES]
    }

    /// Whether the data is purely temporal (all spatial extents are 1).
    ///
    /// Purely temporal data has the property that a temporal window is a
    /// contiguous run of linear sample indices, which enables the
    /// cumulative-sum fast paths in the estimators.
    pub fn is_temporal(&self) -> bool {
        self.shape[1] == 1 && self.shape[2] == 1 && self.shape[3] == 1
    }

    /// Attribute values of the `i`-th sample in canonical order.
    ///
    /// # Panics
    ///
    /// Panics if `i >= num_samples()`.
    pub fn sample(&self, i: usize) -> &[f64] {
        let d = self.num_attrib();
        &self.data[i * d..(i + 1) * d]
    }

    /// Mutable attribute values of the `i`-th sample.
    pub fn sample_mut(&mut self, i: usize) -> &mut [f64] {
        let d = self.num_attrib();
        &mut self.data[i * d..(i + 1) * d]
    }

    /// Linear sample index of a coordinate over the four sample axes.
    pub fn sample_index(&self, idx: &[usize; SAMPLE_AXES]) -> usize {
        let s = &self.shape;
        ((idx[0] * s[1] + idx[1]) * s[2] + idx[2]) * s[3] + idx[3]
    }

    /// Restartable iterator over sample coordinates in canonical row-major
    /// order, aligned with linear sample indices.
    pub fn index_vector(&self) -> IndexVector {
        IndexVector::new(self.sample_shape())
    }

    /// Raw row-major storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable raw row-major storage.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}
