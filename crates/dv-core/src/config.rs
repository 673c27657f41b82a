//! Performance tunables.
//!
//! These constants govern which algorithmic variant the estimator and search
//! layers pick. They trade memory for speed and can be overridden where a
//! constructor takes them as parameters; the defaults assume a few GiB of
//! available RAM.

/// Maximum number of samples for which the kernel density estimator keeps
/// cumulative sums of kernel rows.
///
/// The kernel matrix is quadratic in the number of samples. Above this
/// limit, window sums are recomputed directly instead.
pub const KDE_CUMULATIVE_SAMPLE_LIMIT: usize = 20_000;

/// Ceiling (in bytes) on the cumulative outer-product table used by the
/// Gaussian estimator for O(1) window moments.
///
/// Above the ceiling, window mean and covariance are accumulated by direct
/// summation over the range. Each parallel worker may allocate a table up
/// to this size.
pub const GAUSSIAN_CUMULATIVE_BYTE_LIMIT: usize = 2 * 1024 * 1024 * 1024;

/// Maximum number of scored proposals for which offline non-maximum
/// suppression (global sort) is used.
///
/// Above the limit, an online bounded-insertion variant is used instead.
/// Its output can depend on the order scores arrive in.
pub const NMS_OFFLINE_LIMIT: usize = 10_000;
