//! Elementary χ² computations
//!
//! The χ² is evaluated as `dᵀ Σ⁻¹ d` by solving the lower triangular system
//! `L v = d` with `L` the Cholesky factor of `Σ`, and summing `v²`. This is
//! more accurate and cheaper than inverting the covariance matrix.

use crate::covariance::{
    CovarianceError, cholesky_lower, solve_lower_triangular, solve_lower_triangular_vec,
};
use crate::results::Results;
use ndarray::{Array1, ArrayBase, Axis, Data, Ix1, Ix2};
use serde::{Deserialize, Serialize};

/// χ² of a single vector of differences
///
/// `sqrtcov` is the lower triangular Cholesky factor of the covariance
/// matrix. Its upper triangle is never read and may contain anything.
///
/// # Example
/// ```
/// use fkstat_stats::chi2::calc_chi2;
/// use fkstat_stats::covariance::cholesky_lower;
/// use ndarray::array;
///
/// let cov = array![[4.0, 0.0], [0.0, 1.0]];
/// let chi2 = calc_chi2(&cholesky_lower(&cov).unwrap(), &array![2.0, 1.0]).unwrap();
/// assert!((chi2 - 2.0).abs() < 1e-12);
/// ```
pub fn calc_chi2<S1, S2>(
    sqrtcov: &ArrayBase<S1, Ix2>,
    diffs: &ArrayBase<S2, Ix1>,
) -> Result<f64, CovarianceError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let v = solve_lower_triangular_vec(sqrtcov, diffs)?;
    Ok(v.dot(&v))
}

/// χ² of every column of an `N x K` batch of differences
///
/// The squares are summed over the first axis only, returning `K` values.
pub fn calc_chi2_batch<S1, S2>(
    sqrtcov: &ArrayBase<S1, Ix2>,
    diffs: &ArrayBase<S2, Ix2>,
) -> Result<Array1<f64>, CovarianceError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let v = solve_lower_triangular(sqrtcov, diffs)?;
    Ok((&v * &v).sum_axis(Axis(0)))
}

/// φ: the spread of the replica χ² around the χ² of the replica mean
///
/// `diffs` is `N_bins x N_replicas`. The result is
/// `sqrt((⟨χ²[d_k]⟩ - χ²[⟨d⟩]) / N_bins)`.
///
/// # Errors
/// * [`CovarianceError::InsufficientData`] for zero bins or zero replicas
pub fn calc_phi<S1, S2>(
    sqrtcov: &ArrayBase<S1, Ix2>,
    diffs: &ArrayBase<S2, Ix2>,
) -> Result<f64, CovarianceError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let (nbins, nreplicas) = diffs.dim();
    if nbins == 0 || nreplicas == 0 {
        return Err(CovarianceError::InsufficientData {
            required: 1,
            actual: nbins.min(nreplicas),
        });
    }

    let chi2s = calc_chi2_batch(sqrtcov, diffs)?;
    let mean_chi2 = chi2s.sum() / nreplicas as f64;
    let mean_diff = diffs.sum_axis(Axis(1)) / nreplicas as f64;
    let central = calc_chi2(sqrtcov, &mean_diff)?;

    Ok(((mean_chi2 - central) / nbins as f64).sqrt())
}

/// χ² of every theory replica against the data central values
pub fn all_chi2(results: &Results) -> Result<Array1<f64>, CovarianceError> {
    calc_chi2_batch(results.data.sqrtcovmat(), &results.replica_diffs())
}

/// χ² of the central theory prediction against the data central values
pub fn central_chi2(results: &Results) -> Result<f64, CovarianceError> {
    calc_chi2(results.data.sqrtcovmat(), &results.central_diff())
}

/// Like [`all_chi2`] with a total (experimental + theory) covariance matrix
pub fn all_chi2_theory<S>(
    results: &Results,
    totcov: &ArrayBase<S, Ix2>,
) -> Result<Array1<f64>, CovarianceError>
where
    S: Data<Elem = f64>,
{
    calc_chi2_batch(&cholesky_lower(totcov)?, &results.replica_diffs())
}

/// Like [`central_chi2`] with a total (experimental + theory) covariance matrix
pub fn central_chi2_theory<S>(
    results: &Results,
    totcov: &ArrayBase<S, Ix2>,
) -> Result<f64, CovarianceError>
where
    S: Data<Elem = f64>,
{
    calc_chi2(&cholesky_lower(totcov)?, &results.central_diff())
}

/// Replica χ², central χ² and number of points of one comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chi2Result {
    /// χ² of every replica
    pub replica_chi2: Array1<f64>,
    /// χ² of the central prediction
    pub central_chi2: f64,
    /// Number of data points
    pub ndata: usize,
}

impl Chi2Result {
    /// Create a new χ² result
    pub const fn new(replica_chi2: Array1<f64>, central_chi2: f64, ndata: usize) -> Self {
        Self {
            replica_chi2,
            central_chi2,
            ndata,
        }
    }

    /// Mean of the replica χ²
    pub fn replica_mean(&self) -> f64 {
        self.replica_chi2.mean().unwrap_or(f64::NAN)
    }

    /// Standard deviation of the replica χ²
    pub fn replica_std(&self) -> f64 {
        if self.replica_chi2.is_empty() {
            return f64::NAN;
        }
        self.replica_chi2.std(0.0)
    }

    /// Central χ² divided by the number of points
    pub fn central_per_point(&self) -> f64 {
        self.central_chi2 / self.ndata as f64
    }
}

/// Replica and central χ² using the experimental covariance only
pub fn abs_chi2_data(results: &Results) -> Result<Chi2Result, CovarianceError> {
    Ok(Chi2Result::new(
        all_chi2(results)?,
        central_chi2(results)?,
        results.data.len(),
    ))
}
