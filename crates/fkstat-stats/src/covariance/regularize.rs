//! Regularization of ill-conditioned covariance matrices
//!
//! Two independent prescriptions are provided:
//!
//! - [`regularize_covmat`] clips the eigenvalues of the correlation matrix
//!   from below at `max(eigenvalues) / threshold`.
//! - [`regularize_fro_l2`] works on a square root factor `A` of the
//!   covariance (`C = A Aᵀ`) and clips the singular values of the row
//!   normalised factor until its Frobenius-L2 condition number
//!   `‖A‖_F ‖A⁻¹‖_2` is at most `threshold * sqrt(N)`.
//!
//! Both leave their input untouched and are fixed points when the input
//! already satisfies the target condition.

use super::CovarianceError;
use super::linalg::{reconstruct_from_eigen, svd, symmetric_eigen};
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use serde::{Deserialize, Serialize};

/// Default acceptable condition number of the correlation matrix
pub const DEFAULT_COND_NUM_THRESHOLD: f64 = 500.0;

/// Iteration cap of the bracketing root solve in [`regularize_singular_values`]
const MAX_BISECTIONS: usize = 200;

/// Configuration of the eigenvalue clipping regularization
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RegularizationConfig {
    /// Acceptable condition number of the correlation matrix (default: 500)
    pub threshold: f64,
}

impl Default for RegularizationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_COND_NUM_THRESHOLD,
        }
    }
}

impl RegularizationConfig {
    /// Apply [`regularize_covmat`] with this configuration
    pub fn apply<S>(&self, covmat: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, CovarianceError>
    where
        S: Data<Elem = f64>,
    {
        regularize_covmat(covmat, self.threshold)
    }
}

/// Square roots of the diagonal of a covariance matrix
///
/// # Errors
/// * [`CovarianceError::ZeroVariance`] for a zero, negative or non-finite variance
pub fn standard_deviations<S>(covmat: &ArrayBase<S, Ix2>) -> Result<Array1<f64>, CovarianceError>
where
    S: Data<Elem = f64>,
{
    covmat
        .diag()
        .iter()
        .enumerate()
        .map(|(index, &var)| {
            if var.is_finite() && var > 0.0 {
                Ok(var.sqrt())
            } else {
                Err(CovarianceError::ZeroVariance { index })
            }
        })
        .collect()
}

/// `corr_ij = cov_ij / (σ_i σ_j)`
pub fn correlation_from_covariance<S>(
    covmat: &ArrayBase<S, Ix2>,
) -> Result<Array2<f64>, CovarianceError>
where
    S: Data<Elem = f64>,
{
    super::linalg::check_square(covmat)?;
    let d = standard_deviations(covmat)?;
    Ok(covmat / &d / &d.view().insert_axis(Axis(1)))
}

/// Regularize a covariance matrix by clipping the eigenvalues of its correlation matrix
///
/// The correlation matrix is eigendecomposed and every eigenvalue below
/// `max(eigenvalues) / cond_num_threshold` is raised to that floor. The
/// clipped correlation is then converted back with `σ_i σ_j`.
///
/// The intermediate regularized correlation matrix does not necessarily have
/// a unit diagonal, so the returned covariance may have slightly different
/// variances than the input.
///
/// # Errors
/// * [`CovarianceError::ZeroVariance`] if any variance is not positive
/// * [`CovarianceError::InvalidParameter`] if the threshold is not positive
pub fn regularize_covmat<S>(
    covmat: &ArrayBase<S, Ix2>,
    cond_num_threshold: f64,
) -> Result<Array2<f64>, CovarianceError>
where
    S: Data<Elem = f64>,
{
    if !(cond_num_threshold.is_finite() && cond_num_threshold > 0.0) {
        return Err(CovarianceError::InvalidParameter(format!(
            "condition number threshold must be positive, got {cond_num_threshold}"
        )));
    }

    let d = standard_deviations(covmat)?;
    let corr = correlation_from_covariance(covmat)?;
    let decomp = symmetric_eigen(&corr)?;

    let max_eig = decomp
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = max_eig / cond_num_threshold;

    let clipped_count = decomp.eigenvalues.iter().filter(|&&v| v < floor).count();
    debug!(
        "regularize_covmat: clipping {clipped_count} of {} eigenvalues to {floor:e}",
        decomp.eigenvalues.len()
    );

    let clipped = decomp.eigenvalues.mapv(|v| v.max(floor));
    let new_corr = reconstruct_from_eigen(&clipped, &decomp.eigenvectors)?;
    let new_corr = (&new_corr + &new_corr.t()) / 2.0;

    // σ_i σ_j, computed once so the result stays exactly symmetric
    let scale = &d.view().insert_axis(Axis(1)) * &d;
    Ok(new_corr * &scale)
}

/// Frobenius-L2 condition number from singular values sorted in decreasing order
///
/// For a matrix `A` with singular values `s` this is `‖A‖_F ‖A⁻¹‖_2 = sqrt(Σ s²) / s_min`.
/// An `N x N` matrix with orthonormal rows, such as the square root of an
/// identity correlation matrix, has condition `sqrt(N)`, the smallest value
/// possible for `N` singular values. It equals 1 only for `N = 1`.
pub fn fro_l2_cond<S>(s: &ArrayBase<S, Ix1>) -> f64
where
    S: Data<Elem = f64>,
{
    let Some(&smallest) = s.iter().last() else {
        return f64::NAN;
    };
    s.dot(s).sqrt() / smallest
}

fn clip_below<S>(s: &ArrayBase<S, Ix1>, smin: f64) -> Array1<f64>
where
    S: Data<Elem = f64>,
{
    s.mapv(|v| v.max(smin))
}

/// Clip singular values from below so that [`fro_l2_cond`] is at most `norm_threshold`
///
/// Values already within the threshold are returned unchanged. Otherwise the
/// smallest floor is located by a bracketed root solve of
/// `f(smin) = fro_l2_cond(clip(s, smin)) - norm_threshold`, which decreases
/// monotonically in `smin`. The search starts from the closed-form estimate
/// `sqrt(Σ s²) / norm_threshold`, which is always a lower bound of the root.
///
/// # Errors
/// * [`CovarianceError::InvalidParameter`] if the target is unreachable
///   (`norm_threshold <= sqrt(len(s))`, the condition of equal singular values)
pub fn regularize_singular_values<S>(
    s: &ArrayBase<S, Ix1>,
    norm_threshold: f64,
) -> Result<Array1<f64>, CovarianceError>
where
    S: Data<Elem = f64>,
{
    if fro_l2_cond(s) <= norm_threshold {
        return Ok(s.to_owned());
    }

    let reachable = (s.len() as f64).sqrt();
    if norm_threshold.is_nan() || norm_threshold <= reachable {
        return Err(CovarianceError::InvalidParameter(format!(
            "norm threshold {norm_threshold} is unreachable for {} singular values (minimum {reachable})",
            s.len()
        )));
    }

    let target = |smin: f64| fro_l2_cond(&clip_below(s, smin)) - norm_threshold;

    // f(lo) >= 0 by construction, f(s_max) = sqrt(len) - threshold < 0
    let mut lo = s.dot(s).sqrt() / norm_threshold;
    let mut hi = s.iter().copied().fold(lo, f64::max);

    for _ in 0..MAX_BISECTIONS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if target(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    debug!("regularize_singular_values: floor {hi:e} for threshold {norm_threshold}");
    Ok(clip_below(s, hi))
}

/// Return a regularized version of a square root covariance factor
///
/// `sqrtcov` is an `(N, nsys)` matrix whose Gram matrix is the covariance.
/// It is decomposed as `D A` with `D` the diagonal of row norms and `A` the
/// square root of the correlation matrix. If `fro_l2_cond(A) <= threshold * sqrt(N)`
/// the input is returned unchanged; otherwise the singular values of `A` are
/// clipped with [`regularize_singular_values`] and `D U diag(s') Vᵀ` is returned.
///
/// `threshold` roughly corresponds to the maximum relative uncertainty in any systematic.
///
/// # Errors
/// * [`CovarianceError::ZeroVariance`] if a row of `sqrtcov` vanishes
pub fn regularize_fro_l2<S>(
    sqrtcov: &ArrayBase<S, Ix2>,
    threshold: f64,
) -> Result<Array2<f64>, CovarianceError>
where
    S: Data<Elem = f64>,
{
    let n = sqrtcov.nrows();
    if n == 0 {
        return Err(CovarianceError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    let norm_threshold = threshold * (n as f64).sqrt();

    let d: Array1<f64> = sqrtcov
        .rows()
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let norm = row.dot(&row).sqrt();
            if norm.is_finite() && norm > 0.0 {
                Ok(norm)
            } else {
                Err(CovarianceError::ZeroVariance { index })
            }
        })
        .collect::<Result<_, _>>()?;
    let d_col = d.view().insert_axis(Axis(1));

    let sqrtcorr = sqrtcov / &d_col;
    let decomp = svd(&sqrtcorr)?;

    let cond = fro_l2_cond(&decomp.singular_values);
    if cond <= norm_threshold {
        return Ok(sqrtcov.to_owned());
    }
    debug!("regularize_fro_l2: condition {cond:e} exceeds {norm_threshold:e}");

    let snew = regularize_singular_values(&decomp.singular_values, norm_threshold)?;
    let scaled = &decomp.u * &snew * &d_col;
    Ok(scaled.dot(&decomp.vt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::linalg::condition_number;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn ill_conditioned() -> Array2<f64> {
        // Nearly collinear rows: the correlation matrix has a tiny eigenvalue
        let s = array![
            [1.0, 0.2, 0.1],
            [1.0, 0.2001, 0.1001],
            [0.3, 0.9, 0.4]
        ];
        s.dot(&s.t())
    }

    #[test]
    fn test_config_default() {
        let config = RegularizationConfig::default();
        assert_eq!(config.threshold, 500.0);
    }

    #[test]
    fn test_regularize_covmat_meets_condition() {
        let cov = ill_conditioned();
        let corr = correlation_from_covariance(&cov).unwrap();
        assert!(condition_number(&corr).unwrap() > 100.0);

        let new_cov = regularize_covmat(&cov, 100.0).unwrap();

        // Symmetric output
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(new_cov[[i, j]], new_cov[[j, i]]);
            }
        }

        // The clipped correlation factor is (σσ)⁻¹ C', its condition is bounded
        let d = standard_deviations(&cov).unwrap();
        let clipped_corr = &new_cov / &d / &d.view().insert_axis(Axis(1));
        assert!(condition_number(&clipped_corr).unwrap() <= 100.0 * (1.0 + 1e-8));

        let input_unchanged = ill_conditioned();
        assert_eq!(cov, input_unchanged);
    }

    #[test]
    fn test_regularize_covmat_idempotent_when_well_conditioned() {
        let cov = array![[4.0, 1.0, 0.2], [1.0, 9.0, 0.5], [0.2, 0.5, 1.0]];
        let once = regularize_covmat(&cov, 500.0).unwrap();
        let twice = regularize_covmat(&once, 500.0).unwrap();

        for (a, b) in once.iter().zip(cov.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
        for (a, b) in twice.iter().zip(once.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_regularize_covmat_zero_variance() {
        let cov = array![[1.0, 0.0], [0.0, 0.0]];
        assert!(matches!(
            regularize_covmat(&cov, 500.0),
            Err(CovarianceError::ZeroVariance { index: 1 })
        ));
    }

    #[test]
    fn test_regularize_covmat_rejects_bad_threshold() {
        let cov = Array2::<f64>::eye(2);
        assert!(regularize_covmat(&cov, 0.0).is_err());
        assert!(regularize_covmat(&cov, f64::NAN).is_err());
    }

    #[test]
    fn test_fro_l2_cond() {
        assert_abs_diff_eq!(fro_l2_cond(&array![1.0]), 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(fro_l2_cond(&array![1.0, 1.0, 1.0, 1.0]), 2.0, epsilon = 1e-15);
        assert_abs_diff_eq!(fro_l2_cond(&array![3.0, 4.0, 0.5]), 25.25_f64.sqrt() / 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_fro_l2_cond_orthonormal_rows() {
        let (c, s) = (0.6, 0.8);
        let rotation = array![[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]];
        for factor in [rotation, Array2::eye(3)] {
            let singular_values = svd(&factor).unwrap().singular_values;
            assert_abs_diff_eq!(fro_l2_cond(&singular_values), 3.0_f64.sqrt(), epsilon = 1e-12);
        }

        // Such a factor is always within the threshold of regularize_fro_l2
        let identity = Array2::<f64>::eye(5);
        assert_eq!(regularize_fro_l2(&identity, 1.0).unwrap(), identity);
    }

    #[test]
    fn test_regularize_singular_values_noop_within_threshold() {
        let s = array![2.0, 1.0, 0.5];
        let out = regularize_singular_values(&s, 10.0).unwrap();
        assert_eq!(out, s);
    }

    #[test]
    fn test_regularize_singular_values_hits_threshold() {
        let s = array![10.0, 5.0, 1e-3, 1e-6];
        let out = regularize_singular_values(&s, 20.0).unwrap();

        let cond = fro_l2_cond(&out);
        assert!(cond <= 20.0);
        assert_abs_diff_eq!(cond, 20.0, epsilon = 1e-8);

        // Large singular values are untouched, small ones share the floor
        assert_eq!(out[0], 10.0);
        assert_eq!(out[1], 5.0);
        assert_eq!(out[2], out[3]);
    }

    #[test]
    fn test_regularize_singular_values_unreachable() {
        let s = array![1.0, 1e-9];
        assert!(matches!(
            regularize_singular_values(&s, 1.2),
            Err(CovarianceError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_regularize_fro_l2_noop() {
        let sqrtcov = array![[1.0, 0.0], [0.0, 2.0]];
        let out = regularize_fro_l2(&sqrtcov, 1.0).unwrap();
        assert_eq!(out, sqrtcov);
    }

    #[test]
    fn test_regularize_fro_l2_reduces_condition() {
        let sqrtcov = array![
            [1.0, 0.5, 0.0],
            [1.0, 0.5001, 0.0],
            [0.0, 0.2, 3.0]
        ];
        let threshold = 5.0;
        let n = sqrtcov.nrows() as f64;

        let out = regularize_fro_l2(&sqrtcov, threshold).unwrap();
        assert_eq!(out.dim(), sqrtcov.dim());

        // Normalised with the row norms of the input factor
        let d: Array1<f64> = sqrtcov.rows().into_iter().map(|r| r.dot(&r).sqrt()).collect();
        let normalised = &out / &d.view().insert_axis(Axis(1));
        let s = svd(&normalised).unwrap().singular_values;
        assert!(fro_l2_cond(&s) <= threshold * n.sqrt() * (1.0 + 1e-6));
    }

    #[test]
    fn test_regularize_fro_l2_tall_factor() {
        // Four points sharing two nearly collinear systematics
        let sqrtcov = array![
            [1.0, 1e-3],
            [2.0, 2.1e-3],
            [0.5, -4e-4],
            [3.0, 2.8e-3]
        ];
        let threshold = 5.0;
        let n = sqrtcov.nrows() as f64;

        let d: Array1<f64> = sqrtcov.rows().into_iter().map(|r| f64::sqrt(r.dot(&r))).collect();
        let d_col = d.view().insert_axis(Axis(1));
        let before = svd(&(&sqrtcov / &d_col)).unwrap().singular_values;
        assert_eq!(before.len(), 2);
        assert!(fro_l2_cond(&before) > threshold * n.sqrt());

        let out = regularize_fro_l2(&sqrtcov, threshold).unwrap();
        assert_eq!(out.dim(), (4, 2));

        let after = svd(&(&out / &d_col)).unwrap().singular_values;
        let cond = fro_l2_cond(&after);
        assert!(cond <= threshold * n.sqrt() * (1.0 + 1e-6));
        assert_abs_diff_eq!(cond, threshold * n.sqrt(), epsilon = 1e-6);

        // The dominant direction is kept
        assert_abs_diff_eq!(after[0], before[0], epsilon = 1e-9);
    }

    #[test]
    fn test_regularize_fro_l2_zero_row() {
        let sqrtcov = array![[1.0, 0.0], [0.0, 0.0]];
        assert!(matches!(
            regularize_fro_l2(&sqrtcov, 2.0),
            Err(CovarianceError::ZeroVariance { index: 1 })
        ));
    }
}
