//! Theory covariance matrices from scale variations
//!
//! Predictions computed with varied renormalization/factorization scales
//! are turned into a covariance matrix
//!
//! ```text
//! S = N * Σ_k (p_k - p_0) ⊗ (p_k - p_0)
//! ```
//!
//! where `p_0` is the central-scale prediction and `N` is `1/2` for the
//! 3-point prescription and `1/3` for the 7-point one. The total covariance
//! entering the χ² is `S + C_exp`.

use crate::chi2::{Chi2Result, all_chi2_theory, calc_chi2, central_chi2_theory};
use crate::covariance::{
    CovMatrix, CovarianceError, PointKey, check_square, cholesky_lower, correlation_from_covariance,
};
use crate::results::Results;
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building theory covariance matrices
#[derive(Debug, Error)]
pub enum TheoryError {
    /// The number of theories does not match the prescription
    #[error("Expecting exactly {expected} theories, but got {actual}")]
    WrongTheoryCount {
        /// Accepted counts
        expected: &'static str,
        /// Number of theories supplied
        actual: usize,
    },

    /// Vectors or matrices of different sizes were combined
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Normalization to data hit a zero data point
    #[error("Data point {index} is zero, cannot normalise")]
    ZeroData {
        /// Offending point
        index: usize,
    },

    /// Error from the underlying covariance routines
    #[error(transparent)]
    Covariance(#[from] CovarianceError),
}

/// Scale variation prescription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScaleVariation {
    /// Central plus two correlated variations
    #[default]
    #[serde(rename = "3pt")]
    ThreePoint,
    /// Central plus six independent variations
    #[serde(rename = "7pt")]
    SevenPoint,
}

impl ScaleVariation {
    /// Number of theories the prescription requires
    pub const fn ntheories(self) -> usize {
        match self {
            Self::ThreePoint => 3,
            Self::SevenPoint => 7,
        }
    }

    /// Normalization of the sum of outer products
    pub const fn normalization(self) -> f64 {
        match self {
            Self::ThreePoint => 0.5,
            Self::SevenPoint => 1.0 / 3.0,
        }
    }
}

/// Accept only 3 or 7 theories, returning the matching prescription
pub fn check_three_or_seven_theories(ntheories: usize) -> Result<ScaleVariation, TheoryError> {
    match ntheories {
        3 => Ok(ScaleVariation::ThreePoint),
        7 => Ok(ScaleVariation::SevenPoint),
        actual => Err(TheoryError::WrongTheoryCount {
            expected: "3 or 7",
            actual,
        }),
    }
}

/// Accept exactly 3 theories
pub fn check_three_theories(ntheories: usize) -> Result<(), TheoryError> {
    if ntheories == 3 {
        Ok(())
    } else {
        Err(TheoryError::WrongTheoryCount {
            expected: "3",
            actual: ntheories,
        })
    }
}

/// Theory covariance matrix from scale-varied predictions
///
/// `predictions[0]` is the central-scale prediction; the remaining entries
/// are the variations. The prescription follows from the number of entries.
///
/// # Errors
/// * [`TheoryError::WrongTheoryCount`] unless there are 3 or 7 predictions
/// * [`TheoryError::LengthMismatch`] if the predictions differ in length
///
/// # Example
/// ```
/// use fkstat_stats::theory::scale_variation_covmat;
/// use ndarray::array;
///
/// let predictions = [array![1.0, 2.0], array![1.0, 2.0], array![1.0, 2.0]];
/// let cov = scale_variation_covmat(&predictions).unwrap();
/// assert!(cov.iter().all(|&v| v == 0.0));
/// ```
pub fn scale_variation_covmat(predictions: &[Array1<f64>]) -> Result<Array2<f64>, TheoryError> {
    let prescription = check_three_or_seven_theories(predictions.len())?;
    let central = &predictions[0];
    let n = central.len();

    let mut covmat = Array2::<f64>::zeros((n, n));
    for shifted in &predictions[1..] {
        if shifted.len() != n {
            return Err(TheoryError::LengthMismatch {
                expected: n,
                actual: shifted.len(),
            });
        }
        let delta = shifted - central;
        let column = delta.view().insert_axis(Axis(1));
        let row = delta.view().insert_axis(Axis(0));
        covmat += &column.dot(&row);
    }
    covmat *= prescription.normalization();

    debug!(
        "Built {}x{} theory covariance from {} theories",
        n,
        n,
        predictions.len()
    );
    Ok(covmat)
}

/// Keyed theory covariance matrix over a point index
pub fn theory_covmat(
    predictions: &[Array1<f64>],
    index: Vec<PointKey>,
) -> Result<CovMatrix, TheoryError> {
    let values = scale_variation_covmat(predictions)?;
    Ok(CovMatrix::new(index, values)?)
}

/// Theory plus experimental covariance matrix
pub fn total_covmat<S>(
    predictions: &[Array1<f64>],
    expcov: &ArrayBase<S, Ix2>,
) -> Result<Array2<f64>, TheoryError>
where
    S: Data<Elem = f64>,
{
    let thcov = scale_variation_covmat(predictions)?;
    let n = check_square(expcov)?;
    if n != thcov.nrows() {
        return Err(TheoryError::LengthMismatch {
            expected: thcov.nrows(),
            actual: n,
        });
    }
    Ok(thcov + expcov)
}

/// One theory covariance matrix per dataset
///
/// `datasets[i]` holds the central predictions of dataset `i` for every
/// theory, central scale first.
pub fn theory_covmat_datasets(
    datasets: &[Vec<Array1<f64>>],
) -> Result<Vec<Array2<f64>>, TheoryError> {
    datasets
        .iter()
        .map(|predictions| scale_variation_covmat(predictions))
        .collect()
}

/// One total covariance matrix per dataset
///
/// `datasets[i]` holds the results of dataset `i` for every theory. The
/// experimental covariance is taken from the first (central) theory.
pub fn total_covmat_datasets(datasets: &[Vec<Results>]) -> Result<Vec<Array2<f64>>, TheoryError> {
    datasets
        .iter()
        .map(|results| {
            let ntheories = check_three_or_seven_theories(results.len())?.ntheories();
            let predictions: Vec<Array1<f64>> = results
                .iter()
                .take(ntheories)
                .map(|r| r.theory.central_value().clone())
                .collect();
            total_covmat(&predictions, results[0].data.covmat())
        })
        .collect()
}

/// Block-diagonal matrix from per-dataset blocks
pub fn block_diagonal_covmat(blocks: &[Array2<f64>]) -> Result<Array2<f64>, TheoryError> {
    let mut total = 0;
    for block in blocks {
        total += check_square(block)?;
    }

    let mut covmat = Array2::<f64>::zeros((total, total));
    let mut start = 0;
    for block in blocks {
        let end = start + block.nrows();
        covmat.slice_mut(s![start..end, start..end]).assign(block);
        start = end;
    }
    Ok(covmat)
}

/// Keep only the diagonal of a covariance matrix
pub fn diagonal_covmat<S>(covmat: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, TheoryError>
where
    S: Data<Elem = f64>,
{
    check_square(covmat)?;
    Ok(Array2::from_diag(&covmat.diag()))
}

/// Correlation matrix `C_ij / sqrt(C_ii C_jj)`
pub fn correlation_matrix<S>(covmat: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, TheoryError>
where
    S: Data<Elem = f64>,
{
    Ok(correlation_from_covariance(covmat)?)
}

/// Covariance matrix normalised to data, `C_ij / (D_i D_j)`
pub fn normalised_covmat<S>(
    covmat: &ArrayBase<S, Ix2>,
    data: &Array1<f64>,
) -> Result<Array2<f64>, TheoryError>
where
    S: Data<Elem = f64>,
{
    let n = check_square(covmat)?;
    if data.len() != n {
        return Err(TheoryError::LengthMismatch {
            expected: n,
            actual: data.len(),
        });
    }
    if let Some(index) = data.iter().position(|&d| d == 0.0) {
        return Err(TheoryError::ZeroData { index });
    }
    Ok(covmat / data / &data.view().insert_axis(Axis(1)))
}

/// Data minus central theory, concatenated over all results
pub fn data_theory_diff(results: &[Results]) -> Array1<f64> {
    results
        .iter()
        .flat_map(|r| {
            r.data
                .central_value()
                .iter()
                .zip(r.theory.central_value().iter())
                .map(|(d, t)| d - t)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Central χ² per point with theory and experimental covariance combined
pub fn chi2_impact<S1, S2>(
    thcov: &ArrayBase<S1, Ix2>,
    expcov: &ArrayBase<S2, Ix2>,
    results: &[Results],
) -> Result<f64, TheoryError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let diff = data_theory_diff(results);
    let n = check_square(thcov)?;
    let m = check_square(expcov)?;
    if n != diff.len() || m != diff.len() {
        return Err(TheoryError::LengthMismatch {
            expected: diff.len(),
            actual: if n != diff.len() { n } else { m },
        });
    }
    if diff.is_empty() {
        return Err(CovarianceError::InsufficientData {
            required: 1,
            actual: 0,
        }
        .into());
    }

    let total = thcov.to_owned() + expcov;
    let chi2 = calc_chi2(&cholesky_lower(&total)?, &diff)?;
    Ok(chi2 / diff.len() as f64)
}

/// χ² with theory errors for every pair of results and total covariance
pub fn abs_chi2_data_theory(
    results: &[Results],
    total_covmats: &[Array2<f64>],
) -> Result<Vec<Chi2Result>, TheoryError> {
    if results.len() != total_covmats.len() {
        return Err(TheoryError::LengthMismatch {
            expected: results.len(),
            actual: total_covmats.len(),
        });
    }

    results
        .iter()
        .zip(total_covmats)
        .map(|(result, covmat)| {
            Ok(Chi2Result::new(
                all_chi2_theory(result, covmat)?,
                central_chi2_theory(result, covmat)?,
                result.data.len(),
            ))
        })
        .collect()
}
