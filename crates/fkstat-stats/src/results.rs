//! Data and theory results consumed by the chi² routines
//!
//! These are thin typed records: the experimental central values with their
//! covariance matrix, and the theory predictions for every replica of a PDF
//! ensemble.

use crate::covariance::{CovarianceError, cholesky_lower};
use ndarray::{Array1, Array2, Axis};

/// Experimental central values with their covariance matrix
#[derive(Debug, Clone)]
pub struct DataResult {
    central_value: Array1<f64>,
    covmat: Array2<f64>,
    sqrtcovmat: Array2<f64>,
}

impl DataResult {
    /// Build a data result, computing the Cholesky factor of `covmat`
    ///
    /// # Errors
    /// * [`CovarianceError::DimensionMismatch`] if the sizes disagree
    /// * [`CovarianceError::NotPositiveDefinite`] if `covmat` has no Cholesky factor
    pub fn new(central_value: Array1<f64>, covmat: Array2<f64>) -> Result<Self, CovarianceError> {
        if covmat.nrows() != central_value.len() {
            return Err(CovarianceError::DimensionMismatch {
                expected: central_value.len(),
                actual: covmat.nrows(),
            });
        }
        let sqrtcovmat = cholesky_lower(&covmat)?;
        Ok(Self {
            central_value,
            covmat,
            sqrtcovmat,
        })
    }

    /// Experimental central values
    pub const fn central_value(&self) -> &Array1<f64> {
        &self.central_value
    }

    /// Experimental covariance matrix
    pub const fn covmat(&self) -> &Array2<f64> {
        &self.covmat
    }

    /// Lower triangular Cholesky factor of the covariance matrix
    pub const fn sqrtcovmat(&self) -> &Array2<f64> {
        &self.sqrtcovmat
    }

    /// Number of data points
    pub fn len(&self) -> usize {
        self.central_value.len()
    }

    /// Whether there are no data points
    pub fn is_empty(&self) -> bool {
        self.central_value.is_empty()
    }
}

/// Theory predictions for every replica of an ensemble
#[derive(Debug, Clone)]
pub struct TheoryResult {
    central_value: Array1<f64>,
    rawdata: Array2<f64>,
}

impl TheoryResult {
    /// Build a theory result from `ndata x nreplicas` predictions
    ///
    /// The central value is the replica mean.
    pub fn from_replicas(rawdata: Array2<f64>) -> Result<Self, CovarianceError> {
        let central_value =
            rawdata
                .mean_axis(Axis(1))
                .ok_or(CovarianceError::InsufficientData {
                    required: 1,
                    actual: 0,
                })?;
        Ok(Self {
            central_value,
            rawdata,
        })
    }

    /// Build a theory result with an explicitly supplied central prediction
    pub fn new(central_value: Array1<f64>, rawdata: Array2<f64>) -> Result<Self, CovarianceError> {
        if rawdata.nrows() != central_value.len() {
            return Err(CovarianceError::DimensionMismatch {
                expected: central_value.len(),
                actual: rawdata.nrows(),
            });
        }
        Ok(Self {
            central_value,
            rawdata,
        })
    }

    /// Central prediction
    pub const fn central_value(&self) -> &Array1<f64> {
        &self.central_value
    }

    /// Replica predictions (`ndata x nreplicas`)
    pub const fn rawdata(&self) -> &Array2<f64> {
        &self.rawdata
    }

    /// Number of replicas
    pub fn nreplicas(&self) -> usize {
        self.rawdata.ncols()
    }
}

/// A data result paired with the theory predictions for the same points
#[derive(Debug, Clone)]
pub struct Results {
    /// Experimental side
    pub data: DataResult,
    /// Theory side
    pub theory: TheoryResult,
}

impl Results {
    /// Pair data and theory, checking that they describe the same number of points
    pub fn new(data: DataResult, theory: TheoryResult) -> Result<Self, CovarianceError> {
        if data.len() != theory.central_value().len() {
            return Err(CovarianceError::DimensionMismatch {
                expected: data.len(),
                actual: theory.central_value().len(),
            });
        }
        Ok(Self { data, theory })
    }

    /// Theory replicas minus data central values (`ndata x nreplicas`)
    pub fn replica_diffs(&self) -> Array2<f64> {
        self.theory.rawdata() - &self.data.central_value().view().insert_axis(Axis(1))
    }

    /// Theory central minus data central
    pub fn central_diff(&self) -> Array1<f64> {
        self.theory.central_value() - self.data.central_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_theory_central_is_replica_mean() {
        let theory = TheoryResult::from_replicas(array![[1.0, 3.0], [2.0, 6.0]]).unwrap();
        assert_eq!(theory.central_value(), &array![2.0, 4.0]);
        assert_eq!(theory.nreplicas(), 2);
    }

    #[test]
    fn test_diffs() {
        let data = DataResult::new(array![1.0, 1.0], Array2::eye(2)).unwrap();
        let theory = TheoryResult::from_replicas(array![[1.0, 3.0], [2.0, 6.0]]).unwrap();
        let results = Results::new(data, theory).unwrap();

        assert_eq!(results.replica_diffs(), array![[0.0, 2.0], [1.0, 5.0]]);
        assert_eq!(results.central_diff(), array![1.0, 3.0]);
    }

    #[test]
    fn test_mismatched_sizes() {
        let data = DataResult::new(array![1.0, 1.0], Array2::eye(2)).unwrap();
        let theory = TheoryResult::from_replicas(array![[1.0], [2.0], [3.0]]).unwrap();
        assert!(Results::new(data, theory).is_err());
        assert!(DataResult::new(array![1.0], Array2::eye(2)).is_err());
    }
}
