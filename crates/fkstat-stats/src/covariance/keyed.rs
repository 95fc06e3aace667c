//! Covariance matrices indexed by (experiment, dataset, point)

use super::CovarianceError;
use super::linalg::{check_square, cholesky_lower};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative tolerance used when validating symmetry
const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Composite key of a single data point
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointKey {
    /// Experiment the point belongs to
    pub experiment: String,
    /// Dataset within the experiment
    pub dataset: String,
    /// Index of the point within the dataset
    pub point: usize,
}

impl PointKey {
    /// Create a new point key
    pub fn new(experiment: impl Into<String>, dataset: impl Into<String>, point: usize) -> Self {
        Self {
            experiment: experiment.into(),
            dataset: dataset.into(),
            point,
        }
    }

    /// Keys for `ndata` consecutive points of one dataset
    pub fn range(experiment: &str, dataset: &str, ndata: usize) -> Vec<Self> {
        (0..ndata)
            .map(|point| Self::new(experiment, dataset, point))
            .collect()
    }
}

impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.experiment, self.dataset, self.point)
    }
}

/// Square covariance matrix with a composite row/column index
///
/// Rows and columns share the same index.
#[derive(Debug, Clone, PartialEq)]
pub struct CovMatrix {
    index: Vec<PointKey>,
    values: Array2<f64>,
}

impl CovMatrix {
    /// Create a keyed matrix, checking that the index matches the shape
    pub fn new(index: Vec<PointKey>, values: Array2<f64>) -> Result<Self, CovarianceError> {
        let n = check_square(&values)?;
        if index.len() != n {
            return Err(CovarianceError::DimensionMismatch {
                expected: n,
                actual: index.len(),
            });
        }
        Ok(Self { index, values })
    }

    /// Row/column index
    pub fn index(&self) -> &[PointKey] {
        &self.index
    }

    /// Underlying matrix
    pub const fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Consume the keyed matrix, returning the underlying array
    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the matrix has no points
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Diagonal block of all points belonging to `dataset`
    pub fn dataset_block(&self, dataset: &str) -> Result<Array2<f64>, CovarianceError> {
        self.block_where(dataset, |key| key.dataset == dataset)
    }

    /// Diagonal block of all points belonging to `experiment`
    pub fn experiment_block(&self, experiment: &str) -> Result<Array2<f64>, CovarianceError> {
        self.block_where(experiment, |key| key.experiment == experiment)
    }

    fn block_where<F>(&self, label: &str, predicate: F) -> Result<Array2<f64>, CovarianceError>
    where
        F: Fn(&PointKey) -> bool,
    {
        let positions: Vec<usize> = self
            .index
            .iter()
            .enumerate()
            .filter(|(_, key)| predicate(key))
            .map(|(i, _)| i)
            .collect();

        if positions.is_empty() {
            return Err(CovarianceError::UnknownBlock(label.to_string()));
        }

        Ok(self
            .values
            .select(Axis(0), &positions)
            .select(Axis(1), &positions))
    }

    /// Element-wise sum of two matrices sharing the same index
    pub fn try_add(&self, other: &Self) -> Result<Self, CovarianceError> {
        if self.index != other.index {
            return Err(CovarianceError::IndexMismatch);
        }
        Ok(Self {
            index: self.index.clone(),
            values: &self.values + &other.values,
        })
    }

    /// Check symmetry and strictly positive diagonal
    pub fn validate(&self) -> Result<(), CovarianceError> {
        let n = self.len();
        for i in 0..n {
            let var = self.values[[i, i]];
            if !var.is_finite() || var <= 0.0 {
                return Err(CovarianceError::ZeroVariance { index: i });
            }
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let a = self.values[[i, j]];
                let b = self.values[[j, i]];
                let scale = (self.values[[i, i]] * self.values[[j, j]]).sqrt();
                if (a - b).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(CovarianceError::InvalidParameter(format!(
                        "matrix is not symmetric at ({}, {})",
                        self.index[i], self.index[j]
                    )));
                }
            }
        }
        Ok(())
    }

    /// Lower triangular Cholesky factor of the matrix
    pub fn cholesky(&self) -> Result<Array2<f64>, CovarianceError> {
        cholesky_lower(&self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_dataset_matrix() -> CovMatrix {
        let mut index = PointKey::range("DIS", "NMC", 2);
        index.extend(PointKey::range("DYP", "E605", 1));
        let values = array![[4.0, 1.0, 0.5], [1.0, 9.0, 0.3], [0.5, 0.3, 1.0]];
        CovMatrix::new(index, values).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_index() {
        let result = CovMatrix::new(PointKey::range("A", "B", 2), Array2::eye(3));
        assert!(matches!(
            result,
            Err(CovarianceError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_dataset_block() {
        let cov = two_dataset_matrix();
        let block = cov.dataset_block("NMC").unwrap();
        assert_eq!(block, array![[4.0, 1.0], [1.0, 9.0]]);

        let block = cov.experiment_block("DYP").unwrap();
        assert_eq!(block, array![[1.0]]);

        assert!(matches!(
            cov.dataset_block("CHORUS"),
            Err(CovarianceError::UnknownBlock(_))
        ));
    }

    #[test]
    fn test_try_add() {
        let cov = two_dataset_matrix();
        let sum = cov.try_add(&cov).unwrap();
        assert_eq!(sum.values()[[1, 1]], 18.0);

        let other = CovMatrix::new(PointKey::range("X", "Y", 3), Array2::eye(3)).unwrap();
        assert!(matches!(
            cov.try_add(&other),
            Err(CovarianceError::IndexMismatch)
        ));
    }

    #[test]
    fn test_validate() {
        assert!(two_dataset_matrix().validate().is_ok());

        let asymmetric =
            CovMatrix::new(PointKey::range("A", "B", 2), array![[1.0, 0.5], [0.2, 1.0]]).unwrap();
        assert!(asymmetric.validate().is_err());

        let zero_diag =
            CovMatrix::new(PointKey::range("A", "B", 2), array![[1.0, 0.0], [0.0, 0.0]]).unwrap();
        assert!(matches!(
            zero_diag.validate(),
            Err(CovarianceError::ZeroVariance { index: 1 })
        ));
    }

    #[test]
    fn test_point_key_display() {
        assert_eq!(PointKey::new("DIS", "NMC", 3).to_string(), "DIS/NMC/3");
    }
}
