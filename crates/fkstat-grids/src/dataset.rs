//! Dense FK tables and the datasets built from them.

use crate::error::{GridError, Result};
use crate::operation::Operation;
use ndarray::{Array1, ArrayD};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

/// Dense form of an FK table, ready to be convolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FkTensor {
    /// Number of data points
    pub ndata: usize,
    /// Number of active flavour combinations
    pub nbasis: usize,
    /// Flavour indices of the combinations, flattened pairs if hadronic
    pub basis: Vec<usize>,
    /// Number of x nodes
    pub nx: usize,
    /// Interpolation nodes in x
    pub xgrid: Array1<f64>,
    /// `(ndata, nbasis, nx)` or `(ndata, nbasis, nx, nx)` coefficients
    pub fktable: ArrayD<f64>,
    /// Whether the table convolves two PDFs
    pub hadronic: bool,
}

impl FkTensor {
    /// Check that the dense array agrees with the declared dimensions
    pub fn validate(&self) -> Result<()> {
        let expected: Vec<usize> = if self.hadronic {
            vec![self.ndata, self.nbasis, self.nx, self.nx]
        } else {
            vec![self.ndata, self.nbasis, self.nx]
        };
        let per_combination = if self.hadronic { 2 } else { 1 };
        if self.fktable.shape() != expected.as_slice()
            || self.xgrid.len() != self.nx
            || self.basis.len() != per_combination * self.nbasis
        {
            return Err(GridError::Shape(format!(
                "fktable {:?} with {} basis entries and {} x nodes, expected {expected:?}",
                self.fktable.shape(),
                self.basis.len(),
                self.xgrid.len()
            )));
        }
        Ok(())
    }
}

/// All FK tables of a dataset and how to combine them
#[derive(Debug, Clone, Serialize)]
pub struct DatasetRecord {
    /// Dataset name
    pub name: String,
    /// One table per operand
    pub fktables: Vec<FkTensor>,
    /// Whether the tables are hadronic
    pub hadronic: bool,
    /// Operation combining the operands
    pub operation: Operation,
    /// Training fraction
    pub frac: f64,
    /// Number of data points of the combined prediction
    pub ndata: usize,
}

impl DatasetRecord {
    /// Assemble a dataset from its operand tables
    ///
    /// # Errors
    /// * [`GridError::InvalidMetadata`] if there are no tables or `frac` is
    ///   outside `[0, 1]`
    /// * [`GridError::Shape`] if the number of tables does not suit the operation
    pub fn new(
        name: &str,
        fktables: Vec<FkTensor>,
        operation: Operation,
        frac: f64,
    ) -> Result<Self> {
        let first = fktables.first().ok_or_else(|| {
            GridError::InvalidMetadata(format!("dataset {name} has no FK tables"))
        })?;
        if !(0.0..=1.0).contains(&frac) {
            return Err(GridError::InvalidMetadata(format!(
                "training fraction of {name} must lie in [0, 1], got {frac}"
            )));
        }
        if let Some(arity) = operation.arity()
            && arity != fktables.len()
        {
            return Err(GridError::Shape(format!(
                "{operation} needs {arity} FK tables, {name} has {}",
                fktables.len()
            )));
        }
        for table in &fktables {
            table.validate()?;
        }

        let hadronic = first.hadronic;
        let ndata = fktables.iter().map(|t| t.ndata).max().unwrap_or_default();
        Ok(Self {
            name: name.to_string(),
            fktables,
            hadronic,
            operation,
            frac,
            ndata,
        })
    }

    /// Number of points used for training, `floor(frac * ndata)`
    pub fn ntraining(&self) -> usize {
        (self.frac * self.ndata as f64).floor() as usize
    }

    /// Split of the data points into training (`true`) and validation
    ///
    /// Exactly [`Self::ntraining`] points are selected, shuffled with the
    /// given seed. With `frac = 1` every point is kept for training.
    pub fn training_mask(&self, seed: Option<u64>) -> Vec<bool> {
        let ntraining = self.ntraining();
        let mut mask: Vec<bool> = (0..self.ndata).map(|i| i < ntraining).collect();
        if ntraining < self.ndata {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            mask.shuffle(&mut rng);
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, array};

    fn dis_tensor(ndata: usize) -> FkTensor {
        FkTensor {
            ndata,
            nbasis: 1,
            basis: vec![1],
            nx: 2,
            xgrid: array![0.1, 0.5],
            fktable: Array3::<f64>::ones((ndata, 1, 2)).into_dyn(),
            hadronic: false,
        }
    }

    #[test]
    fn test_new_record() {
        let record =
            DatasetRecord::new("NMC", vec![dis_tensor(3)], Operation::Null, 0.75).unwrap();
        assert_eq!(record.ndata, 3);
        assert!(!record.hadronic);
        assert_eq!(record.name, "NMC");
    }

    #[test]
    fn test_ratio_with_repeated_denominator() {
        let record = DatasetRecord::new(
            "R",
            vec![dis_tensor(4), dis_tensor(1)],
            Operation::Ratio,
            1.0,
        )
        .unwrap();
        assert_eq!(record.ndata, 4);
    }

    #[test]
    fn test_training_mask() {
        let record =
            DatasetRecord::new("NMC", vec![dis_tensor(8)], Operation::Null, 0.75).unwrap();
        assert_eq!(record.ntraining(), 6);
        let mask = record.training_mask(Some(7));
        assert_eq!(mask.len(), 8);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 6);
        assert_eq!(mask, record.training_mask(Some(7)));

        let full = DatasetRecord::new("NMC", vec![dis_tensor(3)], Operation::Null, 1.0).unwrap();
        assert_eq!(full.training_mask(None), vec![true; 3]);

        let none = DatasetRecord::new("NMC", vec![dis_tensor(3)], Operation::Null, 0.0).unwrap();
        assert_eq!(none.training_mask(Some(1)), vec![false; 3]);
    }

    #[test]
    fn test_invalid_records() {
        assert!(matches!(
            DatasetRecord::new("E", vec![], Operation::Null, 1.0),
            Err(GridError::InvalidMetadata(_))
        ));
        assert!(matches!(
            DatasetRecord::new("E", vec![dis_tensor(1)], Operation::Ratio, 1.0),
            Err(GridError::Shape(_))
        ));
        assert!(DatasetRecord::new("E", vec![dis_tensor(1)], Operation::Null, 1.5).is_err());

        let mut bad = dis_tensor(2);
        bad.nx = 3;
        assert!(DatasetRecord::new("E", vec![bad], Operation::Null, 1.0).is_err());
    }
}
