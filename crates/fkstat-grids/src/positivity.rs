//! Positivity and integrability sets.
//!
//! A positivity set is a single legacy FK table whose predictions must not
//! turn negative. It has no experimental data: its pseudo-data are zeros,
//! every point is used in training and it never contributes to the χ².
//! Sets whose name contains [`INTEGRABILITY_TAG`] constrain the small-x
//! behaviour of the PDF instead of its sign.

use crate::convolution::dataset_predictions;
use crate::dataset::DatasetRecord;
use crate::error::{GridError, Result};
use crate::legacy::{LegacyFkTable, fk_parser};
use crate::operation::Operation;
use log::debug;
use ndarray::{Array1, ArrayView2};
use serde::Serialize;
use std::path::Path;

/// Name fragment marking an integrability set
pub const INTEGRABILITY_TAG: &str = "INTEG";

/// A positivity or integrability constraint
#[derive(Debug, Clone, Serialize)]
pub struct PositivitySet {
    /// Set name
    pub name: String,
    /// Single-table dataset with the identity operation
    pub record: DatasetRecord,
    /// Maximum multiplier of the constraint penalty
    pub lambda: f64,
    /// Whether the set is an integrability constraint
    pub integrability: bool,
}

impl PositivitySet {
    /// Number of constrained points
    pub const fn ndata(&self) -> usize {
        self.record.ndata
    }

    /// Pseudo-data, zero at every point
    pub fn expdata(&self) -> Array1<f64> {
        Array1::zeros(self.ndata())
    }

    /// Every point is used in training
    pub fn training_mask(&self) -> Vec<bool> {
        vec![true; self.ndata()]
    }

    /// Positivity sets never enter the χ²
    pub const fn counts_chi2(&self) -> bool {
        false
    }

    /// Predictions of the constrained observable for one PDF
    pub fn predictions(&self, pdf: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        dataset_predictions(&self.record, pdf)
    }
}

/// Build a positivity set from a legacy FK table
///
/// # Errors
/// * [`GridError::InvalidMetadata`] if `lambda` is negative or not finite
/// * [`GridError::Shape`] if the table sizes are inconsistent
pub fn positivity_reader(name: &str, fk: &LegacyFkTable, lambda: f64) -> Result<PositivitySet> {
    if !lambda.is_finite() || lambda < 0.0 {
        return Err(GridError::InvalidMetadata(format!(
            "positivity multiplier of {name} must be a non-negative number, got {lambda}"
        )));
    }
    let tensor = fk_parser(fk)?;
    let record = DatasetRecord::new(name, vec![tensor], Operation::Null, 1.0)?;
    let integrability = name.contains(INTEGRABILITY_TAG);
    debug!(
        "Positivity set {name}: {} points, lambda {lambda}, integrability {integrability}",
        record.ndata
    );
    Ok(PositivitySet {
        name: name.to_string(),
        record,
        lambda,
        integrability,
    })
}

/// Load a legacy FK table file and build its positivity set
pub fn load_positivity(name: &str, path: impl AsRef<Path>, lambda: f64) -> Result<PositivitySet> {
    let fk = LegacyFkTable::load(path)?;
    positivity_reader(name, &fk, lambda)
}
