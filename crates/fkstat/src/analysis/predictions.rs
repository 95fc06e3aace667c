//! Theory predictions from FK tables.

use super::AnalysisError;
use fkstat_grids::{DatasetRecord, dataset_predictions};
use fkstat_stats::TheoryResult;
use ndarray::{Array2, Axis, stack};
use rayon::prelude::*;

/// Convolve every PDF replica with a dataset and collect the predictions
///
/// Each replica is a `14 x nx` array of `x f(x)` on the x-grid of the
/// dataset tables. The result holds one column per replica; its central
/// value is the replica mean.
pub fn theory_result_from_grids(
    record: &DatasetRecord,
    replicas: &[Array2<f64>],
) -> Result<TheoryResult, AnalysisError> {
    let columns = replicas
        .par_iter()
        .map(|pdf| dataset_predictions(record, pdf.view()))
        .collect::<Result<Vec<_>, _>>()?;

    let views: Vec<_> = columns.iter().map(|c| c.view()).collect();
    let rawdata = stack(Axis(1), &views).map_err(|e| {
        fkstat_stats::CovarianceError::InvalidParameter(format!(
            "cannot stack predictions of {}: {e}",
            record.name
        ))
    })?;
    Ok(TheoryResult::from_replicas(rawdata)?)
}
