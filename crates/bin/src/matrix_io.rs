//! Headerless CSV matrices and vectors.

use fkstat::output::{write_matrix_csv, write_vector_csv};
use ndarray::{Array1, Array2};
use std::error::Error;
use std::fs::File;
use std::io;
use std::path::Path;

/// Read a matrix, one row per line
pub(crate) fn read_matrix(path: &Path) -> Result<Array2<f64>, Box<dyn Error>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| format!("cannot open {}: {e}", path.display()))?;

    let mut values = Vec::new();
    let mut ncols = None;
    let mut nrows = 0;
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        match ncols {
            None => ncols = Some(record.len()),
            Some(n) if n != record.len() => {
                return Err(format!(
                    "{}: row {} has {} columns, expected {n}",
                    path.display(),
                    line + 1,
                    record.len()
                )
                .into());
            }
            Some(_) => {}
        }
        for field in &record {
            values.push(field.parse::<f64>().map_err(|e| {
                format!("{}: row {}: invalid number {field:?}: {e}", path.display(), line + 1)
            })?);
        }
        nrows += 1;
    }

    Ok(Array2::from_shape_vec((nrows, ncols.unwrap_or(0)), values)?)
}

/// Read a vector stored either as one column or as one row
pub(crate) fn read_vector(path: &Path) -> Result<Array1<f64>, Box<dyn Error>> {
    let matrix = read_matrix(path)?;
    match matrix.dim() {
        (_, 1) | (1, _) => Ok(matrix.into_iter().collect()),
        (0, 0) => Ok(Array1::zeros(0)),
        shape => Err(format!("{}: expected a vector, got a {shape:?} matrix", path.display()).into()),
    }
}

/// Write a matrix to `out`, or to stdout when no path is given
pub(crate) fn emit_matrix(out: Option<&Path>, matrix: &Array2<f64>) -> Result<(), Box<dyn Error>> {
    match out {
        Some(path) => write_matrix_csv(File::create(path)?, matrix)?,
        None => write_matrix_csv(io::stdout().lock(), matrix)?,
    }
    Ok(())
}

/// Write a vector to `out`, or to stdout when no path is given
pub(crate) fn emit_vector(out: Option<&Path>, vector: &Array1<f64>) -> Result<(), Box<dyn Error>> {
    match out {
        Some(path) => write_vector_csv(File::create(path)?, vector)?,
        None => write_vector_csv(io::stdout().lock(), vector)?,
    }
    Ok(())
}
