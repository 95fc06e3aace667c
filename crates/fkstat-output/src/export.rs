//! Export of χ² tables and covariance matrices.
//!
//! Every exportable type implements [`Exporter`], which renders CSV or JSON
//! to a string, a writer or a file.

use crate::summary::{Chi2Row, Chi2Table};
use fkstat_stats::{CovMatrix, PointKey};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }

    /// Guess the format from a file extension, CSV unless it is `json`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::PrettyJson,
            _ => Self::Csv,
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a writer in the specified format.
    fn export_to_writer<W: Write>(
        &self,
        writer: &mut W,
        format: ExportFormat,
    ) -> Result<(), ExportError>
    where
        Self: Sized,
    {
        let content = self.export_to_string(format)?;
        writer.write_all(content.as_bytes())?;
        Ok(())
    }

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn finish_csv(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| ExportError::InvalidFormat(e.to_string()))
}

fn to_json<T: Serialize>(value: &T, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(value)?),
        _ => Ok(serde_json::to_string(value)?),
    }
}

impl Exporter for Chi2Row {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                wtr.serialize(self)?;
                finish_csv(wtr)
            }
            ExportFormat::Json | ExportFormat::PrettyJson => to_json(self, format),
        }
    }
}

impl Exporter for Vec<Chi2Row> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                for record in self {
                    wtr.serialize(record)?;
                }
                finish_csv(wtr)
            }
            ExportFormat::Json | ExportFormat::PrettyJson => to_json(self, format),
        }
    }
}

impl Exporter for Chi2Table {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                for record in self.all_rows() {
                    wtr.serialize(record)?;
                }
                finish_csv(wtr)
            }
            ExportFormat::Json | ExportFormat::PrettyJson => to_json(self, format),
        }
    }
}

/// Covariance matrix with one labelled row per data point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CovMatrixExport {
    /// Point labels, in row order
    pub index: Vec<PointKey>,

    /// Matrix rows
    pub rows: Vec<Vec<f64>>,
}

impl CovMatrixExport {
    /// Capture a keyed covariance matrix
    pub fn new(covmat: &CovMatrix) -> Self {
        Self {
            index: covmat.index().to_vec(),
            rows: covmat.values().outer_iter().map(|r| r.to_vec()).collect(),
        }
    }
}

impl From<&CovMatrix> for CovMatrixExport {
    fn from(covmat: &CovMatrix) -> Self {
        Self::new(covmat)
    }
}

impl Exporter for CovMatrixExport {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                let mut header = vec![
                    "experiment".to_string(),
                    "dataset".to_string(),
                    "point".to_string(),
                ];
                header.extend(
                    self.index
                        .iter()
                        .map(|k| format!("{}/{}/{}", k.experiment, k.dataset, k.point)),
                );
                wtr.write_record(&header)?;
                for (key, row) in self.index.iter().zip(&self.rows) {
                    let mut record =
                        vec![key.experiment.clone(), key.dataset.clone(), key.point.to_string()];
                    record.extend(row.iter().map(f64::to_string));
                    wtr.write_record(&record)?;
                }
                finish_csv(wtr)
            }
            ExportFormat::Json | ExportFormat::PrettyJson => to_json(self, format),
        }
    }
}

/// Write a matrix as headerless CSV, one row per line
pub fn write_matrix_csv<W: Write>(writer: W, matrix: &Array2<f64>) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    for row in matrix.outer_iter() {
        wtr.write_record(row.iter().map(f64::to_string))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a vector as headerless CSV, one value per line
pub fn write_vector_csv<W: Write>(writer: W, vector: &Array1<f64>) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    for value in vector {
        wtr.write_record([value.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}
