//! Chi-squared summary tables.
//!
//! One row per dataset (or experiment), reporting the number of points, the
//! central χ² per point and the mean and spread of the replica χ² per point.

use fkstat_stats::Chi2Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// χ² summary of one dataset or experiment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chi2Row {
    /// Dataset or experiment name
    pub name: String,

    /// Number of data points
    pub ndata: usize,

    /// Central χ² divided by the number of points
    pub central_chi2: f64,

    /// Mean of the replica χ² divided by the number of points
    pub replica_mean: f64,

    /// Standard deviation of the replica χ² divided by the number of points
    pub replica_std: f64,
}

impl Chi2Row {
    /// Create a row from per-point values
    pub const fn new(
        name: String,
        ndata: usize,
        central_chi2: f64,
        replica_mean: f64,
        replica_std: f64,
    ) -> Self {
        Self {
            name,
            ndata,
            central_chi2,
            replica_mean,
            replica_std,
        }
    }

    /// Normalize a χ² result by its number of points
    ///
    /// # Examples
    ///
    /// ```
    /// use fkstat_output::Chi2Row;
    /// use fkstat_stats::Chi2Result;
    /// use ndarray::array;
    ///
    /// let result = Chi2Result::new(array![8.0, 12.0], 9.0, 10);
    /// let row = Chi2Row::from_result("NMC", &result);
    /// assert_eq!(row.central_chi2, 0.9);
    /// assert_eq!(row.replica_mean, 1.0);
    /// ```
    pub fn from_result(name: impl Into<String>, result: &Chi2Result) -> Self {
        let n = result.ndata as f64;
        let per_point = |v: f64| if result.ndata == 0 { f64::NAN } else { v / n };
        Self {
            name: name.into(),
            ndata: result.ndata,
            central_chi2: per_point(result.central_chi2),
            replica_mean: per_point(result.replica_mean()),
            replica_std: per_point(result.replica_std()),
        }
    }
}

impl fmt::Display for Chi2Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: χ²/N = {:.3} over {} points (replicas {:.3} ± {:.3})",
            self.name, self.central_chi2, self.ndata, self.replica_mean, self.replica_std
        )
    }
}

/// Table of χ² rows, optionally closed by a total row
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Chi2Table {
    /// Table title
    pub title: String,

    /// One row per dataset or experiment
    pub rows: Vec<Chi2Row>,

    /// χ² of all points together, correlations included
    pub total: Option<Chi2Row>,
}

impl Chi2Table {
    /// Create an empty table
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Append a row
    pub fn push(&mut self, row: Chi2Row) {
        self.rows.push(row);
    }

    /// Set the total row
    pub fn set_total(&mut self, total: Chi2Row) {
        self.total = Some(total);
    }

    /// Total number of points in the rows
    pub fn ndata(&self) -> usize {
        self.rows.iter().map(|r| r.ndata).sum()
    }

    /// Rows followed by the total, if any
    pub fn all_rows(&self) -> impl Iterator<Item = &Chi2Row> {
        self.rows.iter().chain(self.total.as_ref())
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("\n{}\n", self.title));
        output.push_str(&"=".repeat(72));
        output.push('\n');
        output.push_str(&format!(
            "{:<30} {:>8} {:>10} {:>10} {:>10}\n",
            "Dataset", "ndata", "χ²/N", "mean", "std"
        ));
        output.push_str(&"-".repeat(72));
        output.push('\n');

        for row in &self.rows {
            output.push_str(&ascii_row(row));
        }
        if let Some(total) = &self.total {
            output.push_str(&"-".repeat(72));
            output.push('\n');
            output.push_str(&ascii_row(total));
        }

        output.push_str(&"=".repeat(72));
        output.push('\n');
        output
    }

    /// Format as Markdown for documentation.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("## {}\n\n", self.title));
        output.push_str("| Dataset | ndata | χ²/N | Replica mean | Replica std |\n");
        output.push_str("|---------|-------|------|--------------|-------------|\n");
        for row in &self.rows {
            output.push_str(&markdown_row(row, false));
        }
        if let Some(total) = &self.total {
            output.push_str(&markdown_row(total, true));
        }

        output
    }
}

fn ascii_row(row: &Chi2Row) -> String {
    format!(
        "{:<30} {:>8} {:>10.4} {:>10.4} {:>10.4}\n",
        row.name, row.ndata, row.central_chi2, row.replica_mean, row.replica_std
    )
}

fn markdown_row(row: &Chi2Row, bold: bool) -> String {
    let name = if bold {
        format!("**{}**", row.name)
    } else {
        row.name.clone()
    };
    format!(
        "| {name} | {} | {:.4} | {:.4} | {:.4} |\n",
        row.ndata, row.central_chi2, row.replica_mean, row.replica_std
    )
}

impl fmt::Display for Chi2Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ascii_table())
    }
}
