//! FK tables assembled from one or more grid files.

use crate::error::{GridError, Result};
use crate::flavour::luminosity_mapping;
use crate::metadata::DatasetMetadata;
use ndarray::{Array1, Array2, Array3, Array4, ArrayD};
use polars::prelude::{Column, DataFrame, NamedFrom, Series};
use std::collections::BTreeSet;

/// Row key of the sigma table: data point and x node(s)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    /// Data point index
    pub data: usize,
    /// Index of the (first) x node
    pub x1: usize,
    /// Index of the second x node, for hadronic tables
    pub x2: Option<usize>,
}

/// Rows, columns and values of a piece of sigma table
#[derive(Debug, Clone)]
pub(crate) struct SigmaBlock {
    pub(crate) rows: Vec<RowKey>,
    pub(crate) columns: Vec<usize>,
    pub(crate) values: Array2<f64>,
}

/// Concatenate blocks over the union of their columns
///
/// Columns come out sorted ascending; a block lacking a column contributes
/// zeros to it.
pub(crate) fn concat_blocks(blocks: Vec<SigmaBlock>) -> SigmaBlock {
    let columns: Vec<usize> = blocks
        .iter()
        .flat_map(|b| b.columns.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let nrows: usize = blocks.iter().map(|b| b.rows.len()).sum();

    let mut values = Array2::<f64>::zeros((nrows, columns.len()));
    let mut rows = Vec::with_capacity(nrows);
    let mut offset = 0;
    for block in blocks {
        for (j, column) in block.columns.iter().enumerate() {
            // Columns are unique and sorted, the search always succeeds
            if let Ok(target) = columns.binary_search(column) {
                for (i, &v) in block.values.column(j).iter().enumerate() {
                    values[[offset + i, target]] += v;
                }
            }
        }
        offset += block.rows.len();
        rows.extend(block.rows);
    }

    SigmaBlock {
        rows,
        columns,
        values,
    }
}

/// Theory prediction table of one group of grids
///
/// The sigma table has one row per `(data, x1[, x2])` and one column per
/// flavour combination, in ascending column order.
#[derive(Debug, Clone)]
pub struct FkTableData {
    ndata: usize,
    xgrid: Array1<f64>,
    q0: f64,
    hadronic: bool,
    metadata: DatasetMetadata,
    rows: Vec<RowKey>,
    columns: Vec<usize>,
    sigma: Array2<f64>,
}

impl FkTableData {
    /// Build a table, validating the sigma table against its keys
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ndata: usize,
        xgrid: Array1<f64>,
        q0: f64,
        hadronic: bool,
        metadata: DatasetMetadata,
        rows: Vec<RowKey>,
        columns: Vec<usize>,
        sigma: Array2<f64>,
    ) -> Result<Self> {
        if sigma.dim() != (rows.len(), columns.len()) {
            return Err(GridError::Shape(format!(
                "sigma table is {:?}, keys describe ({}, {})",
                sigma.dim(),
                rows.len(),
                columns.len()
            )));
        }
        if columns.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GridError::Shape(
                "flavour columns must be strictly ascending".to_string(),
            ));
        }
        let nx = xgrid.len();
        for key in &rows {
            let x2_ok = match key.x2 {
                Some(x2) => hadronic && x2 < nx,
                None => !hadronic,
            };
            if key.data >= ndata || key.x1 >= nx || !x2_ok {
                return Err(GridError::Shape(format!(
                    "row key {key:?} out of range for {ndata} points and {nx} x nodes"
                )));
            }
        }

        Ok(Self {
            ndata,
            xgrid,
            q0,
            hadronic,
            metadata,
            rows,
            columns,
            sigma,
        })
    }

    /// Number of data points
    pub const fn ndata(&self) -> usize {
        self.ndata
    }

    /// Interpolation nodes in x
    pub const fn xgrid(&self) -> &Array1<f64> {
        &self.xgrid
    }

    /// Fitting scale
    pub const fn q0(&self) -> f64 {
        self.q0
    }

    /// Whether the table convolves two PDFs
    pub const fn hadronic(&self) -> bool {
        self.hadronic
    }

    /// Metadata of the dataset the table belongs to
    pub const fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Row keys of the sigma table
    pub fn rows(&self) -> &[RowKey] {
        &self.rows
    }

    /// Flavour combination of every column
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Sigma table values
    pub const fn sigma(&self) -> &Array2<f64> {
        &self.sigma
    }

    /// Number of active flavour combinations
    pub fn nbasis(&self) -> usize {
        self.columns.len()
    }

    /// Flavour indices of the columns, flattened pairs for hadronic tables
    pub fn luminosity_mapping(&self) -> Vec<usize> {
        luminosity_mapping(&self.columns, self.hadronic)
    }

    /// Dense `(ndata, nbasis, nx)` or `(ndata, nbasis, nx, nx)` array
    ///
    /// Points without rows (skipped by a shift) are zero.
    pub fn dense_tensor(&self) -> ArrayD<f64> {
        let (ndata, nbasis, nx) = (self.ndata, self.nbasis(), self.xgrid.len());
        if self.hadronic {
            let mut tensor = Array4::<f64>::zeros((ndata, nbasis, nx, nx));
            for (key, row) in self.rows.iter().zip(self.sigma.rows()) {
                let x2 = key.x2.unwrap_or_default();
                for (b, &v) in row.iter().enumerate() {
                    tensor[[key.data, b, key.x1, x2]] = v;
                }
            }
            tensor.into_dyn()
        } else {
            let mut tensor = Array3::<f64>::zeros((ndata, nbasis, nx));
            for (key, row) in self.rows.iter().zip(self.sigma.rows()) {
                for (b, &v) in row.iter().enumerate() {
                    tensor[[key.data, b, key.x1]] = v;
                }
            }
            tensor.into_dyn()
        }
    }

    /// Sigma table as a `DataFrame`
    ///
    /// Index columns `data`, `x1` (and `x2` for hadronic tables) are followed
    /// by one column per flavour combination, named by its index.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let data: Vec<u64> = self.rows.iter().map(|k| k.data as u64).collect();
        let x1: Vec<u64> = self.rows.iter().map(|k| k.x1 as u64).collect();

        let mut columns: Vec<Column> = vec![
            Series::new("data".into(), data).into(),
            Series::new("x1".into(), x1).into(),
        ];
        if self.hadronic {
            let x2: Vec<u64> = self
                .rows
                .iter()
                .map(|k| k.x2.unwrap_or_default() as u64)
                .collect();
            columns.push(Series::new("x2".into(), x2).into());
        }
        for (j, flavour) in self.columns.iter().enumerate() {
            let values: Vec<f64> = self.sigma.column(j).to_vec();
            columns.push(Series::new(flavour.to_string().into(), values).into());
        }

        Ok(DataFrame::new(columns)?)
    }
}
