//! Legacy uncompressed FK tables.
//!
//! The legacy format stores the coefficients of every data point as one
//! block of `dsz` values, of which only the first `tx * nonzero` are
//! meaningful: the tail of each block is alignment padding.

use crate::dataset::FkTensor;
use crate::error::{GridError, Result};
use ndarray::{Array1, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// In-memory legacy FK table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyFkTable {
    /// Number of data points
    pub ndata: usize,
    /// Number of active flavour combinations
    pub nonzero: usize,
    /// Number of x entries per combination, `nx^2` for hadronic tables
    pub tx: usize,
    /// Stride of a data point block, padding included
    pub dsz: usize,
    /// Flavour indices of the active combinations
    pub flmap: Vec<usize>,
    /// Interpolation nodes in x
    pub xgrid: Vec<f64>,
    /// Flat coefficients
    pub sigma: Vec<f64>,
    /// Whether the table convolves two PDFs
    pub hadronic: bool,
}

impl LegacyFkTable {
    /// Load a table stored as YAML or JSON
    ///
    /// # Errors
    /// * [`GridError::GridNotFound`] if the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GridError::GridNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| GridError::io(path, e))?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Padding at the end of every data point block
    pub fn padding(&self) -> Result<usize> {
        let used = self.tx * self.nonzero;
        self.dsz.checked_sub(used).ok_or_else(|| {
            GridError::Shape(format!(
                "block stride {} is smaller than its {used} coefficients",
                self.dsz
            ))
        })
    }
}

/// Build the dense tensor of a legacy table, removing the padding
///
/// # Errors
/// * [`GridError::Shape`] if the sizes recorded in the table are inconsistent
pub fn fk_parser(fk: &LegacyFkTable) -> Result<FkTensor> {
    let pad = fk.padding()?;

    let nx = if fk.hadronic {
        let root = fk.tx.isqrt();
        if root * root != fk.tx {
            return Err(GridError::Shape(format!(
                "hadronic table with {} x entries, not a square",
                fk.tx
            )));
        }
        root
    } else {
        fk.tx
    };
    if fk.xgrid.len() != nx {
        return Err(GridError::Shape(format!(
            "x-grid has {} nodes, the table expects {nx}",
            fk.xgrid.len()
        )));
    }

    let values: Vec<f64> = if pad > 0 {
        // Only complete blocks carry padding
        let complete = fk.sigma.len() / fk.dsz;
        let keep = fk.dsz - pad;
        fk.sigma
            .iter()
            .enumerate()
            .filter(|&(k, _)| k / fk.dsz >= complete || k % fk.dsz < keep)
            .map(|(_, &v)| v)
            .collect()
    } else {
        fk.sigma.clone()
    };

    let shape: Vec<usize> = if fk.hadronic {
        vec![fk.ndata, fk.nonzero, nx, nx]
    } else {
        vec![fk.ndata, fk.nonzero, nx]
    };
    let fktable = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
        GridError::Shape(format!(
            "cannot reshape legacy table into {shape:?} after removing padding: {e}"
        ))
    })?;

    let tensor = FkTensor {
        ndata: fk.ndata,
        nbasis: fk.nonzero,
        basis: fk.flmap.clone(),
        nx,
        xgrid: Array1::from(fk.xgrid.clone()),
        fktable,
        hadronic: fk.hadronic,
    };
    tensor.validate()?;
    Ok(tensor)
}
