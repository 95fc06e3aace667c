//! Reading grid files into FK tables and datasets.
//!
//! Grids store `o = fk ⊗ f`, while the FK tables consumed downstream are
//! defined for `o = fk ⊗ xf`: every coefficient is divided by the x value of
//! its node (by `x1 * x2` for hadronic grids).

use crate::compat::CompatibilityFlags;
use crate::dataset::{DatasetRecord, FkTensor};
use crate::error::{GridError, Result};
use crate::flavour::luminosity_to_columns;
use crate::format::GridFile;
use crate::metadata::DatasetMetadata;
use crate::table::{FkTableData, RowKey, SigmaBlock, concat_blocks};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::path::{Path, PathBuf};

/// Read and concatenate one group of grid files
///
/// All grids of a group share the hadronic flag, scale and x-grid of the
/// first one. Each file contributes its data points after the previous
/// file's, optionally shifted; flavour columns are the union over files.
///
/// # Errors
/// * [`GridError::GridNotFound`] if a file is missing
/// * [`GridError::UnsupportedHadron`] for a non-proton hadronic grid
/// * [`GridError::RepetitionOnGroup`] / [`GridError::MultipleShifts`] for
///   inconsistent compatibility flags
pub fn read_fktable(metadata: &DatasetMetadata, group: &[PathBuf]) -> Result<FkTableData> {
    let grids = group
        .iter()
        .map(GridFile::read)
        .collect::<Result<Vec<_>>>()?;
    let first = grids
        .first()
        .ok_or_else(|| GridError::InvalidMetadata("empty group of grids".to_string()))?;

    let hadronic = first.check_proton()?;
    let q0 = first.q0();
    let xgrid = first.x_grid.clone();
    let nx = xgrid.len();

    let xdivision: Array1<f64> = if hadronic {
        Array1::from_iter(
            xgrid
                .iter()
                .flat_map(|&x1| xgrid.iter().map(move |&x2| x1 * x2)),
        )
    } else {
        xgrid.clone()
    };

    let flags = CompatibilityFlags::for_group(metadata, group)?;
    if flags.repetition || flags.norm.is_some() || flags.shifts.is_some() {
        debug!("Compatibility corrections for {}: {flags:?}", metadata.name());
    }

    let mut blocks = Vec::with_capacity(grids.len());
    let mut ndata = 0;
    for (i, (grid, path)) in grids.iter().zip(group).enumerate() {
        let columns = luminosity_to_columns(&grid.lumi, hadronic)?;
        let lf = columns.len();

        let mut n = grid.nbins();
        let rank = if hadronic { 4 } else { 3 };
        if grid.x_grid.len() != nx || grid.table.ndim() != rank {
            return Err(GridError::Shape(format!(
                "grid {} does not share the x-grid of the first grid of its group",
                path.display()
            )));
        }

        let mut raw = Array2::from_shape_vec(
            (n, lf * xdivision.len()),
            grid.table.iter().copied().collect(),
        )
        .map_err(|e| GridError::Shape(e.to_string()))?;

        // Remove the bin normalization
        raw /= &grid.bin_normalizations.view().insert_axis(Axis(1));

        if let Some(norm) = flags.norm_slice(ndata, n)? {
            raw *= &ArrayView1::from(norm).insert_axis(Axis(1));
        }
        if flags.repetition {
            raw = raw.slice_move(ndarray::s![0..1, ..]);
            n = 1;
        }
        ndata += flags.shift(i)?;

        let block = divide_by_x(&raw, lf, &xdivision) * metadata.conversion_factor;
        let rows = row_keys(ndata, n, nx, hadronic);
        blocks.push(SigmaBlock {
            rows,
            columns,
            values: block,
        });
        ndata += n;
    }

    let sigma = concat_blocks(blocks);
    info!(
        "Read {} grid(s) for {}: {} points, {} flavour columns, hadronic={hadronic}",
        grids.len(),
        metadata.name(),
        ndata,
        sigma.columns.len()
    );

    FkTableData::new(
        ndata,
        xgrid,
        q0,
        hadronic,
        metadata.clone(),
        sigma.rows,
        sigma.columns,
        sigma.values,
    )
}

/// Rearrange an `(n, lf * nx^k)` table into `(n * nx^k, lf)`, dividing by x
fn divide_by_x(raw: &Array2<f64>, lf: usize, xdivision: &Array1<f64>) -> Array2<f64> {
    let n = raw.nrows();
    let nxk = xdivision.len();
    Array2::from_shape_fn((n * nxk, lf), |(row, f)| {
        let (d, xi) = (row / nxk, row % nxk);
        raw[[d, f * nxk + xi]] / xdivision[xi]
    })
}

fn row_keys(start: usize, n: usize, nx: usize, hadronic: bool) -> Vec<RowKey> {
    (start..start + n)
        .flat_map(|data| {
            (0..nx).flat_map(move |x1| {
                let x2s: Vec<Option<usize>> = if hadronic {
                    (0..nx).map(Some).collect()
                } else {
                    vec![None]
                };
                x2s.into_iter().map(move |x2| RowKey { data, x1, x2 })
            })
        })
        .collect()
}

/// Extract the dense arrays of an FK table
pub fn fk_to_np(table: &FkTableData) -> FkTensor {
    FkTensor {
        ndata: table.ndata(),
        nbasis: table.nbasis(),
        basis: table.luminosity_mapping(),
        nx: table.xgrid().len(),
        xgrid: table.xgrid().clone(),
        fktable: table.dense_tensor(),
        hadronic: table.hadronic(),
    }
}

/// Load every operand of a dataset
///
/// `theory_path` is the theory folder containing `pineappls/`. `frac` is the
/// training fraction of the dataset.
pub fn load_dataset(
    name: &str,
    metadata_path: impl AsRef<Path>,
    theory_path: impl AsRef<Path>,
    frac: f64,
) -> Result<DatasetRecord> {
    let metadata = DatasetMetadata::load(metadata_path)?;
    let groups = metadata.resolve_grid_paths(theory_path)?;

    let fktables = groups
        .iter()
        .map(|group| read_fktable(&metadata, group).map(|t| fk_to_np(&t)))
        .collect::<Result<Vec<_>>>()?;

    DatasetRecord::new(name, fktables, metadata.operation, frac)
}
