//! Decoding of grids written by PineAPPL.

use crate::error::{GridError, Result};
use crate::format::{BIN_AXES, GridFile};
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use pineappl::fk_table::FkTable;
use pineappl::grid::Grid;
use std::collections::BTreeMap;

/// Decode a PineAPPL FK table, lz4-framed or not
pub(crate) fn decode(bytes: &[u8]) -> Result<GridFile> {
    let grid = Grid::read(bytes).map_err(|e| GridError::Corrupt(format!("PineAPPL grid: {e}")))?;

    let key_values: BTreeMap<String, String> = grid
        .key_values()
        .map(|kv| kv.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let bin_info = grid.bin_info();
    let nbins = bin_info.bins();
    let dimensions = bin_info.dimensions();
    let mut bin_left = Array2::zeros((nbins, BIN_AXES));
    for axis in 0..dimensions.min(BIN_AXES) {
        for (bin, edge) in bin_info.left(axis).into_iter().enumerate().take(nbins) {
            bin_left[[bin, axis]] = edge;
        }
    }
    let bin_normalizations = Array1::from(bin_info.normalizations());

    let fktable = FkTable::try_from(grid)
        .map_err(|e| GridError::Corrupt(format!("grid is not an FK table: {e}")))?;

    // The crate pins its own ndarray; copy through a flat buffer
    let table = fktable.table();
    let shape = table.shape().to_vec();
    let table = ArrayD::from_shape_vec(IxDyn(&shape), table.iter().copied().collect())
        .map_err(|e| GridError::Shape(e.to_string()))?;

    Ok(GridFile {
        key_values,
        muf2: fktable.muf2(),
        x_grid: Array1::from(fktable.x_grid()),
        bin_left,
        bin_normalizations,
        lumi: fktable.lumi(),
        table,
    })
}
