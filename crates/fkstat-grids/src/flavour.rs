//! Flavour basis and luminosity translation.
//!
//! Grids list their luminosities as pairs of particle codes. The FK table
//! columns are indices into a fixed 14-flavour evolution basis: the index of
//! the code for DIS-like grids, and `14 * i + j` for hadronic grids.

use crate::error::{GridError, Result};

/// Particle codes of the evolution basis, in column order
pub const FLAVOUR_BASIS: [i32; 14] = [
    22, 100, 21, 200, 203, 208, 215, 224, 235, 103, 108, 115, 124, 135,
];

/// Number of flavours in the basis
pub const FLAVOUR_SIZE: usize = FLAVOUR_BASIS.len();

/// File extension of grid files
pub const GRID_EXTENSION: &str = "pineappl.lz4";

/// Initial state code of a proton
pub const PROTON: &str = "2212";

/// Position of a particle code in the flavour basis
pub fn flavour_index(code: i32) -> Option<usize> {
    FLAVOUR_BASIS.iter().position(|&c| c == code)
}

fn side_columns(lumi: &[(i32, i32)], side: impl Fn(&(i32, i32)) -> i32) -> Result<Vec<usize>> {
    lumi.iter()
        .map(|pair| {
            let code = side(pair);
            flavour_index(code).ok_or(GridError::UnknownFlavour(code))
        })
        .collect()
}

/// Translate a grid luminosity list into FK table column indices
///
/// For hadronic grids every pair `(a, b)` maps to `14 * idx(a) + idx(b)`.
/// For DIS-like grids the proton may sit on either side: the second element
/// is used when every second element is a basis code, otherwise the first.
///
/// # Example
/// ```
/// use fkstat_grids::flavour::luminosity_to_columns;
///
/// let dis = luminosity_to_columns(&[(11, 100), (11, 21)], false).unwrap();
/// assert_eq!(dis, vec![1, 2]);
///
/// let had = luminosity_to_columns(&[(21, 21), (100, 22)], true).unwrap();
/// assert_eq!(had, vec![30, 14]);
/// ```
pub fn luminosity_to_columns(lumi: &[(i32, i32)], hadronic: bool) -> Result<Vec<usize>> {
    if hadronic {
        return lumi
            .iter()
            .map(|&(a, b)| {
                let i = flavour_index(a).ok_or(GridError::UnknownFlavour(a))?;
                let j = flavour_index(b).ok_or(GridError::UnknownFlavour(b))?;
                Ok(FLAVOUR_SIZE * i + j)
            })
            .collect();
    }

    let proton_second = lumi.iter().all(|&(_, b)| flavour_index(b).is_some());
    if proton_second {
        side_columns(lumi, |&(_, b)| b)
    } else {
        side_columns(lumi, |&(a, _)| a)
    }
}

/// Split a hadronic column index into its two flavour indices
pub const fn column_to_pair(column: usize) -> (usize, usize) {
    (column / FLAVOUR_SIZE, column % FLAVOUR_SIZE)
}

/// Flavour indices of a set of columns
///
/// Hadronic columns are expanded into their flattened `(i, j)` pairs.
pub fn luminosity_mapping(columns: &[usize], hadronic: bool) -> Vec<usize> {
    if hadronic {
        columns
            .iter()
            .flat_map(|&c| {
                let (i, j) = column_to_pair(c);
                [i, j]
            })
            .collect()
    } else {
        columns.to_vec()
    }
}
