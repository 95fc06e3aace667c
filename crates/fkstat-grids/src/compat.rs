//! Compatibility corrections for grids converted from the legacy format.
//!
//! Three metadata entries patch grids so that they agree with the data as
//! it was described by the predecessor tables: a per-point normalization, a
//! repetition flag (the grid holds one value that is broadcast), and shifts
//! of the data index between the files of a group.

use crate::error::{GridError, Result};
use crate::metadata::{DatasetMetadata, grid_file_name};
use std::path::{Path, PathBuf};

/// Corrections that apply to one group of grid files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompatibilityFlags {
    /// Normalization factor of every data point of the group
    pub norm: Option<Vec<f64>>,
    /// Keep only the first data point
    pub repetition: bool,
    /// Data index shift applied before each file of the group
    pub shifts: Option<Vec<usize>>,
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

impl CompatibilityFlags {
    /// Work out the corrections for the group of grids `group`
    ///
    /// # Errors
    /// * [`GridError::RepetitionOnGroup`] if a flagged group has more than one file
    /// * [`GridError::MultipleShifts`] if shifts are given for more than one operand
    pub fn for_group(metadata: &DatasetMetadata, group: &[PathBuf]) -> Result<Self> {
        let operands = &metadata.operands;

        // A group only learns its role in the operation by matching file names
        let mut norm = None;
        if let Some(norms) = metadata.apfelcomb_norm.as_ref().filter(|n| !n.is_empty()) {
            for (factors, members) in norms.iter().zip(operands) {
                let matches = members.len() == group.len()
                    && group.iter().zip(members).all(|(path, member)| {
                        file_name(path) == Some(grid_file_name(member).as_str())
                    });
                if matches {
                    norm = Some(factors.clone());
                }
            }
        }

        let mut repetition = false;
        if let Some(flags) = metadata.repetition_flag.as_ref().filter(|f| !f.is_empty()) {
            let targets: Vec<String> = operands
                .iter()
                .zip(flags)
                .filter(|&(_, &flagged)| flagged)
                .filter_map(|(members, _)| members.first().map(|m| grid_file_name(m)))
                .collect();
            repetition = group
                .first()
                .and_then(|p| file_name(p))
                .is_some_and(|name| targets.iter().any(|t| t == name));
            if repetition && group.len() > 1 {
                return Err(GridError::RepetitionOnGroup(group.to_vec()));
            }
        }

        let mut shifts = None;
        if let Some(all_shifts) = metadata.shifts.as_ref().filter(|s| !s.is_empty()) {
            if operands.len() > 1 {
                return Err(GridError::MultipleShifts(metadata.name().to_string()));
            }
            shifts = Some(
                all_shifts[0]
                    .iter()
                    .map(|shift| shift.unwrap_or(0))
                    .collect(),
            );
        }

        Ok(Self {
            norm,
            repetition,
            shifts,
        })
    }

    /// Shift to apply before the `index`-th file of the group
    pub fn shift(&self, index: usize) -> Result<usize> {
        match &self.shifts {
            None => Ok(0),
            Some(shifts) => shifts.get(index).copied().ok_or_else(|| {
                GridError::InvalidMetadata(format!(
                    "no shift given for grid {index} of the group ({} shifts)",
                    shifts.len()
                ))
            }),
        }
    }

    /// Normalization factors for the points `start..start + n`
    pub fn norm_slice(&self, start: usize, n: usize) -> Result<Option<&[f64]>> {
        match &self.norm {
            None => Ok(None),
            Some(norm) => norm.get(start..start + n).map(Some).ok_or_else(|| {
                GridError::InvalidMetadata(format!(
                    "normalization has {} factors, points {start}..{} requested",
                    norm.len(),
                    start + n
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|n| PathBuf::from(format!("/theory/pineappls/{n}.pineappl.lz4")))
            .collect()
    }

    fn metadata(yaml: &str) -> DatasetMetadata {
        DatasetMetadata::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_no_flags() {
        let meta = metadata("operands: [[A]]\n");
        let flags = CompatibilityFlags::for_group(&meta, &paths(&["A"])).unwrap();
        assert_eq!(flags, CompatibilityFlags::default());
        assert_eq!(flags.shift(5).unwrap(), 0);
    }

    #[test]
    fn test_norm_matches_operand() {
        let meta = metadata(
            "operands: [[A1, A2], [B]]\noperation: ratio\napfelcomb_norm: [[1.0, 2.0], [3.0]]\n",
        );
        let flags = CompatibilityFlags::for_group(&meta, &paths(&["B"])).unwrap();
        assert_eq!(flags.norm, Some(vec![3.0]));

        let flags = CompatibilityFlags::for_group(&meta, &paths(&["A1", "A2"])).unwrap();
        assert_eq!(flags.norm, Some(vec![1.0, 2.0]));
        assert_eq!(flags.norm_slice(1, 1).unwrap(), Some(&[2.0][..]));
        assert!(flags.norm_slice(1, 2).is_err());

        // Partial match of a group does not count
        let flags = CompatibilityFlags::for_group(&meta, &paths(&["A1"])).unwrap();
        assert_eq!(flags.norm, None);
    }

    #[test]
    fn test_repetition_flag() {
        let meta = metadata(
            "operands: [[NUM], [DEN]]\noperation: ratio\nrepetition_flag: [false, true]\n",
        );
        assert!(
            CompatibilityFlags::for_group(&meta, &paths(&["DEN"]))
                .unwrap()
                .repetition
        );
        assert!(
            !CompatibilityFlags::for_group(&meta, &paths(&["NUM"]))
                .unwrap()
                .repetition
        );
    }

    #[test]
    fn test_repetition_on_group_fails() {
        let meta = metadata("operands: [[A, B]]\nrepetition_flag: [true]\n");
        assert!(matches!(
            CompatibilityFlags::for_group(&meta, &paths(&["A", "B"])),
            Err(GridError::RepetitionOnGroup(_))
        ));
    }

    #[test]
    fn test_shifts() {
        let meta = metadata("operands: [[A, B]]\nshifts: [[null, 3]]\n");
        let flags = CompatibilityFlags::for_group(&meta, &paths(&["A", "B"])).unwrap();
        assert_eq!(flags.shifts, Some(vec![0, 3]));
        assert_eq!(flags.shift(1).unwrap(), 3);
        assert!(flags.shift(2).is_err());
    }

    #[test]
    fn test_shifts_with_several_operands() {
        let meta = metadata(
            "target_dataset: X\noperands: [[A], [B]]\noperation: add\nshifts: [[0], [1]]\n",
        );
        assert!(matches!(
            CompatibilityFlags::for_group(&meta, &paths(&["A"])),
            Err(GridError::MultipleShifts(name)) if name == "X"
        ));
    }
}
