//! Dataset metadata files.
//!
//! Each dataset is described by a YAML file listing the grids that make it
//! up and how to combine them:
//!
//! ```yaml
//! target_dataset: ATLAS_WCHARM
//! operands:
//!   - [ATLAS_WCHARM_WP]
//!   - [ATLAS_WCHARM_WM]
//! operation: add
//! conversion_factor: 1000.0
//! ```

use crate::error::{GridError, Result};
use crate::flavour::GRID_EXTENSION;
use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Subdirectory of a theory folder holding the grids
pub const GRIDS_FOLDER: &str = "pineappls";

const fn default_conversion_factor() -> f64 {
    1.0
}

/// Contents of a dataset metadata file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Name of the dataset the grids belong to
    #[serde(default)]
    pub target_dataset: Option<String>,

    /// Grid basenames, one list per operand
    pub operands: Vec<Vec<String>>,

    /// Operation combining the operands
    #[serde(default)]
    pub operation: Operation,

    /// Per-operand, per-point normalization factors
    #[serde(default)]
    pub apfelcomb_norm: Option<Vec<Vec<f64>>>,

    /// Per-operand flag: keep only the first point of the operand
    #[serde(default)]
    pub repetition_flag: Option<Vec<bool>>,

    /// Per-file shifts of the data index, null entries meaning no shift
    #[serde(default)]
    pub shifts: Option<Vec<Vec<Option<usize>>>>,

    /// Factor multiplying every coefficient
    #[serde(default = "default_conversion_factor")]
    pub conversion_factor: f64,
}

impl DatasetMetadata {
    /// Load a metadata file
    ///
    /// # Errors
    /// * [`GridError::MetadataNotFound`] if the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GridError::MetadataNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| GridError::io(path, e))?;
        Self::from_yaml(&text)
    }

    /// Parse metadata from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        let metadata: Self = serde_yaml::from_str(text)?;
        if metadata.operands.is_empty() {
            return Err(GridError::InvalidMetadata(
                "metadata lists no operands".to_string(),
            ));
        }
        Ok(metadata)
    }

    /// Name used in messages: the target dataset or the first grid
    pub fn name(&self) -> &str {
        self.target_dataset
            .as_deref()
            .or_else(|| self.operands.first().and_then(|o| o.first()).map(String::as_str))
            .unwrap_or("<unnamed>")
    }

    /// Paths of every grid, grouped by operand
    ///
    /// # Errors
    /// * [`GridError::GridNotFound`] naming the first missing grid
    pub fn resolve_grid_paths(&self, theory_path: impl AsRef<Path>) -> Result<Vec<Vec<PathBuf>>> {
        let folder = theory_path.as_ref().join(GRIDS_FOLDER);
        self.operands
            .iter()
            .map(|operand| {
                operand
                    .iter()
                    .map(|member| {
                        let path = folder.join(grid_file_name(member));
                        if path.exists() {
                            Ok(path)
                        } else {
                            Err(GridError::GridNotFound(path))
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// File name of the grid with the given basename
pub fn grid_file_name(member: &str) -> String {
    format!("{member}.{GRID_EXTENSION}")
}
