//! Groups of datasets, such as the datasets of one experiment.
//!
//! A group file lists each dataset with its metadata file and training
//! fraction:
//!
//! ```yaml
//! name: NMC
//! datasets:
//!   - name: NMC_NC_NOTFIXED_P_EM-SIGMARED
//!     metadata: NMC_P/metadata.yaml
//!     frac: 0.75
//! ```
//!
//! Relative metadata paths are resolved against the directory of the group
//! file.

use crate::dataset::DatasetRecord;
use crate::error::{GridError, Result};
use crate::reader::load_dataset;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const fn default_frac() -> f64 {
    1.0
}

/// One dataset of a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Dataset name
    pub name: String,
    /// Path of the dataset metadata file
    pub metadata: PathBuf,
    /// Training fraction
    #[serde(default = "default_frac")]
    pub frac: f64,
}

impl DatasetSpec {
    /// Dataset fully used for training
    pub fn new(name: impl Into<String>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            metadata: metadata.into(),
            frac: default_frac(),
        }
    }

    /// Set the training fraction
    pub const fn with_frac(mut self, frac: f64) -> Self {
        self.frac = frac;
        self
    }

    /// Read the FK tables of this dataset from a theory folder
    pub fn read(&self, theory_path: impl AsRef<Path>) -> Result<DatasetRecord> {
        load_dataset(&self.name, &self.metadata, theory_path, self.frac)
    }
}

/// A named list of datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetGroup {
    /// Group name
    pub name: String,
    /// Datasets in the group
    pub datasets: Vec<DatasetSpec>,
}

impl DatasetGroup {
    /// Load a group file
    ///
    /// # Errors
    /// * [`GridError::MetadataNotFound`] if the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GridError::MetadataNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| GridError::io(path, e))?;
        let mut group: Self = serde_yaml::from_str(&text)?;
        if let Some(base) = path.parent() {
            for spec in &mut group.datasets {
                if spec.metadata.is_relative() {
                    spec.metadata = base.join(&spec.metadata);
                }
            }
        }
        Ok(group)
    }

    /// Read every dataset of the group, in order
    pub fn extract(&self, theory_path: impl AsRef<Path>) -> Result<Vec<DatasetRecord>> {
        let records = extract_group(&self.datasets, theory_path)?;
        info!("Read {} datasets of group {}", records.len(), self.name);
        Ok(records)
    }
}

/// Read the FK tables of every dataset in a group
///
/// Fails on the first dataset that cannot be read.
pub fn extract_group(
    datasets: &[DatasetSpec],
    theory_path: impl AsRef<Path>,
) -> Result<Vec<DatasetRecord>> {
    let theory_path = theory_path.as_ref();
    datasets.iter().map(|spec| spec.read(theory_path)).collect()
}
