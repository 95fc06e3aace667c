#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod compat;
pub mod convolution;
pub mod dataset;
pub mod error;
pub mod flavour;
pub mod format;
pub mod group;
pub mod legacy;
pub mod metadata;
pub mod operation;
pub mod positivity;
#[cfg(feature = "pineappl")]
mod pineappl_grid;
pub mod reader;
pub mod table;

pub use convolution::{convolute, dataset_predictions};
pub use dataset::{DatasetRecord, FkTensor};
pub use error::{GridError, Result};
pub use format::GridFile;
pub use group::{DatasetGroup, DatasetSpec, extract_group};
pub use legacy::{LegacyFkTable, fk_parser};
pub use metadata::DatasetMetadata;
pub use operation::Operation;
pub use positivity::{PositivitySet, load_positivity, positivity_reader};
pub use reader::{fk_to_np, load_dataset, read_fktable};
pub use table::{FkTableData, RowKey};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
