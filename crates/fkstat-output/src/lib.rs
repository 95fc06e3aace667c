#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod summary;

pub use export::{
    CovMatrixExport, ExportError, ExportFormat, Exporter, write_matrix_csv, write_vector_csv,
};
pub use summary::{Chi2Row, Chi2Table};
