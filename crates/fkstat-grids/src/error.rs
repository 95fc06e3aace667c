//! Error types for grid operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;

/// Errors that can occur while reading grids and dataset metadata.
#[derive(Debug, Error)]
pub enum GridError {
    /// A grid file referenced by the metadata does not exist
    #[error("Failed to find grid {}", .0.display())]
    GridNotFound(PathBuf),

    /// The dataset metadata file does not exist
    #[error("Dataset metadata not found: {}", .0.display())]
    MetadataNotFound(PathBuf),

    /// IO error while reading or writing a file
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The grid payload is truncated or malformed
    #[error("Corrupt grid: {0}")]
    Corrupt(String),

    /// The grid encoding cannot be read by this build
    #[error("Unsupported grid format: {0}")]
    UnsupportedFormat(String),

    /// The lz4 block could not be decompressed
    #[error("Decompression error: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),

    /// Metadata YAML could not be parsed
    #[error("Metadata parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Metadata is well formed but inconsistent
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Hadronic grid whose initial state is not a proton
    #[error("Cannot read a hadronic grid with no protons (initial state {0})")]
    UnsupportedHadron(String),

    /// Repetition flag on a group of more than one grid
    #[error("Repetition set for a group of grids at once: {0:?}")]
    RepetitionOnGroup(Vec<PathBuf>),

    /// Index shifts requested for an operation with more than one operand
    #[error("Wrong shifts for {0}: only single-operand datasets can be shifted")]
    MultipleShifts(String),

    /// Particle code not part of the flavour basis
    #[error("Unknown flavour code {0}")]
    UnknownFlavour(i32),

    /// Unknown operation tag
    #[error("Unknown operation {0}")]
    UnknownOperation(String),

    /// Array dimensions are inconsistent
    #[error("Shape error: {0}")]
    Shape(String),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl GridError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
