#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod analysis;

// Re-export main types from sub-crates
pub use fkstat_grids as grids;
pub use fkstat_output as output;
pub use fkstat_stats as stats;

pub use analysis::{
    Analysis, AnalysisConfig, AnalysisError, AnalysisReport, DatasetAnalysis, DatasetInput,
    theory_result_from_grids,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
