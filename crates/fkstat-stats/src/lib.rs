#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bootstrap;
pub mod chi2;
pub mod covariance;
pub mod results;
pub mod theory;

// Re-export main types
pub use bootstrap::{bootstrap_apply, bootstrap_values};
pub use chi2::{
    Chi2Result, abs_chi2_data, all_chi2, all_chi2_theory, calc_chi2, calc_chi2_batch, calc_phi,
    central_chi2, central_chi2_theory,
};
pub use covariance::{
    CovMatrix, CovarianceError, PointKey, RegularizationConfig, regularize_covmat,
    regularize_fro_l2,
};
pub use results::{DataResult, Results, TheoryResult};
pub use theory::{ScaleVariation, TheoryError, scale_variation_covmat, total_covmat};
