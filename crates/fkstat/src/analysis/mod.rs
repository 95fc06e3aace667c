//! Dataset-level analysis pipeline.
//!
//! For every dataset the pipeline takes the results computed with each
//! theory of a scale variation prescription (central theory first), builds
//! the theory covariance from their central predictions, adds the
//! experimental covariance and evaluates the χ² of the central theory.
//! All datasets are then combined: the theory covariance is built over the
//! concatenated predictions, so it correlates datasets, while the
//! experimental part stays block diagonal.

mod config;
mod predictions;

pub use config::AnalysisConfig;
pub use predictions::theory_result_from_grids;

use fkstat_output::{Chi2Row, Chi2Table};
use fkstat_stats::covariance::cholesky_lower;
use fkstat_stats::theory::block_diagonal_covmat;
use fkstat_stats::{
    Chi2Result, CovMatrix, CovarianceError, PointKey, Results, TheoryError, calc_chi2,
    calc_chi2_batch, scale_variation_covmat,
};
use log::{debug, info};
use ndarray::{Array1, Array2, Axis, concatenate};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the analysis pipeline
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Theory covariance construction failed
    #[error(transparent)]
    Theory(#[from] TheoryError),

    /// Covariance or χ² evaluation failed
    #[error(transparent)]
    Covariance(#[from] CovarianceError),

    /// Grid or FK table failure
    #[error(transparent)]
    Grid(#[from] fkstat_grids::GridError),

    /// A dataset does not provide one result per theory of the prescription
    #[error("Dataset {dataset} has {actual} theories, the prescription needs {expected}")]
    Prescription {
        /// Dataset name
        dataset: String,
        /// Theories required
        expected: usize,
        /// Theories supplied
        actual: usize,
    },

    /// Datasets with different numbers of replicas were combined
    #[error("Dataset {dataset} has {actual} replicas, expected {expected}")]
    ReplicaMismatch {
        /// Dataset name
        dataset: String,
        /// Replicas of the first dataset
        expected: usize,
        /// Replicas of this dataset
        actual: usize,
    },

    /// Nothing to analyse
    #[error("No datasets to analyse")]
    NoDatasets,

    /// Two datasets share a name
    #[error("Dataset {0} appears more than once")]
    DuplicateDataset(String),

    /// Configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed YAML configuration
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Malformed JSON configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Input of one dataset: its results for every theory, central theory first
#[derive(Debug, Clone)]
pub struct DatasetInput {
    /// Dataset name
    pub name: String,
    /// Experiment the dataset belongs to
    pub experiment: String,
    /// One result per theory of the prescription
    pub results: Vec<Results>,
}

impl DatasetInput {
    /// Create a dataset input
    pub fn new(
        name: impl Into<String>,
        experiment: impl Into<String>,
        results: Vec<Results>,
    ) -> Self {
        Self {
            name: name.into(),
            experiment: experiment.into(),
            results,
        }
    }

    fn central(&self) -> Result<&Results, AnalysisError> {
        self.results.first().ok_or_else(|| AnalysisError::Prescription {
            dataset: self.name.clone(),
            expected: 1,
            actual: 0,
        })
    }

    fn index(&self) -> Result<Vec<PointKey>, AnalysisError> {
        Ok(PointKey::range(
            &self.experiment,
            &self.name,
            self.central()?.data.len(),
        ))
    }
}

/// Covariance matrices and χ² of one dataset
#[derive(Debug, Clone)]
pub struct DatasetAnalysis {
    /// Dataset name
    pub name: String,
    /// Experiment the dataset belongs to
    pub experiment: String,
    /// Theory covariance from the scale variations
    pub theory_covmat: CovMatrix,
    /// Covariance entering the χ²
    pub total_covmat: CovMatrix,
    /// χ² of the central theory
    pub chi2: Chi2Result,
}

/// Outcome of an [`Analysis`] over several datasets
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Per-dataset results, in input order
    pub datasets: Vec<DatasetAnalysis>,
    /// Theory covariance of all datasets, correlated across datasets
    pub theory_covmat: CovMatrix,
    /// Covariance of all datasets entering the combined χ²
    pub total_covmat: CovMatrix,
    /// χ² of all datasets together
    pub combined: Chi2Result,
    /// χ² of every experiment, in order of first appearance
    pub experiments: Vec<(String, Chi2Result)>,
}

impl AnalysisReport {
    /// χ² table with one row per dataset and a total row
    pub fn dataset_table(&self) -> Chi2Table {
        let mut table = Chi2Table::new("Dataset χ²");
        for dataset in &self.datasets {
            table.push(Chi2Row::from_result(&dataset.name, &dataset.chi2));
        }
        table.set_total(Chi2Row::from_result("Total", &self.combined));
        table
    }

    /// χ² table with one row per experiment and a total row
    pub fn experiment_table(&self) -> Chi2Table {
        let mut table = Chi2Table::new("Experiment χ²");
        for (experiment, chi2) in &self.experiments {
            table.push(Chi2Row::from_result(experiment, chi2));
        }
        table.set_total(Chi2Row::from_result("Total", &self.combined));
        table
    }
}

/// χ² analysis with theory uncertainties
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    config: AnalysisConfig,
}

impl Analysis {
    /// Create an analysis with the given settings
    pub const fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Analysis settings
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn check_prescription(&self, input: &DatasetInput) -> Result<(), AnalysisError> {
        let expected = self.config.prescription.ntheories();
        if input.results.len() != expected {
            return Err(AnalysisError::Prescription {
                dataset: input.name.clone(),
                expected,
                actual: input.results.len(),
            });
        }
        Ok(())
    }

    /// Central predictions of every theory, concatenated over `inputs`
    fn predictions(&self, inputs: &[&DatasetInput]) -> Vec<Array1<f64>> {
        (0..self.config.prescription.ntheories())
            .map(|theory| {
                inputs
                    .iter()
                    .flat_map(|input| input.results[theory].theory.central_value().iter().copied())
                    .collect()
            })
            .collect()
    }

    /// Experimental plus (optionally) theory covariance, regularized if requested
    fn total(&self, expcov: &Array2<f64>, thcov: &Array2<f64>) -> Result<Array2<f64>, AnalysisError> {
        let total = if self.config.use_theory_covmat {
            expcov + thcov
        } else {
            expcov.clone()
        };
        match &self.config.regularization {
            Some(regularization) => Ok(regularization.apply(&total)?),
            None => Ok(total),
        }
    }

    /// Theory covariance, total covariance and χ² of one dataset
    pub fn analyse_dataset(&self, input: &DatasetInput) -> Result<DatasetAnalysis, AnalysisError> {
        self.check_prescription(input)?;
        let central = input.central()?;
        let index = input.index()?;

        let thcov = scale_variation_covmat(&self.predictions(&[input]))?;
        let total = self.total(central.data.covmat(), &thcov)?;

        let sqrtcov = cholesky_lower(&total)?;
        let chi2 = Chi2Result::new(
            calc_chi2_batch(&sqrtcov, &central.replica_diffs())?,
            calc_chi2(&sqrtcov, &central.central_diff())?,
            central.data.len(),
        );
        debug!(
            "{}: χ²/N = {:.4} over {} points",
            input.name,
            chi2.central_per_point(),
            chi2.ndata
        );

        Ok(DatasetAnalysis {
            name: input.name.clone(),
            experiment: input.experiment.clone(),
            theory_covmat: CovMatrix::new(index.clone(), thcov)?,
            total_covmat: CovMatrix::new(index, total)?,
            chi2,
        })
    }

    /// Analyse every dataset and all of them together
    ///
    /// Datasets are processed in parallel; the combined χ² uses the theory
    /// covariance of the concatenated predictions.
    pub fn run(&self, inputs: &[DatasetInput]) -> Result<AnalysisReport, AnalysisError> {
        if inputs.is_empty() {
            return Err(AnalysisError::NoDatasets);
        }
        let mut names = BTreeSet::new();
        for input in inputs {
            if !names.insert(input.name.as_str()) {
                return Err(AnalysisError::DuplicateDataset(input.name.clone()));
            }
        }

        let datasets = inputs
            .par_iter()
            .map(|input| self.analyse_dataset(input))
            .collect::<Result<Vec<_>, _>>()?;

        let refs: Vec<&DatasetInput> = inputs.iter().collect();
        let (theory_covmat, total_covmat, replica_diffs, central_diff) = self.combine(&refs)?;
        let combined = chi2_of(&total_covmat, &replica_diffs, &central_diff)?;
        info!(
            "Analysed {} datasets: combined χ²/N = {:.4} over {} points",
            datasets.len(),
            combined.central_per_point(),
            combined.ndata
        );

        let mut experiments: Vec<String> = Vec::new();
        for input in inputs {
            if !experiments.contains(&input.experiment) {
                experiments.push(input.experiment.clone());
            }
        }
        let experiments = experiments
            .into_par_iter()
            .map(|experiment| {
                let members: Vec<&DatasetInput> = inputs
                    .iter()
                    .filter(|input| input.experiment == experiment)
                    .collect();
                let (_, total, replicas, central) = self.combine(&members)?;
                Ok((experiment, chi2_of(&total, &replicas, &central)?))
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        Ok(AnalysisReport {
            datasets,
            theory_covmat,
            total_covmat,
            combined,
            experiments,
        })
    }

    /// Combined covariances and differences of a group of datasets
    #[allow(clippy::type_complexity)]
    fn combine(
        &self,
        inputs: &[&DatasetInput],
    ) -> Result<(CovMatrix, CovMatrix, Array2<f64>, Array1<f64>), AnalysisError> {
        let mut index = Vec::new();
        let mut expcovs = Vec::with_capacity(inputs.len());
        let mut replica_diffs = Vec::with_capacity(inputs.len());
        let mut central_diffs = Vec::with_capacity(inputs.len());
        let mut nreplicas = None;
        for input in inputs {
            self.check_prescription(input)?;
            let central = input.central()?;
            let nrep = central.theory.nreplicas();
            match nreplicas {
                None => nreplicas = Some(nrep),
                Some(expected) if expected != nrep => {
                    return Err(AnalysisError::ReplicaMismatch {
                        dataset: input.name.clone(),
                        expected,
                        actual: nrep,
                    });
                }
                Some(_) => {}
            }
            index.extend(input.index()?);
            expcovs.push(central.data.covmat().clone());
            replica_diffs.push(central.replica_diffs());
            central_diffs.push(central.central_diff());
        }

        let thcov = scale_variation_covmat(&self.predictions(inputs))?;
        let expcov = block_diagonal_covmat(&expcovs)?;
        let total = self.total(&expcov, &thcov)?;

        let replica_views: Vec<_> = replica_diffs.iter().map(|d| d.view()).collect();
        let central_views: Vec<_> = central_diffs.iter().map(|d| d.view()).collect();
        let shape_err = |e: ndarray::ShapeError| CovarianceError::InvalidParameter(e.to_string());
        let replicas = concatenate(Axis(0), &replica_views).map_err(shape_err)?;
        let central = concatenate(Axis(0), &central_views).map_err(shape_err)?;

        Ok((
            CovMatrix::new(index.clone(), thcov)?,
            CovMatrix::new(index, total)?,
            replicas,
            central,
        ))
    }
}

fn chi2_of(
    total: &CovMatrix,
    replica_diffs: &Array2<f64>,
    central_diff: &Array1<f64>,
) -> Result<Chi2Result, AnalysisError> {
    let sqrtcov = total.cholesky()?;
    Ok(Chi2Result::new(
        calc_chi2_batch(&sqrtcov, replica_diffs)?,
        calc_chi2(&sqrtcov, central_diff)?,
        central_diff.len(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fkstat_stats::{DataResult, ScaleVariation, TheoryResult};
    use ndarray::array;

    fn results(shift: f64) -> Results {
        let data = DataResult::new(array![1.0, 2.0], array![[0.04, 0.0], [0.0, 0.09]]).unwrap();
        let theory = TheoryResult::from_replicas(array![
            [1.0 + shift, 1.2 + shift],
            [2.1 + shift, 1.9 + shift]
        ])
        .unwrap();
        Results::new(data, theory).unwrap()
    }

    fn input(name: &str, experiment: &str) -> DatasetInput {
        DatasetInput::new(
            name,
            experiment,
            vec![results(0.0), results(0.1), results(-0.1)],
        )
    }

    #[test]
    fn test_dataset_chi2_includes_theory_covmat() {
        let analysis = Analysis::default();
        let out = analysis.analyse_dataset(&input("NMC", "DIS")).unwrap();

        // Variations of +-0.1 on both points: S = 0.01 everywhere
        assert_relative_eq!(out.theory_covmat.values()[[0, 1]], 0.01, epsilon = 1e-12);
        assert_relative_eq!(out.total_covmat.values()[[1, 1]], 0.10, epsilon = 1e-12);
        assert_eq!(out.chi2.ndata, 2);
        assert_eq!(out.chi2.replica_chi2.len(), 2);

        let experimental_only = Analysis::new(AnalysisConfig {
            use_theory_covmat: false,
            ..AnalysisConfig::default()
        })
        .analyse_dataset(&input("NMC", "DIS"))
        .unwrap();
        assert!(experimental_only.chi2.central_chi2 > out.chi2.central_chi2);
    }

    #[test]
    fn test_run_combines_datasets() {
        let inputs = vec![input("NMC", "DIS"), input("SLAC", "DIS"), input("E605", "DY")];
        let report = Analysis::default().run(&inputs).unwrap();

        assert_eq!(report.datasets.len(), 3);
        assert_eq!(report.total_covmat.len(), 6);
        // Datasets are correlated through the theory covariance only
        assert_relative_eq!(report.total_covmat.values()[[0, 2]], 0.01, epsilon = 1e-12);
        assert_eq!(report.experiments.len(), 2);
        assert_eq!(report.experiments[0].0, "DIS");
        assert_eq!(report.experiments[0].1.ndata, 4);

        let table = report.dataset_table();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.total.as_ref().map(|t| t.ndata), Some(6));
        assert_eq!(report.experiment_table().rows.len(), 2);
    }

    #[test]
    fn test_single_dataset_combined_matches_dataset() {
        let report = Analysis::default().run(&[input("NMC", "DIS")]).unwrap();
        assert_relative_eq!(
            report.combined.central_chi2,
            report.datasets[0].chi2.central_chi2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_wrong_number_of_theories() {
        let analysis = Analysis::new(
            AnalysisConfig::default().with_prescription(ScaleVariation::SevenPoint),
        );
        assert!(matches!(
            analysis.analyse_dataset(&input("NMC", "DIS")),
            Err(AnalysisError::Prescription { expected: 7, actual: 3, .. })
        ));
    }

    #[test]
    fn test_invalid_inputs() {
        let analysis = Analysis::default();
        assert!(matches!(analysis.run(&[]), Err(AnalysisError::NoDatasets)));
        assert!(matches!(
            analysis.run(&[input("A", "X"), input("A", "Y")]),
            Err(AnalysisError::DuplicateDataset(_))
        ));
    }

    #[test]
    fn test_regularized_total() {
        let analysis = Analysis::new(AnalysisConfig::default().with_regularization(1.5));
        let out = analysis.analyse_dataset(&input("NMC", "DIS")).unwrap();
        let values = out.total_covmat.values();
        assert_relative_eq!(values[[0, 1]], values[[1, 0]], epsilon = 1e-15);
    }
}
