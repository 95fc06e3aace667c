//! fkstat CLI binary.
//!
//! Inspects grids and datasets, regularizes covariance matrices, builds
//! scale variation theory covariances and evaluates χ² from plain CSV files.

mod matrix_io;

use clap::{Parser, Subcommand, ValueEnum};
use fkstat::grids::{DatasetMetadata, GridFile, load_dataset};
use fkstat::output::{Chi2Row, Chi2Table};
use fkstat::stats::covariance::{DEFAULT_COND_NUM_THRESHOLD, cholesky_lower, regularize_fro_l2};
use fkstat::stats::theory::abs_chi2_data_theory;
use fkstat::stats::{
    DataResult, Results, TheoryResult, abs_chi2_data, bootstrap_values, calc_phi, regularize_covmat,
    scale_variation_covmat, total_covmat,
};
use log::info;
use matrix_io::{emit_matrix, emit_vector, read_matrix, read_vector};
use ndarray::{Array2, Axis};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "fkstat")]
#[command(about = "fkstat: chi-squared and covariance analysis of PDF fits", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a grid file
    Grid {
        /// Grid file (.pineappl.lz4)
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Load a dataset from its metadata and grids
    Dataset {
        /// Dataset metadata file
        metadata: PathBuf,

        /// Theory folder containing pineappls/
        #[arg(long)]
        theory: PathBuf,

        /// Dataset name (defaults to the metadata target)
        #[arg(long)]
        name: Option<String>,

        /// Training fraction
        #[arg(long, default_value = "1.0")]
        frac: f64,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Regularize a covariance matrix
    Regularize {
        /// Covariance matrix (headerless CSV)
        covmat: PathBuf,

        /// Condition number threshold (eigen: default 500, fro-l2: required)
        #[arg(long)]
        threshold: Option<f64>,

        /// Regularization method
        #[arg(long, value_enum, default_value_t = Method::Eigen)]
        method: Method,

        /// Output file (stdout if absent)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Build the scale variation theory covariance matrix
    TheoryCovmat {
        /// Prediction vectors, central theory first (3 or 7 files)
        #[arg(required = true)]
        predictions: Vec<PathBuf>,

        /// Experimental covariance to add
        #[arg(long)]
        expcov: Option<PathBuf>,

        /// Output file (stdout if absent)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Bootstrap error of the replica mean, per bin
    Bootstrap {
        /// Replica predictions, one column per replica
        replicas: PathBuf,

        /// Number of bootstrap resamples
        #[arg(long, default_value = "100")]
        nresamples: usize,

        /// Random seed for reproducible resampling
        #[arg(long)]
        seed: Option<u64>,

        /// Output file (stdout if absent)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Compute the χ² of theory predictions against data
    Chi2 {
        /// Data central values
        #[arg(long)]
        data: PathBuf,

        /// Theory predictions: a vector, or one column per replica
        #[arg(long)]
        theory: PathBuf,

        /// Experimental covariance matrix
        #[arg(long)]
        covmat: PathBuf,

        /// Theory covariance matrix added to the experimental one
        #[arg(long)]
        theory_covmat: Option<PathBuf>,

        /// Name shown in the table
        #[arg(long, default_value = "dataset")]
        name: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Method {
    /// Clip the eigenvalues of the correlation matrix
    Eigen,
    /// Clip the singular values of the square root of the correlation matrix
    FroL2,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Grid { file, format } => grid_summary(&file, format),
        Commands::Dataset {
            metadata,
            theory,
            name,
            frac,
            format,
        } => dataset_summary(&metadata, &theory, name, frac, format),
        Commands::Regularize {
            covmat,
            threshold,
            method,
            out,
        } => regularize(&covmat, threshold, method, out.as_deref()),
        Commands::TheoryCovmat {
            predictions,
            expcov,
            out,
        } => theory_covmat(&predictions, expcov.as_deref(), out.as_deref()),
        Commands::Bootstrap {
            replicas,
            nresamples,
            seed,
            out,
        } => bootstrap(&replicas, nresamples, seed, out.as_deref()),
        Commands::Chi2 {
            data,
            theory,
            covmat,
            theory_covmat,
            name,
            format,
        } => chi2(
            &data,
            &theory,
            &covmat,
            theory_covmat.as_deref(),
            &name,
            format,
        ),
    }
}

fn banner(title: &str) {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║{:^62}║", title);
    println!("╚══════════════════════════════════════════════════════════════╝\n");
}

fn grid_summary(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let grid = GridFile::read(path)?;
    let hadronic = grid.check_proton()?;
    let q2_nodes = grid.bin_axis_nodes(0)?;
    let x_nodes = grid.bin_axis_nodes(1)?;

    match format {
        Format::Json => {
            let summary = json!({
                "file": path.display().to_string(),
                "hadronic": hadronic,
                "q0": grid.q0(),
                "bins": grid.nbins(),
                "luminosities": grid.lumi,
                "xgrid": grid.x_grid.to_vec(),
                "bin_axes": [q2_nodes, x_nodes],
                "metadata": grid.key_values,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Format::Text => {
            banner(&format!("GRID: {}", file_label(path)));
            println!("Hadronic:      {hadronic}");
            println!("Q0:            {:.6}", grid.q0());
            println!("Bins:          {}", grid.nbins());
            println!("x nodes:       {}", grid.x_grid.len());
            println!("Luminosities:  {}", grid.lumi.len());
            for (a, b) in &grid.lumi {
                println!("  ({a:>4}, {b:>4})");
            }
            println!("Bin axis 0:    {} distinct lower edges", q2_nodes.len());
            println!("Bin axis 1:    {} distinct lower edges", x_nodes.len());
        }
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn dataset_summary(
    metadata: &Path,
    theory: &Path,
    name: Option<String>,
    frac: f64,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = match name {
        Some(name) => name,
        None => DatasetMetadata::load(metadata)?.name().to_string(),
    };
    let record = load_dataset(&name, metadata, theory, frac)?;
    info!("Loaded {} with {} FK table(s)", record.name, record.fktables.len());

    match format {
        Format::Json => {
            let tables: Vec<_> = record
                .fktables
                .iter()
                .map(|t| {
                    json!({
                        "ndata": t.ndata,
                        "nbasis": t.nbasis,
                        "nx": t.nx,
                        "basis": t.basis,
                        "shape": t.fktable.shape(),
                    })
                })
                .collect();
            let summary = json!({
                "name": record.name,
                "operation": record.operation,
                "hadronic": record.hadronic,
                "ndata": record.ndata,
                "frac": record.frac,
                "fktables": tables,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Format::Text => {
            banner(&format!("DATASET: {}", record.name));
            println!("Operation:  {}", record.operation);
            println!("Hadronic:   {}", record.hadronic);
            println!("Points:     {}", record.ndata);
            println!("Fraction:   {}", record.frac);
            for (i, t) in record.fktables.iter().enumerate() {
                let xrows = if t.hadronic { t.nx * t.nx } else { t.nx };
                println!(
                    "  Table {i}: {} points, {} rows, {} flavour columns, shape {:?}",
                    t.ndata,
                    t.ndata * xrows,
                    t.nbasis,
                    t.fktable.shape()
                );
            }
        }
    }
    Ok(())
}

fn regularize(
    path: &Path,
    threshold: Option<f64>,
    method: Method,
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let covmat = read_matrix(path)?;
    let regularized = match method {
        Method::Eigen => {
            regularize_covmat(&covmat, threshold.unwrap_or(DEFAULT_COND_NUM_THRESHOLD))?
        }
        Method::FroL2 => {
            let threshold = threshold.ok_or("--threshold is required with --method fro-l2")?;
            let sqrtcov = regularize_fro_l2(&cholesky_lower(&covmat)?, threshold)?;
            sqrtcov.dot(&sqrtcov.t())
        }
    };
    info!(
        "Regularized a {}x{} matrix with {:?}",
        covmat.nrows(),
        covmat.ncols(),
        method
    );
    emit_matrix(out, &regularized)
}

fn theory_covmat(
    predictions: &[PathBuf],
    expcov: Option<&Path>,
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let predictions = predictions
        .iter()
        .map(|p| read_vector(p))
        .collect::<Result<Vec<_>, _>>()?;
    let covmat = match expcov {
        Some(path) => total_covmat(&predictions, &read_matrix(path)?)?,
        None => scale_variation_covmat(&predictions)?,
    };
    emit_matrix(out, &covmat)
}

fn bootstrap(
    path: &Path,
    nresamples: usize,
    seed: Option<u64>,
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let replicas = read_matrix(path)?;
    let resampled = bootstrap_values(&replicas, nresamples, seed)?;
    let error = resampled.std_axis(Axis(1), 0.0);
    info!(
        "Bootstrapped {} bins over {} replicas with {} resamples",
        replicas.nrows(),
        replicas.ncols(),
        nresamples
    );
    emit_vector(out, &error)
}

fn chi2(
    data: &Path,
    theory: &Path,
    covmat: &Path,
    theory_covmat: Option<&Path>,
    name: &str,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let central = read_vector(data)?;
    let mut predictions = read_matrix(theory)?;
    // A single row holds one prediction per point
    if predictions.nrows() == 1 && central.len() > 1 {
        predictions = predictions.reversed_axes();
    }
    let results = Results::new(
        DataResult::new(central, read_matrix(covmat)?)?,
        TheoryResult::from_replicas(predictions)?,
    )?;

    let result = match theory_covmat {
        Some(path) => {
            let thcov: Array2<f64> = read_matrix(path)?;
            let total = results.data.covmat() + &thcov;
            abs_chi2_data_theory(std::slice::from_ref(&results), &[total])?
                .pop()
                .ok_or("no χ² computed")?
        }
        None => abs_chi2_data(&results)?,
    };
    let phi = if results.theory.nreplicas() > 1 {
        Some(calc_phi(results.data.sqrtcovmat(), &results.replica_diffs())?)
    } else {
        None
    };

    let row = Chi2Row::from_result(name, &result);
    match format {
        Format::Json => {
            let summary = json!({
                "name": name,
                "ndata": result.ndata,
                "central_chi2": result.central_chi2,
                "replica_chi2": result.replica_chi2.to_vec(),
                "chi2_per_point": row.central_chi2,
                "phi": phi,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Format::Text => {
            let mut table = Chi2Table::new(if theory_covmat.is_some() {
                "χ² with theory covariance"
            } else {
                "χ² (experimental covariance)"
            });
            table.push(row);
            println!("{table}");
            if let Some(phi) = phi {
                println!("φ = {phi:.6}");
            }
        }
    }
    Ok(())
}
