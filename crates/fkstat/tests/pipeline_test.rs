//! Grids on disk through predictions to the χ² report.

use approx::assert_relative_eq;
use fkstat::grids::format::{INITIAL_STATE_1, INITIAL_STATE_2};
use fkstat::grids::metadata::{GRIDS_FOLDER, grid_file_name};
use fkstat::grids::{GridFile, flavour::FLAVOUR_SIZE, load_dataset};
use fkstat::output::{ExportFormat, Exporter};
use fkstat::stats::{DataResult, Results};
use fkstat::{Analysis, AnalysisConfig, DatasetInput, theory_result_from_grids};
use ndarray::{Array1, Array2, Array3, array};
use std::collections::BTreeMap;
use std::path::Path;

const XGRID: [f64; 3] = [0.01, 0.1, 0.5];

/// DIS grid with gluon luminosity, coefficient `scale * x` everywhere
fn write_grid(theory: &Path, name: &str, scale: f64) {
    let folder = theory.join(GRIDS_FOLDER);
    std::fs::create_dir_all(&folder).unwrap();
    let grid = GridFile {
        key_values: BTreeMap::from([
            (INITIAL_STATE_1.to_string(), "11".to_string()),
            (INITIAL_STATE_2.to_string(), "2212".to_string()),
        ]),
        muf2: 1.0,
        x_grid: Array1::from(XGRID.to_vec()),
        bin_left: Array2::zeros((2, 2)),
        bin_normalizations: Array1::ones(2),
        lumi: vec![(11, 21)],
        table: Array3::from_shape_fn((2, 1, 3), |(d, _, x)| scale * (d + 1) as f64 * XGRID[x])
            .into_dyn(),
    };
    grid.write(folder.join(grid_file_name(name))).unwrap();
}

#[test]
fn test_grids_to_chi2_report() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = dir.path().join("metadata.yaml");
    std::fs::write(&metadata, "target_dataset: TOY\noperands: [[TOY]]\n").unwrap();

    // Central theory and two scale variations
    let scales = [1.0, 1.1, 0.9];
    let replicas: Vec<Array2<f64>> = [0.9, 1.1]
        .iter()
        .map(|&g| Array2::from_elem((FLAVOUR_SIZE, XGRID.len()), g))
        .collect();
    let data = DataResult::new(array![3.0, 6.0], array![[0.1, 0.0], [0.0, 0.4]]).unwrap();

    let results: Vec<Results> = scales
        .iter()
        .enumerate()
        .map(|(i, &scale)| {
            let theory = dir.path().join(format!("theory_{i}"));
            write_grid(&theory, "TOY", scale);
            let record = load_dataset("TOY", &metadata, &theory, 1.0).unwrap();
            let predictions = theory_result_from_grids(&record, &replicas).unwrap();
            Results::new(data.clone(), predictions).unwrap()
        })
        .collect();

    // Division by x leaves `scale * (d + 1)` per node, summed over three nodes
    assert_relative_eq!(
        results[0].theory.central_value()[1],
        6.0,
        epsilon = 1e-9
    );

    let report = Analysis::new(AnalysisConfig::default())
        .run(&[DatasetInput::new("TOY", "DIS", results)])
        .unwrap();
    assert_eq!(report.combined.ndata, 2);
    assert_eq!(report.combined.replica_chi2.len(), 2);
    // Central theory matches the data exactly
    assert_relative_eq!(report.combined.central_chi2, 0.0, epsilon = 1e-12);
    assert!(report.combined.replica_chi2.iter().all(|&c| c > 0.0));

    let csv = report
        .dataset_table()
        .export_to_string(ExportFormat::Csv)
        .unwrap();
    assert!(csv.contains("TOY,2"));
    assert!(csv.contains("Total,2"));
}
