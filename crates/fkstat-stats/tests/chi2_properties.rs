//! Property tests for the χ² and covariance routines.

use fkstat_stats::bootstrap::bootstrap_values;
use fkstat_stats::chi2::calc_chi2;
use fkstat_stats::covariance::{
    cholesky_lower, fro_l2_cond, regularize_covmat, regularize_fro_l2, svd, symmetric_eigen,
};
use fkstat_stats::theory::scale_variation_covmat;
use ndarray::{Array1, Array2};
use proptest::prelude::*;

/// Well conditioned SPD matrix `A Aᵀ + n I`
fn spd_from(values: &[f64], n: usize) -> Array2<f64> {
    let a = Array2::from_shape_fn((n, n), |(i, j)| values[i * n + j]);
    a.dot(&a.t()) + Array2::<f64>::eye(n) * n as f64
}

/// `dᵀ C⁻¹ d` via Gauss-Jordan elimination of `[C | d]`
fn direct_chi2(cov: &Array2<f64>, d: &Array1<f64>) -> f64 {
    let n = d.len();
    let mut m = Array2::<f64>::zeros((n, n + 1));
    m.slice_mut(ndarray::s![.., ..n]).assign(cov);
    m.column_mut(n).assign(d);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&a, &b| m[[a, col]].abs().total_cmp(&m[[b, col]].abs()))
            .unwrap();
        for k in 0..=n {
            m.swap([col, k], [pivot_row, k]);
        }
        let pivot = m[[col, col]];
        for k in 0..=n {
            m[[col, k]] /= pivot;
        }
        for row in 0..n {
            if row != col {
                let factor = m[[row, col]];
                for k in 0..=n {
                    m[[row, k]] -= factor * m[[col, k]];
                }
            }
        }
    }

    let x = m.column(n).to_owned();
    d.dot(&x)
}

fn matrix_strategy() -> impl Strategy<Value = (usize, Vec<f64>, Vec<f64>)> {
    (1usize..7).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec(-2.0f64..2.0, n * n),
            prop::collection::vec(-5.0f64..5.0, n),
        )
    })
}

proptest! {
    /// Property: the Cholesky χ² matches the χ² from a direct inversion
    #[test]
    fn prop_chi2_matches_direct_inverse((n, values, diffs) in matrix_strategy()) {
        let cov = spd_from(&values, n);
        let d = Array1::from(diffs);

        let chi2 = calc_chi2(&cholesky_lower(&cov).unwrap(), &d).unwrap();
        let expected = direct_chi2(&cov, &d);

        prop_assert!(chi2 >= 0.0);
        prop_assert!(
            (chi2 - expected).abs() <= 1e-9 * expected.abs().max(1.0),
            "cholesky {} vs direct {}", chi2, expected
        );
    }

    /// Property: identical inputs give bit-identical χ²
    #[test]
    fn prop_chi2_reproducible((n, values, diffs) in matrix_strategy()) {
        let cov = spd_from(&values, n);
        let l = cholesky_lower(&cov).unwrap();
        let d = Array1::from(diffs);
        prop_assert_eq!(
            calc_chi2(&l, &d).unwrap().to_bits(),
            calc_chi2(&l, &d).unwrap().to_bits()
        );
    }

    /// Property: eigenvalue clipping leaves a well conditioned matrix alone
    #[test]
    fn prop_regularize_covmat_noop_within_threshold((n, values, _d) in matrix_strategy()) {
        let cov = spd_from(&values, n);
        let regularized = regularize_covmat(&cov, 1e12).unwrap();
        for (a, b) in regularized.iter().zip(cov.iter()) {
            prop_assert!((a - b).abs() <= 1e-9 * cov[[0, 0]].max(1.0));
        }
    }

    /// Property: eigenvalue clipping yields a symmetric matrix
    #[test]
    fn prop_regularize_covmat_symmetric((n, values, _d) in matrix_strategy()) {
        let cov = spd_from(&values, n);
        let regularized = regularize_covmat(&cov, 2.0).unwrap();
        prop_assert_eq!(&regularized, &regularized.t());
    }

    /// Property: the Frobenius-L2 regularization is a no-op below threshold
    #[test]
    fn prop_fro_l2_noop((n, values, _d) in matrix_strategy()) {
        let cov = spd_from(&values, n);
        let sqrtcov = cholesky_lower(&cov).unwrap();
        let rownorm = sqrtcov.map_axis(ndarray::Axis(1), |r| r.dot(&r).sqrt());
        let normalized = &sqrtcov / &rownorm.view().insert_axis(ndarray::Axis(1));
        let cond = fro_l2_cond(&svd(&normalized).unwrap().singular_values);
        let threshold = cond / (n as f64).sqrt() * 1.01;

        let out = regularize_fro_l2(&sqrtcov, threshold).unwrap();
        prop_assert_eq!(out, sqrtcov);
    }

    /// Property: scale variation covariance matrices are positive semi-definite
    #[test]
    fn prop_theory_covmat_psd(
        shifts in prop::collection::vec(prop::collection::vec(-1.0f64..1.0, 4), 2)
    ) {
        let central = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let mut predictions = vec![central.clone()];
        predictions.extend(shifts.into_iter().map(|s| &central + &Array1::from(s)));

        let cov = scale_variation_covmat(&predictions).unwrap();
        let eig = symmetric_eigen(&cov).unwrap();
        prop_assert!(eig.eigenvalues.iter().all(|&v| v >= -1e-12));
    }

    /// Property: seeded bootstrap reproduces its output
    #[test]
    fn prop_bootstrap_seeded(
        values in prop::collection::vec(-10.0f64..10.0, 12),
        seed in any::<u64>(),
        nresamples in 1usize..20
    ) {
        let data = Array2::from_shape_vec((3, 4), values).unwrap();
        let first = bootstrap_values(&data, nresamples, Some(seed)).unwrap();
        let second = bootstrap_values(&data, nresamples, Some(seed)).unwrap();
        prop_assert_eq!(first.dim(), (3, nresamples));
        prop_assert_eq!(first, second);
    }
}
