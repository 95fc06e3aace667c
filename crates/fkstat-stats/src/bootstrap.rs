//! Bootstrap resampling over replicas
//!
//! `data` has the replicas on its last axis (`N_bins x N_replicas`). A
//! one-dimensional input is a single bin. A resample draws `N_replicas` replica indices with replacement; drawing
//! `nresamples` of them at once gives an index matrix of shape
//! `(N_replicas, nresamples)`.

use crate::covariance::CovarianceError;
use ndarray::{Array2, Array3, ArrayBase, ArrayView2, ArrayView3, Axis, Data, Dimension, Ix2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Draw a `(nreplicas, nresamples)` matrix of replica indices
///
/// With a seed the draw is reproducible.
pub fn bootstrap_indices(nreplicas: usize, nresamples: usize, seed: Option<u64>) -> Array2<usize> {
    let mut rng = rng_from_seed(seed);
    Array2::from_shape_simple_fn((nreplicas, nresamples), || rng.gen_range(0..nreplicas))
}

/// View `data` as `N_bins x N_replicas`, promoting a vector to a single row
fn as_bins<S, D>(data: &ArrayBase<S, D>) -> Result<ArrayView2<'_, f64>, CovarianceError>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let view = data.view().into_dyn();
    let view = match view.ndim() {
        1 => view.insert_axis(Axis(0)),
        2 => view,
        ndim => {
            return Err(CovarianceError::InvalidParameter(format!(
                "bootstrap data must have one or two axes, got {ndim}"
            )));
        }
    };
    view.into_dimensionality::<Ix2>()
        .map_err(|e| CovarianceError::InvalidParameter(e.to_string()))
}

/// Resampled data tensor of shape `(N_bins, N_replicas, nresamples)`
fn resample(data: &ArrayView2<'_, f64>, indices: &Array2<usize>) -> Array3<f64> {
    let nbins = data.nrows();
    let (nreplicas, nresamples) = indices.dim();
    Array3::from_shape_fn((nbins, nreplicas, nresamples), |(bin, rep, sample)| {
        data[[bin, indices[[rep, sample]]]]
    })
}

fn check_data(data: &ArrayView2<'_, f64>, nresamples: usize) -> Result<(), CovarianceError> {
    if data.ncols() == 0 {
        return Err(CovarianceError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if nresamples == 0 {
        return Err(CovarianceError::InvalidParameter(
            "nresamples must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Mean over replicas of every bootstrap resample
///
/// Returns an `N_bins x nresamples` array; a vector of replicas gives a
/// single row.
///
/// # Example
/// ```
/// use fkstat_stats::bootstrap::bootstrap_values;
/// use ndarray::array;
///
/// let data = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
/// let first = bootstrap_values(&data, 10, Some(42)).unwrap();
/// let second = bootstrap_values(&data, 10, Some(42)).unwrap();
/// assert_eq!(first.dim(), (2, 10));
/// assert_eq!(first, second);
/// ```
pub fn bootstrap_values<S, D>(
    data: &ArrayBase<S, D>,
    nresamples: usize,
    seed: Option<u64>,
) -> Result<Array2<f64>, CovarianceError>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    bootstrap_apply(data, nresamples, seed, |resampled| {
        resampled
            .mean_axis(Axis(1))
            .ok_or(CovarianceError::InsufficientData {
                required: 1,
                actual: 0,
            })
    })
}

/// Apply `func` to the `(N_bins, N_replicas, nresamples)` resampled tensor
pub fn bootstrap_apply<T, S, D, F>(
    data: &ArrayBase<S, D>,
    nresamples: usize,
    seed: Option<u64>,
    func: F,
) -> Result<T, CovarianceError>
where
    S: Data<Elem = f64>,
    D: Dimension,
    F: FnOnce(ArrayView3<'_, f64>) -> Result<T, CovarianceError>,
{
    let data = as_bins(data)?;
    check_data(&data, nresamples)?;
    let indices = bootstrap_indices(data.ncols(), nresamples, seed);
    let resampled = resample(&data, &indices);
    func(resampled.view())
}
