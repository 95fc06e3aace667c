//! Dense linear algebra for covariance matrices
//!
//! This module provides the factorizations the chi² and regularization
//! routines are built on: Cholesky factorization, forward substitution on
//! lower triangular systems, a cyclic Jacobi eigensolver for symmetric
//! matrices and a one-sided Jacobi singular value decomposition.
//!
//! None of these routines ever forms an explicit inverse.

use super::CovarianceError;
use ndarray::{Array1, Array2, ArrayBase, ArrayViewMut2, Axis, Data, Ix1, Ix2};

/// Maximum number of Jacobi sweeps before giving up on further refinement
const MAX_SWEEPS: usize = 100;

/// Relative off-diagonal tolerance used to stop the Jacobi iterations
const JACOBI_TOLERANCE: f64 = 1e-15;

/// Result of a symmetric eigenvalue decomposition
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues (sorted in ascending order)
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors (columns are eigenvectors)
    pub eigenvectors: Array2<f64>,
}

/// Result of a thin singular value decomposition `A = U diag(s) Vᵀ`
///
/// For an `m x n` input with `k = min(m, n)`, `u` is `m x k`, `singular_values`
/// has length `k` and `vt` is `k x n`.
#[derive(Debug, Clone)]
pub struct Svd {
    /// Left singular vectors (orthonormal columns)
    pub u: Array2<f64>,
    /// Singular values (sorted in descending order)
    pub singular_values: Array1<f64>,
    /// Right singular vectors, transposed (orthonormal rows)
    pub vt: Array2<f64>,
}

/// Return the dimension of a square matrix, or an error naming its shape
pub fn check_square<S>(matrix: &ArrayBase<S, Ix2>) -> Result<usize, CovarianceError>
where
    S: Data<Elem = f64>,
{
    let (rows, cols) = matrix.dim();
    if rows == cols {
        Ok(rows)
    } else {
        Err(CovarianceError::NotSquare { rows, cols })
    }
}

/// Lower triangular Cholesky factor `L` with `L Lᵀ = matrix`
///
/// Only the lower triangle of `matrix` is read.
///
/// # Errors
/// * [`CovarianceError::NotPositiveDefinite`] if a pivot is not strictly positive
pub fn cholesky_lower<S>(matrix: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, CovarianceError>
where
    S: Data<Elem = f64>,
{
    let n = check_square(matrix)?;
    let mut l = Array2::<f64>::zeros((n, n));

    for j in 0..n {
        let mut pivot = matrix[[j, j]];
        for k in 0..j {
            pivot -= l[[j, k]] * l[[j, k]];
        }
        if !pivot.is_finite() || pivot <= 0.0 {
            return Err(CovarianceError::NotPositiveDefinite);
        }
        let ljj = pivot.sqrt();
        l[[j, j]] = ljj;

        for i in (j + 1)..n {
            let mut sum = matrix[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / ljj;
        }
    }

    Ok(l)
}

/// Check whether a symmetric matrix admits a Cholesky factorization
pub fn is_positive_definite<S>(matrix: &ArrayBase<S, Ix2>) -> bool
where
    S: Data<Elem = f64>,
{
    cholesky_lower(matrix).is_ok()
}

/// Solve `L X = B` by forward substitution
///
/// Only the lower triangle of `lower` is read; whatever sits above the
/// diagonal is ignored.
///
/// # Errors
/// * [`CovarianceError::Singular`] if a diagonal entry of `lower` is zero
/// * [`CovarianceError::DimensionMismatch`] if `rhs` has the wrong number of rows
pub fn solve_lower_triangular<S1, S2>(
    lower: &ArrayBase<S1, Ix2>,
    rhs: &ArrayBase<S2, Ix2>,
) -> Result<Array2<f64>, CovarianceError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let n = check_square(lower)?;
    if rhs.nrows() != n {
        return Err(CovarianceError::DimensionMismatch {
            expected: n,
            actual: rhs.nrows(),
        });
    }

    let mut x = rhs.to_owned();
    for i in 0..n {
        let pivot = lower[[i, i]];
        if pivot == 0.0 {
            return Err(CovarianceError::Singular { index: i });
        }
        let (solved, mut rest) = x.view_mut().split_at(Axis(0), i);
        let mut row = rest.row_mut(0);
        for k in 0..i {
            let lik = lower[[i, k]];
            if lik != 0.0 {
                row.scaled_add(-lik, &solved.row(k));
            }
        }
        row /= pivot;
    }

    Ok(x)
}

/// Solve `L x = b` for a single right hand side
pub fn solve_lower_triangular_vec<S1, S2>(
    lower: &ArrayBase<S1, Ix2>,
    rhs: &ArrayBase<S2, Ix1>,
) -> Result<Array1<f64>, CovarianceError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let column = rhs.view().insert_axis(Axis(1));
    let solved = solve_lower_triangular(lower, &column)?;
    Ok(solved.index_axis_move(Axis(1), 0))
}

/// Cyclic Jacobi eigendecomposition of a symmetric matrix
///
/// Eigenvalues are returned in ascending order, matching the convention of
/// LAPACK's symmetric drivers.
pub fn symmetric_eigen<S>(matrix: &ArrayBase<S, Ix2>) -> Result<EigenDecomposition, CovarianceError>
where
    S: Data<Elem = f64>,
{
    let n = check_square(matrix)?;

    let mut a = matrix.to_owned();
    let mut v = Array2::<f64>::eye(n);
    let scale = frobenius_norm(&a);

    for _sweep in 0..MAX_SWEEPS {
        if off_diagonal_norm(&a) <= JACOBI_TOLERANCE * scale {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                if a[[p, q]] == 0.0 {
                    continue;
                }
                let (c, s) = plane_rotation(a[[p, p]], a[[q, q]], a[[p, q]]);
                rotate_columns(a.view_mut(), p, q, c, s);
                rotate_columns(a.view_mut().reversed_axes(), p, q, c, s);
                a[[p, q]] = 0.0;
                a[[q, p]] = 0.0;
                rotate_columns(v.view_mut(), p, q, c, s);
            }
        }
    }

    let eigenvalues: Array1<f64> = a.diag().to_owned();

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&i, &j| eigenvalues[i].total_cmp(&eigenvalues[j]));

    Ok(EigenDecomposition {
        eigenvalues: indices.iter().map(|&i| eigenvalues[i]).collect(),
        eigenvectors: v.select(Axis(1), &indices),
    })
}

/// Rotation `(c, s)` of the `(p, q)` plane diagonalizing `[[alpha, gamma], [gamma, beta]]`
///
/// Picks the smaller of the two angles (`|θ| <= π/4`). `gamma` must be nonzero.
fn plane_rotation(alpha: f64, beta: f64, gamma: f64) -> (f64, f64) {
    let zeta = (beta - alpha) / (2.0 * gamma);
    let t = zeta.signum() / (zeta.abs() + zeta.hypot(1.0));
    let c = t.hypot(1.0).recip();
    (c, c * t)
}

fn frobenius_norm(matrix: &Array2<f64>) -> f64 {
    matrix.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

fn off_diagonal_norm(matrix: &Array2<f64>) -> f64 {
    let mut sum = 0.0;
    for ((i, j), &x) in matrix.indexed_iter() {
        if i != j {
            sum += x * x;
        }
    }
    sum.sqrt()
}

/// Reconstruct a matrix from eigenvalues and eigenvectors
///
/// Computes: M = V * Λ * V^T
pub fn reconstruct_from_eigen(
    eigenvalues: &Array1<f64>,
    eigenvectors: &Array2<f64>,
) -> Result<Array2<f64>, CovarianceError> {
    let n = eigenvalues.len();
    if eigenvectors.nrows() != n || eigenvectors.ncols() != n {
        return Err(CovarianceError::DimensionMismatch {
            expected: n,
            actual: eigenvectors.nrows(),
        });
    }

    // Scaling the columns of V by Λ
    let v_lambda = eigenvectors * eigenvalues;
    Ok(v_lambda.dot(&eigenvectors.t()))
}

/// Ratio of the largest to the smallest eigenvalue of a symmetric matrix
///
/// Returns infinity when the smallest eigenvalue is not positive.
pub fn condition_number<S>(matrix: &ArrayBase<S, Ix2>) -> Result<f64, CovarianceError>
where
    S: Data<Elem = f64>,
{
    let decomp = symmetric_eigen(matrix)?;
    let n = decomp.eigenvalues.len();
    if n == 0 {
        return Err(CovarianceError::InvalidParameter(
            "condition number of an empty matrix".to_string(),
        ));
    }
    let min_eig = decomp.eigenvalues[0];
    let max_eig = decomp.eigenvalues[n - 1];

    if min_eig <= 0.0 {
        Ok(f64::INFINITY)
    } else {
        Ok(max_eig / min_eig)
    }
}

/// Thin singular value decomposition by one-sided Jacobi rotations
///
/// Left singular vectors belonging to vanishing singular values are
/// completed to an orthonormal set, so `u` always has orthonormal columns.
pub fn svd<S>(matrix: &ArrayBase<S, Ix2>) -> Result<Svd, CovarianceError>
where
    S: Data<Elem = f64>,
{
    let (rows, cols) = matrix.dim();
    if rows == 0 || cols == 0 {
        return Err(CovarianceError::InvalidParameter(format!(
            "cannot decompose a {rows}x{cols} matrix"
        )));
    }
    if matrix.iter().any(|x| !x.is_finite()) {
        return Err(CovarianceError::InvalidParameter(
            "matrix contains non-finite entries".to_string(),
        ));
    }

    if rows >= cols {
        let (u, singular_values, v) = one_sided_jacobi(matrix.to_owned());
        Ok(Svd {
            u,
            singular_values,
            vt: v.reversed_axes(),
        })
    } else {
        // Decompose the transpose: Aᵀ = W S Vᵀ  =>  A = V S Wᵀ
        let (w, singular_values, v) = one_sided_jacobi(matrix.t().to_owned());
        Ok(Svd {
            u: v,
            singular_values,
            vt: w.reversed_axes(),
        })
    }
}

/// Orthogonalize the columns of a tall matrix
///
/// Returns `(U, s, V)` with `W = U diag(s) Vᵀ`, sorted by descending `s`.
fn one_sided_jacobi(mut w: Array2<f64>) -> (Array2<f64>, Array1<f64>, Array2<f64>) {
    let k = w.ncols();
    let mut v = Array2::<f64>::eye(k);

    for _sweep in 0..MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..k {
            for q in (p + 1)..k {
                let alpha = w.column(p).dot(&w.column(p));
                let beta = w.column(q).dot(&w.column(q));
                let gamma = w.column(p).dot(&w.column(q));

                if gamma == 0.0 || gamma.abs() <= f64::EPSILON * (alpha * beta).sqrt() {
                    continue;
                }
                rotated = true;

                let (c, s) = plane_rotation(alpha, beta, gamma);
                rotate_columns(w.view_mut(), p, q, c, s);
                rotate_columns(v.view_mut(), p, q, c, s);
            }
        }
        if !rotated {
            break;
        }
    }

    let norms: Vec<f64> = w.columns().into_iter().map(|c| c.dot(&c).sqrt()).collect();
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&i, &j| norms[j].total_cmp(&norms[i]));

    let largest = order.first().map_or(0.0, |&i| norms[i]);
    let negligible = largest * f64::EPSILON * (w.nrows().max(k) as f64);

    let mut u = Array2::<f64>::zeros((w.nrows(), k));
    let mut deficient = Vec::new();
    for (target, &source) in order.iter().enumerate() {
        if norms[source] > negligible {
            u.column_mut(target).assign(&(&w.column(source) / norms[source]));
        } else {
            deficient.push(target);
        }
    }
    complete_orthonormal_columns(&mut u, &deficient);

    let singular_values = order.iter().map(|&i| norms[i]).collect();
    (u, singular_values, v.select(Axis(1), &order))
}

/// `M ← M J` for the rotation `J` of the `(p, q)` plane; pass a transposed view to rotate rows
fn rotate_columns(mut m: ArrayViewMut2<'_, f64>, p: usize, q: usize, c: f64, s: f64) {
    for mut row in m.rows_mut() {
        let (mp, mq) = (row[p], row[q]);
        row[p] = c * mp - s * mq;
        row[q] = s * mp + c * mq;
    }
}

/// Fill the listed (zero) columns of `u` with unit vectors orthogonal to the rest
fn complete_orthonormal_columns(u: &mut Array2<f64>, deficient: &[usize]) {
    let rows = u.nrows();
    let mut filled: Vec<usize> = (0..u.ncols()).filter(|c| !deficient.contains(c)).collect();

    let mut candidate = 0;
    for &target in deficient {
        while candidate < rows {
            let mut basis = Array1::<f64>::zeros(rows);
            basis[candidate] = 1.0;
            candidate += 1;

            // Two passes of Gram-Schmidt keep the result orthogonal to working precision
            for _ in 0..2 {
                for &c in &filled {
                    let proj = u.column(c).dot(&basis);
                    basis.scaled_add(-proj, &u.column(c));
                }
            }
            let norm = basis.dot(&basis).sqrt();
            if norm > 0.5 {
                u.column_mut(target).assign(&(basis / norm));
                filled.push(target);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn spd_matrix() -> Array2<f64> {
        array![[4.0, 2.0, 0.6], [2.0, 5.0, 1.5], [0.6, 1.5, 3.0]]
    }

    #[test]
    fn test_cholesky_reconstructs_matrix() {
        let matrix = spd_matrix();
        let l = cholesky_lower(&matrix).unwrap();

        let reconstructed = l.dot(&l.t());
        for (a, b) in reconstructed.iter().zip(matrix.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
        assert_eq!(l[[0, 1]], 0.0);
        assert_eq!(l[[0, 2]], 0.0);
        assert_eq!(l[[1, 2]], 0.0);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let matrix = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            cholesky_lower(&matrix),
            Err(CovarianceError::NotPositiveDefinite)
        ));
        assert!(!is_positive_definite(&matrix));
    }

    #[test]
    fn test_cholesky_rejects_rectangular() {
        let matrix = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            cholesky_lower(&matrix),
            Err(CovarianceError::NotSquare { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn test_forward_substitution_ignores_upper_triangle() {
        let clean = array![[2.0, 0.0], [1.0, 4.0]];
        let garbage = array![[2.0, 1e300], [1.0, 4.0]];
        let b = array![2.0, 9.0];

        let x_clean = solve_lower_triangular_vec(&clean, &b).unwrap();
        let x_garbage = solve_lower_triangular_vec(&garbage, &b).unwrap();

        assert_abs_diff_eq!(x_clean[0], 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(x_clean[1], 2.0, epsilon = 1e-14);
        assert_eq!(x_clean, x_garbage);
    }

    #[test]
    fn test_forward_substitution_singular() {
        let lower = array![[1.0, 0.0], [1.0, 0.0]];
        let b = array![1.0, 1.0];
        assert!(matches!(
            solve_lower_triangular_vec(&lower, &b),
            Err(CovarianceError::Singular { index: 1 })
        ));
    }

    #[test]
    fn test_forward_substitution_dimension_mismatch() {
        let lower = Array2::<f64>::eye(3);
        let b = array![1.0, 1.0];
        assert!(matches!(
            solve_lower_triangular_vec(&lower, &b),
            Err(CovarianceError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_symmetric_eigen_ascending() {
        let matrix = array![[2.0, 1.0, 1.0], [1.0, 2.0, 1.0], [1.0, 1.0, 2.0]];
        let decomp = symmetric_eigen(&matrix).unwrap();

        assert_abs_diff_eq!(decomp.eigenvalues[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(decomp.eigenvalues[1], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(decomp.eigenvalues[2], 4.0, epsilon = 1e-10);

        let reconstructed =
            reconstruct_from_eigen(&decomp.eigenvalues, &decomp.eigenvectors).unwrap();
        for (a, b) in reconstructed.iter().zip(matrix.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_plane_rotation_zeroes_off_diagonal() {
        for (alpha, beta, gamma) in [(2.0, 2.0, 1.0), (1.0, 3.0, -0.5), (1e8, -1e8, 1e-6)] {
            let mut block = array![[alpha, gamma], [gamma, beta]];
            let (c, s) = plane_rotation(alpha, beta, gamma);
            assert_abs_diff_eq!(c * c + s * s, 1.0, epsilon = 1e-15);
            assert!(s.abs() <= c);

            rotate_columns(block.view_mut(), 0, 1, c, s);
            rotate_columns(block.view_mut().reversed_axes(), 0, 1, c, s);
            let scale = alpha.abs().max(beta.abs());
            assert_abs_diff_eq!(block[[0, 1]], 0.0, epsilon = 1e-14 * scale);
            assert_abs_diff_eq!(block[[0, 0]] + block[[1, 1]], alpha + beta, epsilon = 1e-12 * scale);
        }
    }

    #[test]
    fn test_symmetric_eigen_tiny_scale() {
        // Cross-section covariances routinely live many orders below unity
        let matrix = spd_matrix() * 1e-24;
        let decomp = symmetric_eigen(&matrix).unwrap();
        let reconstructed =
            reconstruct_from_eigen(&decomp.eigenvalues, &decomp.eigenvectors).unwrap();
        for (a, b) in reconstructed.iter().zip(matrix.iter()) {
            assert_abs_diff_eq!(a / 1e-24, b / 1e-24, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_condition_number() {
        let matrix = Array2::<f64>::eye(3);
        assert_abs_diff_eq!(condition_number(&matrix).unwrap(), 1.0, epsilon = 1e-12);

        let mut matrix2 = Array2::<f64>::eye(3);
        matrix2[[0, 0]] = 1000.0;
        matrix2[[2, 2]] = 0.001;
        assert_abs_diff_eq!(condition_number(&matrix2).unwrap(), 1e6, epsilon = 1e-3);
    }

    fn assert_svd_reconstructs(matrix: &Array2<f64>) {
        let decomp = svd(matrix).unwrap();
        let k = matrix.nrows().min(matrix.ncols());
        assert_eq!(decomp.u.dim(), (matrix.nrows(), k));
        assert_eq!(decomp.singular_values.len(), k);
        assert_eq!(decomp.vt.dim(), (k, matrix.ncols()));

        let reconstructed = (&decomp.u * &decomp.singular_values).dot(&decomp.vt);
        for (a, b) in reconstructed.iter().zip(matrix.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }

        let utu = decomp.u.t().dot(&decomp.u);
        for ((i, j), &x) in utu.indexed_iter() {
            assert_abs_diff_eq!(x, if i == j { 1.0 } else { 0.0 }, epsilon = 1e-10);
        }

        for pair in decomp.singular_values.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn test_svd_tall_and_wide() {
        let tall = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        assert_svd_reconstructs(&tall);
        assert_svd_reconstructs(&tall.t().to_owned());
        assert_svd_reconstructs(&spd_matrix());
    }

    #[test]
    fn test_svd_rank_deficient_completes_basis() {
        // Second row is a multiple of the first
        let matrix = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 1.0, 0.0]];
        let decomp = svd(&matrix).unwrap();
        assert_abs_diff_eq!(decomp.singular_values[2], 0.0, epsilon = 1e-12);
        assert_svd_reconstructs(&matrix);
    }

    #[test]
    fn test_svd_known_values() {
        let matrix = array![[3.0, 0.0], [0.0, -4.0]];
        let decomp = svd(&matrix).unwrap();
        assert_abs_diff_eq!(decomp.singular_values[0], 4.0, epsilon = 1e-14);
        assert_abs_diff_eq!(decomp.singular_values[1], 3.0, epsilon = 1e-14);
    }
}
