//! Convolution of FK tables with a PDF sampled on their x-grid.
//!
//! The PDF is given as a `14 x nx` array of `x f(x)` values in the
//! evolution basis, on the x nodes of the table.

use crate::dataset::{DatasetRecord, FkTensor};
use crate::error::{GridError, Result};
use crate::flavour::FLAVOUR_SIZE;
use ndarray::{Array1, Array2, ArrayView2, Axis, Ix3, Ix4, Zip};

fn check_pdf(fk: &FkTensor, pdf: &ArrayView2<'_, f64>) -> Result<()> {
    if pdf.dim() != (FLAVOUR_SIZE, fk.nx) {
        return Err(GridError::Shape(format!(
            "PDF is {:?}, the table needs ({FLAVOUR_SIZE}, {})",
            pdf.dim(),
            fk.nx
        )));
    }
    if let Some(&bad) = fk.basis.iter().find(|&&b| b >= FLAVOUR_SIZE) {
        return Err(GridError::Shape(format!("basis index {bad} out of range")));
    }
    Ok(())
}

/// Theory predictions of one FK table
///
/// DIS tables give `sum_{b,x} fk[n,b,x] pdf[basis_b,x]`, hadronic tables
/// `sum_{b,x1,x2} fk[n,b,x1,x2] pdf[i_b,x1] pdf[j_b,x2]`.
///
/// # Errors
/// * [`GridError::Shape`] if the PDF does not match the table
pub fn convolute(fk: &FkTensor, pdf: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
    fk.validate()?;
    check_pdf(fk, &pdf)?;

    let shape_err = |e: ndarray::ShapeError| GridError::Shape(e.to_string());
    if fk.hadronic {
        let table = fk.fktable.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
        let mut lumi = ndarray::Array3::<f64>::zeros((fk.nbasis, fk.nx, fk.nx));
        for (b, mut plane) in lumi.outer_iter_mut().enumerate() {
            let (i, j) = (fk.basis[2 * b], fk.basis[2 * b + 1]);
            let (fi, fj) = (pdf.row(i), pdf.row(j));
            Zip::indexed(&mut plane).for_each(|(x1, x2), v| *v = fi[x1] * fj[x2]);
        }
        Ok(table
            .outer_iter()
            .map(|point| (&point * &lumi).sum())
            .collect())
    } else {
        let table = fk.fktable.view().into_dimensionality::<Ix3>().map_err(shape_err)?;
        let active: Array2<f64> = pdf.select(Axis(0), &fk.basis);
        Ok(table
            .outer_iter()
            .map(|point| (&point * &active).sum())
            .collect())
    }
}

/// Predictions of a dataset: every operand convolved, then combined
pub fn dataset_predictions(record: &DatasetRecord, pdf: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
    let operands = record
        .fktables
        .iter()
        .map(|fk| convolute(fk, pdf))
        .collect::<Result<Vec<_>>>()?;
    record.operation.apply(&operands)
}
