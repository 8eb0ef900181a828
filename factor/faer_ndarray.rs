//! Thin bridge between `ndarray` arrays and the `faer` dense SVD.
//!
//! All decompositions run with `Par::Seq` so that the same input produces
//! bit-identical factors on every run.

use dyn_stack::{MemBuffer, MemStack};
use faer::diag::{Diag, DiagRef};
use faer::linalg::svd::{self, ComputeSvdVectors};
use faer::{Mat, MatRef, Par};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("SVD failed to converge")]
    SvdNoConvergence,
}

/// Singular value decomposition `A = U · diag(S) · Vt`.
///
/// `u` is `nrows × nrows` and `vt` is `ncols × ncols` when requested;
/// `singular_values` holds `min(nrows, ncols)` values in non-increasing order.
#[derive(Debug, Clone)]
pub struct SvdParts {
    pub u: Option<Array2<f64>>,
    pub singular_values: Array1<f64>,
    pub vt: Option<Array2<f64>>,
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

fn mat_to_transposed_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.ncols(), mat.nrows()), |(i, j)| mat[(j, i)])
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    Array1::from_shape_fn(mat.nrows(), |i| mat[(i, 0)])
}

enum FaerStorage<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

/// Zero-copy `faer` view of a standard-layout (or transposed) array, falling
/// back to an owned copy for arbitrary strides.
pub struct FaerArrayView<'a> {
    storage: FaerStorage<'a>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let borrowed = array.as_slice_memory_order().and_then(|slice| {
            if array.is_standard_layout() {
                Some(MatRef::from_row_major_slice(slice, rows, cols))
            } else if array.t().is_standard_layout() {
                Some(MatRef::from_column_major_slice(slice, rows, cols))
            } else {
                None
            }
        });
        let storage = match borrowed {
            Some(view) => FaerStorage::Borrowed(view),
            None => FaerStorage::Owned(Mat::from_fn(rows, cols, |i, j| array[(i, j)])),
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        match &self.storage {
            FaerStorage::Borrowed(view) => *view,
            FaerStorage::Owned(mat) => mat.as_ref(),
        }
    }
}

pub trait FaerSvd {
    fn svd(&self, compute_u: bool, compute_vt: bool) -> Result<SvdParts, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerSvd for ArrayBase<S, Ix2> {
    fn svd(&self, compute_u: bool, compute_vt: bool) -> Result<SvdParts, FaerLinalgError> {
        let view = FaerArrayView::new(self);
        let mat = view.as_ref();
        let (rows, cols) = mat.shape();

        let flag = |wanted: bool| {
            if wanted {
                ComputeSvdVectors::Full
            } else {
                ComputeSvdVectors::No
            }
        };

        let mut singular = Diag::<f64>::zeros(rows.min(cols));
        let mut u_storage = compute_u.then(|| Mat::<f64>::zeros(rows, rows));
        let mut v_storage = compute_vt.then(|| Mat::<f64>::zeros(cols, cols));

        let par = Par::Seq;
        let mut mem = MemBuffer::new(svd::svd_scratch::<f64>(
            rows,
            cols,
            flag(compute_u),
            flag(compute_vt),
            par,
            Default::default(),
        ));
        let mut stack = MemStack::new(&mut mem);

        svd::svd(
            mat,
            singular.as_mut(),
            u_storage.as_mut().map(|m| m.as_mut()),
            v_storage.as_mut().map(|m| m.as_mut()),
            par,
            &mut stack,
            Default::default(),
        )
        .map_err(|_| FaerLinalgError::SvdNoConvergence)?;

        Ok(SvdParts {
            u: u_storage.map(|m| mat_to_array(m.as_ref())),
            singular_values: diag_to_array(singular.as_ref()),
            vt: v_storage.map(|m| mat_to_transposed_array(m.as_ref())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array, s};

    fn reconstruct(parts: &SvdParts, rows: usize, cols: usize) -> Array2<f64> {
        let u = parts.u.as_ref().unwrap();
        let vt = parts.vt.as_ref().unwrap();
        let rank = parts.singular_values.len();
        let mut scaled_u = u.slice(s![.., ..rank]).to_owned();
        for (mut col, &sv) in scaled_u.columns_mut().into_iter().zip(parts.singular_values.iter()) {
            col *= sv;
        }
        let out = scaled_u.dot(&vt.slice(s![..rank, ..]));
        assert_eq!(out.dim(), (rows, cols));
        out
    }

    #[test]
    fn svd_reconstructs_tall_matrix() {
        let a = array![[3.0, 1.0], [1.0, 3.0], [0.5, -2.0], [4.0, 0.0]];
        let parts = a.svd(true, true).unwrap();
        assert_eq!(parts.singular_values.len(), 2);
        assert!(parts.singular_values[0] >= parts.singular_values[1]);
        let back = reconstruct(&parts, 4, 2);
        for (x, y) in back.iter().zip(a.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-10);
        }
    }

    #[test]
    fn svd_reconstructs_transposed_view() {
        let base = array![[1.0, 2.0, 0.0], [0.0, -1.0, 5.0]];
        let a = base.t();
        let parts = a.svd(true, true).unwrap();
        let back = reconstruct(&parts, 3, 2);
        for (x, y) in back.iter().zip(a.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-10);
        }
    }

    #[test]
    fn right_vectors_are_orthonormal_without_left_vectors() {
        let a = array![[2.0, 0.0, 1.0], [1.0, 1.0, 0.0]];
        let parts = a.svd(false, true).unwrap();
        assert!(parts.u.is_none());
        let vt = parts.vt.unwrap();
        assert_eq!(vt.dim(), (3, 3));
        let gram = vt.dot(&vt.t());
        for ((i, j), value) in gram.indexed_iter() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(*value, expected, epsilon = 1e-10);
        }
    }
}
