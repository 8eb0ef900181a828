use super::faer_ndarray::{FaerLinalgError, FaerSvd};
use ndarray::{Array2, ArrayView2, Axis};

const ROTATION_TOLERANCE: f64 = 1.0e-6;
const ROTATION_MAX_ITER: usize = 100;

/// Orthogonal rotation applied to fitted loadings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Varimax,
    Quartimax,
}

impl Rotation {
    /// Rotates a `features × factors` loadings matrix.
    ///
    /// Each feature's communality (the row sum of squared loadings) is
    /// unchanged by the rotation.
    pub fn apply(self, loadings: ArrayView2<'_, f64>) -> Result<Array2<f64>, FaerLinalgError> {
        match self {
            Rotation::None => Ok(loadings.to_owned()),
            Rotation::Varimax | Rotation::Quartimax => ortho_rotation(loadings, self),
        }
    }
}

fn ortho_rotation(
    loadings: ArrayView2<'_, f64>,
    method: Rotation,
) -> Result<Array2<f64>, FaerLinalgError> {
    let (n_features, n_factors) = loadings.dim();
    let mut rotation = Array2::<f64>::eye(n_factors);
    let mut criterion = 0.0;

    for iter in 0..ROTATION_MAX_ITER {
        let rotated = loadings.dot(&rotation);
        let mut target = rotated.mapv(|v| v * v * v);
        if method == Rotation::Varimax {
            let column_means = rotated.mapv(|v| v * v).sum_axis(Axis(0)) / n_features as f64;
            target -= &(&rotated * &column_means);
        }

        let parts = loadings.t().dot(&target).svd(true, true)?;
        let (Some(u), Some(vt)) = (parts.u, parts.vt) else {
            return Err(FaerLinalgError::SvdNoConvergence);
        };
        rotation = u.dot(&vt);

        let next = parts.singular_values.sum();
        if criterion != 0.0 && next < criterion * (1.0 + ROTATION_TOLERANCE) {
            log::debug!("{method:?} rotation settled after {} iterations", iter + 1);
            break;
        }
        criterion = next;
    }

    Ok(loadings.dot(&rotation))
}
