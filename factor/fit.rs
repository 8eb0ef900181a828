//! Maximum-likelihood factor analysis.
//!
//! The model assumes `x = W^T z + mean + e` with `z ~ N(0, I_k)` and
//! `e ~ N(0, diag(psi))`. It is fitted with the SVD-based iteration from
//! Barber, *Bayesian Reasoning and Machine Learning*, algorithm 21.1: each
//! step rescales the centered data by the current noise deviations, takes a
//! truncated SVD, rebuilds `W` from the leading singular pairs and updates
//! `psi` from the unexplained variance.

use super::faer_ndarray::{FaerLinalgError, FaerSvd};
use super::rotation::Rotation;
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use std::f64::consts::PI;
use thiserror::Error;

/// Floor applied to noise variances and to logarithm arguments.
pub const SMALL: f64 = 1.0e-12;
pub const DEFAULT_TOLERANCE: f64 = 1.0e-2;
pub const DEFAULT_MAX_ITER: usize = 1_000;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("the number of factors must be at least 1")]
    NoComponents,
    #[error("cannot extract {components} factors from {features} features")]
    TooManyComponents { components: usize, features: usize },
    #[error("the data matrix has no rows")]
    EmptyMatrix,
    #[error("invalid fit options: {0}")]
    InvalidOptions(&'static str),
    #[error("initial noise variance has {found} entries, expected {expected}")]
    NoiseVarianceShape { found: usize, expected: usize },
    #[error(transparent)]
    Linalg(#[from] FaerLinalgError),
}

#[derive(Clone, Debug)]
pub struct FitOptions {
    /// Number of latent factors to extract.
    pub components: usize,
    /// Stopping threshold on the log-likelihood increase between iterations.
    pub tolerance: f64,
    pub max_iter: usize,
    /// Starting noise variance per feature; all ones when absent.
    pub noise_variance_init: Option<Array1<f64>>,
    pub rotation: Rotation,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            components: 5,
            tolerance: DEFAULT_TOLERANCE,
            max_iter: DEFAULT_MAX_ITER,
            noise_variance_init: None,
            rotation: Rotation::None,
        }
    }
}

impl FitOptions {
    fn validate(&self, n_features: usize) -> Result<(), FitError> {
        if self.components == 0 {
            return Err(FitError::NoComponents);
        }
        if self.components > n_features {
            return Err(FitError::TooManyComponents {
                components: self.components,
                features: n_features,
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FitError::InvalidOptions("tolerance must be positive"));
        }
        if self.max_iter == 0 {
            return Err(FitError::InvalidOptions("max_iter must be at least 1"));
        }
        if let Some(init) = &self.noise_variance_init {
            if init.len() != n_features {
                return Err(FitError::NoiseVarianceShape {
                    found: init.len(),
                    expected: n_features,
                });
            }
            if init.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
                return Err(FitError::InvalidOptions(
                    "initial noise variance must be positive and finite",
                ));
            }
        }
        Ok(())
    }
}

/// A fitted factor-analysis model.
#[derive(Clone, Debug)]
pub struct FactorModel {
    components: Array2<f64>,
    mean: Array1<f64>,
    noise_variance: Array1<f64>,
    log_likelihood: Vec<f64>,
    converged: bool,
}

/// Leading `k` squared singular values, their right singular vectors, and the
/// squared norm of the discarded spectrum.
struct TruncatedSpectrum {
    squared: Array1<f64>,
    vt: Array2<f64>,
    unexplained: f64,
}

fn truncated_spectrum(
    matrix: &Array2<f64>,
    components: usize,
) -> Result<TruncatedSpectrum, FaerLinalgError> {
    let parts = matrix.svd(false, true)?;
    let vt = parts.vt.ok_or(FaerLinalgError::SvdNoConvergence)?;
    let singular = parts.singular_values;
    let kept = components.min(singular.len());

    // Fewer samples than factors leaves trailing factors with zero variance.
    let mut squared = Array1::<f64>::zeros(components);
    for (dst, &sv) in squared.iter_mut().zip(singular.iter().take(kept)) {
        *dst = sv * sv;
    }
    let unexplained: f64 = singular.slice(s![kept..]).iter().map(|sv| sv * sv).sum();

    Ok(TruncatedSpectrum {
        squared,
        vt: vt.slice(s![..components, ..]).to_owned(),
        unexplained,
    })
}

/// Flips each factor so that its largest-magnitude loading is positive.
fn normalize_signs(components: &mut Array2<f64>) {
    for mut row in components.rows_mut() {
        let pivot = row
            .iter()
            .copied()
            .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            row.mapv_inplace(|v| -v);
        }
    }
}

impl FactorModel {
    /// Fits `options.components` factors to the rows of `data`.
    pub fn fit(data: ArrayView2<'_, f64>, options: &FitOptions) -> Result<Self, FitError> {
        let (n_samples, n_features) = data.dim();
        options.validate(n_features)?;
        if n_samples == 0 {
            return Err(FitError::EmptyMatrix);
        }
        let k = options.components;

        let mean = data.mean_axis(Axis(0)).ok_or(FitError::EmptyMatrix)?;
        let centered = &data - &mean;
        let variance = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n_samples as f64;

        let nsqrt = (n_samples as f64).sqrt();
        let llconst = n_features as f64 * (2.0 * PI).ln() + k as f64;

        let mut psi = options
            .noise_variance_init
            .clone()
            .unwrap_or_else(|| Array1::ones(n_features));
        let mut components = Array2::<f64>::zeros((k, n_features));
        let mut log_likelihood = Vec::new();
        let mut previous = f64::NEG_INFINITY;
        let mut converged = false;

        for iter in 0..options.max_iter {
            let sqrt_psi = psi.mapv(|v| v.sqrt() + SMALL);
            let scaled = &centered / &(&sqrt_psi * nsqrt);
            let spectrum = truncated_spectrum(&scaled, k)?;

            let mut w = spectrum.vt;
            for (mut row, &sq) in w.rows_mut().into_iter().zip(spectrum.squared.iter()) {
                row *= (sq - 1.0).max(0.0).sqrt();
            }
            w *= &sqrt_psi;

            let ll = -(n_samples as f64) / 2.0
                * (llconst
                    + spectrum.squared.mapv(|v| v.max(SMALL).ln()).sum()
                    + spectrum.unexplained
                    + psi.mapv(|v| v.max(SMALL).ln()).sum());
            log_likelihood.push(ll);
            log::debug!("iteration {}: log-likelihood {ll:.6}", iter + 1);

            components = w;
            if ll - previous < options.tolerance {
                converged = true;
                break;
            }
            previous = ll;

            let explained = components.mapv(|v| v * v).sum_axis(Axis(0));
            psi = (&variance - &explained).mapv(|v| v.max(SMALL));
        }

        if !converged {
            log::warn!(
                "Factor analysis did not converge after {} iterations; consider raising max_iter",
                options.max_iter
            );
        }

        if options.rotation != Rotation::None {
            components = options.rotation.apply(components.t())?.reversed_axes();
        }
        normalize_signs(&mut components);

        Ok(Self {
            components,
            mean,
            noise_variance: psi,
            log_likelihood,
            converged,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.components.ncols()
    }

    /// Factors × features.
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Features × factors; column `j` holds every feature's loading on factor `j`.
    pub fn loadings(&self) -> Array2<f64> {
        self.components.t().to_owned()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn noise_variance(&self) -> &Array1<f64> {
        &self.noise_variance
    }

    /// Log-likelihood after each iteration.
    pub fn log_likelihood(&self) -> &[f64] {
        &self.log_likelihood
    }

    pub fn n_iter(&self) -> usize {
        self.log_likelihood.len()
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    /// Samples `x = loadings * z + noise` with unit-variance features.
    fn single_factor_data(loadings: &[f64], n: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = Array2::zeros((n, loadings.len()));
        for mut row in data.rows_mut() {
            let z: f64 = rng.sample(StandardNormal);
            for (value, &l) in row.iter_mut().zip(loadings) {
                let e: f64 = rng.sample(StandardNormal);
                *value = l * z + (1.0 - l * l).sqrt() * e;
            }
        }
        data
    }

    fn options(components: usize) -> FitOptions {
        FitOptions {
            components,
            ..FitOptions::default()
        }
    }

    #[test]
    fn recovers_single_dominant_factor() {
        let truth = [0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2];
        let data = single_factor_data(&truth, 2_000, 7);
        let model = FactorModel::fit(data.view(), &options(1)).unwrap();

        assert!(model.converged());
        let loadings = model.loadings();
        assert_eq!(loadings.dim(), (8, 1));
        for (estimate, expected) in loadings.column(0).iter().zip(truth) {
            assert_abs_diff_eq!(*estimate, expected, epsilon = 0.1);
        }
        for (psi, l) in model.noise_variance().iter().zip(truth) {
            assert_abs_diff_eq!(*psi, 1.0 - l * l, epsilon = 0.1);
        }
    }

    #[test]
    fn fit_is_deterministic() {
        let data = single_factor_data(&[0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2], 300, 11);
        let first = FactorModel::fit(data.view(), &options(5)).unwrap();
        let second = FactorModel::fit(data.view(), &options(5)).unwrap();
        assert_eq!(first.components(), second.components());
        assert_eq!(first.log_likelihood(), second.log_likelihood());
    }

    #[test]
    fn largest_loading_of_each_factor_is_positive() {
        let truth = [-0.9, -0.8, -0.7, 0.1, 0.2, 0.3];
        let data = single_factor_data(&truth, 500, 3);
        let model = FactorModel::fit(data.view(), &options(5)).unwrap();
        for row in model.components().rows() {
            let pivot = row
                .iter()
                .copied()
                .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
            assert!(pivot >= 0.0);
        }
    }

    #[test]
    fn log_likelihood_is_non_decreasing() {
        let data = single_factor_data(&[0.9, 0.7, 0.5, 0.3, 0.6, 0.8], 400, 5);
        let model = FactorModel::fit(data.view(), &options(2)).unwrap();
        let ll = model.log_likelihood();
        assert!(!ll.is_empty());
        for pair in ll.windows(2) {
            assert!(
                pair[1] >= pair[0] - 1e-6 * pair[0].abs(),
                "log-likelihood fell: {pair:?}"
            );
        }
    }

    #[test]
    fn fewer_samples_than_factors_still_yields_full_shape() {
        let data = ndarray::array![
            [1.0, 2.0, 0.5, 4.0, 3.0, 1.0],
            [2.0, 1.0, 1.5, 3.0, 2.0, 0.0],
            [0.0, 3.0, 2.5, 1.0, 5.0, 2.0],
        ];
        let model = FactorModel::fit(data.view(), &options(5)).unwrap();
        assert_eq!(model.loadings().dim(), (6, 5));
        assert!(model.loadings().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rejects_more_factors_than_features() {
        let data = Array2::<f64>::zeros((10, 3));
        let err = FactorModel::fit(data.view(), &options(5)).unwrap_err();
        assert!(matches!(
            err,
            FitError::TooManyComponents {
                components: 5,
                features: 3
            }
        ));
    }

    #[test]
    fn rejects_empty_matrix_and_bad_options() {
        let empty = Array2::<f64>::zeros((0, 6));
        assert!(matches!(
            FactorModel::fit(empty.view(), &options(5)),
            Err(FitError::EmptyMatrix)
        ));

        let data = Array2::<f64>::ones((4, 6));
        assert!(matches!(
            FactorModel::fit(data.view(), &options(0)),
            Err(FitError::NoComponents)
        ));
        let bad_init = FitOptions {
            noise_variance_init: Some(Array1::ones(2)),
            ..options(2)
        };
        assert!(matches!(
            FactorModel::fit(data.view(), &bad_init),
            Err(FitError::NoiseVarianceShape {
                found: 2,
                expected: 6
            })
        ));
    }

    #[test]
    fn varimax_keeps_communalities_of_unrotated_fit() {
        let data = single_factor_data(&[0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3], 400, 21);
        let plain = FactorModel::fit(data.view(), &options(2)).unwrap();
        let rotated = FactorModel::fit(
            data.view(),
            &FitOptions {
                rotation: Rotation::Varimax,
                ..options(2)
            },
        )
        .unwrap();
        let a = plain.loadings().mapv(|v| v * v).sum_axis(Axis(1));
        let b = rotated.loadings().mapv(|v| v * v).sum_axis(Axis(1));
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-9);
        }
    }
}
