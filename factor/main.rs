use std::path::PathBuf;
use thiserror::Error;

use super::fit::{FactorModel, FitError, FitOptions};
use super::io::{LoadError, load_table};
use super::report::write_report_file;

pub const DEFAULT_INPUT_PATH: &str = "dailydialog-completions.csv";
pub const DEFAULT_OUTPUT_PATH: &str = "loadings.txt";
pub const DEFAULT_FACTORS: usize = 5;
pub const DEFAULT_TOP_FEATURES: usize = 20;

/// Everything a single analysis run needs.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Features listed per factor in the report.
    pub top_features: usize,
    pub fit: FitOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(DEFAULT_INPUT_PATH),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            top_features: DEFAULT_TOP_FEATURES,
            fit: FitOptions {
                components: DEFAULT_FACTORS,
                ..FitOptions::default()
            },
        }
    }
}

/// Shape and convergence facts about a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisSummary {
    pub rows: usize,
    pub features: usize,
    pub skipped_rows: usize,
    pub factors: usize,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(
        "Not enough numerical features to extract the desired number of factors. ({found} features, {required} factors requested)"
    )]
    InsufficientFeatures { found: usize, required: usize },
    #[error("Input file contains no numeric data rows.")]
    EmptyMatrix,
    #[error("Factor analysis failed: {0}")]
    Fit(#[from] FitError),
    #[error("Failed to write report '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loads the feature table, fits the factor model and writes the report.
///
/// The report file is only touched once the fit has succeeded.
pub fn run(config: &AnalysisConfig) -> Result<AnalysisSummary, DriverError> {
    log::info!("Loading data from {}", config.input_path.display());
    let table = load_table(&config.input_path)?;

    let required = config.fit.components;
    if table.n_features() < required {
        return Err(DriverError::InsufficientFeatures {
            found: table.n_features(),
            required,
        });
    }
    if table.n_rows() == 0 {
        return Err(DriverError::EmptyMatrix);
    }
    log::info!(
        "Loaded {} rows x {} features ({} rows skipped)",
        table.n_rows(),
        table.n_features(),
        table.skipped_rows
    );

    let model = FactorModel::fit(table.data.view(), &config.fit)?;
    log::info!(
        "Fitted {} factors in {} iterations",
        model.n_components(),
        model.n_iter()
    );
    log::debug!("Noise variance: {}", model.noise_variance());

    let loadings = model.loadings();
    write_report_file(
        &config.output_path,
        &table.feature_names,
        loadings.view(),
        config.top_features,
    )
    .map_err(|source| DriverError::Write {
        path: config.output_path.clone(),
        source,
    })?;
    log::info!("Loadings written to {}", config.output_path.display());

    Ok(AnalysisSummary {
        rows: table.n_rows(),
        features: model.n_features(),
        skipped_rows: table.skipped_rows,
        factors: model.n_components(),
        iterations: model.n_iter(),
        converged: model.converged(),
    })
}
