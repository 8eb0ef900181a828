// ========================================================================================
//
//                              THE BATCH DRIVER: MDA
//
// ========================================================================================
//
// Reads a whitespace-delimited feature matrix, extracts latent factors by
// maximum-likelihood factor analysis, and writes the top-loading features of
// each factor to a plain-text report.
//
// Running without arguments analyses `dailydialog-completions.csv` in the current
// directory and writes `loadings.txt` next to it. Every failure exits with status 1,
// including the case where the table has fewer features than requested factors; no
// report is written in that case.

use clap::{Parser, ValueEnum};
use mda::fit::{DEFAULT_MAX_ITER, DEFAULT_TOLERANCE, FitOptions};
use mda::main::{
    AnalysisConfig, DEFAULT_FACTORS, DEFAULT_INPUT_PATH, DEFAULT_OUTPUT_PATH,
    DEFAULT_TOP_FEATURES, run,
};
use mda::rotation::Rotation;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RotationCli {
    None,
    Varimax,
    Quartimax,
}

impl From<RotationCli> for Rotation {
    fn from(value: RotationCli) -> Self {
        match value {
            RotationCli::None => Rotation::None,
            RotationCli::Varimax => Rotation::Varimax,
            RotationCli::Quartimax => Rotation::Quartimax,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "mda",
    version,
    about = "Factor analysis of a feature matrix with per-factor top loadings."
)]
struct Args {
    /// Whitespace-delimited table: a header line, then one identifier plus values per row.
    #[arg(default_value = DEFAULT_INPUT_PATH)]
    input_path: PathBuf,

    /// Report destination; overwritten if it exists.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// Number of latent factors to extract.
    #[arg(short = 'k', long, default_value_t = DEFAULT_FACTORS)]
    factors: usize,

    /// Number of features listed per factor.
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_FEATURES)]
    top: usize,

    /// Orthogonal rotation applied to the fitted loadings.
    #[arg(long, value_enum, default_value_t = RotationCli::None)]
    rotation: RotationCli,

    /// Stopping threshold on the log-likelihood gain per iteration.
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tol: f64,

    /// Maximum number of fitting iterations.
    #[arg(long, default_value_t = DEFAULT_MAX_ITER)]
    max_iter: usize,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start_time = Instant::now();

    let args = Args::parse();
    let config = AnalysisConfig {
        input_path: args.input_path,
        output_path: args.output,
        top_features: args.top,
        fit: FitOptions {
            components: args.factors,
            tolerance: args.tol,
            max_iter: args.max_iter,
            noise_variance_init: None,
            rotation: args.rotation.into(),
        },
    };

    match run(&config) {
        Ok(summary) => {
            if !summary.converged {
                log::warn!("Loadings were written from a model that did not converge.");
            }
            log::info!(
                "Done: {} factors from {} rows x {} features in {:.2?}",
                summary.factors,
                summary.rows,
                summary.features,
                start_time.elapsed()
            );
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
