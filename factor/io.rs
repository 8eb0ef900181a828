//! # Feature Table Loading
//!
//! Reads a whitespace-delimited feature file into a dense `ndarray` matrix.
//!
//! The first line is the header: its first token labels the identifier column
//! and is ignored, the remaining tokens are feature names. Every later line
//! starts with a row identifier followed by one numeric value per feature.
//! Rows that do not conform (a token that is not a finite number, or the wrong
//! number of values) are dropped whole, never repaired.

use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to open input file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error while reading input: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input file is empty; expected a header line with feature names.")]
    MissingHeader,
    #[error("Could not assemble the feature matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// A validated feature matrix together with its column names.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Feature names from the header, without the identifier column.
    pub feature_names: Vec<String>,
    /// Retained rows. Shape: [n_rows, feature_names.len()].
    pub data: Array2<f64>,
    /// Number of non-blank data lines that were dropped.
    pub skipped_rows: usize,
}

impl FeatureTable {
    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Lazily yields the whitespace-separated tokens of each line in `path`.
pub fn stream_entries(
    path: &Path,
) -> Result<impl Iterator<Item = Result<Vec<String>, LoadError>>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file).lines().map(|line| {
        let line = line?;
        Ok(line.split_whitespace().map(str::to_owned).collect())
    }))
}

/// Parses the values of one data row, or `None` if the row does not conform.
fn parse_row(tokens: &[String], n_features: usize) -> Option<Vec<f64>> {
    let values = tokens.get(1..)?;
    if values.len() != n_features {
        return None;
    }
    values
        .iter()
        .map(|token| token.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}

/// Consumes a header line and data lines into a [`FeatureTable`].
pub fn build_table<I>(entries: I) -> Result<FeatureTable, LoadError>
where
    I: IntoIterator<Item = Result<Vec<String>, LoadError>>,
{
    let mut entries = entries.into_iter();
    let header = entries.next().ok_or(LoadError::MissingHeader)??;
    let feature_names: Vec<String> = header.into_iter().skip(1).collect();
    let n_features = feature_names.len();

    let mut values = Vec::new();
    let mut n_rows = 0usize;
    let mut skipped_rows = 0usize;

    for (offset, entry) in entries.enumerate() {
        let tokens = entry?;
        if tokens.is_empty() {
            continue;
        }
        match parse_row(&tokens, n_features) {
            Some(row) => {
                values.extend(row);
                n_rows += 1;
            }
            None => {
                // Line numbers are 1-based and count the header.
                log::debug!(
                    "Skipping non-conforming row '{}' on line {}",
                    tokens[0],
                    offset + 2
                );
                skipped_rows += 1;
            }
        }
    }

    let data = Array2::from_shape_vec((n_rows, n_features), values)?;

    Ok(FeatureTable {
        feature_names,
        data,
        skipped_rows,
    })
}

/// Opens `path` and builds its [`FeatureTable`].
pub fn load_table(path: &Path) -> Result<FeatureTable, LoadError> {
    build_table(stream_entries(path)?)
}
