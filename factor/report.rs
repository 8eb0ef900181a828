//! Per-factor ranking of feature loadings and the plain-text report writer.
//!
//! The report opens with a comment line and then holds one line per factor:
//!
//! ```text
//! # Loadings for factors
//! Factor1=+0.8123*past_tense -0.6012*present_tense ...
//! ```

use itertools::Itertools;
use ndarray::{ArrayView1, ArrayView2};
use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub const REPORT_HEADER: &str = "# Loadings for factors";

/// One feature's loading on a factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankedLoading<'a> {
    pub feature: &'a str,
    pub loading: f64,
}

/// Orders features by descending absolute loading and keeps the first `top_n`.
///
/// The sort is stable, so features with equal magnitude stay in input order.
pub fn rank_features<'a>(
    feature_names: &'a [String],
    loadings: ArrayView1<'_, f64>,
    top_n: usize,
) -> Vec<RankedLoading<'a>> {
    feature_names
        .iter()
        .zip(loadings.iter())
        .map(|(name, &loading)| RankedLoading {
            feature: name.as_str(),
            loading,
        })
        .sorted_by(|a, b| b.loading.abs().total_cmp(&a.loading.abs()))
        .take(top_n)
        .collect()
}

/// Renders `Factor<k>=` followed by `<signed loading>*<feature> ` terms.
pub fn format_factor_line(factor_number: usize, ranked: &[RankedLoading<'_>]) -> String {
    let mut line = format!("Factor{factor_number}=");
    for term in ranked {
        // Writing into a String cannot fail.
        let _ = write!(line, "{:+.4}*{} ", term.loading, term.feature);
    }
    line
}

/// Writes the full report for a `features × factors` loadings matrix.
pub fn write_report<W: Write>(
    out: &mut W,
    feature_names: &[String],
    loadings: ArrayView2<'_, f64>,
    top_n: usize,
) -> io::Result<()> {
    writeln!(out, "{REPORT_HEADER}")?;
    for (index, column) in loadings.columns().into_iter().enumerate() {
        let factor_number = index + 1;
        log::info!("Processing Factor {factor_number}");
        let ranked = rank_features(feature_names, column, top_n);
        writeln!(out, "{}", format_factor_line(factor_number, &ranked))?;
    }
    Ok(())
}

/// Creates (or truncates) `path` and writes the report into it.
pub fn write_report_file(
    path: &Path,
    feature_names: &[String],
    loadings: ArrayView2<'_, f64>,
    top_n: usize,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_report(&mut writer, feature_names, loadings, top_n)?;
    writer.flush()
}
