#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

pub mod faer_ndarray;
pub mod fit;
pub mod io;
pub mod main;
pub mod report;
pub mod rotation;

pub use fit::{FactorModel, FitError, FitOptions};
pub use io::{FeatureTable, LoadError, build_table, load_table, stream_entries};
pub use main::{AnalysisConfig, AnalysisSummary, DriverError, run};
pub use report::{RankedLoading, format_factor_line, rank_features, write_report};
pub use rotation::Rotation;
