//! Error taxonomy for the analysis pipeline

use thiserror::Error;

/// Errors raised by the pipeline stages.
///
/// Schema and arithmetic failures abort the stage that raised them and are
/// handed back to the caller unchanged. Data-quality findings are never
/// errors; they travel in [`crate::preprocess::QualityReport`].
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A required raw field is missing or malformed.
    #[error("schema error in row {row}, field `{field}`: {reason}")]
    Schema {
        row: usize,
        field: &'static str,
        reason: String,
    },

    /// A ratio was asked to divide by zero.
    #[error("arithmetic error: zero denominator in {context}")]
    Arithmetic { context: String },

    #[error("no rows to analyze: {0}")]
    EmptyInput(&'static str),

    #[error("clustering failed: {0}")]
    Clustering(String),

    #[error("polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl AnalysisError {
    pub(crate) fn schema(row: usize, field: &'static str, reason: impl Into<String>) -> Self {
        AnalysisError::Schema {
            row,
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn zero_denominator(context: impl Into<String>) -> Self {
        AnalysisError::Arithmetic {
            context: context.into(),
        }
    }
}
