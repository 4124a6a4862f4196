//! Error types for baseline and correlation computations.

use thiserror::Error;

/// Result type for zonal operations.
pub type Result<T> = std::result::Result<T, ZonalError>;

/// Errors that can occur while building baselines, standardizing
/// observations, or correlating series.
///
/// Sparse data is deliberately absent from this taxonomy: a stratum, zone,
/// or shift with too few observations surfaces as NaN output plus a skip
/// diagnostic, never as an error.
#[derive(Debug, Error)]
pub enum ZonalError {
    /// Missing required column in input data
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Unsupported enum value or conflicting mutually-exclusive options
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start of the range
        start: String,
        /// End of the range
        end: String,
    },

    /// Categorical column value outside the declared mapping
    #[error("Unexpected value in column {column}: {value}")]
    UnexpectedCategory {
        /// Column holding the offending value
        column: String,
        /// The value that has no declared mapping
        value: String,
    },

    /// Catalog read of a table that was never written
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}
