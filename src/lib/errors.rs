//! Custom error types for fgscreen operations.

use std::io;
use std::path::PathBuf;

use fgscreen_metrics::MetricsError;
use thiserror::Error;

/// Result type alias for fgscreen operations
pub type Result<T> = std::result::Result<T, ScreenError>;

/// Error type for fgscreen operations
#[derive(Error, Debug)]
pub enum ScreenError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// A required run-data value was missing or malformed
    #[error("Invalid run data: {0}")]
    Metadata(#[from] MetricsError),

    /// The FASTQ directory layout did not match expectations
    #[error("Unexpected FASTQ layout at '{path}': {reason}")]
    Layout {
        /// The offending path
        path: PathBuf,
        /// Explanation of the problem
        reason: String,
    },

    /// Decompressing or concatenating the inputs of a unit failed
    #[error("Failed to prepare input for {unit} from '{path}': {source}")]
    FileProcessing {
        /// Identity of the unit being prepared
        unit: String,
        /// The file being read or written when the failure occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The analysis module could not be launched or exited unsuccessfully
    #[error("Analysis module '{module}' failed for {unit}: {reason}")]
    Execution {
        /// Identity of the unit being analysed
        unit: String,
        /// Name of the analysis module
        module: String,
        /// Explanation of the failure
        reason: String,
    },

    /// The analysis produced no result for a unit
    #[error("Analysis returned no result for {unit}: {reason}")]
    NoResult {
        /// Identity of the unit being analysed
        unit: String,
        /// Explanation of why there is no result
        reason: String,
    },

    /// A line of module output could not be interpreted
    #[error("Invalid alignment output at line {line}: {reason}")]
    InvalidAlignment {
        /// 1-based line number within the module output
        line: u64,
        /// Explanation of the problem
        reason: String,
    },

    /// The run was cancelled before this unit could finish
    #[error("Cancelled")]
    Cancelled,

    /// A unit failed and the run was aborted
    #[error("Processing failed for {unit}: {source}")]
    UnitFailed {
        /// Identity of the failing unit
        unit: String,
        /// The error raised by the unit
        #[source]
        source: Box<ScreenError>,
    },

    /// A report could not be written for a completed unit
    #[error("Failed to write report for {unit}: {reason}")]
    Report {
        /// Identity of the unit being reported
        unit: String,
        /// Explanation of the failure
        reason: String,
    },
}

impl ScreenError {
    /// Returns true for the error raised by cooperative cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
