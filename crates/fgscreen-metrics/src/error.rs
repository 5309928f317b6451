//! Errors raised when reading typed values out of a [`crate::MetricsStore`].

use thiserror::Error;

/// Result type alias for metrics store reads.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Error type for typed metrics store reads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    /// The key is not present in the store.
    #[error("Metric '{key}' not found")]
    MissingKey {
        /// The normalized key that was requested
        key: String,
    },

    /// The key is present but its value cannot be decoded as the requested type.
    #[error("Metric '{key}' has value '{value}' which is not a valid {expected}")]
    Parse {
        /// The normalized key that was requested
        key: String,
        /// The raw stored value
        value: String,
        /// Name of the type the caller asked for (e.g. "integer")
        expected: &'static str,
    },
}

impl MetricsError {
    /// Returns the key this error refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::MissingKey { key } | Self::Parse { key, .. } => key,
        }
    }
}
