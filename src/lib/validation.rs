//! Input validation utilities
//!
//! This module provides common validation functions for command-line parameters and file
//! paths with consistent error messages. All functions return
//! [`ScreenError::InvalidParameter`] on failure.

use std::fmt::Display;
use std::path::Path;

use ahash::AHashSet;

use crate::errors::{Result, ScreenError};

/// Maximum number of reference genomes a single screen can hold.
pub const MAX_GENOMES: usize = 64;

/// Validate that a file exists
///
/// # Arguments
/// * `path` - Path to validate
/// * `description` - Human-readable description of the file (e.g., "Run data file")
///
/// # Errors
/// Returns an error if the file does not exist
///
/// # Example
/// ```
/// use fgscreen_lib::validation::validate_file_exists;
///
/// let result = validate_file_exists("/nonexistent/run_data.txt", "Run data file");
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.is_file() {
        return Err(ScreenError::InvalidParameter {
            parameter: description.to_string(),
            reason: format!("File does not exist: {}", path_ref.display()),
        });
    }
    Ok(())
}

/// Validate that a directory exists
///
/// # Errors
/// Returns an error if the path does not exist or is not a directory
pub fn validate_dir_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.is_dir() {
        return Err(ScreenError::InvalidParameter {
            parameter: description.to_string(),
            reason: format!("Directory does not exist: {}", path_ref.display()),
        });
    }
    Ok(())
}

/// Validate the list of reference genomes to screen against.
///
/// Names must be non-empty, unique (case-insensitively, since they become metric keys),
/// free of whitespace and `.`, and there may be at most [`MAX_GENOMES`] of them.
///
/// # Errors
/// Returns an error describing the first offending name
///
/// # Example
/// ```
/// use fgscreen_lib::validation::validate_genomes;
///
/// validate_genomes(&["phix".to_string(), "human".to_string()]).unwrap();
/// assert!(validate_genomes(&[]).is_err());
/// assert!(validate_genomes(&["phix".to_string(), "PhiX".to_string()]).is_err());
/// ```
pub fn validate_genomes(genomes: &[String]) -> Result<()> {
    let invalid = |reason: String| ScreenError::InvalidParameter {
        parameter: "genomes".to_string(),
        reason,
    };

    if genomes.is_empty() {
        return Err(invalid("At least one genome is required".to_string()));
    }
    if genomes.len() > MAX_GENOMES {
        return Err(invalid(format!(
            "At most {MAX_GENOMES} genomes are supported, got: {}",
            genomes.len()
        )));
    }

    let mut seen = AHashSet::with_capacity(genomes.len());
    for genome in genomes {
        if genome.trim().is_empty() {
            return Err(invalid("Genome names must not be empty".to_string()));
        }
        if genome.chars().any(|c| c.is_whitespace() || c == '.') {
            return Err(invalid(format!("Genome name must not contain '.' or spaces: '{genome}'")));
        }
        if !seen.insert(genome.to_lowercase()) {
            return Err(invalid(format!("Duplicate genome: '{genome}'")));
        }
    }
    Ok(())
}

/// Validate that a value is positive (> 0)
///
/// # Errors
/// Returns an error if the value is not positive
///
/// # Example
/// ```
/// use fgscreen_lib::validation::validate_positive;
///
/// validate_positive(4, "threads").unwrap();
/// assert!(validate_positive(0, "threads").is_err());
/// ```
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(ScreenError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}
