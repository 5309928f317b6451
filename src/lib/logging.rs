//! Logging utilities for formatted output.
//!
//! This module provides consistent, user-friendly formatting helpers for counts, durations,
//! sizes and percentages, an [`OperationTimer`] for timing top-level steps, and a summary
//! logger for a unit's screen result.

use std::time::{Duration, Instant};

use crate::screen::AnalysisResult;

/// Formats a count with thousands separators.
///
/// # Examples
///
/// ```
/// use fgscreen_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234), "1,234");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a percentage with specified decimal places.
///
/// # Arguments
///
/// * `value` - The fraction (0.0-1.0) to format as percentage
/// * `decimals` - Number of decimal places to include
///
/// # Examples
///
/// ```
/// use fgscreen_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// assert_eq!(format_percent(0.5, 1), "50.0%");
/// assert_eq!(format_percent(1.0, 0), "100%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0, decimals = decimals)
}

/// Formats a byte count in GiB with two decimals.
///
/// # Examples
///
/// ```
/// use fgscreen_lib::logging::format_gib;
///
/// assert_eq!(format_gib(0), "0.00 GiB");
/// assert_eq!(format_gib(3 * 1024 * 1024 * 1024 / 2), "1.50 GiB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2} GiB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

/// Formats a duration in human-readable form.
///
/// # Examples
///
/// ```
/// use fgscreen_lib::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(45)), "45s");
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// assert_eq!(format_duration(Duration::from_secs(5400)), "1h 30m");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 { format!("{mins}m") } else { format!("{mins}m {remaining_secs}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Logs a per-genome summary of one unit's screen result.
#[allow(clippy::cast_precision_loss)]
pub fn log_screen_summary(unit: &str, result: &AnalysisResult) {
    log::info!("Screen summary for {unit}:");
    log::info!("  Reads processed: {}", format_count(result.reads_processed));
    if result.reads_processed == 0 {
        return;
    }
    let total = result.reads_processed as f64;
    for genome in &result.genomes {
        log::info!(
            "  {}: {} mapped ({}), {} unique, {} multi",
            genome.genome,
            format_count(genome.mapped()),
            format_percent(genome.mapped() as f64 / total, 2),
            format_count(genome.unique),
            format_count(genome.multi)
        );
    }
    log::info!(
        "  Hit no genomes: {} ({})",
        format_count(result.hit_no_genomes),
        format_percent(result.hit_no_genomes as f64 / total, 2)
    );
}

/// Operation timing and summary helper.
///
/// # Examples
///
/// ```no_run
/// use fgscreen_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Screening units");
///
/// // ... do work ...
///
/// timer.log_completion(12);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Time since the timer was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs the completion with an item count.
    pub fn log_completion(&self, count: u64) {
        log::info!(
            "{} completed: {} in {}",
            self.operation,
            format_count(count),
            format_duration(self.elapsed())
        );
    }
}
