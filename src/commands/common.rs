//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, ensure};
use clap::Args;

use fgscreen_lib::pipeline::{DEFAULT_GRACE_PERIOD, SchedulerConfig};
use fgscreen_lib::screen::{
    DEFAULT_PAIRED_ARGS, DEFAULT_PROGRAM, DEFAULT_SINGLE_ARGS, ExternalAnalysisModule,
    FilterOptions,
};
use fgscreen_lib::validation::{validate_file_exists, validate_positive};

/// Input and output run-data files.
#[derive(Debug, Clone, Args)]
pub struct RunDataIoOptions {
    /// Input run-data file (`key=value` lines)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output run-data file, written only if the whole run succeeds
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

impl RunDataIoOptions {
    /// Validates that the input file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the input file does not exist.
    pub fn validate(&self) -> Result<()> {
        validate_file_exists(&self.input, "Input run data")?;
        Ok(())
    }
}

/// Parses a `LABEL=PATH` reference index binding.
fn parse_reference(value: &str) -> std::result::Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((label, path)) if !label.trim().is_empty() && !path.trim().is_empty() => {
            Ok((label.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected LABEL=PATH, got '{value}'")),
    }
}

/// Options for the external aligner run once per genome.
#[derive(Debug, Clone, Args)]
pub struct MapperOptions {
    /// Aligner program to run
    #[arg(long = "mapper", default_value = DEFAULT_PROGRAM)]
    pub mapper: String,

    /// Single-end argument template, one value per aligner argument.
    ///
    /// `{index}`, `{input}`, `{output}` and `{threads}` are substituted. Values may start with
    /// `-`, so end the list with `;` when other options follow.
    #[arg(long = "mapper-args", num_args = 1.., allow_hyphen_values = true, value_terminator = ";")]
    pub single_args: Option<Vec<String>>,

    /// Paired argument template, as `--mapper-args`; `{mate}` is also substituted
    #[arg(
        long = "mapper-paired-args",
        num_args = 1..,
        allow_hyphen_values = true,
        value_terminator = ";"
    )]
    pub paired_args: Option<Vec<String>>,

    /// Threads given to each aligner process
    #[arg(id = "mapper_threads", long = "mapper-threads", default_value_t = 1)]
    pub threads: usize,

    /// Index path of a genome, as LABEL=PATH (defaults to the label itself)
    #[arg(long = "reference", value_parser = parse_reference)]
    pub references: Vec<(String, PathBuf)>,
}

impl MapperOptions {
    /// Validates the aligner options.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread count is zero or a template is empty or holds a blank
    /// argument.
    pub fn validate(&self) -> Result<()> {
        validate_positive(self.threads, "mapper-threads")?;
        ensure!(!self.mapper.trim().is_empty(), "--mapper must not be empty");
        for (flag, template) in
            [("--mapper-args", &self.single_args), ("--mapper-paired-args", &self.paired_args)]
        {
            if let Some(template) = template {
                ensure!(!template.is_empty(), "{flag} must not be empty");
                ensure!(
                    template.iter().all(|arg| !arg.trim().is_empty()),
                    "{flag} must not contain blank arguments"
                );
            }
        }
        Ok(())
    }

    /// Builds the aligner module.
    #[must_use]
    pub fn build_module(&self) -> ExternalAnalysisModule {
        let template = |given: &Option<Vec<String>>, default: &[&str]| -> Vec<String> {
            given.clone().unwrap_or_else(|| default.iter().map(|s| (*s).to_string()).collect())
        };
        let mut module = ExternalAnalysisModule::new(self.mapper.trim())
            .with_single_args(template(&self.single_args, DEFAULT_SINGLE_ARGS))
            .with_paired_args(template(&self.paired_args, DEFAULT_PAIRED_ARGS))
            .with_threads(self.threads);
        for (label, path) in &self.references {
            module = module.with_index(label, path.clone());
        }
        module
    }
}

/// Options for filtering alignments before they are counted.
#[derive(Debug, Clone, Default, Args)]
pub struct AlignmentFilterOptions {
    /// Ignore alignments that failed vendor quality checks
    #[arg(long = "remove-qc-fail", default_value_t = false)]
    pub remove_qc_fail: bool,

    /// Ignore secondary and supplementary alignments
    #[arg(long = "remove-secondary", default_value_t = false)]
    pub remove_secondary: bool,

    /// Ignore alignments below this mapping quality
    #[arg(long = "min-mapq")]
    pub min_mapq: Option<u8>,
}

impl AlignmentFilterOptions {
    /// The filter configuration for the result parser.
    #[must_use]
    pub fn to_filter_options(&self) -> FilterOptions {
        FilterOptions {
            remove_qc_fail: self.remove_qc_fail,
            remove_secondary: self.remove_secondary,
            min_mapping_quality: self.min_mapq,
        }
    }
}

/// Options for the worker pool.
#[derive(Debug, Clone, Default, Args)]
pub struct ThreadingOptions {
    /// Number of units screened at once (defaults to the available parallelism)
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Seconds to wait for running units to stop after a failure
    #[arg(long = "grace-period", default_value_t = DEFAULT_GRACE_PERIOD.as_secs())]
    pub grace_period: u64,
}

impl ThreadingOptions {
    /// Validates the thread count when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread count is zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(threads) = self.threads {
            validate_positive(threads, "threads")?;
        }
        Ok(())
    }

    /// The scheduler configuration.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();
        SchedulerConfig {
            workers: self.threads.unwrap_or(defaults.workers),
            grace_period: Duration::from_secs(self.grace_period),
        }
    }
}
