//! Per-job report sinks, notified once for every completed job after all jobs finish.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fgoxide::io::DelimFile;
use log::info;
use serde::{Deserialize, Serialize};

use crate::logging::log_screen_summary;
use crate::pipeline::CollectedResult;
use crate::screen::AnalysisResult;
use crate::screen::result::percent;
use crate::unit::{ScreenJob, WorkUnit};

/// Receives the result of each completed job.
pub trait ReportSink: Send + Sync {
    /// Handles one job's result. Sinks ignore collectors they do not render.
    ///
    /// # Errors
    /// Any error aborts reporting and fails the run.
    fn accept(&self, job: &ScreenJob, result: &dyn CollectedResult) -> Result<()>;
}

/// One row of a unit's screen report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeReportRow {
    /// Genome label
    pub genome: String,
    /// Reads screened
    pub reads_processed: u64,
    /// Reads mapped on this genome
    pub mapped: u64,
    /// Percent of reads mapped on this genome
    pub mapped_percent: f64,
    /// Reads with one placement on this genome
    pub unique: u64,
    /// Reads with several placements on this genome
    pub multi: u64,
    /// Unique here, unmapped elsewhere
    pub one_hit_one_genome: u64,
    /// Multi-mapped here, unmapped elsewhere
    pub multiple_hits_one_genome: u64,
    /// Unique here, mapped elsewhere too
    pub one_hit_multiple_genomes: u64,
    /// Multi-mapped here, mapped elsewhere too
    pub multiple_hits_multiple_genomes: u64,
    /// Also mapped on the sample's own genome
    pub excluded: u64,
    /// Percent of reads that mapped on no screened genome
    pub hit_no_genomes_percent: f64,
}

impl GenomeReportRow {
    /// One row per screened genome.
    #[must_use]
    pub fn rows(result: &AnalysisResult) -> Vec<Self> {
        let total = result.reads_processed;
        result
            .genomes
            .iter()
            .map(|g| Self {
                genome: g.genome.clone(),
                reads_processed: total,
                mapped: g.mapped(),
                mapped_percent: percent(g.mapped(), total),
                unique: g.unique,
                multi: g.multi,
                one_hit_one_genome: g.one_hit_one_genome,
                multiple_hits_one_genome: g.multiple_hits_one_genome,
                one_hit_multiple_genomes: g.one_hit_multiple_genomes,
                multiple_hits_multiple_genomes: g.multiple_hits_multiple_genomes,
                excluded: g.excluded,
                hit_no_genomes_percent: percent(result.hit_no_genomes, total),
            })
            .collect()
    }
}

/// Writes one screen TSV per reported unit under a report directory.
///
/// Sample reports go to `<dir>/Project_<project>/<stem>-fastqscreen.tsv` and undetermined
/// reports to `<dir>/Undetermined_indices/<stem>-fastqscreen.tsv`. A job that stands in for
/// another read also gets a report for that read, with the same rows.
#[derive(Debug, Clone)]
pub struct TsvReportSink {
    dir: PathBuf,
}

impl TsvReportSink {
    /// Creates a sink writing under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where the report of `unit` is written.
    #[must_use]
    pub fn report_path(&self, unit: &WorkUnit) -> PathBuf {
        let subdir = if unit.is_undetermined() {
            "Undetermined_indices".to_string()
        } else {
            format!("Project_{}", unit.project())
        };
        self.dir.join(subdir).join(format!("{}-fastqscreen.tsv", unit.report_stem()))
    }
}

impl ReportSink for TsvReportSink {
    fn accept(&self, job: &ScreenJob, result: &dyn CollectedResult) -> Result<()> {
        let Some(result) = result.as_any().downcast_ref::<AnalysisResult>() else {
            return Ok(());
        };
        let rows = GenomeReportRow::rows(result);
        for unit in job.report_units() {
            let path = self.report_path(&unit);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create report directory: {}", parent.display())
                })?;
            }
            write_report(&path, &rows)?;
        }
        Ok(())
    }
}

fn write_report(path: &Path, rows: &[GenomeReportRow]) -> Result<()> {
    DelimFile::default()
        .write_tsv(&path, rows)
        .with_context(|| format!("Failed to write screen report: {}", path.display()))
}

/// Logs a summary of each job.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn accept(&self, job: &ScreenJob, result: &dyn CollectedResult) -> Result<()> {
        if let Some(screen) = result.as_any().downcast_ref::<AnalysisResult>() {
            log_screen_summary(&job.to_string(), screen);
        } else {
            let entries = result.metrics(&job.unit.metric_prefix(result.collector())).len();
            info!("{} summary for {job}: {entries} run-data entries", result.collector());
        }
        Ok(())
    }
}

/// Forwards each result to several sinks in order, stopping at the first error.
#[derive(Default)]
pub struct MultiReportSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl MultiReportSink {
    /// An empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sink.
    #[must_use]
    pub fn with<S: ReportSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl ReportSink for MultiReportSink {
    fn accept(&self, job: &ScreenJob, result: &dyn CollectedResult) -> Result<()> {
        for sink in &self.sinks {
            sink.accept(job, result)?;
        }
        Ok(())
    }
}
