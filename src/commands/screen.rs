//! Screen the FASTQ files of a sequencing run against a panel of reference genomes.
//!
//! This module implements the `screen` command. It reads the run data (`key=value` lines
//! describing the run and its sample design), finds each unit's FASTQ files in a bcl2fastq
//! output directory, aligns every unit against each genome with an external aligner and
//! writes the run data back out with the `fastqscreen.*` results added.
//!
//! With `--read-stats`, per-read content statistics are collected for every sample and read
//! on the same worker pool once the screen has finished, and added under `fastqc.*`.
//!
//! The output run data is only written if every unit succeeds.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use crate::commands::command::Command;
use crate::commands::common::{
    AlignmentFilterOptions, MapperOptions, RunDataIoOptions, ThreadingOptions,
};
use fgscreen_lib::fastq_layout::CasavaLayout;
use fgscreen_lib::logging::{OperationTimer, format_gib};
use fgscreen_lib::metrics::{MetricsStore, SharedMetricsStore, load_metrics, save_metrics};
use fgscreen_lib::pipeline::{Scheduler, ScreenProcessor};
use fgscreen_lib::read_stats::ReadStatsProcessor;
use fgscreen_lib::report::{LogReportSink, MultiReportSink, TsvReportSink};
use fgscreen_lib::run_metadata::{EnumerationOptions, enumerate_jobs, enumerate_read_stats_jobs};
use fgscreen_lib::scratch::TemporaryResourceManager;
use fgscreen_lib::screen::AnalysisInvoker;
use fgscreen_lib::unit::ScreenJob;
use fgscreen_lib::validation::{validate_dir_exists, validate_genomes};

#[derive(Debug, Parser)]
#[command(
    name = "screen",
    about = "\x1b[38;5;151m[QC]\x1b[0m            \x1b[36mScreen run FASTQs for contamination against reference genomes\x1b[0m",
    long_about = r#"
Screens every sample (and optionally the undetermined reads) of a demultiplexed run
against a panel of reference genomes, and records per-genome mapping counts in the run data.

For each unit the FASTQ chunks are decompressed into a scratch file, aligned once per genome
with an external aligner (bowtie2 by default), and the SAM output is reduced to counts of
reads mapping uniquely or several times to one or more genomes.

# Run Data

The input is a `key=value` file. The run layout is read from
`run.info.flow.cell.lane.count`, `run.info.read.count` and `run.info.read<N>.indexed`, and the
sample design from `design.lane<L>.samples.names`, `design.lane<L>.<S>.sample.project`,
`design.lane<L>.<S>.index` and `design.lane<L>.<S>.sample.ref`.

Results are added under `fastqscreen.lane<L>.sample.<S>.read<R>.<S>.*` and
`fastqscreen.lane<L>.undetermined.read<R>.*`. With `--read-stats`, read-content statistics
are added under `fastqc.lane<L>.sample.<S>.read<R>.<S>.*` for every sample and read.

# Mapper Arguments

`--mapper-args` and `--mapper-paired-args` take the aligner's arguments as separate values,
ended by a `;` argument (quote it in the shell). Values may start with `-` and may contain
spaces.

# Failure

The first failing unit cancels the others; no output is written and the command exits with
an error naming that unit.
"#
)]
pub struct Screen {
    /// Input and output run data
    #[command(flatten)]
    pub io: RunDataIoOptions,

    /// bcl2fastq output directory holding the Project_*/Sample_* folders
    #[arg(short = 'f', long = "fastq-dir")]
    pub fastq_dir: PathBuf,

    /// Genomes to screen against, in order
    #[arg(short = 'g', long = "genomes", value_delimiter = ',', required = true)]
    pub genomes: Vec<String>,

    /// Directory for decompressed FASTQs and aligner outputs (defaults to the system temp dir)
    #[arg(long = "tmp-dir")]
    pub tmp_dir: Option<PathBuf>,

    /// Also write one TSV report per unit under this directory
    #[arg(long = "report-dir")]
    pub report_dir: Option<PathBuf>,

    /// Screen read 1 and read 2 together on paired-end runs
    #[arg(long = "paired", default_value_t = false)]
    pub paired: bool,

    /// Also screen each lane's undetermined reads
    #[arg(long = "undetermined", default_value_t = false)]
    pub undetermined: bool,

    /// Also collect read-content statistics for every sample and read
    #[arg(long = "read-stats", default_value_t = false)]
    pub read_stats: bool,

    /// List the units that would be screened and exit
    #[arg(long = "dry-run", default_value_t = false)]
    pub dry_run: bool,

    #[command(flatten)]
    pub mapper: MapperOptions,

    #[command(flatten)]
    pub filters: AlignmentFilterOptions,

    #[command(flatten)]
    pub threading: ThreadingOptions,
}

impl Screen {
    fn validate(&self) -> Result<()> {
        self.io.validate()?;
        validate_dir_exists(&self.fastq_dir, "FASTQ directory")?;
        if let Some(tmp_dir) = &self.tmp_dir {
            validate_dir_exists(tmp_dir, "Temporary directory")?;
        }
        validate_genomes(&self.genomes)?;
        self.mapper.validate()?;
        self.threading.validate()?;
        Ok(())
    }

    fn scratch_dir(&self) -> PathBuf {
        self.tmp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    fn report_sink(&self) -> MultiReportSink {
        let sink = MultiReportSink::new().with(LogReportSink);
        match &self.report_dir {
            Some(dir) => sink.with(TsvReportSink::new(dir)),
            None => sink,
        }
    }

    /// Runs the screen, then the read statistics, and returns every result.
    ///
    /// The store is sealed and the scratch space cleaned up before returning, even on
    /// failure, so workers abandoned after a cancellation can change neither.
    fn screen(&self, jobs: Vec<ScreenJob>, read_stats_jobs: Vec<ScreenJob>) -> Result<MetricsStore> {
        let scratch_dir = self.scratch_dir();
        let scratch = Arc::new(TemporaryResourceManager::new(&scratch_dir));
        let invoker = AnalysisInvoker::new(
            Arc::new(self.mapper.build_module()),
            self.genomes.clone(),
            self.filters.to_filter_options(),
            &scratch_dir,
        );
        let store = Arc::new(SharedMetricsStore::default());
        let processor =
            Arc::new(ScreenProcessor::new(Arc::clone(&scratch), invoker, Arc::clone(&store)));
        let sink = self.report_sink();

        let outcome = Scheduler::new(self.threading.scheduler_config())
            .run(jobs, processor, &sink)
            .context("Contamination screen failed")
            .and_then(|summary| {
                info!("{} unit(s) screened, {} skipped", summary.completed, summary.skipped);
                if read_stats_jobs.is_empty() {
                    return Ok(());
                }
                let processor = Arc::new(ReadStatsProcessor::new(Arc::clone(&store)));
                let summary = Scheduler::new(self.threading.scheduler_config())
                    .run(read_stats_jobs, processor, &sink)
                    .context("Read statistics failed")?;
                info!("Read statistics collected for {} unit(s)", summary.completed);
                Ok(())
            });

        let leftover = scratch.total_scratch_bytes();
        if leftover > 0 {
            info!("Removing {} of leftover scratch files", format_gib(leftover));
        }
        scratch.cleanup_all();
        let results = store.seal();

        outcome?;
        Ok(results)
    }
}

impl Command for Screen {
    fn execute(&self, command_line: &str) -> Result<()> {
        self.validate()?;
        info!("{command_line}");

        let timer = OperationTimer::new("Screening run");
        let mut run_data = load_metrics(&self.io.input)?;
        let layout = CasavaLayout::new(&self.fastq_dir);
        let options = EnumerationOptions { paired: self.paired, undetermined: self.undetermined };
        let jobs = enumerate_jobs(&run_data, &layout, options)
            .context("Failed to enumerate the units to screen")?;
        let read_stats_jobs = if self.read_stats {
            enumerate_read_stats_jobs(&run_data, &layout)
                .context("Failed to enumerate the units to collect read statistics for")?
        } else {
            Vec::new()
        };

        if self.dry_run {
            for job in &jobs {
                info!("Would screen {job} ({} file(s))", job.unit.source_files().len());
            }
            for job in &read_stats_jobs {
                info!("Would collect read statistics for {job}");
            }
            return Ok(());
        }

        let job_count = (jobs.len() + read_stats_jobs.len()) as u64;
        let results = self.screen(jobs, read_stats_jobs)?;
        run_data.merge(results);
        save_metrics(&self.io.output, &run_data)?;
        info!("Wrote {}", self.io.output.display());
        timer.log_completion(job_count);
        Ok(())
    }
}
