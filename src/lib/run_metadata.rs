//! Run design lookups and enumeration of the screen jobs of a run.

use log::{info, warn};

use crate::errors::{Result, ScreenError};
use crate::fastq_layout::FastqLocator;
use crate::metrics::{MetricsError, MetricsStore};
use crate::unit::{ScreenJob, WorkUnit};

/// Read-only view of a run's layout and sample design.
pub trait RunMetadata {
    /// Number of lanes on the flow cell.
    fn lane_count(&self) -> Result<u32>;

    /// Number of reads in the run, index reads included.
    fn read_count(&self) -> Result<u32>;

    /// True if the sequencer read `read` (1-based, index reads included) is an index read.
    fn is_read_indexed(&self, read: u32) -> Result<bool>;

    /// Sample names of a lane, in design order.
    fn sample_names(&self, lane: u32) -> Result<Vec<String>>;

    /// Project of a sample.
    fn sample_project(&self, lane: u32, sample: &str) -> Result<String>;

    /// Index sequence of a sample, `None` when the lane is not indexed.
    fn sample_index(&self, lane: u32, sample: &str) -> Option<String>;

    /// The sample's own reference genome, if the design names one.
    fn sample_genome(&self, lane: u32, sample: &str) -> Option<String>;
}

fn as_u32(store: &MetricsStore, key: &str) -> Result<u32> {
    let value = store.get_u64(key)?;
    u32::try_from(value).map_err(|_| {
        ScreenError::Metadata(MetricsError::Parse {
            key: key.to_string(),
            value: value.to_string(),
            expected: "32-bit unsigned integer",
        })
    })
}

fn optional(store: &MetricsStore, key: &str) -> Option<String> {
    store.get(key).filter(|v| !v.is_empty()).map(str::to_string)
}

impl RunMetadata for MetricsStore {
    fn lane_count(&self) -> Result<u32> {
        as_u32(self, "run.info.flow.cell.lane.count")
    }

    fn read_count(&self) -> Result<u32> {
        as_u32(self, "run.info.read.count")
    }

    fn is_read_indexed(&self, read: u32) -> Result<bool> {
        Ok(self.get_bool(&format!("run.info.read{read}.indexed"))?)
    }

    fn sample_names(&self, lane: u32) -> Result<Vec<String>> {
        Ok(self.get_list(&format!("design.lane{lane}.samples.names"))?)
    }

    fn sample_project(&self, lane: u32, sample: &str) -> Result<String> {
        Ok(self.get_required(&format!("design.lane{lane}.{sample}.sample.project"))?.to_string())
    }

    fn sample_index(&self, lane: u32, sample: &str) -> Option<String> {
        optional(self, &format!("design.lane{lane}.{sample}.index"))
            .filter(|index| !index.eq_ignore_ascii_case("NoIndex"))
    }

    fn sample_genome(&self, lane: u32, sample: &str) -> Option<String> {
        optional(self, &format!("design.lane{lane}.{sample}.sample.ref"))
    }
}

/// What to enumerate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationOptions {
    /// Screen read 1 and read 2 together on paired-end runs.
    pub paired: bool,
    /// Also screen each lane's undetermined reads.
    pub undetermined: bool,
}

/// Number of non-indexed reads of the run.
///
/// # Errors
/// Fails if the read count or a read's index flag is missing or malformed.
pub fn sequenced_read_count(meta: &dyn RunMetadata) -> Result<u32> {
    let mut count = 0;
    for read in 1..=meta.read_count()? {
        if !meta.is_read_indexed(read)? {
            count += 1;
        }
    }
    Ok(count)
}

/// Builds the screen jobs of a run, in lane then design order, undetermined last in each lane.
///
/// Units whose read-1 FASTQ files cannot be found are logged and left out. In paired mode the
/// read-2 unit is attached as mate even when it has no files, so that the job is reported as
/// skipped rather than silently dropped.
///
/// # Errors
/// Fails on missing or malformed run metadata and on layout errors.
pub fn enumerate_jobs(
    meta: &dyn RunMetadata,
    layout: &dyn FastqLocator,
    options: EnumerationOptions,
) -> Result<Vec<ScreenJob>> {
    let paired_end_run = sequenced_read_count(meta)? > 1;
    let paired = options.paired && paired_end_run;
    if options.paired && !paired_end_run {
        warn!("Paired mode requested on a single-end run; screening read 1 only");
    }

    let mut jobs = Vec::new();
    for lane in 1..=meta.lane_count()? {
        for sample in meta.sample_names(lane)? {
            let project = meta.sample_project(lane, &sample)?;
            let index = meta.sample_index(lane, &sample);
            let primary = WorkUnit::sample(project.as_str(), sample.as_str(), lane, 1)
                .with_index(index.clone());
            let mate = paired.then(|| {
                WorkUnit::sample(project.as_str(), sample.as_str(), lane, 2)
                    .with_index(index)
                    .as_paired_mate()
            });
            let genome = meta.sample_genome(lane, &sample);
            if let Some(job) = build_job(layout, primary, mate, genome, paired_end_run)? {
                jobs.push(job);
            }
        }

        if options.undetermined {
            let primary = WorkUnit::undetermined(lane, 1);
            let mate = paired.then(|| WorkUnit::undetermined(lane, 2).as_paired_mate());
            if let Some(job) = build_job(layout, primary, mate, None, paired_end_run)? {
                jobs.push(job);
            }
        }
    }

    info!("Enumerated {} screen job(s)", jobs.len());
    Ok(jobs)
}

/// Builds the read-statistics jobs of a run: one per sample, lane and sequenced read.
///
/// Reads are numbered as sequenced, so index reads are skipped and do not consume a number.
/// Undetermined reads are not included. Units without FASTQ files are logged and left out.
///
/// # Errors
/// Fails on missing or malformed run metadata and on layout errors.
pub fn enumerate_read_stats_jobs(
    meta: &dyn RunMetadata,
    layout: &dyn FastqLocator,
) -> Result<Vec<ScreenJob>> {
    let reads = sequenced_read_count(meta)?;
    let mut jobs = Vec::new();
    for lane in 1..=meta.lane_count()? {
        for sample in meta.sample_names(lane)? {
            let project = meta.sample_project(lane, &sample)?;
            let index = meta.sample_index(lane, &sample);
            for read in 1..=reads {
                let unit = WorkUnit::sample(project.as_str(), sample.as_str(), lane, read)
                    .with_index(index.clone());
                let unit = locate(layout, unit)?;
                if unit.source_files().is_empty() {
                    warn!("No FASTQ files found for {unit}; no read statistics");
                    continue;
                }
                jobs.push(ScreenJob::single(unit));
            }
        }
    }

    info!("Enumerated {} read statistics job(s)", jobs.len());
    Ok(jobs)
}

fn locate(layout: &dyn FastqLocator, unit: WorkUnit) -> Result<WorkUnit> {
    let found =
        layout.locate(unit.project(), unit.sample_name(), unit.index(), unit.lane(), unit.read())?;
    Ok(unit.with_source_files(found.files, found.compression))
}

fn build_job(
    layout: &dyn FastqLocator,
    primary: WorkUnit,
    mate: Option<WorkUnit>,
    sample_genome: Option<String>,
    paired_end_run: bool,
) -> Result<Option<ScreenJob>> {
    let unit = locate(layout, primary)?;
    if unit.source_files().is_empty() {
        warn!("No FASTQ files found for {unit}; skipping");
        return Ok(None);
    }
    let mate = mate.map(|m| locate(layout, m)).transpose()?;
    let mirror_read = (mate.is_none() && paired_end_run).then_some(2);
    Ok(Some(ScreenJob { unit, mate, sample_genome, mirror_read }))
}
