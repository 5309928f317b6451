//! Work-unit descriptors.
//!
//! A [`WorkUnit`] identifies one (project, sample, lane, read) combination and the FASTQ files
//! that hold its reads. A [`ScreenJob`] is what the scheduler actually runs: a primary unit,
//! its paired mate when screening in paired mode, and the bookkeeping needed to write the
//! results back into the run data.

use std::fmt;
use std::path::{Path, PathBuf};

/// Compression applied to a unit's source FASTQ files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionKind {
    /// Plain text
    #[default]
    None,
    /// gzip (including multi-member and BGZF files)
    Gzip,
    /// bzip2 (including multi-stream files)
    Bzip2,
}

impl CompressionKind {
    /// Infers the compression from a FASTQ file name.
    ///
    /// Returns `None` when the name does not look like a FASTQ file.
    ///
    /// # Example
    /// ```
    /// use fgscreen_lib::unit::CompressionKind;
    ///
    /// assert_eq!(CompressionKind::from_path("s1_L001_R1_001.fastq.gz"), Some(CompressionKind::Gzip));
    /// assert_eq!(CompressionKind::from_path("s1_L001_R1_001.fq.bz2"), Some(CompressionKind::Bzip2));
    /// assert_eq!(CompressionKind::from_path("s1_L001_R1_001.fastq"), Some(CompressionKind::None));
    /// assert_eq!(CompressionKind::from_path("SampleSheet.csv"), None);
    /// ```
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_str()?.to_ascii_lowercase();
        let (stem, kind) = if let Some(stem) = name.strip_suffix(".gz") {
            (stem, Self::Gzip)
        } else if let Some(stem) = name.strip_suffix(".bz2") {
            (stem, Self::Bzip2)
        } else {
            (name.as_str(), Self::None)
        };
        (stem.ends_with(".fastq") || stem.ends_with(".fq")).then_some(kind)
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gzip"),
            Self::Bzip2 => write!(f, "bzip2"),
        }
    }
}

/// One (project, sample, lane, read) combination and its source files.
///
/// A unit is immutable once built; the `with_*` methods consume and return it so that
/// construction reads as a single expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    project: String,
    sample: Option<String>,
    index: Option<String>,
    lane: u32,
    read: u32,
    is_paired_mate: bool,
    source_files: Vec<PathBuf>,
    compression: CompressionKind,
    staged: bool,
}

impl WorkUnit {
    /// Creates a unit for a demultiplexed sample.
    ///
    /// # Panics
    /// Panics if `lane` or `read` is zero.
    #[must_use]
    pub fn sample(project: impl Into<String>, sample: impl Into<String>, lane: u32, read: u32) -> Self {
        Self::build(project.into(), Some(sample.into()), lane, read)
    }

    /// Creates the per-lane unit holding reads whose index matched no sample.
    ///
    /// # Panics
    /// Panics if `lane` or `read` is zero.
    #[must_use]
    pub fn undetermined(lane: u32, read: u32) -> Self {
        Self::build(String::new(), None, lane, read)
    }

    fn build(project: String, sample: Option<String>, lane: u32, read: u32) -> Self {
        assert!(lane >= 1, "lane numbers start at 1");
        assert!(read >= 1, "read numbers start at 1");
        Self {
            project,
            sample,
            index: None,
            lane,
            read,
            is_paired_mate: false,
            source_files: Vec::new(),
            compression: CompressionKind::None,
            staged: false,
        }
    }

    /// Sets the sample index sequence (used only for naming reports).
    #[must_use]
    pub fn with_index(mut self, index: Option<String>) -> Self {
        self.index = index.filter(|i| !i.trim().is_empty());
        self
    }

    /// Sets the ordered source files and their compression.
    #[must_use]
    pub fn with_source_files(mut self, files: Vec<PathBuf>, compression: CompressionKind) -> Self {
        self.source_files = files;
        self.compression = compression;
        self
    }

    /// Marks this unit as the second read of a paired job.
    #[must_use]
    pub fn as_paired_mate(mut self) -> Self {
        self.is_paired_mate = true;
        self
    }

    /// Marks the source files as run-owned copies that are deleted on release.
    #[must_use]
    pub fn with_staged_sources(mut self, staged: bool) -> Self {
        self.staged = staged;
        self
    }

    /// The project name (empty for undetermined units).
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The sample name, or `None` for the undetermined unit.
    #[must_use]
    pub fn sample_name(&self) -> Option<&str> {
        self.sample.as_deref()
    }

    /// The sample index sequence, if any.
    #[must_use]
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// 1-based lane number.
    #[must_use]
    pub fn lane(&self) -> u32 {
        self.lane
    }

    /// 1-based read number among the non-indexed reads.
    #[must_use]
    pub fn read(&self) -> u32 {
        self.read
    }

    /// True if this unit is the mate of a paired job.
    #[must_use]
    pub fn is_paired_mate(&self) -> bool {
        self.is_paired_mate
    }

    /// True if this is the undetermined unit of its lane.
    #[must_use]
    pub fn is_undetermined(&self) -> bool {
        self.sample.is_none()
    }

    /// The ordered source FASTQ files.
    #[must_use]
    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    /// Compression of the source files.
    #[must_use]
    pub fn compression(&self) -> CompressionKind {
        self.compression
    }

    /// True if the source files are deleted when the unit is released.
    #[must_use]
    pub fn has_staged_sources(&self) -> bool {
        self.staged
    }

    /// A file-name-safe identifier that is unique within a run.
    ///
    /// # Example
    /// ```
    /// use fgscreen_lib::unit::WorkUnit;
    ///
    /// assert_eq!(WorkUnit::sample("P1", "s1", 3, 1).key(), "P1_s1_L003_R1");
    /// assert_eq!(WorkUnit::undetermined(2, 2).key(), "undetermined_L002_R2");
    /// ```
    #[must_use]
    pub fn key(&self) -> String {
        let raw = match &self.sample {
            Some(sample) => format!("{}_{}_L{:03}_R{}", self.project, sample, self.lane, self.read),
            None => format!("undetermined_L{:03}_R{}", self.lane, self.read),
        };
        raw.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect()
    }

    /// The run-data key prefix under which `collector` stores this unit's results.
    #[must_use]
    pub fn metric_prefix(&self, collector: &str) -> String {
        self.metric_prefix_for_read(collector, self.read)
    }

    /// The run-data key prefix this unit would have for another read number.
    ///
    /// # Example
    /// ```
    /// use fgscreen_lib::unit::WorkUnit;
    ///
    /// let unit = WorkUnit::sample("P1", "s1", 1, 1);
    /// assert_eq!(unit.metric_prefix("fastqscreen"), "fastqscreen.lane1.sample.s1.read1.s1");
    /// assert_eq!(unit.metric_prefix_for_read("fastqscreen", 2), "fastqscreen.lane1.sample.s1.read2.s1");
    /// assert_eq!(unit.metric_prefix("fastqc"), "fastqc.lane1.sample.s1.read1.s1");
    /// assert_eq!(
    ///     WorkUnit::undetermined(4, 1).metric_prefix("fastqscreen"),
    ///     "fastqscreen.lane4.undetermined.read1"
    /// );
    /// ```
    #[must_use]
    pub fn metric_prefix_for_read(&self, collector: &str, read: u32) -> String {
        match &self.sample {
            Some(sample) => {
                format!("{collector}.lane{}.sample.{sample}.read{read}.{sample}", self.lane)
            }
            None => format!("{collector}.lane{}.undetermined.read{read}", self.lane),
        }
    }

    /// The bcl2fastq-style file stem used to name this unit's reports.
    #[must_use]
    pub fn report_stem(&self) -> String {
        match &self.sample {
            Some(sample) => format!(
                "{sample}_{}_L{:03}_R{}",
                self.index.as_deref().unwrap_or("NoIndex"),
                self.lane,
                self.read
            ),
            None => format!("lane{}_Undetermined_L{:03}_R{}", self.lane, self.lane, self.read),
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sample {
            Some(sample) => write!(
                f,
                "project {} sample {} lane {} read {}",
                self.project, sample, self.lane, self.read
            ),
            None => write!(f, "undetermined lane {} read {}", self.lane, self.read),
        }
    }
}

/// A unit of scheduling: one primary unit plus what is needed to analyse and record it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenJob {
    /// The unit whose reads are screened.
    pub unit: WorkUnit,
    /// The read-2 unit screened together with `unit` in paired mode.
    pub mate: Option<WorkUnit>,
    /// The sample's own reference genome, excluded when measuring contamination.
    pub sample_genome: Option<String>,
    /// Another read number whose prefix receives a copy of the results.
    pub mirror_read: Option<u32>,
}

impl ScreenJob {
    /// Creates a single-end job with no mirroring and no sample genome.
    #[must_use]
    pub fn single(unit: WorkUnit) -> Self {
        Self { unit, mate: None, sample_genome: None, mirror_read: None }
    }

    /// True if this job screens a read pair.
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.mate.is_some()
    }

    /// Every metric prefix `collector` writes to for this job.
    #[must_use]
    pub fn metric_prefixes(&self, collector: &str) -> Vec<String> {
        let mut prefixes = vec![self.unit.metric_prefix(collector)];
        if let Some(read) = self.mirror_read {
            prefixes.push(self.unit.metric_prefix_for_read(collector, read));
        }
        prefixes
    }

    /// The units reported for this job: the primary unit, then its mirrored read if any.
    ///
    /// The mirrored unit carries no source files.
    #[must_use]
    pub fn report_units(&self) -> Vec<WorkUnit> {
        let mut units = vec![self.unit.clone()];
        if let Some(read) = self.mirror_read {
            units.push(WorkUnit {
                read,
                is_paired_mate: false,
                source_files: Vec::new(),
                staged: false,
                ..self.unit.clone()
            });
        }
        units
    }
}

impl fmt::Display for ScreenJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unit)?;
        if let Some(mate) = &self.mate {
            write!(f, " (paired with read {})", mate.read())?;
        }
        Ok(())
    }
}
