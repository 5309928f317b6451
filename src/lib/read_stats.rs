//! Read-content statistics, collected per sample and read alongside the contamination screen.
//!
//! Each job's FASTQ chunks are streamed once through [`seq_io`]; nothing is written to scratch.
//! Besides a few basic counts, three checks are reported as `error`/`warning` flags:
//!
//! | Check                         | Warning                  | Error                    |
//! |-------------------------------|--------------------------|--------------------------|
//! | `basic.statistics`            | never                    | never                    |
//! | `per.sequence.quality.scores` | modal mean quality <= 27 | modal mean quality <= 20 |
//! | `per.base.n.content`          | any position > 5% N      | any position > 20% N     |
//!
//! Results are stored under `fastqc.lane<L>.sample.<S>.read<R>.<S>`.

use std::any::Any;
use std::io;
use std::sync::Arc;

use log::debug;
use seq_io::fastq::{Reader as FastqReader, Record};

use crate::errors::{Result, ScreenError};
use crate::metrics::{MetricsStore, SharedMetricsStore};
use crate::pipeline::{CancellationToken, CollectedResult, JobOutcome, JobProcessor, merge_result};
use crate::scratch::open_source;
use crate::screen::result::percent;
use crate::unit::ScreenJob;

/// Collector name of the read statistics; the first component of their run-data keys.
pub const READ_STATS_COLLECTOR: &str = "fastqc";

/// Records read between two cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 100_000;

const PHRED_OFFSET: u8 = 33;

const QUALITY_WARN: usize = 27;
const QUALITY_ERROR: usize = 20;
const N_CONTENT_WARN: f64 = 5.0;
const N_CONTENT_ERROR: f64 = 20.0;

/// Outcome of one check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckStatus {
    /// The check failed.
    pub error: bool,
    /// The check passed with a warning.
    pub warning: bool,
}

impl CheckStatus {
    fn from_thresholds(warn: bool, error: bool) -> Self {
        Self { error, warning: warn && !error }
    }
}

/// Statistics over every read of one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadStats {
    /// Reads seen.
    pub sequences: u64,
    /// Shortest read, zero when no reads were seen.
    pub min_length: usize,
    /// Longest read.
    pub max_length: usize,
    gc_bases: u64,
    called_bases: u64,
    /// Bases seen at each position.
    bases_at: Vec<u64>,
    /// `N` calls seen at each position.
    n_at: Vec<u64>,
    /// Reads by truncated mean base quality.
    mean_quality: Vec<u64>,
}

impl ReadStats {
    /// Adds one read. `qual` is Phred+33 encoded.
    pub fn add(&mut self, seq: &[u8], qual: &[u8]) {
        let length = seq.len();
        self.min_length = if self.sequences == 0 { length } else { self.min_length.min(length) };
        self.max_length = self.max_length.max(length);
        self.sequences += 1;

        if self.bases_at.len() < length {
            self.bases_at.resize(length, 0);
            self.n_at.resize(length, 0);
        }
        for (position, base) in seq.iter().enumerate() {
            self.bases_at[position] += 1;
            match base.to_ascii_uppercase() {
                b'G' | b'C' => {
                    self.gc_bases += 1;
                    self.called_bases += 1;
                }
                b'A' | b'T' => self.called_bases += 1,
                b'N' => self.n_at[position] += 1,
                _ => {}
            }
        }

        if !qual.is_empty() {
            let total: usize = qual.iter().map(|q| usize::from(q.saturating_sub(PHRED_OFFSET))).sum();
            let mean = total / qual.len();
            if self.mean_quality.len() <= mean {
                self.mean_quality.resize(mean + 1, 0);
            }
            self.mean_quality[mean] += 1;
        }
    }

    /// Percent of called bases that are `G` or `C`.
    #[must_use]
    pub fn gc_percent(&self) -> f64 {
        percent(self.gc_bases, self.called_bases)
    }

    /// The most common truncated mean read quality, if any read was seen.
    #[must_use]
    pub fn modal_mean_quality(&self) -> Option<usize> {
        // Ties go to the higher quality.
        self.mean_quality
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .max_by_key(|(quality, count)| (**count, *quality))
            .map(|(quality, _)| quality)
    }

    /// The highest percentage of `N` calls at any position.
    #[must_use]
    pub fn max_n_percent(&self) -> f64 {
        self.n_at
            .iter()
            .zip(&self.bases_at)
            .map(|(n, bases)| percent(*n, *bases))
            .fold(0.0, f64::max)
    }

    /// The status of each check, in report order.
    #[must_use]
    pub fn checks(&self) -> [(&'static str, CheckStatus); 3] {
        let quality = match self.modal_mean_quality() {
            Some(q) => CheckStatus::from_thresholds(q <= QUALITY_WARN, q <= QUALITY_ERROR),
            None => CheckStatus::default(),
        };
        let n_percent = self.max_n_percent();
        [
            ("basic.statistics", CheckStatus::default()),
            ("per.sequence.quality.scores", quality),
            (
                "per.base.n.content",
                CheckStatus::from_thresholds(n_percent > N_CONTENT_WARN, n_percent > N_CONTENT_ERROR),
            ),
        ]
    }

    /// Renders the statistics as run-data entries under `prefix`.
    #[must_use]
    pub fn to_metrics(&self, prefix: &str) -> MetricsStore {
        let mut store = MetricsStore::new();
        let basic = format!("{prefix}.basic.statistics");
        store.put(format!("{basic}.total.sequences"), self.sequences);
        store.put(format!("{basic}.sequence.length.min"), self.min_length);
        store.put(format!("{basic}.sequence.length.max"), self.max_length);
        store.put(format!("{basic}.gc.percent"), format!("{:.2}", self.gc_percent()));
        for (check, status) in self.checks() {
            store.put(format!("{prefix}.{check}.error"), status.error);
            store.put(format!("{prefix}.{check}.warning"), status.warning);
        }
        store
    }
}

impl CollectedResult for ReadStats {
    fn collector(&self) -> &str {
        READ_STATS_COLLECTOR
    }

    fn metrics(&self, prefix: &str) -> MetricsStore {
        self.to_metrics(prefix)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Streams a job's FASTQ chunks into [`ReadStats`] and merges them into the shared store.
pub struct ReadStatsProcessor {
    store: Arc<SharedMetricsStore>,
}

impl ReadStatsProcessor {
    /// Creates a processor writing results into `store`.
    #[must_use]
    pub fn new(store: Arc<SharedMetricsStore>) -> Self {
        Self { store }
    }
}

impl JobProcessor for ReadStatsProcessor {
    fn process(&self, job: &ScreenJob, cancel: &CancellationToken) -> Result<JobOutcome> {
        let unit = &job.unit;
        let Some(first) = unit.source_files().first() else {
            return Err(ScreenError::FileProcessing {
                unit: unit.to_string(),
                path: std::path::PathBuf::new(),
                source: io::Error::new(io::ErrorKind::NotFound, "unit has no source files"),
            });
        };
        debug!("Collecting read statistics for {unit} from {}", first.display());

        let mut stats = ReadStats::default();
        for path in unit.source_files() {
            let failed = |source: io::Error| ScreenError::FileProcessing {
                unit: unit.to_string(),
                path: path.clone(),
                source,
            };
            let mut reader = FastqReader::new(open_source(path, unit.compression()).map_err(failed)?);
            while let Some(record) = reader.next() {
                let record =
                    record.map_err(|e| failed(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
                stats.add(record.seq(), record.qual());
                if stats.sequences % CANCEL_CHECK_INTERVAL == 0 {
                    cancel.check()?;
                }
            }
        }
        cancel.check()?;

        merge_result(&self.store, job, &stats)?;
        Ok(JobOutcome::Completed(Box::new(stats)))
    }
}
