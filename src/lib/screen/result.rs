//! Cross-genome tallies and the per-unit screen result.

use std::any::Any;

use ahash::AHashMap;

use super::parser::{AlignmentGroup, HitCount, ParseSummary};
use crate::metrics::MetricsStore;
use crate::pipeline::CollectedResult;
use crate::validation::MAX_GENOMES;

/// Collector name of the contamination screen; the first component of its run-data keys.
pub const SCREEN_COLLECTOR: &str = "fastqscreen";

/// Counters for one reference genome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenomeCounts {
    /// Genome label.
    pub genome: String,
    /// Reads with a unique placement on this genome.
    pub unique: u64,
    /// Reads with several placements on this genome.
    pub multi: u64,
    /// Unique on this genome and mapped on no other screened genome.
    pub one_hit_one_genome: u64,
    /// Multi-mapped on this genome and mapped on no other screened genome.
    pub multiple_hits_one_genome: u64,
    /// Unique on this genome and mapped on at least one other screened genome.
    pub one_hit_multiple_genomes: u64,
    /// Multi-mapped on this genome and mapped on at least one other screened genome.
    pub multiple_hits_multiple_genomes: u64,
    /// Mapped on this genome and also on the sample's own genome.
    pub excluded: u64,
}

impl GenomeCounts {
    /// Zeroed counters for `genome`.
    #[must_use]
    pub fn new(genome: impl Into<String>) -> Self {
        Self { genome: genome.into(), ..Self::default() }
    }

    /// Reads mapped on this genome.
    #[must_use]
    pub fn mapped(&self) -> u64 {
        self.unique + self.multi
    }
}

/// The screen result of one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// Reads (or read pairs) screened.
    pub reads_processed: u64,
    /// True if reads were screened as pairs.
    pub paired: bool,
    /// The sample's own genome, if known.
    pub sample_genome: Option<String>,
    /// Per-genome counters in screening order.
    pub genomes: Vec<GenomeCounts>,
    /// Reads that mapped on no screened genome.
    pub hit_no_genomes: u64,
    /// Reads that mapped on some screened genome but not on the sample's own genome.
    pub mapped_except_sample_genome: u64,
}

/// `100 * count / total`, or zero when `total` is zero.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn percent(count: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { 100.0 * count as f64 / total as f64 }
}

impl AnalysisResult {
    /// A result with no reads and no genomes.
    #[must_use]
    pub fn empty(paired: bool) -> Self {
        Self {
            reads_processed: 0,
            paired,
            sample_genome: None,
            genomes: Vec::new(),
            hit_no_genomes: 0,
            mapped_except_sample_genome: 0,
        }
    }

    /// Counters for `genome`, if it was screened.
    #[must_use]
    pub fn genome(&self, genome: &str) -> Option<&GenomeCounts> {
        self.genomes.iter().find(|g| g.genome.eq_ignore_ascii_case(genome))
    }

    /// Renders the result as run-data entries under `prefix`.
    ///
    /// Percentages are relative to [`reads_processed`](Self::reads_processed) and are zero
    /// when nothing was processed.
    #[must_use]
    pub fn to_metrics(&self, prefix: &str) -> MetricsStore {
        let total = self.reads_processed;
        let mut store = MetricsStore::new();
        store.put(format!("{prefix}.reads.processed"), total);
        store.put(format!("{prefix}.paired"), self.paired);

        for counts in &self.genomes {
            let key = |suffix: &str| format!("{prefix}.{}.{suffix}", counts.genome);
            let mapped = counts.mapped();
            let unmapped = total.saturating_sub(mapped);
            store.put(key("mapped"), mapped);
            store.put(key("unmapped"), unmapped);
            store.put(key("unique"), counts.unique);
            store.put(key("multi"), counts.multi);
            store.put(key("excluded"), counts.excluded);
            store.put(key("one.hit.one.genome"), counts.one_hit_one_genome);
            store.put(key("multiple.hits.one.genome"), counts.multiple_hits_one_genome);
            store.put(key("one.hit.multiple.genomes"), counts.one_hit_multiple_genomes);
            store.put(key("multiple.hits.multiple.genomes"), counts.multiple_hits_multiple_genomes);
            store.put(key("mapped.percent"), percent(mapped, total));
            store.put(key("unmapped.percent"), percent(unmapped, total));
        }

        store.put(format!("{prefix}.hit.no.genomes"), self.hit_no_genomes);
        store.put(format!("{prefix}.hit.no.genomes.percent"), percent(self.hit_no_genomes, total));
        store.put(
            format!("{prefix}.mappedexceptgenomesample"),
            percent(self.mapped_except_sample_genome, total),
        );
        store.put(
            format!("{prefix}.mappedexceptgenomesample.count"),
            self.mapped_except_sample_genome,
        );
        store
    }
}

impl CollectedResult for AnalysisResult {
    fn collector(&self) -> &str {
        SCREEN_COLLECTOR
    }

    fn metrics(&self, prefix: &str) -> MetricsStore {
        self.to_metrics(prefix)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Accumulates alignment groups from every screened genome of one unit.
///
/// Each read maps to a pair of bit masks (unique placements, multi placements), one bit per
/// genome in screening order, which is why a tally holds at most 64 genomes.
#[derive(Debug)]
pub struct ScreenTally {
    genomes: Vec<String>,
    paired: bool,
    reads: AHashMap<String, (u64, u64)>,
    reads_processed: u64,
}

impl ScreenTally {
    /// Creates an empty tally for `genomes`.
    ///
    /// # Panics
    /// Panics if more than 64 genomes are given; callers validate the genome list first.
    #[must_use]
    pub fn new(genomes: &[String], paired: bool) -> Self {
        assert!(genomes.len() <= MAX_GENOMES, "at most {MAX_GENOMES} genomes can be tallied");
        Self { genomes: genomes.to_vec(), paired, reads: AHashMap::new(), reads_processed: 0 }
    }

    /// Index of `genome` in screening order.
    #[must_use]
    pub fn genome_index(&self, genome: &str) -> Option<usize> {
        self.genomes.iter().position(|g| g.eq_ignore_ascii_case(genome))
    }

    /// Records one genome's reduced group. Groups for unknown genomes are ignored.
    pub fn add(&mut self, group: AlignmentGroup) {
        let Some(index) = self.genome_index(&group.genome) else {
            log::warn!("Ignoring alignment group for unscreened genome '{}'", group.genome);
            return;
        };
        let bit = 1_u64 << index;
        let masks = self.reads.entry(group.read_name).or_insert((0, 0));
        match group.hits {
            HitCount::Unique => masks.0 |= bit,
            HitCount::Multi => masks.1 |= bit,
        }
    }

    /// Records the counters of one parsed genome output.
    ///
    /// Every genome sees the same input reads, so the largest count is kept.
    pub fn record_summary(&mut self, summary: &ParseSummary) {
        self.reads_processed = self.reads_processed.max(summary.reads_processed);
    }

    /// Reads that mapped on at least one genome so far.
    #[must_use]
    pub fn mapped_reads(&self) -> usize {
        self.reads.len()
    }

    /// Computes the final counters.
    #[must_use]
    pub fn into_result(self, sample_genome: Option<&str>) -> AnalysisResult {
        let sample_bit = sample_genome.and_then(|g| self.genome_index(g)).map(|i| 1_u64 << i);
        let mut genomes: Vec<GenomeCounts> = self.genomes.iter().map(GenomeCounts::new).collect();
        let mut mapped_except_sample_genome = 0;

        for &(unique_mask, multi_mask) in self.reads.values() {
            let mapped_on = unique_mask | multi_mask;
            let on_one_genome = mapped_on.count_ones() == 1;
            match sample_bit {
                Some(bit) if mapped_on & bit != 0 => {}
                _ => mapped_except_sample_genome += 1,
            }

            for (index, counts) in genomes.iter_mut().enumerate() {
                let bit = 1_u64 << index;
                if mapped_on & bit == 0 {
                    continue;
                }
                let unique = unique_mask & bit != 0;
                match (unique, on_one_genome) {
                    (true, true) => counts.one_hit_one_genome += 1,
                    (true, false) => counts.one_hit_multiple_genomes += 1,
                    (false, true) => counts.multiple_hits_one_genome += 1,
                    (false, false) => counts.multiple_hits_multiple_genomes += 1,
                }
                if unique {
                    counts.unique += 1;
                } else {
                    counts.multi += 1;
                }
                if let Some(sample) = sample_bit {
                    if sample != bit && mapped_on & sample != 0 {
                        counts.excluded += 1;
                    }
                }
            }
        }

        let mapped_any = self.reads.len() as u64;
        AnalysisResult {
            reads_processed: self.reads_processed,
            paired: self.paired,
            sample_genome: sample_genome.map(str::to_string),
            genomes,
            hit_no_genomes: self.reads_processed.saturating_sub(mapped_any),
            mapped_except_sample_genome,
        }
    }
}
