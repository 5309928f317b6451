//! Record-level filters applied before alignments are grouped by read.
//!
//! A [`FilterChain`] holds an ordered list of [`AlignmentFilter`]s; a record is kept only if
//! every filter accepts it. [`RemoveUnmapped`] is always the first filter of a chain.

use super::parser::AlignmentRecord;

/// A predicate over parsed alignment records.
pub trait AlignmentFilter: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Returns true if the record should be kept.
    fn accepts(&self, record: &AlignmentRecord) -> bool;
}

/// Drops records whose unmapped flag (0x4) is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveUnmapped;

impl AlignmentFilter for RemoveUnmapped {
    fn name(&self) -> &'static str {
        "remove-unmapped"
    }

    fn accepts(&self, record: &AlignmentRecord) -> bool {
        !record.flags.is_unmapped()
    }
}

/// Drops records that failed vendor quality checks (0x200).
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveQcFail;

impl AlignmentFilter for RemoveQcFail {
    fn name(&self) -> &'static str {
        "remove-qc-fail"
    }

    fn accepts(&self, record: &AlignmentRecord) -> bool {
        !record.flags.is_qc_fail()
    }
}

/// Drops secondary (0x100) and supplementary (0x800) alignments.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveSecondary;

impl AlignmentFilter for RemoveSecondary {
    fn name(&self) -> &'static str {
        "remove-secondary"
    }

    fn accepts(&self, record: &AlignmentRecord) -> bool {
        !record.flags.is_secondary() && !record.flags.is_supplementary()
    }
}

/// Drops records whose mapping quality is below a threshold.
///
/// A missing mapping quality (255) never passes a non-zero threshold.
#[derive(Debug, Clone, Copy)]
pub struct MinMappingQuality(pub u8);

impl AlignmentFilter for MinMappingQuality {
    fn name(&self) -> &'static str {
        "min-mapping-quality"
    }

    fn accepts(&self, record: &AlignmentRecord) -> bool {
        match record.mapping_quality {
            Some(mapq) => mapq >= self.0,
            None => self.0 == 0,
        }
    }
}

/// Options selecting the optional filters of a [`FilterChain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Drop QC-failed records.
    pub remove_qc_fail: bool,
    /// Drop secondary and supplementary records.
    pub remove_secondary: bool,
    /// Minimum mapping quality, if any.
    pub min_mapping_quality: Option<u8>,
}

/// An ordered conjunction of filters.
pub struct FilterChain {
    filters: Vec<Box<dyn AlignmentFilter>>,
}

impl FilterChain {
    /// A chain holding only [`RemoveUnmapped`].
    #[must_use]
    pub fn new() -> Self {
        Self { filters: vec![Box::new(RemoveUnmapped)] }
    }

    /// Builds the chain selected by `options`.
    #[must_use]
    pub fn from_options(options: &FilterOptions) -> Self {
        let mut chain = Self::new();
        if options.remove_qc_fail {
            chain = chain.with(RemoveQcFail);
        }
        if options.remove_secondary {
            chain = chain.with(RemoveSecondary);
        }
        if let Some(q) = options.min_mapping_quality {
            chain = chain.with(MinMappingQuality(q));
        }
        chain
    }

    /// Appends a filter.
    #[must_use]
    pub fn with<F: AlignmentFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Returns true if every filter accepts `record`.
    #[must_use]
    pub fn accepts(&self, record: &AlignmentRecord) -> bool {
        self.filters.iter().all(|f| f.accepts(record))
    }

    /// Names of the installed filters, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain").field("filters", &self.names()).finish()
    }
}
