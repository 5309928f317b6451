//! Streaming reduction of an analysis module's SAM output into per-read hit groups.
//!
//! The parser moves through three states:
//!
//! ```text
//! AwaitingHeader --'@' line--> ConsumingHeader --body line--> ConsumingBody
//!        \______________________body line_____________________/
//! ```
//!
//! Header lines are accumulated until the first body line, at which point the genome
//! description is installed once and its `@SQ` names become the set of valid reference
//! names. Body records are filtered, then counted while they share a read name; when the
//! name changes the read is reduced to a single [`AlignmentGroup`].
//!
//! The module output must be grouped by read name (as an aligner emits it). Records for one
//! read that are not contiguous are counted as separate reads.

use std::io::BufRead;

use ahash::AHashSet;
use noodles::sam::Header;
use noodles::sam::alignment::record::Flags;

use super::filter::FilterChain;
use crate::errors::{Result, ScreenError};

/// Minimum number of tab-separated fields in a SAM body line.
const MIN_SAM_FIELDS: usize = 11;

/// One parsed SAM body line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    /// QNAME
    pub read_name: String,
    /// FLAG
    pub flags: Flags,
    /// RNAME (`*` when unplaced)
    pub reference: String,
    /// 1-based POS (0 when unplaced)
    pub position: u32,
    /// MAPQ, or `None` when unavailable (255)
    pub mapping_quality: Option<u8>,
}

impl AlignmentRecord {
    /// Parses a SAM body line.
    ///
    /// # Errors
    /// Returns [`ScreenError::InvalidAlignment`] if the line has fewer than 11 fields or a
    /// numeric field does not parse.
    pub fn parse(line: &str, line_number: u64) -> Result<Self> {
        let invalid = |reason: String| ScreenError::InvalidAlignment { line: line_number, reason };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < MIN_SAM_FIELDS {
            return Err(invalid(format!(
                "expected at least {MIN_SAM_FIELDS} tab-separated fields, found {}",
                fields.len()
            )));
        }

        let flags = fields[1]
            .parse::<u16>()
            .map_err(|_| invalid(format!("invalid FLAG '{}'", fields[1])))?;
        let position = fields[3]
            .parse::<u32>()
            .map_err(|_| invalid(format!("invalid POS '{}'", fields[3])))?;
        let mapq = fields[4]
            .parse::<u8>()
            .map_err(|_| invalid(format!("invalid MAPQ '{}'", fields[4])))?;

        Ok(Self {
            read_name: fields[0].to_string(),
            flags: Flags::from(flags),
            reference: fields[2].to_string(),
            position,
            mapping_quality: (mapq != 255).then_some(mapq),
        })
    }
}

/// How many surviving alignments a read had on one genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitCount {
    /// Exactly one placement (one pair in paired mode).
    Unique = 1,
    /// More than one placement.
    Multi = 2,
}

/// The reduction of all surviving records of one read on one genome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentGroup {
    /// The read name shared by the group's records.
    pub read_name: String,
    /// Unique or multi-mapped.
    pub hits: HitCount,
    /// The genome label the records were aligned to.
    pub genome: String,
}

/// Counters describing one parsed module output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// The genome label of the output.
    pub genome: String,
    /// Distinct reads seen, whether or not any record survived filtering.
    pub reads_processed: u64,
    /// Body records seen.
    pub records_processed: u64,
    /// Body records rejected by the filter chain.
    pub records_filtered: u64,
    /// Groups emitted as [`HitCount::Unique`].
    pub unique: u64,
    /// Groups emitted as [`HitCount::Multi`].
    pub multi: u64,
}

/// The read currently being consumed and how many of its records survived filtering.
///
/// Only the count is needed to classify a read, so memory use is constant however many
/// records an aligner reports for one read.
#[derive(Debug, Default)]
struct ReadBuffer {
    read_name: Option<String>,
    surviving: usize,
}

impl ReadBuffer {
    fn is_current(&self, read_name: &str) -> bool {
        self.read_name.as_deref() == Some(read_name)
    }

    fn start(&mut self, read_name: &str) {
        self.read_name = Some(read_name.to_string());
        self.surviving = 0;
    }

    fn push(&mut self) {
        self.surviving += 1;
    }

    /// Removes the current read, returning its name and surviving record count.
    fn take(&mut self) -> Option<(String, usize)> {
        let name = self.read_name.take()?;
        Some((name, std::mem::take(&mut self.surviving)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    AwaitingHeader,
    ConsumingHeader,
    ConsumingBody,
}

/// A single-use reducer of one genome's SAM output.
#[derive(Debug)]
pub struct ResultParser {
    genome: String,
    paired: bool,
    filters: FilterChain,
    state: ParserState,
    header_text: String,
    references: Option<AHashSet<String>>,
    buffer: ReadBuffer,
    line_number: u64,
    summary: ParseSummary,
}

impl ResultParser {
    /// Creates a parser for the output of `genome`.
    ///
    /// In paired mode a read is unique when exactly two records survive (one per mate);
    /// in single-end mode when exactly one does.
    #[must_use]
    pub fn new(genome: impl Into<String>, paired: bool, filters: FilterChain) -> Self {
        let genome = genome.into();
        Self {
            summary: ParseSummary { genome: genome.clone(), ..ParseSummary::default() },
            genome,
            paired,
            filters,
            state: ParserState::AwaitingHeader,
            header_text: String::new(),
            references: None,
            buffer: ReadBuffer::default(),
            line_number: 0,
        }
    }

    /// The reference names declared by the installed genome description, if any.
    #[must_use]
    pub fn references(&self) -> Option<&AHashSet<String>> {
        self.references.as_ref()
    }

    /// Consumes one line of module output, emitting a group to `sink` whenever a read ends.
    ///
    /// # Errors
    /// Returns [`ScreenError::InvalidAlignment`] for a malformed line, a header line after
    /// body lines, an unparseable header, or a reference name not in the header.
    pub fn push_line<F: FnMut(AlignmentGroup)>(&mut self, line: &str, sink: &mut F) -> Result<()> {
        self.line_number += 1;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(());
        }

        if line.starts_with('@') {
            return match self.state {
                ParserState::ConsumingBody => Err(ScreenError::InvalidAlignment {
                    line: self.line_number,
                    reason: "header line found after alignment records".to_string(),
                }),
                ParserState::AwaitingHeader | ParserState::ConsumingHeader => {
                    self.state = ParserState::ConsumingHeader;
                    self.header_text.push_str(line);
                    self.header_text.push('\n');
                    Ok(())
                }
            };
        }

        if self.state != ParserState::ConsumingBody {
            self.install_description()?;
            self.state = ParserState::ConsumingBody;
        }

        let record = AlignmentRecord::parse(line, self.line_number)?;
        if let Some(references) = &self.references {
            if record.reference != "*" && !references.contains(&record.reference) {
                return Err(ScreenError::InvalidAlignment {
                    line: self.line_number,
                    reason: format!(
                        "reference '{}' is not declared in the header for {}",
                        record.reference, self.genome
                    ),
                });
            }
        }

        if !self.buffer.is_current(&record.read_name) {
            self.flush(sink);
            self.buffer.start(&record.read_name);
        }

        self.summary.records_processed += 1;
        if self.filters.accepts(&record) {
            self.buffer.push();
        } else {
            self.summary.records_filtered += 1;
        }
        Ok(())
    }

    /// Flushes the last buffered read and returns the counters.
    #[must_use]
    pub fn finish<F: FnMut(AlignmentGroup)>(mut self, sink: &mut F) -> ParseSummary {
        self.flush(sink);
        self.summary
    }

    /// Parses a whole module output.
    ///
    /// # Errors
    /// Returns an error if reading fails or any line is invalid.
    pub fn parse_reader<R: BufRead, F: FnMut(AlignmentGroup)>(
        mut self,
        reader: R,
        sink: &mut F,
    ) -> Result<ParseSummary> {
        for line in reader.lines() {
            let line = line.map_err(|e| ScreenError::InvalidAlignment {
                line: self.line_number + 1,
                reason: format!("failed to read module output: {e}"),
            })?;
            self.push_line(&line, sink)?;
        }
        Ok(self.finish(sink))
    }

    fn install_description(&mut self) -> Result<()> {
        if self.header_text.is_empty() {
            return Ok(());
        }
        let header: Header = self.header_text.parse().map_err(|e| ScreenError::InvalidAlignment {
            line: self.line_number,
            reason: format!("invalid header for {}: {e}", self.genome),
        })?;
        let names: AHashSet<String> =
            header.reference_sequences().keys().map(ToString::to_string).collect();
        self.references = (!names.is_empty()).then_some(names);
        self.header_text.clear();
        Ok(())
    }

    fn flush<F: FnMut(AlignmentGroup)>(&mut self, sink: &mut F) {
        let Some((read_name, surviving)) = self.buffer.take() else { return };
        self.summary.reads_processed += 1;
        if surviving == 0 {
            return;
        }
        let unique_size = if self.paired { 2 } else { 1 };
        let hits = if surviving == unique_size { HitCount::Unique } else { HitCount::Multi };
        match hits {
            HitCount::Unique => self.summary.unique += 1,
            HitCount::Multi => self.summary.multi += 1,
        }
        sink(AlignmentGroup { read_name, hits, genome: self.genome.clone() });
    }
}
