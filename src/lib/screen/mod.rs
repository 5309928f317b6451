//! Contamination screening of one job against a set of reference genomes.
//!
//! - [`module`] - the [`AnalysisModule`] seam and the external aligner implementation
//! - [`invoker`] - runs the module once per genome and reduces its output
//! - [`parser`] - streaming reduction of SAM text into per-read hit groups
//! - [`filter`] - record filters applied before grouping
//! - [`result`] - cross-genome tallies and the metrics they produce

pub mod filter;
pub mod invoker;
pub mod module;
pub mod parser;
pub mod result;

pub use filter::{AlignmentFilter, FilterChain, FilterOptions};
pub use invoker::{AnalysisInvoker, Invocation, SkipReason};
pub use module::{
    AnalysisModule, DEFAULT_PAIRED_ARGS, DEFAULT_PROGRAM, DEFAULT_SINGLE_ARGS, ExternalAnalysisModule,
    ModuleRequest,
};
pub use parser::{AlignmentGroup, AlignmentRecord, HitCount, ParseSummary, ResultParser};
pub use result::{AnalysisResult, GenomeCounts, SCREEN_COLLECTOR, ScreenTally};
