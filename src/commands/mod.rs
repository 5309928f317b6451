//! CLI command implementations for fgscreen.
//!
//! - [`screen`] - Screen a run's FASTQs against reference genomes and record the results
//! - [`common`] - Option groups shared by commands

pub mod command;
pub mod common;
pub mod screen;
