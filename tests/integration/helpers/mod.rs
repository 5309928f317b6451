//! Helper utilities for integration tests.

pub mod run_generator;

pub use run_generator::*;
