#![deny(unsafe_code)]

//! Flat key/value metrics store ("run data") for fgscreen.
//!
//! This crate provides:
//! - [`MetricsStore`], an insertion-ordered mapping of normalized keys to string values with
//!   typed accessors that never guess defaults
//! - [`MetricsError`] for missing or malformed values
//! - [`format`] for the newline-delimited `key=value` serialization
//!
//! Keys are trimmed and lower-cased on every read and write, so `Run.Info.Read.Count` and
//! `run.info.read.count` address the same entry.
//!
//! # Example
//! ```
//! use fgscreen_metrics::MetricsStore;
//!
//! let mut store = MetricsStore::new();
//! store.put("Run.Info.Read.Count", 3);
//! assert_eq!(store.get_i32("run.info.read.count").unwrap(), 3);
//! assert!(store.get_i32("run.info.lane.count").is_err());
//! ```

pub mod error;
pub mod format;
pub mod store;

pub use error::{MetricsError, Result};
pub use store::{MetricsStore, normalize_key};
