//! Run-data storage shared by the screening workers.
//!
//! - [`SharedMetricsStore`] - the single mutex-guarded store that workers merge results into
//! - [`load_metrics`] / [`save_metrics`] - `key=value` file I/O

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fgoxide::io::Io;
use parking_lot::Mutex;

pub use fgscreen_metrics::{MetricsError, MetricsStore, format, normalize_key};

/// A [`MetricsStore`] that many workers can update concurrently.
///
/// Every update takes the lock once, so a merge of one unit's results is applied as a whole
/// and never interleaves with another unit's merge. Once [sealed](Self::seal), the store
/// rejects further updates, so a worker still running after its run was abandoned cannot
/// change results that have already been read out.
#[derive(Debug, Default)]
pub struct SharedMetricsStore {
    inner: Mutex<Guarded>,
}

#[derive(Debug, Default)]
struct Guarded {
    store: MetricsStore,
    sealed: bool,
}

impl SharedMetricsStore {
    /// Wraps an existing store.
    #[must_use]
    pub fn new(store: MetricsStore) -> Self {
        Self { inner: Mutex::new(Guarded { store, sealed: false }) }
    }

    /// Merges `other` into the shared store under a single lock acquisition.
    ///
    /// Returns false, leaving the store unchanged, if the store has been sealed.
    #[must_use]
    pub fn merge(&self, other: MetricsStore) -> bool {
        let mut inner = self.inner.lock();
        if inner.sealed {
            return false;
        }
        inner.store.merge(other);
        true
    }

    /// Stores a single value. Ignored once the store is sealed.
    pub fn put(&self, key: impl AsRef<str>, value: impl Display) {
        let mut inner = self.inner.lock();
        if !inner.sealed {
            inner.store.put(key, value);
        }
    }

    /// Returns the raw value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().store.get(key).map(str::to_string)
    }

    /// Number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().store.len()
    }

    /// Returns true if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().store.is_empty()
    }

    /// Returns true once [`seal`](Self::seal) has been called.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.lock().sealed
    }

    /// A copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> MetricsStore {
        self.inner.lock().store.clone()
    }

    /// Rejects every later update and returns the final contents.
    #[must_use]
    pub fn seal(&self) -> MetricsStore {
        let mut inner = self.inner.lock();
        inner.sealed = true;
        inner.store.clone()
    }

    /// Consumes the wrapper, returning the store.
    #[must_use]
    pub fn into_inner(self) -> MetricsStore {
        self.inner.into_inner().store
    }
}

/// Reads a `key=value` run-data file.
///
/// # Errors
/// Returns an error if the file cannot be opened or read
pub fn load_metrics<P: AsRef<Path>>(path: P) -> Result<MetricsStore> {
    let path = path.as_ref();
    let reader = Io::default()
        .new_reader(&path)
        .with_context(|| format!("Failed to open run data: {}", path.display()))?;
    format::read_from(reader).with_context(|| format!("Failed to read run data: {}", path.display()))
}

/// Writes `store` as a `key=value` run-data file.
///
/// The data is written to `<path>.tmp` and renamed into place once complete, so a reader
/// never sees a partially written file.
///
/// # Errors
/// Returns an error if the file cannot be written or renamed
pub fn save_metrics<P: AsRef<Path>>(path: P, store: &MetricsStore) -> Result<()> {
    let path = path.as_ref();
    let tmp = tmp_path(path);

    let written = Io::default()
        .new_writer(&tmp)
        .map_err(anyhow::Error::from)
        .and_then(|writer| format::write_to(store, writer).map_err(anyhow::Error::from));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.context(format!("Failed to write run data: {}", path.display())));
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move run data into place: {}", path.display()))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
