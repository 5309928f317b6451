//! Scratch-space management for uncompressed unit inputs.
//!
//! Each unit's source FASTQ chunks are decompressed and concatenated into a single scratch
//! file, `fgscreen_<unit key>.fastq`. The file is written under a `.tmp` name, synced and
//! renamed, so a final-named file is always complete. Files are removed again when the unit
//! is released, normally through a [`ScratchLease`].
//!
//! [`TemporaryResourceManager::cleanup_all`] closes the manager: a worker that outlives its
//! run cannot leave a new scratch file behind afterwards.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::errors::{Result, ScreenError};
use crate::logging::format_gib;
use crate::unit::{CompressionKind, ScreenJob, WorkUnit};

const IO_BUFFER_SIZE: usize = 1024 * 1024;

/// Owns the scratch files of every unit in a run.
#[derive(Debug)]
pub struct TemporaryResourceManager {
    scratch_dir: PathBuf,
    tracked: Mutex<Tracked>,
}

#[derive(Debug, Default)]
struct Tracked {
    files: AHashMap<PathBuf, u64>,
    closed: bool,
}

impl TemporaryResourceManager {
    /// Creates a manager writing into `scratch_dir`, which must exist.
    #[must_use]
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self { scratch_dir: scratch_dir.into(), tracked: Mutex::new(Tracked::default()) }
    }

    /// The scratch directory.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// The scratch file a unit is materialized into.
    #[must_use]
    pub fn scratch_path(&self, unit: &WorkUnit) -> PathBuf {
        self.scratch_dir.join(format!("fgscreen_{}.fastq", unit.key()))
    }

    /// Decompresses and concatenates the unit's source files into its scratch file.
    ///
    /// An existing scratch file is reused as-is.
    ///
    /// # Errors
    /// Returns [`ScreenError::FileProcessing`] if a source file is missing or unreadable or the
    /// scratch file cannot be written; no partial scratch file is left behind. Returns
    /// [`ScreenError::Cancelled`] once [`cleanup_all`](Self::cleanup_all) has run.
    pub fn materialize(&self, unit: &WorkUnit) -> Result<PathBuf> {
        let path = self.scratch_path(unit);
        if path.is_file() {
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let mut tracked = self.tracked.lock();
            if tracked.closed {
                return Err(ScreenError::Cancelled);
            }
            debug!("Reusing scratch file {} for {unit}", path.display());
            tracked.files.insert(path.clone(), size);
            return Ok(path);
        }
        if self.tracked.lock().closed {
            return Err(ScreenError::Cancelled);
        }

        if unit.source_files().is_empty() {
            return Err(ScreenError::FileProcessing {
                unit: unit.to_string(),
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "unit has no source files"),
            });
        }

        let tmp = tmp_path(&path);
        let written = write_concatenated(unit.source_files(), unit.compression(), &tmp)
            .and_then(|size| self.publish(&tmp, &path, size));

        match written {
            Ok(Some(size)) => {
                info!(
                    "Uncompressed {} file(s) for {unit} into {} ({})",
                    unit.source_files().len(),
                    path.display(),
                    format_gib(size)
                );
                Ok(path)
            }
            Ok(None) => {
                debug!("Discarded scratch file for {unit}: scratch space already cleaned up");
                remove_if_exists(&tmp);
                Err(ScreenError::Cancelled)
            }
            Err((failed, source)) => {
                remove_if_exists(&tmp);
                Err(ScreenError::FileProcessing { unit: unit.to_string(), path: failed, source })
            }
        }
    }

    /// Renames a finished `.tmp` file into place and tracks it, unless the manager is closed.
    ///
    /// The rename happens under the lock, so [`cleanup_all`](Self::cleanup_all) either sees
    /// the file or the file is never created.
    fn publish(
        &self,
        tmp: &Path,
        path: &Path,
        size: u64,
    ) -> std::result::Result<Option<u64>, (PathBuf, io::Error)> {
        let mut tracked = self.tracked.lock();
        if tracked.closed {
            return Ok(None);
        }
        fs::rename(tmp, path).map_err(|e| (path.to_path_buf(), e))?;
        tracked.files.insert(path.to_path_buf(), size);
        Ok(Some(size))
    }

    /// Deletes the unit's scratch file, any `.tmp` leftover and, for staged units, its
    /// source files. Calling it again is a no-op.
    pub fn release(&self, unit: &WorkUnit) {
        let path = self.scratch_path(unit);
        remove_if_exists(&tmp_path(&path));
        remove_if_exists(&path);
        self.tracked.lock().files.remove(&path);

        if unit.has_staged_sources() {
            for source in unit.source_files() {
                remove_if_exists(source);
            }
        }
    }

    /// Returns a guard that releases the job's unit and mate when dropped.
    #[must_use]
    pub fn lease(&self, job: &ScreenJob) -> ScratchLease<'_> {
        let mut units = vec![job.unit.clone()];
        units.extend(job.mate.iter().cloned());
        ScratchLease { manager: self, units }
    }

    /// Bytes currently held in tracked scratch files.
    ///
    /// Advisory only: the value is not used to bound resource use.
    #[must_use]
    pub fn total_scratch_bytes(&self) -> u64 {
        self.tracked.lock().files.values().sum()
    }

    /// Removes every scratch file still tracked and closes the manager: later calls to
    /// [`materialize`](Self::materialize) fail without writing anything.
    pub fn cleanup_all(&self) {
        let paths: Vec<PathBuf> = {
            let mut tracked = self.tracked.lock();
            tracked.closed = true;
            tracked.files.drain().map(|(path, _)| path).collect()
        };
        if !paths.is_empty() {
            debug!("Removing {} leftover scratch file(s)", paths.len());
        }
        for path in paths {
            remove_if_exists(&tmp_path(&path));
            remove_if_exists(&path);
        }
    }
}

/// Releases scratch resources of a job when dropped, including during unwinding.
#[derive(Debug)]
pub struct ScratchLease<'a> {
    manager: &'a TemporaryResourceManager,
    units: Vec<WorkUnit>,
}

impl Drop for ScratchLease<'_> {
    fn drop(&mut self) {
        for unit in &self.units {
            self.manager.release(unit);
        }
    }
}

/// Opens a source FASTQ chunk, decompressing it as it is read.
pub(crate) fn open_source(path: &Path, compression: CompressionKind) -> io::Result<Box<dyn Read>> {
    let file = BufReader::with_capacity(IO_BUFFER_SIZE, File::open(path)?);
    Ok(match compression {
        CompressionKind::None => Box::new(file),
        CompressionKind::Gzip => Box::new(MultiGzDecoder::new(file)),
        CompressionKind::Bzip2 => Box::new(MultiBzDecoder::new(file)),
    })
}

/// Writes every source, decompressed, into `tmp`. Errors carry the path being processed.
fn write_concatenated(
    sources: &[PathBuf],
    compression: CompressionKind,
    tmp: &Path,
) -> std::result::Result<u64, (PathBuf, io::Error)> {
    let file = File::create(tmp).map_err(|e| (tmp.to_path_buf(), e))?;
    let mut writer = BufWriter::with_capacity(IO_BUFFER_SIZE, file);
    let mut total = 0;
    for source in sources {
        let mut reader = open_source(source, compression).map_err(|e| (source.clone(), e))?;
        total += io::copy(&mut reader, &mut writer).map_err(|e| (source.clone(), e))?;
    }
    writer.flush().map_err(|e| (tmp.to_path_buf(), e))?;
    let file = writer.into_inner().map_err(|e| (tmp.to_path_buf(), e.into_error()))?;
    file.sync_all().map_err(|e| (tmp.to_path_buf(), e))?;
    Ok(total)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {e}", path.display()),
    }
}
