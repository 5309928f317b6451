//! Discovery of a unit's FASTQ files in a demultiplexing output directory.
//!
//! The layout follows bcl2fastq/CASAVA conventions:
//!
//! ```text
//! <root>/Project_<project>/Sample_<sample>/<sample>_<index|NoIndex>_L<lane:03>_R<read>_<chunk>.fastq[.gz|.bz2]
//! <root>/Undetermined_indices/Sample_lane<lane>/lane<lane>_Undetermined_L<lane:03>_R<read>_<chunk>.fastq[.gz|.bz2]
//! ```
//!
//! Chunks are returned sorted by file name so that concatenation is deterministic.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::{Result, ScreenError};
use crate::unit::CompressionKind;

/// Location of one unit's FASTQ files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqFiles {
    /// Chunk files in concatenation order.
    pub files: Vec<PathBuf>,
    /// Compression shared by every chunk.
    pub compression: CompressionKind,
}

impl FastqFiles {
    /// True if no file was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Something that can locate the FASTQ files of a (project, sample, lane, read).
pub trait FastqLocator: Send + Sync {
    /// Locates the files for a sample (`sample = Some`) or for the undetermined unit.
    ///
    /// An empty [`FastqFiles`] means nothing was found; that is not an error.
    fn locate(
        &self,
        project: &str,
        sample: Option<&str>,
        index: Option<&str>,
        lane: u32,
        read: u32,
    ) -> Result<FastqFiles>;
}

/// A bcl2fastq/CASAVA output directory.
#[derive(Debug, Clone)]
pub struct CasavaLayout {
    root: PathBuf,
}

impl CasavaLayout {
    /// Creates a locator rooted at `root`.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory(&self, project: &str, sample: Option<&str>, lane: u32) -> PathBuf {
        match sample {
            Some(sample) => self.root.join(format!("Project_{project}")).join(format!("Sample_{sample}")),
            None => self.root.join("Undetermined_indices").join(format!("Sample_lane{lane}")),
        }
    }

    fn file_prefix(sample: Option<&str>, index: Option<&str>, lane: u32, read: u32) -> String {
        match sample {
            Some(sample) => {
                let index = index.filter(|i| !i.is_empty()).unwrap_or("NoIndex");
                format!("{sample}_{index}_L{lane:03}_R{read}_")
            }
            None => format!("lane{lane}_Undetermined_L{lane:03}_R{read}_"),
        }
    }
}

impl FastqLocator for CasavaLayout {
    fn locate(
        &self,
        project: &str,
        sample: Option<&str>,
        index: Option<&str>,
        lane: u32,
        read: u32,
    ) -> Result<FastqFiles> {
        let dir = self.directory(project, sample, lane);
        let prefix = Self::file_prefix(sample, index, lane, read);

        if !dir.is_dir() {
            debug!("FASTQ directory {} does not exist", dir.display());
            return Ok(FastqFiles { files: Vec::new(), compression: CompressionKind::None });
        }

        let entries = fs::read_dir(&dir)
            .map_err(|e| ScreenError::Layout { path: dir.clone(), reason: e.to_string() })?;

        let mut found: Vec<(PathBuf, CompressionKind)> = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| ScreenError::Layout { path: dir.clone(), reason: e.to_string() })?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !name.starts_with(&prefix) || !path.is_file() {
                continue;
            }
            if let Some(kind) = CompressionKind::from_path(&path) {
                found.push((path, kind));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let compression = found.first().map_or(CompressionKind::None, |(_, kind)| *kind);
        if let Some((path, kind)) = found.iter().find(|(_, kind)| *kind != compression) {
            return Err(ScreenError::Layout {
                path: path.clone(),
                reason: format!("mixes {kind} and {compression} compressed chunks for {prefix}*"),
            });
        }

        Ok(FastqFiles { files: found.into_iter().map(|(path, _)| path).collect(), compression })
    }
}
