//! The analysis module seam and its external-process implementation.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use ahash::AHashMap;
use log::{debug, warn};

use crate::errors::{Result, ScreenError};
use crate::pipeline::CancellationToken;

/// Default aligner program.
pub const DEFAULT_PROGRAM: &str = "bowtie2";

/// Default arguments for single-end screening.
pub const DEFAULT_SINGLE_ARGS: &[&str] =
    &["-p", "{threads}", "-k", "2", "--reorder", "-x", "{index}", "-U", "{input}", "-S", "{output}"];

/// Default arguments for paired screening.
pub const DEFAULT_PAIRED_ARGS: &[&str] = &[
    "-p", "{threads}", "-k", "2", "--reorder", "-x", "{index}", "-1", "{input}", "-2", "{mate}",
    "-S", "{output}",
];

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One invocation of an analysis module.
#[derive(Debug, Clone, Copy)]
pub struct ModuleRequest<'a> {
    /// Display name of the unit being screened, for error messages.
    pub unit: &'a str,
    /// Uncompressed FASTQ of the primary read.
    pub input: &'a Path,
    /// Uncompressed FASTQ of the mate, in paired mode.
    pub mate: Option<&'a Path>,
    /// Reference genome labels to align against.
    pub references: &'a [String],
    /// Where the module writes its SAM output.
    pub output: &'a Path,
}

/// Something that turns FASTQ input into SAM alignments against reference genomes.
pub trait AnalysisModule: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Runs the module, writing SAM text to `request.output`.
    ///
    /// # Errors
    /// Returns [`ScreenError::Execution`] if the module fails and [`ScreenError::Cancelled`]
    /// if `cancel` fires while it runs.
    fn run(&self, request: &ModuleRequest<'_>, cancel: &CancellationToken) -> Result<()>;
}

/// Runs an external aligner as a child process.
///
/// Arguments are templates in which `{index}`, `{input}`, `{mate}`, `{output}` and
/// `{threads}` are replaced for each invocation. The child's stdout and stderr are written
/// to `<output>.log`.
#[derive(Debug, Clone)]
pub struct ExternalAnalysisModule {
    program: String,
    single_args: Vec<String>,
    paired_args: Vec<String>,
    indexes: AHashMap<String, PathBuf>,
    threads: usize,
}

impl ExternalAnalysisModule {
    /// A module running `program` with the default bowtie2 argument templates.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            single_args: DEFAULT_SINGLE_ARGS.iter().map(|s| (*s).to_string()).collect(),
            paired_args: DEFAULT_PAIRED_ARGS.iter().map(|s| (*s).to_string()).collect(),
            indexes: AHashMap::new(),
            threads: 1,
        }
    }

    /// Replaces the single-end argument templates.
    #[must_use]
    pub fn with_single_args(mut self, args: Vec<String>) -> Self {
        self.single_args = args;
        self
    }

    /// Replaces the paired argument templates.
    #[must_use]
    pub fn with_paired_args(mut self, args: Vec<String>) -> Self {
        self.paired_args = args;
        self
    }

    /// Sets the index path used for the reference `label`.
    #[must_use]
    pub fn with_index(mut self, label: &str, path: impl Into<PathBuf>) -> Self {
        self.indexes.insert(label.to_lowercase(), path.into());
        self
    }

    /// Sets the value substituted for `{threads}`.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// The index path for `label`, or the label itself when none was configured.
    #[must_use]
    pub fn index_for(&self, label: &str) -> String {
        self.indexes
            .get(&label.to_lowercase())
            .map_or_else(|| label.to_string(), |p| p.display().to_string())
    }

    /// Builds the argument list for `request`.
    ///
    /// # Errors
    /// Returns [`ScreenError::Execution`] if `request` does not name exactly one reference.
    pub fn arguments(&self, request: &ModuleRequest<'_>) -> Result<Vec<String>> {
        let [reference] = request.references else {
            return Err(self.execution_error(
                request,
                format!("expected exactly one reference, got {}", request.references.len()),
            ));
        };

        let index = self.index_for(reference);
        let input = request.input.display().to_string();
        let mate = request.mate.map(|m| m.display().to_string()).unwrap_or_default();
        let output = request.output.display().to_string();
        let threads = self.threads.to_string();
        let values: [(&str, &str); 5] = [
            ("{index}", index.as_str()),
            ("{input}", input.as_str()),
            ("{mate}", mate.as_str()),
            ("{output}", output.as_str()),
            ("{threads}", threads.as_str()),
        ];

        let templates = if request.mate.is_some() { &self.paired_args } else { &self.single_args };
        Ok(templates.iter().map(|template| substitute(template, &values)).collect())
    }

    fn execution_error(&self, request: &ModuleRequest<'_>, reason: String) -> ScreenError {
        ScreenError::Execution {
            unit: request.unit.to_string(),
            module: self.program.clone(),
            reason,
        }
    }

    fn wait(&self, mut child: Child, request: &ModuleRequest<'_>, cancel: &CancellationToken) -> Result<()> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(self.execution_error(
                        request,
                        format!("exited with {status}; see {}", log_path(request.output).display()),
                    ));
                }
                Ok(None) => {
                    if cancel.wait_timeout(POLL_INTERVAL) {
                        warn!("Killing {} for {} after cancellation", self.program, request.unit);
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ScreenError::Cancelled);
                    }
                }
                Err(e) => {
                    let _ = child.kill();
                    return Err(self.execution_error(request, format!("failed to wait: {e}")));
                }
            }
        }
    }
}

impl Default for ExternalAnalysisModule {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl AnalysisModule for ExternalAnalysisModule {
    fn name(&self) -> &str {
        &self.program
    }

    fn run(&self, request: &ModuleRequest<'_>, cancel: &CancellationToken) -> Result<()> {
        cancel.check()?;
        let args = self.arguments(request)?;
        let log = log_path(request.output);
        let stdout = File::create(&log)
            .map_err(|e| self.execution_error(request, format!("cannot create {}: {e}", log.display())))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| self.execution_error(request, format!("cannot share {}: {e}", log.display())))?;

        debug!("Running {} {}", self.program, args.join(" "));
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| self.execution_error(request, format!("failed to launch: {e}")))?;

        self.wait(child, request, cancel)
    }
}

/// The log file written next to a module output.
#[must_use]
pub fn log_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".log");
    PathBuf::from(name)
}

fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (placeholder, value)| acc.replace(placeholder, value))
}
