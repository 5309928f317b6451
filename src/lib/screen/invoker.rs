//! Drives an [`AnalysisModule`] over every reference genome for one job.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fgoxide::io::Io;
use log::{debug, info, warn};

use super::filter::{FilterChain, FilterOptions};
use super::module::{AnalysisModule, ModuleRequest, log_path};
use super::parser::ResultParser;
use super::result::{AnalysisResult, ScreenTally};
use crate::errors::{Result, ScreenError};
use crate::pipeline::CancellationToken;
use crate::unit::ScreenJob;

/// Why a job finished without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Paired screening was requested but the read-2 input does not exist.
    MissingMate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMate => write!(f, "mate input is missing"),
        }
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The module ran against every genome.
    Completed(AnalysisResult),
    /// Nothing was run.
    Skipped(SkipReason),
}

/// Deletes a module output when dropped, so it never outlives its parse.
struct OutputFile(PathBuf);

impl Drop for OutputFile {
    fn drop(&mut self) {
        remove_quietly(&self.0);
    }
}

/// Removes a file, warning on any failure other than the file being absent.
fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {e}", path.display());
        }
    }
}

/// The module log is only kept when the module output could not be used.
fn remove_module_log(output: &Path) {
    remove_quietly(&log_path(output));
}

/// Runs the analysis module once per reference genome and reduces its output.
pub struct AnalysisInvoker {
    module: Arc<dyn AnalysisModule>,
    genomes: Vec<String>,
    filters: FilterOptions,
    scratch_dir: PathBuf,
}

impl AnalysisInvoker {
    /// Creates an invoker screening against `genomes`, writing module outputs in `scratch_dir`.
    #[must_use]
    pub fn new(
        module: Arc<dyn AnalysisModule>,
        genomes: Vec<String>,
        filters: FilterOptions,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            module,
            genomes,
            filters,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// The genomes screened, in order.
    #[must_use]
    pub fn genomes(&self) -> &[String] {
        &self.genomes
    }

    /// The module output path for `job` and `genome`.
    #[must_use]
    pub fn output_path(&self, job: &ScreenJob, genome: &str) -> PathBuf {
        self.scratch_dir.join(format!("fgscreen_{}.{genome}.sam", job.unit.key()))
    }

    /// Screens the materialized `input` (and `mate`, for paired jobs) against every genome.
    ///
    /// # Errors
    /// Returns [`ScreenError::NoResult`] if the input (or an existing mate) is missing or
    /// empty, or if the module output for a genome holds no alignment records. Module, parse
    /// and cancellation errors are propagated.
    pub fn invoke(
        &self,
        job: &ScreenJob,
        input: Option<&Path>,
        mate: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<Invocation> {
        let unit = job.to_string();
        let input = require_content(&unit, input, "input")?;

        let mate = if job.is_paired() {
            match mate.filter(|m| m.exists()) {
                Some(mate) => Some(require_content(&unit, Some(mate), "mate input")?),
                None => {
                    info!("Skipping {unit}: {}", SkipReason::MissingMate);
                    return Ok(Invocation::Skipped(SkipReason::MissingMate));
                }
            }
        } else {
            None
        };

        let mut tally = ScreenTally::new(&self.genomes, job.is_paired());
        for genome in &self.genomes {
            cancel.check()?;
            let output = OutputFile(self.output_path(job, genome));
            let references = std::slice::from_ref(genome);
            let request =
                ModuleRequest { unit: &unit, input, mate, references, output: &output.0 };
            self.module.run(&request, cancel)?;

            let reader = Io::default().new_reader(&output.0).map_err(|e| ScreenError::NoResult {
                unit: unit.clone(),
                reason: format!("{} produced no readable output for {genome}: {e}", self.module.name()),
            })?;
            let parser =
                ResultParser::new(genome.as_str(), job.is_paired(), FilterChain::from_options(&self.filters));
            let summary = parser.parse_reader(reader, &mut |group| tally.add(group))?;
            if summary.reads_processed == 0 {
                return Err(ScreenError::NoResult {
                    unit,
                    reason: format!("{} produced no records for {genome}", self.module.name()),
                });
            }
            debug!(
                "{unit} on {genome}: {} reads, {} unique, {} multi, {} records filtered",
                summary.reads_processed, summary.unique, summary.multi, summary.records_filtered
            );
            tally.record_summary(&summary);
            remove_module_log(&output.0);
        }

        Ok(Invocation::Completed(tally.into_result(job.sample_genome.as_deref())))
    }
}

fn require_content<'a>(unit: &str, path: Option<&'a Path>, what: &str) -> Result<&'a Path> {
    let no_result = |reason: String| ScreenError::NoResult { unit: unit.to_string(), reason };
    let path = path.ok_or_else(|| no_result(format!("{what} is missing")))?;
    let metadata =
        fs::metadata(path).map_err(|_| no_result(format!("{what} {} is missing", path.display())))?;
    if metadata.len() == 0 {
        return Err(no_result(format!("{what} {} is empty", path.display())));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::WorkUnit;
    use parking_lot::Mutex;
    use rstest::rstest;
    use tempfile::TempDir;

    /// Writes canned SAM text per genome and records the requests it saw.
    struct CannedModule {
        outputs: Vec<(String, String)>,
        seen: Mutex<Vec<(String, bool)>>,
    }

    impl CannedModule {
        fn new(outputs: &[(&str, &str)]) -> Self {
            Self {
                outputs: outputs.iter().map(|(g, s)| ((*g).to_string(), (*s).to_string())).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl AnalysisModule for CannedModule {
        fn name(&self) -> &str {
            "canned"
        }

        fn run(&self, request: &ModuleRequest<'_>, _cancel: &CancellationToken) -> Result<()> {
            let genome = &request.references[0];
            self.seen.lock().push((genome.clone(), request.mate.is_some()));
            let text = self
                .outputs
                .iter()
                .find(|(g, _)| g == genome)
                .map(|(_, s)| s.as_str())
                .unwrap_or_else(|| panic!("no canned output for {genome}"));
            fs::write(request.output, text).unwrap();
            Ok(())
        }
    }

    /// Writes `sam` and a log file next to it, as an external aligner would.
    struct LoggingModule {
        sam: String,
    }

    impl AnalysisModule for LoggingModule {
        fn name(&self) -> &str {
            "logging"
        }

        fn run(&self, request: &ModuleRequest<'_>, _cancel: &CancellationToken) -> Result<()> {
            fs::write(log_path(request.output), "aligned 1 read\n").unwrap();
            fs::write(request.output, &self.sam).unwrap();
            Ok(())
        }
    }

    fn line(name: &str, flag: u16) -> String {
        let rname = if flag & 4 == 0 { "chr1" } else { "*" };
        format!("{name}\t{flag}\t{rname}\t1\t30\t4M\t*\t0\t0\tACGT\tIIII\n")
    }

    fn write_input(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_invoke_runs_each_genome_and_cleans_outputs() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path(), "in.fastq", "@r1\nACGT\n+\nIIII\n");
        let human = format!("{}{}", line("r1", 0), line("r2", 4));
        let phix = format!("{}{}{}", line("r1", 4), line("r2", 0), line("r2", 256));
        let module = Arc::new(CannedModule::new(&[("human", &human), ("phix", &phix)]));
        let invoker = AnalysisInvoker::new(
            module.clone(),
            vec!["human".to_string(), "phix".to_string()],
            FilterOptions::default(),
            dir.path(),
        );

        let job = ScreenJob::single(WorkUnit::sample("P", "s1", 1, 1));
        let outcome = invoker.invoke(&job, Some(&input), None, &CancellationToken::new()).unwrap();
        let Invocation::Completed(result) = outcome else { panic!("expected a result") };

        assert_eq!(result.reads_processed, 2);
        assert_eq!(result.genome("human").unwrap().unique, 1);
        assert_eq!(result.genome("phix").unwrap().multi, 1);
        assert_eq!(result.hit_no_genomes, 0);
        assert_eq!(*module.seen.lock(), vec![("human".to_string(), false), ("phix".to_string(), false)]);
        assert!(!invoker.output_path(&job, "human").exists());
        assert!(!invoker.output_path(&job, "phix").exists());
    }

    #[test]
    fn test_missing_or_empty_input_is_no_result() {
        let dir = TempDir::new().unwrap();
        let empty = write_input(dir.path(), "empty.fastq", "");
        let invoker = AnalysisInvoker::new(
            Arc::new(CannedModule::new(&[])),
            vec!["phix".to_string()],
            FilterOptions::default(),
            dir.path(),
        );
        let job = ScreenJob::single(WorkUnit::undetermined(1, 1));
        let token = CancellationToken::new();

        for input in [None, Some(dir.path().join("absent.fastq")), Some(empty)] {
            let err = invoker.invoke(&job, input.as_deref(), None, &token).unwrap_err();
            assert!(matches!(err, ScreenError::NoResult { .. }), "unexpected {err}");
        }
    }

    #[test]
    fn test_paired_missing_mate_is_skipped_and_empty_mate_fails() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path(), "r1.fastq", "@r1\nA\n+\nI\n");
        let empty_mate = write_input(dir.path(), "r2.fastq", "");
        let module = Arc::new(CannedModule::new(&[]));
        let invoker =
            AnalysisInvoker::new(module.clone(), vec!["phix".to_string()], FilterOptions::default(), dir.path());
        let job = ScreenJob {
            unit: WorkUnit::sample("P", "s1", 1, 1),
            mate: Some(WorkUnit::sample("P", "s1", 1, 2).as_paired_mate()),
            sample_genome: None,
            mirror_read: None,
        };
        let token = CancellationToken::new();

        let outcome = invoker.invoke(&job, Some(&input), Some(&dir.path().join("absent")), &token).unwrap();
        assert_eq!(outcome, Invocation::Skipped(SkipReason::MissingMate));
        assert!(module.seen.lock().is_empty());

        let err = invoker.invoke(&job, Some(&input), Some(&empty_mate), &token).unwrap_err();
        assert!(matches!(err, ScreenError::NoResult { .. }));
    }

    #[test]
    fn test_cancelled_before_first_genome() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path(), "in.fastq", "@r1\nA\n+\nI\n");
        let module = Arc::new(CannedModule::new(&[]));
        let invoker =
            AnalysisInvoker::new(module.clone(), vec!["phix".to_string()], FilterOptions::default(), dir.path());
        let token = CancellationToken::new();
        token.cancel();

        let job = ScreenJob::single(WorkUnit::undetermined(1, 1));
        let err = invoker.invoke(&job, Some(&input), None, &token).unwrap_err();
        assert!(err.is_cancelled());
        assert!(module.seen.lock().is_empty());
    }

    #[rstest]
    #[case::empty("")]
    #[case::header_only("@HD\tVN:1.6\tSO:unsorted\n@SQ\tSN:chr1\tLN:100\n")]
    #[case::blank_lines("\n\n")]
    fn test_output_without_records_is_no_result(#[case] output: &str) {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path(), "in.fastq", "@r1\nACGT\n+\nIIII\n");
        let human = line("r1", 0);
        let module = Arc::new(CannedModule::new(&[("human", &human), ("phix", output)]));
        let invoker = AnalysisInvoker::new(
            module,
            vec!["human".to_string(), "phix".to_string()],
            FilterOptions::default(),
            dir.path(),
        );
        let job = ScreenJob::single(WorkUnit::sample("P", "s1", 1, 1));

        let err = invoker.invoke(&job, Some(&input), None, &CancellationToken::new()).unwrap_err();
        match err {
            ScreenError::NoResult { unit, reason } => {
                assert_eq!(unit, "project P sample s1 lane 1 read 1");
                assert_eq!(reason, "canned produced no records for phix");
            }
            other => panic!("expected NoResult, got {other}"),
        }
        assert!(!invoker.output_path(&job, "phix").exists());
    }

    #[test]
    fn test_module_log_removed_after_parse() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path(), "in.fastq", "@r1\nACGT\n+\nIIII\n");
        let human = line("r1", 0);
        let invoker = AnalysisInvoker::new(
            Arc::new(LoggingModule { sam: human }),
            vec!["human".to_string()],
            FilterOptions::default(),
            dir.path(),
        );
        let job = ScreenJob::single(WorkUnit::sample("P", "s1", 1, 1));

        let outcome = invoker.invoke(&job, Some(&input), None, &CancellationToken::new()).unwrap();
        assert!(matches!(outcome, Invocation::Completed(_)));
        assert!(!log_path(&invoker.output_path(&job, "human")).exists());
    }

    #[test]
    fn test_invalid_output_removes_file() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path(), "in.fastq", "@r1\nA\n+\nI\n");
        let module = Arc::new(CannedModule::new(&[("phix", "not\ta\tsam\n")]));
        let invoker = AnalysisInvoker::new(module, vec!["phix".to_string()], FilterOptions::default(), dir.path());
        let job = ScreenJob::single(WorkUnit::undetermined(1, 1));

        let err = invoker.invoke(&job, Some(&input), None, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, ScreenError::InvalidAlignment { line: 1, .. }));
        assert!(!invoker.output_path(&job, "phix").exists());
    }
}
