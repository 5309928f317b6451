//! Concurrency tests for the screening pipeline.
//!
//! These tests drive the real [`Scheduler`], [`ScreenProcessor`] and scratch manager with an
//! in-process analysis module, and check the worker bound, result integrity and fail-fast
//! behaviour across many units.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use fgscreen_lib::errors::{Result, ScreenError};
use fgscreen_lib::metrics::SharedMetricsStore;
use fgscreen_lib::pipeline::{
    CancellationToken, CollectedResult, JobOutcome, JobProcessor, Scheduler, SchedulerConfig,
    ScreenProcessor, UnitState, merge_result,
};
use fgscreen_lib::report::{ReportSink, TsvReportSink};
use fgscreen_lib::scratch::TemporaryResourceManager;
use fgscreen_lib::screen::{AnalysisInvoker, AnalysisModule, AnalysisResult, FilterOptions, ModuleRequest};
use fgscreen_lib::unit::{CompressionKind, ScreenJob, WorkUnit};
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::helpers::{fastq_text, sample_fastq, write_fastq_gz};

/// Maps every read uniquely, tracking how many invocations overlap.
struct CountingModule {
    running: AtomicUsize,
    max_running: AtomicUsize,
    fail_on: Option<String>,
    delay: Duration,
}

impl CountingModule {
    fn new(delay: Duration, fail_on: Option<&str>) -> Self {
        Self {
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            fail_on: fail_on.map(str::to_string),
            delay,
        }
    }
}

impl AnalysisModule for CountingModule {
    fn name(&self) -> &str {
        "counting"
    }

    fn run(&self, request: &ModuleRequest<'_>, cancel: &CancellationToken) -> Result<()> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let outcome = (|| {
            if self.fail_on.as_deref().is_some_and(|unit| request.unit.contains(unit)) {
                return Err(ScreenError::Execution {
                    unit: request.unit.to_string(),
                    module: "counting".to_string(),
                    reason: "boom".to_string(),
                });
            }
            if cancel.wait_timeout(self.delay) {
                return Err(ScreenError::Cancelled);
            }
            let fastq = fs::read_to_string(request.input).expect("scratch FASTQ is readable");
            let sam: String = fastq
                .lines()
                .step_by(4)
                .map(|name| format!("{}\t0\tchr1\t1\t40\t4M\t*\t0\t0\tACGT\tIIII\n", &name[1..]))
                .collect();
            fs::write(request.output, sam).expect("output is writable");
            Ok(())
        })();
        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Records the units it was handed, in order.
#[derive(Default)]
struct RecordingSink {
    units: Mutex<Vec<String>>,
}

impl ReportSink for RecordingSink {
    fn accept(&self, job: &ScreenJob, _result: &dyn CollectedResult) -> anyhow::Result<()> {
        self.units.lock().push(job.unit.key());
        Ok(())
    }
}

fn jobs(root: &Path, samples: usize, reads_per_sample: usize) -> Vec<ScreenJob> {
    (1..=samples)
        .map(|i| {
            let sample = format!("s{i}");
            let path = sample_fastq(root, "P1", &sample, "NoIndex", 1, 1);
            let names: Vec<String> = (0..reads_per_sample).map(|r| format!("{sample}_r{r}")).collect();
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            write_fastq_gz(&path, &names);
            ScreenJob::single(
                WorkUnit::sample("P1", sample.as_str(), 1, 1)
                    .with_source_files(vec![path], CompressionKind::Gzip),
            )
        })
        .collect()
}

fn processor(
    scratch_dir: &Path,
    module: Arc<CountingModule>,
) -> (Arc<ScreenProcessor>, Arc<SharedMetricsStore>, Arc<TemporaryResourceManager>) {
    let store = Arc::new(SharedMetricsStore::default());
    let scratch = Arc::new(TemporaryResourceManager::new(scratch_dir));
    let invoker = AnalysisInvoker::new(
        module,
        vec!["phix".to_string(), "human".to_string()],
        FilterOptions::default(),
        scratch_dir,
    );
    let processor = Arc::new(ScreenProcessor::new(Arc::clone(&scratch), invoker, Arc::clone(&store)));
    (processor, store, scratch)
}

fn scratch_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "fastq" || e == "sam"))
        .collect()
}

#[test]
fn test_worker_bound_and_result_integrity() {
    let dir = TempDir::new().unwrap();
    let scratch_dir = dir.path().join("scratch");
    fs::create_dir_all(&scratch_dir).unwrap();
    let jobs = jobs(&dir.path().join("fastq"), 8, 5);
    let module = Arc::new(CountingModule::new(Duration::from_millis(30), None));
    let (processor, store, _scratch) = processor(&scratch_dir, Arc::clone(&module));

    let scheduler =
        Scheduler::new(SchedulerConfig { workers: 3, grace_period: Duration::from_secs(10) });
    let sink = RecordingSink::default();
    let summary = scheduler.run(jobs, processor, &sink).unwrap();

    assert_eq!(summary.completed, 8);
    assert!(summary.states.iter().all(|s| *s == UnitState::Completed));
    assert!(module.max_running.load(Ordering::SeqCst) <= 3);

    for i in 1..=8 {
        let prefix = format!("fastqscreen.lane1.sample.s{i}.read1.s{i}");
        assert_eq!(store.get(&format!("{prefix}.reads.processed")).as_deref(), Some("5"));
        assert_eq!(store.get(&format!("{prefix}.phix.one.hit.multiple.genomes")).as_deref(), Some("5"));
        assert_eq!(store.get(&format!("{prefix}.hit.no.genomes")).as_deref(), Some("0"));
    }

    let expected: Vec<String> = (1..=8).map(|i| format!("P1_s{i}_L001_R1")).collect();
    assert_eq!(*sink.units.lock(), expected);
    assert!(scratch_files(&scratch_dir).is_empty());
}

#[test]
fn test_first_failure_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let scratch_dir = dir.path().join("scratch");
    fs::create_dir_all(&scratch_dir).unwrap();
    let jobs = jobs(&dir.path().join("fastq"), 6, 2);
    let module = Arc::new(CountingModule::new(Duration::from_secs(20), Some("sample s2 ")));
    let (processor, store, scratch) = processor(&scratch_dir, Arc::clone(&module));

    let scheduler =
        Scheduler::new(SchedulerConfig { workers: 2, grace_period: Duration::from_secs(10) });
    let sink = RecordingSink::default();
    let err = scheduler.run(jobs, processor, &sink).unwrap_err();
    scratch.cleanup_all();

    match err {
        ScreenError::UnitFailed { unit, source } => {
            assert!(unit.contains("sample s2 "), "unexpected unit {unit}");
            assert!(matches!(*source, ScreenError::Execution { .. }));
        }
        other => panic!("expected UnitFailed, got {other}"),
    }
    assert!(store.is_empty());
    assert!(sink.units.lock().is_empty());
    // Wait briefly for the cancelled worker to unwind its lease.
    for _ in 0..50 {
        if scratch_files(&scratch_dir).is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(scratch_files(&scratch_dir).is_empty());
}

#[test]
fn test_report_sink_writes_one_file_per_unit() {
    let dir = TempDir::new().unwrap();
    let scratch_dir = dir.path().join("scratch");
    fs::create_dir_all(&scratch_dir).unwrap();
    let plain = dir.path().join("plain.fastq");
    fs::write(&plain, fastq_text(&["a", "b", "c"])).unwrap();
    let jobs = vec![ScreenJob::single(
        WorkUnit::undetermined(2, 1).with_source_files(vec![plain], CompressionKind::None),
    )];
    let module = Arc::new(CountingModule::new(Duration::ZERO, None));
    let (processor, _store, _scratch) = processor(&scratch_dir, module);

    let reports = dir.path().join("reports");
    let sink = TsvReportSink::new(&reports);
    let summary = Scheduler::new(SchedulerConfig::default()).run(jobs, processor, &sink).unwrap();
    assert_eq!(summary.completed, 1);
    assert!(reports.join("Undetermined_indices").join("lane2_Undetermined_L002_R1-fastqscreen.tsv").exists());
}

/// Fails lane 1 at once. Every other job ignores cancellation, sleeps, then materializes its
/// input and merges a result, as a worker stuck in an uninterruptible call would.
struct StubbornProcessor {
    scratch: Arc<TemporaryResourceManager>,
    store: Arc<SharedMetricsStore>,
    delay: Duration,
    materialize_refused: AtomicBool,
    finished: AtomicBool,
}

impl JobProcessor for StubbornProcessor {
    fn process(&self, job: &ScreenJob, _cancel: &CancellationToken) -> Result<JobOutcome> {
        if job.unit.lane() == 1 {
            return Err(ScreenError::Execution {
                unit: job.to_string(),
                module: "stubborn".to_string(),
                reason: "boom".to_string(),
            });
        }
        thread::sleep(self.delay);
        let outcome = (|| -> Result<JobOutcome> {
            let materialized = self.scratch.materialize(&job.unit);
            self.materialize_refused
                .store(matches!(materialized, Err(ScreenError::Cancelled)), Ordering::SeqCst);
            merge_result(&self.store, job, &AnalysisResult::empty(false))?;
            materialized?;
            Ok(JobOutcome::Completed(Box::new(AnalysisResult::empty(false))))
        })();
        self.finished.store(true, Ordering::SeqCst);
        outcome
    }
}

#[test]
fn test_abandoned_worker_leaves_no_scratch_or_results() {
    let dir = TempDir::new().unwrap();
    let scratch_dir = dir.path().join("scratch");
    fs::create_dir_all(&scratch_dir).unwrap();
    let plain = dir.path().join("plain.fastq");
    fs::write(&plain, fastq_text(&["a", "b"])).unwrap();
    let jobs = vec![
        ScreenJob::single(WorkUnit::undetermined(1, 1).with_source_files(vec![plain.clone()], CompressionKind::None)),
        ScreenJob::single(WorkUnit::undetermined(2, 1).with_source_files(vec![plain], CompressionKind::None)),
    ];

    let scratch = Arc::new(TemporaryResourceManager::new(&scratch_dir));
    let store = Arc::new(SharedMetricsStore::default());
    let processor = Arc::new(StubbornProcessor {
        scratch: Arc::clone(&scratch),
        store: Arc::clone(&store),
        delay: Duration::from_secs(1),
        materialize_refused: AtomicBool::new(false),
        finished: AtomicBool::new(false),
    });

    let scheduler =
        Scheduler::new(SchedulerConfig { workers: 2, grace_period: Duration::from_millis(50) });
    let err = scheduler.run(jobs, Arc::clone(&processor), &RecordingSink::default()).unwrap_err();
    assert!(matches!(err, ScreenError::UnitFailed { .. }));
    // The stuck worker is still sleeping when the run gives up on it.
    assert!(!processor.finished.load(Ordering::SeqCst));
    scratch.cleanup_all();
    let sealed = store.seal();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !processor.finished.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(processor.finished.load(Ordering::SeqCst));
    assert!(processor.materialize_refused.load(Ordering::SeqCst));
    assert!(scratch_files(&scratch_dir).is_empty(), "left {:?}", scratch_files(&scratch_dir));
    assert_eq!(store.snapshot(), sealed);
    assert!(sealed.is_empty());
}
