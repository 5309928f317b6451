//! Bounded worker pool that runs screen jobs and stops the run on the first failure.
//!
//! Jobs are queued on a `crossbeam_channel` in submission order and pulled by a fixed number
//! of worker threads. Workers report `Started`/`Finished` events back over a second channel,
//! so the scheduler blocks on events rather than polling.
//!
//! A failing unit cancels the shared [`CancellationToken`] from its own worker. Idle workers
//! then stop pulling jobs, running ones stop at their next checkpoint, and the scheduler
//! waits up to the grace period for them before returning the failure. Results already merged
//! into the metrics store are left in place.
//!
//! The scheduler knows nothing about what a job computes: a [`JobProcessor`] returns any
//! [`CollectedResult`], so the contamination screen and the read statistics run on the same
//! pool.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, bounded, select, unbounded};
use log::{info, warn};

use super::cancel::CancellationToken;
use crate::errors::{Result, ScreenError};
use crate::logging::format_duration;
use crate::metrics::MetricsStore;
use crate::report::ReportSink;
use crate::screen::SkipReason;
use crate::unit::ScreenJob;

/// Default time to wait for running workers after a failure.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at once.
    pub workers: usize,
    /// How long to wait for running jobs to stop after a failure.
    pub grace_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, std::num::NonZero::get),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// What a collector produced for one job.
pub trait CollectedResult: fmt::Debug + Send + Sync + 'static {
    /// The collector's name, which is also the first component of its run-data keys.
    fn collector(&self) -> &str;

    /// The run-data entries of this result under `prefix`.
    fn metrics(&self, prefix: &str) -> MetricsStore;

    /// The concrete result, for sinks that render one collector's reports.
    fn as_any(&self) -> &dyn Any;
}

/// Terminal result of a successfully processed job.
#[derive(Debug)]
pub enum JobOutcome {
    /// The job produced a result.
    Completed(Box<dyn CollectedResult>),
    /// The job finished without data. This is not a failure.
    Skipped(SkipReason),
}

/// Processes one job on a worker thread.
pub trait JobProcessor: Send + Sync + 'static {
    /// Processes `job`, checking `cancel` between steps.
    ///
    /// # Errors
    /// Any error fails the job and stops the run.
    fn process(&self, job: &ScreenJob, cancel: &CancellationToken) -> Result<JobOutcome>;
}

/// Lifecycle state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Not started.
    Pending,
    /// Running on a worker.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error or stopped by cancellation.
    Failed,
    /// Finished without data.
    Skipped,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Final state of each job, in submission order.
    pub states: Vec<UnitState>,
    /// Number of completed jobs.
    pub completed: usize,
    /// Number of skipped jobs.
    pub skipped: usize,
}

enum Event {
    Started(usize),
    Finished(usize, Result<JobOutcome>),
}

/// Extracts a message from a panic payload.
fn extract_panic_message(panic_info: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Runs jobs on a fixed-size pool of worker threads.
///
/// A scheduler owns the cancellation token of a single run, so [`run`](Self::run) consumes
/// it; build a new scheduler for every run.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Creates a scheduler. A worker count of zero is treated as one.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let config = SchedulerConfig { workers: config.workers.max(1), ..config };
        Self { config, cancel: CancellationToken::new() }
    }

    /// The token shared with workers; cancelling it stops the run.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs every job, then hands each completed result to `sink` in submission order.
    ///
    /// If jobs are still running when the grace period after a cancellation expires, their
    /// threads are detached and keep running until their next checkpoint. Callers that own
    /// shared resources should close them (see `SharedMetricsStore::seal` and
    /// `TemporaryResourceManager::cleanup_all`) before using them further.
    ///
    /// # Errors
    /// Returns [`ScreenError::UnitFailed`] for the first failing job,
    /// [`ScreenError::Cancelled`] if the run was cancelled externally, and
    /// [`ScreenError::Report`] if the sink rejects a result.
    pub fn run<P: JobProcessor>(
        self,
        jobs: Vec<ScreenJob>,
        processor: Arc<P>,
        sink: &dyn ReportSink,
    ) -> Result<RunSummary> {
        let total = jobs.len();
        let jobs = Arc::new(jobs);
        let start = Instant::now();

        let (job_tx, job_rx) = bounded::<usize>(total.max(1));
        for index in 0..total {
            // The receiver is alive and the channel holds every index.
            let _ = job_tx.send(index);
        }
        drop(job_tx);

        let (event_tx, event_rx) = unbounded::<Event>();
        let num_workers = self.config.workers.min(total);
        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let job_rx = job_rx.clone();
            let event_tx = event_tx.clone();
            let jobs = Arc::clone(&jobs);
            let processor = Arc::clone(&processor);
            let cancel = self.cancel.clone();

            handles.push(thread::spawn(move || {
                while let Ok(index) = job_rx.recv() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let job = &jobs[index];
                    let _ = event_tx.send(Event::Started(index));

                    let result =
                        catch_unwind(AssertUnwindSafe(|| processor.process(job, &cancel)))
                            .unwrap_or_else(|panic_info| {
                                Err(ScreenError::Execution {
                                    unit: job.to_string(),
                                    module: format!("worker {worker_id}"),
                                    reason: format!("panicked: {}", extract_panic_message(panic_info)),
                                })
                            });

                    if let Err(e) = &result {
                        if !e.is_cancelled() {
                            cancel.cancel();
                        }
                    }
                    let _ = event_tx.send(Event::Finished(index, result));
                }
            }));
        }
        drop(event_tx);
        drop(job_rx);

        let mut states = vec![UnitState::Pending; total];
        let mut results: Vec<Option<Box<dyn CollectedResult>>> = (0..total).map(|_| None).collect();
        let mut first_failure: Option<(usize, ScreenError)> = None;
        let mut deadline: Option<Instant> = None;
        let mut finished = 0;

        loop {
            if deadline.is_none() && self.cancel.is_cancelled() {
                deadline = Some(Instant::now() + self.config.grace_period);
            }
            let event = match deadline {
                None => select! {
                    recv(event_rx) -> event => match event {
                        Ok(event) => event,
                        Err(_) => break,
                    },
                    recv(self.cancel.cancelled()) -> _ => continue,
                },
                Some(deadline) => match event_rx.recv_deadline(deadline) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let running = states.iter().filter(|s| **s == UnitState::Running).count();
                        warn!(
                            "{running} job(s) still running {} after cancellation; abandoning them",
                            format_duration(self.config.grace_period)
                        );
                        handles.clear();
                        break;
                    }
                },
            };

            match event {
                Event::Started(index) => states[index] = UnitState::Running,
                Event::Finished(index, result) => {
                    finished += 1;
                    let job = &jobs[index];
                    match result {
                        Ok(JobOutcome::Completed(result)) => {
                            states[index] = UnitState::Completed;
                            info!("Finished {finished}/{total}: {job} ({})", result.collector());
                            results[index] = Some(result);
                        }
                        Ok(JobOutcome::Skipped(reason)) => {
                            states[index] = UnitState::Skipped;
                            info!("Skipped {finished}/{total}: {job} ({reason})");
                        }
                        Err(e) => {
                            states[index] = UnitState::Failed;
                            if e.is_cancelled() {
                                info!("Stopped {job} after cancellation");
                            } else {
                                log::error!("Failed {job}: {e}");
                                if first_failure.is_none() {
                                    first_failure = Some((index, e));
                                }
                            }
                        }
                    }
                }
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        if let Some((index, error)) = first_failure {
            return Err(ScreenError::UnitFailed {
                unit: jobs[index].to_string(),
                source: Box::new(error),
            });
        }
        if self.cancel.is_cancelled() {
            return Err(ScreenError::Cancelled);
        }

        for (job, result) in jobs.iter().zip(&results) {
            if let Some(result) = result {
                sink.accept(job, result.as_ref()).map_err(|e| ScreenError::Report {
                    unit: job.to_string(),
                    reason: format!("{e:#}"),
                })?;
            }
        }

        let completed = states.iter().filter(|s| **s == UnitState::Completed).count();
        let skipped = states.iter().filter(|s| **s == UnitState::Skipped).count();
        info!(
            "Processed {total} job(s) in {}: {completed} completed, {skipped} skipped",
            format_duration(start.elapsed())
        );
        Ok(RunSummary { states, completed, skipped })
    }
}
