//! The per-job screening step run by each worker.

use std::sync::Arc;

use log::{debug, info};

use super::cancel::CancellationToken;
use super::scheduler::{CollectedResult, JobOutcome, JobProcessor};
use crate::errors::{Result, ScreenError};
use crate::metrics::{MetricsStore, SharedMetricsStore};
use crate::scratch::TemporaryResourceManager;
use crate::screen::{AnalysisInvoker, Invocation, SkipReason};
use crate::unit::ScreenJob;

/// Materializes a job's inputs, screens them and merges the metrics into the shared store.
pub struct ScreenProcessor {
    scratch: Arc<TemporaryResourceManager>,
    invoker: AnalysisInvoker,
    store: Arc<SharedMetricsStore>,
}

impl ScreenProcessor {
    /// Creates a processor writing results into `store`.
    #[must_use]
    pub fn new(
        scratch: Arc<TemporaryResourceManager>,
        invoker: AnalysisInvoker,
        store: Arc<SharedMetricsStore>,
    ) -> Self {
        Self { scratch, invoker, store }
    }
}

impl JobProcessor for ScreenProcessor {
    fn process(&self, job: &ScreenJob, cancel: &CancellationToken) -> Result<JobOutcome> {
        let _lease = self.scratch.lease(job);
        cancel.check()?;

        let input = self.scratch.materialize(&job.unit)?;
        let mate = match &job.mate {
            Some(mate) if mate.source_files().is_empty() => {
                info!("Skipping {job}: {}", SkipReason::MissingMate);
                return Ok(JobOutcome::Skipped(SkipReason::MissingMate));
            }
            Some(mate) => Some(self.scratch.materialize(mate)?),
            None => None,
        };
        cancel.check()?;

        let result = match self.invoker.invoke(job, Some(&input), mate.as_deref(), cancel)? {
            Invocation::Completed(result) => result,
            Invocation::Skipped(reason) => return Ok(JobOutcome::Skipped(reason)),
        };
        cancel.check()?;

        merge_result(&self.store, job, &result)?;
        Ok(JobOutcome::Completed(Box::new(result)))
    }
}

/// Merges `result` into `store` under every run-data prefix of `job`, as one update.
///
/// # Errors
/// Returns [`ScreenError::Cancelled`] if the store was sealed because the run already ended.
pub fn merge_result(
    store: &SharedMetricsStore,
    job: &ScreenJob,
    result: &dyn CollectedResult,
) -> Result<()> {
    let mut partial = MetricsStore::new();
    for prefix in job.metric_prefixes(result.collector()) {
        partial.merge(result.metrics(&prefix));
    }
    if store.merge(partial) {
        Ok(())
    } else {
        debug!("Dropped {} result for {job}: run data already sealed", result.collector());
        Err(ScreenError::Cancelled)
    }
}
