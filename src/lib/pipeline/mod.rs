//! Concurrent execution of screen jobs.
//!
//! - [`scheduler`] - bounded worker pool with fail-fast cancellation
//! - [`cancel`] - the cooperative [`CancellationToken`]
//! - [`worker`] - [`ScreenProcessor`], the per-job screening step

pub mod cancel;
pub mod scheduler;
pub mod worker;

pub use cancel::CancellationToken;
pub use scheduler::{
    CollectedResult, DEFAULT_GRACE_PERIOD, JobOutcome, JobProcessor, RunSummary, Scheduler,
    SchedulerConfig, UnitState,
};
pub use worker::{ScreenProcessor, merge_result};
