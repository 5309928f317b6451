//! Cooperative cancellation shared by the scheduler and its workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Condvar, Mutex};

use crate::errors::{Result, ScreenError};

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
    /// Dropped on cancellation, which disconnects `signal_rx`.
    signal_tx: Mutex<Option<Sender<()>>>,
    signal_rx: Receiver<()>,
}

impl Default for Inner {
    fn default() -> Self {
        let (signal_tx, signal_rx) = bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
            signal_tx: Mutex::new(Some(signal_tx)),
            signal_rx,
        }
    }
}

/// A cloneable flag that, once set, stays set.
///
/// Workers check it between steps; long waits use [`wait_timeout`](Self::wait_timeout) so
/// that they wake as soon as the run is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and wakes every waiter.
    pub fn cancel(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.condvar.notify_all();
        drop(self.inner.signal_tx.lock().take());
    }

    /// True once [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// A channel that never carries a message and disconnects once the token is cancelled.
    ///
    /// Lets an event loop wait on cancellation alongside other channels with
    /// `crossbeam_channel::select!`.
    #[must_use]
    pub fn cancelled(&self) -> &Receiver<()> {
        &self.inner.signal_rx
    }

    /// Returns [`ScreenError::Cancelled`] if the token is cancelled.
    ///
    /// # Errors
    /// Returns an error if the token is cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() { Err(ScreenError::Cancelled) } else { Ok(()) }
    }

    /// Blocks for up to `timeout`, returning early if the token is cancelled.
    ///
    /// Returns true if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if !self.is_cancelled() {
            let _ = self.inner.condvar.wait_for(&mut guard, timeout);
        }
        self.is_cancelled()
    }
}
