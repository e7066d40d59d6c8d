//! Shared timer for background renewal work.
//!
//! One scheduler drives every session manager and lease container of an
//! application. Cancelling a [`ScheduledTask`] only prevents work that has not
//! started yet; work that already woke up runs to completion and its owner
//! discards stale results.

use crate::error::{VaultError, VaultResult};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// Process-wide renewal scheduler.
#[derive(Clone)]
pub struct RenewalScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    handle: Handle,
    shutdown: watch::Sender<bool>,
}

impl RenewalScheduler {
    /// Scheduler spawning onto `handle`.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner { handle, shutdown }),
        }
    }

    /// Scheduler on the ambient tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerUnavailable` outside a tokio runtime.
    pub fn current() -> VaultResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| VaultError::SchedulerUnavailable(e.to_string()))
    }

    /// Run `task` at `at` unless cancelled or shut down first.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerUnavailable` once the scheduler has been shut down.
    pub fn schedule<F>(&self, name: &'static str, at: Instant, task: F) -> VaultResult<ScheduledTask>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(VaultError::SchedulerUnavailable(
                "scheduler has been shut down".to_string(),
            ));
        }

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let shutdown = self.inner.shutdown.subscribe();

        self.inner.handle.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep_until(at) => {}
                _ = cancel_rx => {
                    debug!(task = name, "Scheduled task cancelled");
                    return;
                }
                () = stopped(shutdown) => {
                    debug!(task = name, "Scheduled task dropped by shutdown");
                    return;
                }
            }
            task.await;
        });

        Ok(ScheduledTask {
            due: at,
            cancel: Some(cancel_tx),
        })
    }

    /// Run `task` now, to completion, independent of whoever started it.
    ///
    /// Started work is not affected by [`shutdown`](Self::shutdown).
    pub fn detach<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "Running detached task");
        self.inner.handle.spawn(task);
    }

    /// Stop every pending task. Further scheduling fails.
    pub fn shutdown(&self) {
        info!("Shutting down renewal scheduler");
        self.inner.shutdown.send_replace(true);
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.inner.shutdown.borrow()
    }
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            // Scheduler dropped without shutdown: pending tasks still run.
            std::future::pending::<()>().await;
        }
    }
}

/// Handle to a pending task. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct ScheduledTask {
    due: Instant,
    cancel: Option<oneshot::Sender<()>>,
}

impl ScheduledTask {
    /// When the task is due.
    #[must_use]
    pub const fn due(&self) -> Instant {
        self.due
    }

    /// Cancel the task if it has not started.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}
