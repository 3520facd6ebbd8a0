//! Fire-and-forget background work with failure reporting.
//!
//! Remote pushes never block the caller and never return their result to
//! it. Failures are logged and handed to an optional [`FailureHook`], which
//! lets the host application (or a test) observe what was swallowed.
//!
//! Scheduled tasks are detached: dropping [`BackgroundTasks`] does not
//! cancel them. [`BackgroundTasks::drain`] waits for everything scheduled so
//! far, which short-lived processes call before exiting.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use storehouse_core::UserId;

/// Remote step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    /// Connectivity / table availability probe.
    Probe,
    /// Fetching the user's remote cart.
    Fetch,
    /// Writing the user's remote cart.
    Upsert,
    /// Provisioning the remote table after a table-missing write.
    Provision,
    /// Scheduling a background task (no runtime, or the task panicked).
    Schedule,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Probe => "probe",
            Self::Fetch => "fetch",
            Self::Upsert => "upsert",
            Self::Provision => "provision",
            Self::Schedule => "schedule",
        };
        f.write_str(name)
    }
}

/// A remote failure that was absorbed instead of surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub operation: SyncOperation,
    pub user: Option<UserId>,
    pub message: String,
}

impl SyncFailure {
    /// Describe a failed operation.
    #[must_use]
    pub fn new(operation: SyncOperation, user: Option<&UserId>, error: &impl ToString) -> Self {
        Self {
            operation,
            user: user.cloned(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

/// Callback receiving every absorbed failure.
pub type FailureHook = Arc<dyn Fn(&SyncFailure) + Send + Sync>;

/// Logs absorbed failures and forwards them to the hook, if any.
#[derive(Clone, Default)]
pub struct FailureReporter {
    hook: Option<FailureHook>,
}

impl FailureReporter {
    /// Create a reporter with an optional hook.
    #[must_use]
    pub fn new(hook: Option<FailureHook>) -> Self {
        Self { hook }
    }

    /// Record a failure.
    pub fn report(&self, failure: &SyncFailure) {
        warn!(
            operation = %failure.operation,
            user = failure.user.as_ref().map(UserId::as_str),
            error = %failure.message,
            "Remote cart operation failed; continuing with device copy"
        );
        if let Some(hook) = &self.hook {
            hook(failure);
        }
    }
}

/// Detached background tasks whose failures go to a [`FailureReporter`].
pub struct BackgroundTasks {
    handles: Mutex<Vec<(SyncOperation, JoinHandle<()>)>>,
    reporter: FailureReporter,
}

impl BackgroundTasks {
    /// Create an empty task set.
    #[must_use]
    pub fn new(reporter: FailureReporter) -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
            reporter,
        }
    }

    /// Run `task` in the background on the current tokio runtime.
    ///
    /// Outside a runtime nothing is spawned and a
    /// [`SyncOperation::Schedule`] failure is reported instead.
    pub fn spawn<F>(&self, operation: SyncOperation, user: Option<&UserId>, task: F)
    where
        F: Future<Output = Result<(), SyncFailure>> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            self.reporter.report(&SyncFailure::new(
                SyncOperation::Schedule,
                user,
                &format!("no async runtime available for {operation}"),
            ));
            return;
        };

        let reporter = self.reporter.clone();
        let handle = runtime.spawn(async move {
            if let Err(failure) = task.await {
                reporter.report(&failure);
            }
        });

        let mut handles = self.handles();
        handles.retain(|(_, h)| !h.is_finished());
        handles.push((operation, handle));
        debug!(%operation, pending = handles.len(), "Scheduled background task");
    }

    /// Number of tasks not yet known to have finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.handles()
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .count()
    }

    /// Wait for every task scheduled so far, including any scheduled while
    /// draining.
    pub async fn drain(&self) {
        loop {
            let batch = std::mem::take(&mut *self.handles());
            if batch.is_empty() {
                return;
            }
            for (operation, handle) in batch {
                if let Err(e) = handle.await {
                    self.reporter.report(&SyncFailure::new(
                        SyncOperation::Schedule,
                        None,
                        &format!("{operation} task aborted: {e}"),
                    ));
                }
            }
        }
    }

    fn handles(&self) -> MutexGuard<'_, Vec<(SyncOperation, JoinHandle<()>)>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn recording_reporter() -> (FailureReporter, Arc<Mutex<Vec<SyncFailure>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: FailureHook = Arc::new(move |f: &SyncFailure| {
            sink.lock().unwrap().push(f.clone());
        });
        (FailureReporter::new(Some(hook)), seen)
    }

    #[tokio::test]
    async fn test_successful_task_reports_nothing() {
        let (reporter, seen) = recording_reporter();
        let tasks = BackgroundTasks::new(reporter);

        tasks.spawn(SyncOperation::Upsert, None, async { Ok(()) });
        tasks.drain().await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_failed_task_reaches_hook() {
        let (reporter, seen) = recording_reporter();
        let tasks = BackgroundTasks::new(reporter);
        let user = UserId::new("u1");

        let failing_user = user.clone();
        tasks.spawn(SyncOperation::Upsert, Some(&user), async move {
            Err(SyncFailure::new(
                SyncOperation::Upsert,
                Some(&failing_user),
                &"connection refused",
            ))
        });
        tasks.drain().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].operation, SyncOperation::Upsert);
        assert_eq!(seen[0].user, Some(user));
        assert_eq!(seen[0].to_string(), "upsert failed: connection refused");
    }

    #[test]
    fn test_spawn_outside_runtime_reports_schedule_failure() {
        let (reporter, seen) = recording_reporter();
        let tasks = BackgroundTasks::new(reporter);

        tasks.spawn(SyncOperation::Upsert, None, async { Ok(()) });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].operation, SyncOperation::Schedule);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let (reporter, seen) = recording_reporter();
        let tasks = BackgroundTasks::new(reporter);

        tasks.spawn(SyncOperation::Upsert, None, async {
            let exploded = true;
            assert!(!exploded, "boom");
            Ok(())
        });
        tasks.drain().await;

        assert_eq!(seen.lock().unwrap()[0].operation, SyncOperation::Schedule);
    }
}
