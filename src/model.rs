use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::TaskFailure;

/// Lifecycle state of a registered task.
///
/// `Pending` and `Running` are transient; the other four are terminal and
/// reached exactly once. A task moves `Pending -> Running` when launched and
/// `Running -> {Succeeded, Failed, Aborted}` when its body settles. A task
/// whose (possibly transitive) dependency did not succeed moves straight from
/// `Pending` to `SkippedDueToDependencyFailure` without ever being launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
    SkippedDueToDependencyFailure,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::Running)
    }
}

/// Message and rendered error chain captured from a failed task body.
///
/// Only tasks ending in `Failed` carry one of these; aborted and skipped
/// tasks are consequences, not independently diagnosable failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub message: String,
    pub trace: String,
}

/// A task body: the opaque unit of work the coordinator launches.
///
/// Bodies receive an [`AbortSignal`] and are expected to call
/// [`AbortSignal::check`] between long-running steps so a global abort
/// request is honored promptly. There is no preemptive interruption.
pub type TaskBody =
    Box<dyn FnOnce(AbortSignal) -> BoxFuture<'static, Result<(), TaskFailure>> + Send + 'static>;

/// Read side of the shared abort flag, handed to every task body.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Cooperative cancellation point.
    ///
    /// Returns `Err(TaskFailure::Aborted)` once an abort has been requested,
    /// so a body can bail out with `signal.check()?` between steps.
    pub fn check(&self) -> Result<(), TaskFailure> {
        if self.is_aborted() {
            Err(TaskFailure::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Trigger side of the shared abort flag.
///
/// Held by the coordinator and cloneable by the caller (e.g. to wire up an
/// interrupt handler, see [`crate::signal::watch_interrupt`]). Triggering is
/// idempotent; the flag is never cleared.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub(crate) fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn signal(&self) -> AbortSignal {
        AbortSignal {
            flag: Arc::clone(&self.flag),
        }
    }
}

/// Registry entry for one task. The body slot is consumed on launch.
pub(crate) struct TaskEntry {
    pub(crate) state: TaskState,
    pub(crate) depends_on: Option<String>,
    pub(crate) body: Option<TaskBody>,
    pub(crate) failure: Option<FailureDetail>,
}

impl TaskEntry {
    pub(crate) fn new(depends_on: Option<String>, body: TaskBody) -> Self {
        Self {
            state: TaskState::Pending,
            depends_on,
            body: Some(body),
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Aborted.is_terminal());
        assert!(TaskState::SkippedDueToDependencyFailure.is_terminal());
    }

    #[test]
    fn abort_signal_tracks_handle() {
        let handle = AbortHandle::new();
        let signal = handle.signal();
        assert!(!signal.is_aborted());
        assert!(signal.check().is_ok());

        handle.trigger();
        assert!(signal.is_aborted());
        assert!(matches!(signal.check(), Err(TaskFailure::Aborted)));

        // Idempotent.
        handle.trigger();
        assert!(handle.is_triggered());
    }
}
