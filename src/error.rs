use thiserror::Error;

/// Errors raised while assembling a run, before any task is launched.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A task with this name is already registered.
    #[error("task '{0}' is already registered")]
    DuplicateTask(String),

    /// The declared dependency does not name a registered task.
    #[error("task '{task}' depends on unregistered task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },
}

/// Terminal outcome of a task body that did not succeed.
///
/// `Aborted` is the distinguished cooperative-cancellation outcome: the body
/// observed the abort flag and stopped on its own. It is not a genuine
/// failure and does not itself raise a new abort request. Everything else is
/// an `Error`, carrying the rendered error chain for diagnostics.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("aborted by request")]
    Aborted,

    #[error("{message}")]
    Error { message: String, trace: String },
}

impl TaskFailure {
    /// Builds a genuine failure from a bare message.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        TaskFailure::Error {
            trace: message.clone(),
            message,
        }
    }

    /// True for the distinguished abort-acknowledged outcome.
    pub fn is_abort(&self) -> bool {
        matches!(self, TaskFailure::Aborted)
    }
}

impl From<anyhow::Error> for TaskFailure {
    fn from(err: anyhow::Error) -> Self {
        TaskFailure::Error {
            message: err.to_string(),
            // Alternate Debug rendering carries the full cause chain.
            trace: format!("{err:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_conversion_keeps_cause_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = anyhow::Error::new(io).context("failed to reach chef server");
        let failure = TaskFailure::from(err);
        match failure {
            TaskFailure::Error { message, trace } => {
                assert_eq!(message, "failed to reach chef server");
                assert!(trace.contains("connection reset"));
            }
            TaskFailure::Aborted => panic!("expected a genuine failure"),
        }
    }

    #[test]
    fn abort_is_not_an_error() {
        assert!(TaskFailure::Aborted.is_abort());
        assert!(!TaskFailure::error("disk full").is_abort());
    }
}
