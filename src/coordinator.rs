//! The run coordinator: registration, the launch loop, and failure
//! propagation across the dependency forest.

use std::collections::{HashMap, VecDeque};
use std::future::Future;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::error::{CoordinatorError, TaskFailure};
use crate::model::{AbortHandle, AbortSignal, FailureDetail, TaskBody, TaskEntry, TaskState};
use crate::report::{RunReport, TaskRecord};

/// Completion event for one settled task: its name and body outcome.
type SettledEvent = (String, Result<(), TaskFailure>);

/// Owns a set of named tasks and their single-parent dependency edges, and
/// drives their concurrent execution in causal order.
///
/// Tasks are registered up front, then [`Coordinator::run`] launches every
/// dependency-free task on its own tokio task and settles the whole forest:
/// a succeeding task releases its dependents; a failing task raises the
/// global abort request and cascades a skip through its transitive
/// dependents. `run` returns only when every registered task has reached a
/// terminal state.
///
/// The run loop is the sole mutator of the bookkeeping below; task bodies
/// communicate with it only through their returned outcome and observe the
/// abort request only through their [`AbortSignal`].
pub struct Coordinator {
    tasks: HashMap<String, TaskEntry>,
    /// Reverse edges: if B depends on A, `dependents["A"]` contains "B".
    dependents: HashMap<String, Vec<String>>,
    abort: AbortHandle,
    completed: usize,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            dependents: HashMap::new(),
            abort: AbortHandle::new(),
            completed: 0,
        }
    }

    /// Registers a task in `Pending` state.
    ///
    /// `depends_on` must name a previously registered task; the new task will
    /// not be launched until that task has succeeded. Registration must
    /// finish before [`Coordinator::run`] is called (enforced by the `&mut`
    /// receiver on both).
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        depends_on: Option<&str>,
        body: F,
    ) -> Result<(), CoordinatorError>
    where
        F: FnOnce(AbortSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskFailure>> + Send + 'static,
    {
        let name = name.into();
        if self.tasks.contains_key(&name) {
            return Err(CoordinatorError::DuplicateTask(name));
        }
        if let Some(dep) = depends_on {
            if !self.tasks.contains_key(dep) {
                return Err(CoordinatorError::UnknownDependency {
                    task: name,
                    dependency: dep.to_string(),
                });
            }
            self.dependents
                .entry(dep.to_string())
                .or_default()
                .push(name.clone());
        }
        debug!(task = %name, depends_on = ?depends_on, "registered task");
        let body: TaskBody = Box::new(move |signal| body(signal).boxed());
        self.tasks
            .insert(name, TaskEntry::new(depends_on.map(str::to_string), body));
        Ok(())
    }

    /// Clone of the shared abort handle, for external cancellation (e.g. an
    /// interrupt handler). Triggering it follows the same propagation path as
    /// an internal task failure.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Runs the whole forest to completion and reports the outcome.
    ///
    /// Every dependency-free task is launched immediately; each further task
    /// is launched when its dependency succeeds. The call returns only once
    /// every registered task is terminal, even under cascading failure.
    pub async fn run(&mut self) -> RunReport {
        let started_at = Utc::now();
        let total = self.tasks.len();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, SettledEvent>> =
            FuturesUnordered::new();

        let mut roots: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, entry)| entry.depends_on.is_none() && entry.state == TaskState::Pending)
            .map(|(name, _)| name.clone())
            .collect();
        roots.sort();
        debug!(total, roots = roots.len(), "starting run");
        for name in roots {
            self.launch(name, &mut in_flight);
        }

        while self.completed < total {
            match in_flight.next().await {
                Some((name, outcome)) => self.on_settled(name, outcome, &mut in_flight),
                None => {
                    // Unreachable: every registered task is either spawned
                    // (and sends exactly one event) or cascade-counted.
                    warn!(
                        completed = self.completed,
                        total, "no tasks in flight before run settled"
                    );
                    break;
                }
            }
        }

        let report = self.build_report(started_at);
        debug!(summary = %report.summary(), "run finished");
        report
    }

    /// True iff every task's terminal state is `Succeeded`.
    pub fn all_succeeded(&self) -> bool {
        self.tasks
            .values()
            .all(|entry| entry.state == TaskState::Succeeded)
    }

    /// The failed tasks and their captured diagnostics. Aborted and skipped
    /// tasks are consequences of a failure elsewhere and are not included.
    pub fn collect_failures(&self) -> HashMap<String, FailureDetail> {
        self.tasks
            .iter()
            .filter_map(|(name, entry)| {
                entry
                    .failure
                    .as_ref()
                    .map(|detail| (name.clone(), detail.clone()))
            })
            .collect()
    }

    /// Current state of a registered task, if it exists.
    pub fn state_of(&self, name: &str) -> Option<TaskState> {
        self.tasks.get(name).map(|entry| entry.state)
    }

    /// Transitions a pending task to `Running` and spawns its body.
    fn launch(
        &mut self,
        name: String,
        in_flight: &mut FuturesUnordered<BoxFuture<'static, SettledEvent>>,
    ) {
        let Some(entry) = self.tasks.get_mut(&name) else {
            warn!(task = %name, "cannot launch unknown task");
            return;
        };
        let Some(body) = entry.body.take() else {
            warn!(task = %name, state = ?entry.state, "cannot launch task twice");
            return;
        };
        entry.state = TaskState::Running;
        debug!(task = %name, "launching task");

        let signal = self.abort.signal();
        let handle = tokio::spawn(body(signal));
        in_flight.push(
            async move {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    // A panicking body is a genuine failure, not a lost task.
                    Err(join_err) => Err(TaskFailure::Error {
                        message: format!("task body panicked: {join_err}"),
                        trace: join_err.to_string(),
                    }),
                };
                (name, outcome)
            }
            .boxed(),
        );
    }

    /// Applies one completion event: records the terminal state, then either
    /// releases or cascades over the settled task's dependents.
    fn on_settled(
        &mut self,
        name: String,
        outcome: Result<(), TaskFailure>,
        in_flight: &mut FuturesUnordered<BoxFuture<'static, SettledEvent>>,
    ) {
        match outcome {
            Ok(()) => {
                self.mark(&name, TaskState::Succeeded, None);
                debug!(task = %name, "task finished successfully");
                for dependent in self.dependents_of(&name) {
                    if self.abort.is_triggered() {
                        // An abort elsewhere means this dependent must not
                        // start, and neither may anything downstream of it.
                        self.cascade_skip(vec![dependent]);
                    } else {
                        self.launch(dependent, in_flight);
                    }
                }
            }
            Err(TaskFailure::Aborted) => {
                self.mark(&name, TaskState::Aborted, None);
                debug!(task = %name, "task acknowledged the abort request");
                let dependents = self.dependents_of(&name);
                self.cascade_skip(dependents);
            }
            Err(TaskFailure::Error { message, trace }) => {
                error!(task = %name, %message, "task failed");
                self.mark(&name, TaskState::Failed, Some(FailureDetail { message, trace }));
                self.abort.trigger();
                let dependents = self.dependents_of(&name);
                self.cascade_skip(dependents);
            }
        }
        self.log_progress();
    }

    /// Records a terminal state for a settled task and counts it.
    fn mark(&mut self, name: &str, state: TaskState, failure: Option<FailureDetail>) {
        if let Some(entry) = self.tasks.get_mut(name) {
            entry.state = state;
            entry.failure = failure;
            self.completed += 1;
        } else {
            warn!(task = %name, "completion event for unknown task");
        }
    }

    fn dependents_of(&self, name: &str) -> Vec<String> {
        self.dependents.get(name).cloned().unwrap_or_default()
    }

    /// Marks every still-pending task in the given seeds, and everything
    /// downstream of them, as skipped. Explicit worklist rather than
    /// recursion: dependency chains can be as deep as the host count.
    fn cascade_skip(&mut self, seeds: Vec<String>) {
        let mut worklist: VecDeque<String> = seeds.into();
        while let Some(name) = worklist.pop_front() {
            let Some(entry) = self.tasks.get_mut(&name) else {
                continue;
            };
            if entry.state != TaskState::Pending {
                continue;
            }
            entry.state = TaskState::SkippedDueToDependencyFailure;
            self.completed += 1;
            debug!(task = %name, "skipping task, its dependency did not succeed");
            if let Some(downstream) = self.dependents.get(&name) {
                worklist.extend(downstream.iter().cloned());
            }
        }
    }

    fn log_progress(&self) {
        let remaining: Vec<&str> = self
            .tasks
            .iter()
            .filter(|(_, entry)| !entry.state.is_terminal())
            .map(|(name, _)| name.as_str())
            .collect();
        debug!(
            "{} of {} tasks are done, remaining: {}",
            self.completed,
            self.tasks.len(),
            remaining.join(",")
        );
    }

    fn build_report(&self, started_at: chrono::DateTime<Utc>) -> RunReport {
        let mut records: Vec<TaskRecord> = self
            .tasks
            .iter()
            .map(|(name, entry)| TaskRecord {
                name: name.clone(),
                state: entry.state,
                error: entry.failure.as_ref().map(|detail| detail.message.clone()),
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let overall_success = self.all_succeeded();
        let error = records
            .iter()
            .find(|record| record.state == TaskState::Failed)
            .and_then(|record| record.error.clone())
            .or_else(|| {
                (!overall_success && self.abort.is_triggered())
                    .then(|| "run aborted by external request".to_string())
            });

        RunReport {
            records,
            overall_success,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_body(
        _signal: AbortSignal,
    ) -> impl Future<Output = Result<(), TaskFailure>> + Send + 'static {
        async { Ok(()) }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut coordinator = Coordinator::new();
        coordinator.register("create-vm", None, noop_body).unwrap();
        let err = coordinator
            .register("create-vm", None, noop_body)
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::DuplicateTask(name) if name == "create-vm"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut coordinator = Coordinator::new();
        let err = coordinator
            .register("start-services", Some("create-vm"), noop_body)
            .unwrap_err();
        match err {
            CoordinatorError::UnknownDependency { task, dependency } => {
                assert_eq!(task, "start-services");
                assert_eq!(dependency, "create-vm");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn registered_tasks_start_pending() {
        let mut coordinator = Coordinator::new();
        coordinator.register("create-vm", None, noop_body).unwrap();
        coordinator
            .register("register-chef", Some("create-vm"), noop_body)
            .unwrap();
        assert_eq!(coordinator.state_of("create-vm"), Some(TaskState::Pending));
        assert_eq!(
            coordinator.state_of("register-chef"),
            Some(TaskState::Pending)
        );
        assert_eq!(coordinator.state_of("missing"), None);
    }

    #[tokio::test]
    async fn empty_run_returns_immediately() {
        let mut coordinator = Coordinator::new();
        let report = coordinator.run().await;
        assert!(report.overall_success);
        assert!(report.records.is_empty());
        assert!(report.error.is_none());
        assert!(coordinator.all_succeeded());
        assert!(coordinator.collect_failures().is_empty());
    }
}
