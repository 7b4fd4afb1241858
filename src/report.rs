use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::TaskState;

/// Terminal outcome of a single task, as recorded in a [`RunReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub state: TaskState,
    /// Final error message when the task failed.
    pub error: Option<String>,
}

/// Summary of one finished run, returned by [`crate::Coordinator::run`].
///
/// Records are sorted by task name. `error` consolidates the reason the run
/// did not fully succeed: the first failing task's message, or a note that
/// the abort request came from outside when no task failed on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub records: Vec<TaskRecord>,
    pub overall_success: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// One-line digest suitable for CLI output.
    pub fn summary(&self) -> String {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut aborted = 0;
        let mut skipped = 0;
        for record in &self.records {
            match record.state {
                TaskState::Succeeded => succeeded += 1,
                TaskState::Failed => failed += 1,
                TaskState::Aborted => aborted += 1,
                TaskState::SkippedDueToDependencyFailure => skipped += 1,
                TaskState::Pending | TaskState::Running => {}
            }
        }
        let mut line = format!(
            "{} tasks: {} succeeded, {} failed, {} aborted, {} skipped",
            self.records.len(),
            succeeded,
            failed,
            aborted,
            skipped
        );
        if let Some(err) = &self.error {
            line.push_str(&format!(" ({err})"));
        }
        line
    }

    /// The records of tasks that ended in `Failed`.
    pub fn failed_tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records
            .iter()
            .filter(|record| record.state == TaskState::Failed)
    }

    /// Pretty-printed JSON rendering, for log capture or tooling.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, state: TaskState, error: Option<&str>) -> TaskRecord {
        TaskRecord {
            name: name.to_string(),
            state,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn summary_counts_every_terminal_state() {
        let report = RunReport {
            records: vec![
                record("create-vm-1", TaskState::Succeeded, None),
                record("create-vm-2", TaskState::Failed, Some("disk full")),
                record("register-chef-1", TaskState::Aborted, None),
                record(
                    "register-chef-2",
                    TaskState::SkippedDueToDependencyFailure,
                    None,
                ),
            ],
            overall_success: false,
            error: Some("disk full".to_string()),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        assert_eq!(
            report.summary(),
            "4 tasks: 1 succeeded, 1 failed, 1 aborted, 1 skipped (disk full)"
        );
        let failed: Vec<&str> = report.failed_tasks().map(|r| r.name.as_str()).collect();
        assert_eq!(failed, vec!["create-vm-2"]);
    }

    #[test]
    fn report_serializes_to_json() {
        let report = RunReport {
            records: vec![record("create-vm", TaskState::Succeeded, None)],
            overall_success: true,
            error: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let json = report.to_json().unwrap();
        assert!(json.contains("\"overall_success\": true"));
        assert!(json.contains("\"Succeeded\""));
    }
}
