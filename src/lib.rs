//! gridflow - dependency-ordered concurrent task coordination for
//! multi-host provisioning runs.
//!
//! A provisioning run ("create N VMs, wait for readiness, register each with
//! the config-management server, start services") is a forest of named tasks
//! where each task declares at most one dependency. The [`Coordinator`]
//! launches every dependency-free task concurrently, releases each dependent
//! once its dependency succeeds, and on any genuine failure raises a global
//! abort request: running tasks are asked to stop cooperatively and
//! everything downstream of the failure is skipped. The run always settles,
//! even under cascading failure, and every outcome is retained for
//! diagnostics.
//!
//! ```no_run
//! use gridflow::{Coordinator, TaskFailure};
//!
//! # async fn demo() -> Result<(), gridflow::CoordinatorError> {
//! let mut coordinator = Coordinator::new();
//! coordinator.register("create-vm", None, |_signal| async {
//!     // launch the instance, wait for readiness...
//!     Ok::<_, TaskFailure>(())
//! })?;
//! coordinator.register("register-chef", Some("create-vm"), |signal| async move {
//!     signal.check()?; // honor a pending abort request before starting
//!     Ok(())
//! })?;
//!
//! let report = coordinator.run().await;
//! if !report.overall_success {
//!     for (task, detail) in coordinator.collect_failures() {
//!         eprintln!("{task}: {}\n{}", detail.message, detail.trace);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod model;
pub mod report;
pub mod signal;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, TaskFailure};
pub use model::{AbortHandle, AbortSignal, FailureDetail, TaskState};
pub use report::{RunReport, TaskRecord};
