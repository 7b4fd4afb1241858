//! Interrupt-to-abort translation.
//!
//! An OS interrupt is folded into the same propagation path as an internal
//! task failure: the watcher only raises the abort request. Running tasks
//! observe the flag at their next cooperative check and exit via the abort
//! outcome; tasks not yet launched are skipped when their dependency
//! settles. Nothing is forcibly stopped.

use tokio::task::JoinHandle;
use tracing::warn;

use crate::model::AbortHandle;

/// Spawns a watcher that raises the abort request on Ctrl-C.
///
/// The caller typically wires this up around [`crate::Coordinator::run`]:
///
/// ```no_run
/// # async fn demo(coordinator: &mut gridflow::Coordinator) {
/// let watcher = gridflow::signal::watch_interrupt(coordinator.abort_handle());
/// let report = coordinator.run().await;
/// watcher.abort();
/// # }
/// ```
pub fn watch_interrupt(handle: AbortHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, requesting abort of all running tasks");
                handle.trigger();
            }
            Err(err) => warn!("unable to listen for interrupt signal: {err}"),
        }
    })
}
