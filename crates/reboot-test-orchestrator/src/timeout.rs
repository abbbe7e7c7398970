//! Deadline enforcement for phases and cycles.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Phase, Result, RunError};

/// Run `operation` until it completes or `deadline` elapses.
///
/// The operation receives a child of `cancel`. When the deadline wins the
/// race the child token is cancelled and the operation future is dropped, so
/// its sessions and child processes are released through their destructors.
/// A deadline that has elapsed always yields `RunError::Timeout`, even if the
/// operation became ready in the same poll or blocked past the deadline
/// inside its final poll.
///
/// # Errors
///
/// Returns `RunError::Timeout` when the deadline elapses, `RunError::Cancelled`
/// when `cancel` fires, and otherwise the operation's own error unchanged.
pub async fn run_with_timeout<T, F, Fut>(
    cancel: &CancellationToken,
    phase: Phase,
    deadline: Duration,
    operation: F,
) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let child = cancel.child_token();
    let start = Instant::now();
    let operation = operation(child.clone());

    let timed_out = || -> Result<T> {
        tracing::warn!(%phase, ?deadline, "Deadline elapsed");
        Err(RunError::Timeout {
            phase,
            duration: deadline,
        })
    };

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RunError::Cancelled),
        () = tokio::time::sleep(deadline) => timed_out(),
        result = operation => {
            // Finishing inside a poll that overran the deadline is still late.
            if start.elapsed() >= deadline {
                timed_out()
            } else {
                result
            }
        }
    };

    child.cancel();
    result
}
