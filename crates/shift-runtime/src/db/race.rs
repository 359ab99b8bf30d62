//! Racing driver calls against a call scope.
//!
//! The driver call runs on its own task and reports through a oneshot
//! channel. When the scope is cancelled or its deadline passes first, the
//! caller gets the scope's error right away and the task is abandoned, not
//! killed: it keeps its connection (or transaction lock) until the driver
//! returns, and its result is discarded.

use std::future::Future;

use shift_core::{CallScope, Result, ShiftError};
use tokio::sync::oneshot;
use tracing::debug;

/// Run `work` on a separate task and return whichever of its result or the
/// scope's cancellation comes first.
pub async fn race<T, W>(scope: &CallScope, work: W) -> Result<T>
where
    T: Send + 'static,
    W: Future<Output = Result<T>> + Send + 'static,
{
    scope.check()?;

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        // Receiver is gone when the caller stopped waiting
        let _ = tx.send(work.await);
    });

    tokio::select! {
        biased;
        err = scope.done() => {
            debug!(error = %err, "Abandoning in-flight database call");
            Err(err)
        }
        result = rx => result.unwrap_or_else(|_| {
            Err(ShiftError::Internal("database task ended without a result".into()))
        }),
    }
}
