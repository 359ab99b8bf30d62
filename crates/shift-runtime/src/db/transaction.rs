use std::sync::Arc;

use shift_core::{Result, ShiftError};
use sqlx::Postgres;
use tokio::sync::Mutex;

use super::executor::{QueryExecutor, Queryer, TxnSlot};

/// A database transaction with the same query surface as [`Database`](super::Database).
///
/// `commit` and `rollback` consume the handle. Dropping an unfinished
/// transaction rolls it back once the last in-flight call on it has returned.
pub struct Transaction {
    slot: TxnSlot,
    executor: QueryExecutor,
}

impl Transaction {
    pub(crate) fn new(inner: sqlx::Transaction<'static, Postgres>) -> Self {
        let slot: TxnSlot = Arc::new(Mutex::new(Some(inner)));
        Self {
            executor: QueryExecutor::for_transaction(slot.clone()),
            slot,
        }
    }

    /// Commit the transaction.
    ///
    /// Waits for any abandoned call still holding the transaction.
    pub async fn commit(self) -> Result<()> {
        let txn = self.take().await?;
        txn.commit().await?;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    /// Roll the transaction back.
    pub async fn rollback(self) -> Result<()> {
        let txn = self.take().await?;
        txn.rollback().await?;
        tracing::debug!("Transaction rolled back");
        Ok(())
    }

    /// Roll back after `cause` ended the unit of work, logging a failed
    /// rollback instead of returning it.
    ///
    /// A cancelled call may still be running on the transaction. Waiting for
    /// it would undo the cancellation, so on a cancellation the handle is
    /// dropped and the driver rolls back once that call releases it.
    pub(crate) async fn unwind(self, cause: &ShiftError) {
        if cause.is_cancellation() {
            tracing::debug!(cause = %cause, "Dropping transaction held by a cancelled call");
            return;
        }

        if let Err(e) = self.rollback().await {
            tracing::error!(error = %e, cause = %cause, "Failed to roll back transaction");
        }
    }

    /// Whether commit or rollback has not run yet.
    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    async fn take(&self) -> Result<sqlx::Transaction<'static, Postgres>> {
        self.slot
            .lock()
            .await
            .take()
            .ok_or(ShiftError::TransactionClosed)
    }
}

impl Queryer for Transaction {
    fn executor(&self) -> &QueryExecutor {
        &self.executor
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").finish_non_exhaustive()
    }
}
