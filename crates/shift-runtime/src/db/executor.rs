use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use shift_core::query::to_arguments;
use shift_core::{CallScope, Result, ShiftError, SqlArg};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{FromRow, PgConnection, PgPool, Postgres};
use tokio::sync::Mutex;

use super::race::race;

/// Shared slot for a live transaction; emptied by commit or rollback.
pub(crate) type TxnSlot = Arc<Mutex<Option<sqlx::Transaction<'static, Postgres>>>>;

/// What a query runs against.
#[derive(Clone)]
enum Handle {
    Pool(PgPool),
    Transaction(TxnSlot),
}

impl Handle {
    /// Run `op` on a connection from this handle.
    ///
    /// Pool calls acquire a fresh connection. Transaction calls hold the
    /// transaction lock for the whole call, so calls on one transaction
    /// run one at a time.
    async fn with_connection<T, F>(self, op: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, sqlx::Result<T>>,
    {
        match self {
            Handle::Pool(pool) => {
                let mut conn = pool
                    .acquire()
                    .await
                    .map_err(|e| ShiftError::Connection(e.to_string()))?;
                Ok(op(&mut *conn).await?)
            }
            Handle::Transaction(slot) => {
                let mut guard = slot.lock().await;
                let txn = guard.as_mut().ok_or(ShiftError::TransactionClosed)?;
                Ok(op(&mut **txn).await?)
            }
        }
    }
}

/// Executes queries against a pool or a transaction, racing each call
/// against its call scope and tracing it to the scope's recorder.
#[derive(Clone)]
pub struct QueryExecutor {
    handle: Handle,
}

impl QueryExecutor {
    pub(crate) fn for_pool(pool: PgPool) -> Self {
        Self {
            handle: Handle::Pool(pool),
        }
    }

    pub(crate) fn for_transaction(slot: TxnSlot) -> Self {
        Self {
            handle: Handle::Transaction(slot),
        }
    }

    /// Fetch exactly one row.
    pub async fn get<T>(&self, scope: &CallScope, sql: &str, args: Vec<SqlArg>) -> Result<T>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
    {
        self.run(scope, sql, args, |conn, sql, arguments| {
            Box::pin(async move {
                sqlx::query_as_with::<_, T, _>(&sql, arguments)
                    .fetch_one(conn)
                    .await
            })
        })
        .await
    }

    /// Fetch all rows.
    pub async fn get_many<T>(
        &self,
        scope: &CallScope,
        sql: &str,
        args: Vec<SqlArg>,
    ) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
    {
        self.run(scope, sql, args, |conn, sql, arguments| {
            Box::pin(async move {
                sqlx::query_as_with::<_, T, _>(&sql, arguments)
                    .fetch_all(conn)
                    .await
            })
        })
        .await
    }

    /// Execute for effect; returns the number of rows affected.
    pub async fn exec(&self, scope: &CallScope, sql: &str, args: Vec<SqlArg>) -> Result<u64> {
        self.run(scope, sql, args, |conn, sql, arguments| {
            Box::pin(async move {
                sqlx::query_with(&sql, arguments)
                    .execute(conn)
                    .await
                    .map(|done| done.rows_affected())
            })
        })
        .await
    }

    /// Fetch raw rows for callers that decode columns themselves.
    pub async fn query(
        &self,
        scope: &CallScope,
        sql: &str,
        args: Vec<SqlArg>,
    ) -> Result<Vec<PgRow>> {
        self.run(scope, sql, args, |conn, sql, arguments| {
            Box::pin(async move { sqlx::query_with(&sql, arguments).fetch_all(conn).await })
        })
        .await
    }

    /// Race one driver call against `scope` and record the outcome.
    async fn run<T, F>(&self, scope: &CallScope, sql: &str, args: Vec<SqlArg>, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut PgConnection, String, PgArguments) -> BoxFuture<'c, sqlx::Result<T>>
            + Send
            + 'static,
    {
        let started = Instant::now();

        let outcome = match to_arguments(&args) {
            Ok(arguments) => {
                let handle = self.handle.clone();
                let owned_sql = sql.to_string();
                race(scope, async move {
                    handle
                        .with_connection(move |conn| op(conn, owned_sql, arguments))
                        .await
                })
                .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            tracing::debug!(query = %sql, error = %e, "Query failed");
        }

        scope.record(sql, &args, started, outcome.as_ref().err()).await;
        outcome
    }
}

/// The query surface shared by [`Database`](super::Database) and
/// [`Transaction`](super::Transaction).
///
/// Code written against `Queryer` runs the same way inside or outside a
/// transaction.
pub trait Queryer: Sync {
    fn executor(&self) -> &QueryExecutor;

    /// Fetch exactly one row.
    fn get<'a, T>(
        &'a self,
        scope: &'a CallScope,
        sql: &'a str,
        args: Vec<SqlArg>,
    ) -> impl Future<Output = Result<T>> + Send + 'a
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
    {
        self.executor().get(scope, sql, args)
    }

    /// Fetch all rows.
    fn get_many<'a, T>(
        &'a self,
        scope: &'a CallScope,
        sql: &'a str,
        args: Vec<SqlArg>,
    ) -> impl Future<Output = Result<Vec<T>>> + Send + 'a
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
    {
        self.executor().get_many(scope, sql, args)
    }

    /// Execute for effect; returns the number of rows affected.
    fn exec<'a>(
        &'a self,
        scope: &'a CallScope,
        sql: &'a str,
        args: Vec<SqlArg>,
    ) -> impl Future<Output = Result<u64>> + Send + 'a {
        self.executor().exec(scope, sql, args)
    }

    /// Fetch raw rows.
    fn query<'a>(
        &'a self,
        scope: &'a CallScope,
        sql: &'a str,
        args: Vec<SqlArg>,
    ) -> impl Future<Output = Result<Vec<PgRow>>> + Send + 'a {
        self.executor().query(scope, sql, args)
    }
}
