use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};

use shift_core::config::DatabaseConfig;
use shift_core::{CallScope, Result, ShiftError};

use super::executor::{QueryExecutor, Queryer};
use super::race::race;
use super::transaction::Transaction;

/// Database connection wrapper providing connection pooling.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    executor: QueryExecutor,
}

impl Database {
    /// Create a database handle whose connections open on first use.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config).connect_lazy_with(config.connect_options()?);
        tracing::debug!(database = %config.display_target(), "Database pool created");
        Ok(Self::from_pool(pool))
    }

    /// Create a database handle and open its first connection now.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| {
                ShiftError::Connection(format!(
                    "Failed to connect to {}: {}",
                    config.display_target(),
                    e
                ))
            })?;

        tracing::info!(database = %config.display_target(), "Connected to database");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            executor: QueryExecutor::for_pool(pool.clone()),
            pool,
        }
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.pool_timeout())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction.
    ///
    /// A transaction begun after the scope gave up is rolled back when the
    /// abandoned task drops it.
    pub async fn begin(&self, scope: &CallScope) -> Result<Transaction> {
        let pool = self.pool.clone();
        let inner = race(scope, async move {
            pool.begin()
                .await
                .map_err(|e| ShiftError::Connection(format!("Failed to begin transaction: {}", e)))
        })
        .await?;

        Ok(Transaction::new(inner))
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` succeeds and returns the commit error, if any. When
    /// `f` fails the transaction is rolled back and `f`'s error is returned;
    /// a failed rollback is only logged.
    pub async fn in_txn<R, F>(&self, scope: &CallScope, f: F) -> Result<R>
    where
        F: for<'t> FnOnce(&'t Transaction, &'t CallScope) -> BoxFuture<'t, Result<R>>,
    {
        let txn = self.begin(scope).await?;

        match f(&txn, scope).await {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(e) => {
                txn.unwind(&e).await;
                Err(e)
            }
        }
    }

    /// Check database connectivity.
    pub async fn health_check(&self, scope: &CallScope) -> Result<()> {
        self.exec(scope, "SELECT 1", vec![]).await.map(|_| ())
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Queryer for Database {
    fn executor(&self) -> &QueryExecutor {
        &self.executor
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("size", &self.pool.size())
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}
