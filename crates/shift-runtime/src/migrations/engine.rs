//! The migration engine.
//!
//! A [`Migrator`] opens one transaction on first use, makes sure the log
//! table exists, reads the log and reconciles it against the registry. That
//! plan is computed once and then kept up to date by the engine itself as it
//! commits steps. Every `up`/`down` call ends its transaction with a commit
//! or a rollback; the next call opens a fresh one.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use shift_core::config::{
    validate_table_name, MigrationsConfig, APPLIED_VIEW_SUFFIX, DEFAULT_LOG_TABLE,
};
use shift_core::{
    sql_args, CallScope, Direction, LogEntry, MigrationPlan, MigrationStatus, Result, ShiftError,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::registry::MigrationRegistry;
use crate::db::{Database, Queryer, Transaction};

/// Whether a run keeps its changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Commit,
    /// Run every step, then roll back.
    DryRun,
}

/// Lifecycle of a [`Migrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing has touched the database yet.
    Uninitialized,
    /// Plan loaded, transaction open.
    Ready,
    /// The last run committed.
    Committed,
    /// The last run rolled back, by failure or dry run.
    RolledBack,
    /// Initialization failed; every call returns that failure.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Committed,
    RolledBack,
}

struct Session {
    txn: Option<Transaction>,
    plan: MigrationPlan,
    outcome: Option<Outcome>,
}

enum Inner {
    Uninitialized,
    Ready(Session),
    Failed(Arc<ShiftError>),
}

/// Applies and reverts registered migrations, recording each step in an
/// append-only log table.
pub struct Migrator {
    db: Database,
    registry: MigrationRegistry,
    table: String,
    create_view: bool,
    inner: Mutex<Inner>,
}

impl Migrator {
    /// An engine logging to the default table, with the applied view.
    pub fn new(db: Database, registry: MigrationRegistry) -> Self {
        Self {
            db,
            registry,
            table: DEFAULT_LOG_TABLE.to_string(),
            create_view: true,
            inner: Mutex::new(Inner::Uninitialized),
        }
    }

    pub fn from_config(
        db: Database,
        registry: MigrationRegistry,
        config: &MigrationsConfig,
    ) -> Result<Self> {
        Ok(Self::new(db, registry)
            .with_table(&config.table)?
            .with_view(config.create_view))
    }

    /// Log to `table`, optionally schema-qualified.
    pub fn with_table(mut self, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        self.table = table.to_string();
        Ok(self)
    }

    /// Create or skip the `<table>_applied` view.
    pub fn with_view(mut self, create_view: bool) -> Self {
        self.create_view = create_view;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn state(&self) -> EngineState {
        match &*self.inner.lock().await {
            Inner::Uninitialized => EngineState::Uninitialized,
            Inner::Failed(_) => EngineState::Failed,
            Inner::Ready(session) => match (&session.txn, session.outcome) {
                (None, Some(Outcome::Committed)) => EngineState::Committed,
                (None, Some(Outcome::RolledBack)) => EngineState::RolledBack,
                _ => EngineState::Ready,
            },
        }
    }

    /// Load the plan now instead of on first use.
    pub async fn init(&self, scope: &CallScope) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.session(&mut inner, scope).await.map(|_| ())
    }

    /// Every registered migration, applied first then pending.
    pub async fn status(&self, scope: &CallScope) -> Result<Vec<MigrationStatus>> {
        let mut inner = self.inner.lock().await;
        let session = self.session(&mut inner, scope).await?;
        Ok(session.plan.status())
    }

    /// Apply up to `count` pending migrations in name order; `None` applies
    /// all of them. Returns the names that ran.
    pub async fn up(
        &self,
        scope: &CallScope,
        count: Option<usize>,
        mode: RunMode,
    ) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let session = self.session(&mut inner, scope).await?;
        let names = session.plan.next_up(count);
        self.run(session, scope, Direction::Up, names, mode).await
    }

    /// Revert up to `count` applied migrations, newest name first; `None`
    /// reverts one. Returns the names that ran.
    pub async fn down(
        &self,
        scope: &CallScope,
        count: Option<usize>,
        mode: RunMode,
    ) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let session = self.session(&mut inner, scope).await?;
        let names = session.plan.next_down(count);
        self.run(session, scope, Direction::Down, names, mode).await
    }

    /// Roll back the open transaction, if any.
    pub async fn release(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Inner::Ready(session) = &mut *inner {
            if let Some(txn) = session.txn.take() {
                session.outcome = Some(Outcome::RolledBack);
                txn.rollback().await?;
            }
        }
        Ok(())
    }

    async fn session<'a>(&self, inner: &'a mut Inner, scope: &CallScope) -> Result<&'a mut Session> {
        if matches!(inner, Inner::Uninitialized) {
            *inner = match self.initialize(scope).await {
                Ok(session) => Inner::Ready(session),
                Err(e) => {
                    error!(error = %e, "Migration engine failed to initialize");
                    Inner::Failed(Arc::new(e))
                }
            };
        }

        match inner {
            Inner::Ready(session) => Ok(session),
            Inner::Failed(err) => Err(ShiftError::Initialization(err.clone())),
            Inner::Uninitialized => Err(ShiftError::InvalidState(
                "migration engine is not initialized".into(),
            )),
        }
    }

    async fn initialize(&self, scope: &CallScope) -> Result<Session> {
        let txn = self.open(scope).await?;

        match self.load_log(&txn, scope).await {
            Ok(log) => {
                let plan = MigrationPlan::reconcile(self.registry.names(), &log);
                for name in plan.unknown() {
                    warn!(migration = %name, table = %self.table, "Logged migration is not registered");
                }
                debug!(
                    applied = plan.applied().len(),
                    pending = plan.pending().len(),
                    "Migration plan loaded"
                );

                Ok(Session {
                    txn: Some(txn),
                    plan,
                    outcome: None,
                })
            }
            Err(e) => {
                txn.unwind(&e).await;
                Err(e)
            }
        }
    }

    /// Begin a transaction and make sure the log table exists in it.
    async fn open(&self, scope: &CallScope) -> Result<Transaction> {
        let txn = self.db.begin(scope).await?;
        match self.ensure_schema(&txn, scope).await {
            Ok(()) => Ok(txn),
            Err(e) => {
                txn.unwind(&e).await;
                Err(e)
            }
        }
    }

    async fn ensure_schema(&self, txn: &Transaction, scope: &CallScope) -> Result<()> {
        let table = &self.table;

        txn.exec(
            scope,
            &format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    name TEXT NOT NULL,
                    direction TEXT NOT NULL CHECK (direction IN ('up', 'down')),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )
                "#
            ),
            vec![],
        )
        .await?;

        if self.create_view {
            txn.exec(
                scope,
                &format!(
                    r#"
                    CREATE OR REPLACE VIEW {table}{APPLIED_VIEW_SUFFIX} AS
                    SELECT name, created_at AS applied_at
                    FROM (
                        SELECT DISTINCT ON (name) name, direction, created_at
                        FROM {table}
                        ORDER BY name, created_at DESC, id DESC
                    ) latest
                    WHERE direction = 'up'
                    "#
                ),
                vec![],
            )
            .await?;
        }

        Ok(())
    }

    async fn load_log(&self, txn: &Transaction, scope: &CallScope) -> Result<Vec<LogEntry>> {
        let rows: Vec<(String, String, DateTime<Utc>)> = txn
            .get_many(
                scope,
                &format!(
                    "SELECT name, direction, created_at FROM {} ORDER BY created_at, id",
                    self.table
                ),
                vec![],
            )
            .await?;

        rows.into_iter()
            .map(|(name, direction, created_at)| -> Result<LogEntry> {
                let direction = direction
                    .parse()
                    .map_err(|e| ShiftError::InvalidState(format!("{} in {}", e, self.table)))?;
                Ok(LogEntry::new(name, direction, created_at))
            })
            .collect()
    }

    async fn run(
        &self,
        session: &mut Session,
        scope: &CallScope,
        direction: Direction,
        names: Vec<String>,
        mode: RunMode,
    ) -> Result<Vec<String>> {
        let txn = match session.txn.take() {
            Some(txn) => txn,
            None => self.open(scope).await?,
        };

        let mut logged_at = Vec::with_capacity(names.len());
        for name in &names {
            match self.step(&txn, scope, name, direction).await {
                Ok(at) => logged_at.push(at),
                Err(e) => {
                    txn.unwind(&e).await;
                    session.outcome = Some(Outcome::RolledBack);
                    return Err(e);
                }
            }
        }

        if mode == RunMode::DryRun {
            session.outcome = Some(Outcome::RolledBack);
            txn.rollback().await?;
            info!(direction = %direction, steps = names.len(), "Dry run rolled back");
            return Ok(names);
        }

        if let Err(e) = txn.commit().await {
            session.outcome = Some(Outcome::RolledBack);
            return Err(e);
        }
        session.outcome = Some(Outcome::Committed);

        for (name, at) in names.iter().zip(logged_at) {
            match direction {
                Direction::Up => session.plan.mark_applied(name, at),
                Direction::Down => session.plan.mark_reverted(name),
            }
        }

        info!(direction = %direction, steps = names.len(), "Migrations committed");
        Ok(names)
    }

    /// Run one migration body and log it.
    async fn step(
        &self,
        txn: &Transaction,
        scope: &CallScope,
        name: &str,
        direction: Direction,
    ) -> Result<DateTime<Utc>> {
        let migration = self.registry.get(name).ok_or_else(|| {
            ShiftError::InvalidState(format!("Migration '{}' is not registered", name))
        })?;

        info!(migration = %name, direction = %direction, "Running migration");
        let started = Instant::now();

        let body = match direction {
            Direction::Up => migration.apply(txn, scope).await,
            Direction::Down => migration.revert(txn, scope).await,
        };
        body.map_err(|e| match e {
            e if e.is_cancellation() => e,
            e @ ShiftError::Irreversible(_) => e,
            e => ShiftError::migration(name, direction, e),
        })?;

        let (created_at,): (DateTime<Utc>,) = txn
            .get(
                scope,
                &format!(
                    "INSERT INTO {} (name, direction) VALUES ($1, $2) RETURNING created_at",
                    self.table
                ),
                sql_args![name, direction.as_str()],
            )
            .await?;

        debug!(
            migration = %name,
            direction = %direction,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Migration finished"
        );
        Ok(created_at)
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("table", &self.table)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
