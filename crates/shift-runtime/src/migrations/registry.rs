use std::sync::Arc;

use futures::future::BoxFuture;
use shift_core::{CallScope, Result, ShiftError};

use super::loader::{split_sql_statements, SqlMigration};
use crate::db::{Queryer, Transaction};

/// Body of one migration direction.
///
/// Runs inside the engine's transaction and must do all of its work through
/// that transaction.
pub type MigrationFn = Arc<
    dyn for<'t> Fn(&'t Transaction, &'t CallScope) -> BoxFuture<'t, Result<()>> + Send + Sync,
>;

/// A named pair of apply and revert functions.
#[derive(Clone)]
pub struct Migration {
    name: String,
    apply: MigrationFn,
    revert: MigrationFn,
}

impl Migration {
    pub fn new<A, R>(name: impl Into<String>, apply: A, revert: R) -> Self
    where
        A: for<'t> Fn(&'t Transaction, &'t CallScope) -> BoxFuture<'t, Result<()>>
            + Send
            + Sync
            + 'static,
        R: for<'t> Fn(&'t Transaction, &'t CallScope) -> BoxFuture<'t, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            apply: migration_fn(apply),
            revert: migration_fn(revert),
        }
    }

    /// A migration that runs SQL scripts. Without `down_sql` it cannot be
    /// reverted.
    pub fn from_sql(
        name: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: Option<String>,
    ) -> Self {
        let name = name.into();
        let up_sql: String = up_sql.into();

        let revert = match down_sql {
            Some(down_sql) => script(down_sql.into()),
            None => {
                let name = name.clone();
                migration_fn(move |_txn, _scope| {
                    let name = name.clone();
                    Box::pin(async move { Err(ShiftError::Irreversible(name)) })
                })
            }
        };

        Self {
            name,
            apply: script(up_sql.into()),
            revert,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the forward body.
    pub async fn apply(&self, txn: &Transaction, scope: &CallScope) -> Result<()> {
        (self.apply)(txn, scope).await
    }

    /// Run the backward body.
    pub async fn revert(&self, txn: &Transaction, scope: &CallScope) -> Result<()> {
        (self.revert)(txn, scope).await
    }
}

impl From<SqlMigration> for Migration {
    fn from(m: SqlMigration) -> Self {
        Self::from_sql(m.name, m.up, m.down)
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn migration_fn<F>(f: F) -> MigrationFn
where
    F: for<'t> Fn(&'t Transaction, &'t CallScope) -> BoxFuture<'t, Result<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn script(sql: Arc<str>) -> MigrationFn {
    migration_fn(move |txn, scope| {
        let sql = sql.clone();
        Box::pin(async move { run_script(txn, scope, &sql).await })
    })
}

/// Run every statement of `sql` on `txn`, in order.
pub async fn run_script(txn: &Transaction, scope: &CallScope, sql: &str) -> Result<()> {
    for statement in split_sql_statements(sql) {
        txn.exec(scope, &statement, vec![]).await?;
    }
    Ok(())
}

/// Registered migrations, kept sorted by name.
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration from its apply and revert functions.
    ///
    /// # Example
    ///
    /// ```ignore
    /// registry.add(
    ///     "001_create_users",
    ///     |txn, scope| Box::pin(async move {
    ///         txn.exec(scope, "CREATE TABLE users (id BIGINT)", vec![]).await.map(|_| ())
    ///     }),
    ///     |txn, scope| Box::pin(async move {
    ///         txn.exec(scope, "DROP TABLE users", vec![]).await.map(|_| ())
    ///     }),
    /// )?;
    /// ```
    pub fn add<A, R>(&mut self, name: impl Into<String>, apply: A, revert: R) -> Result<()>
    where
        A: for<'t> Fn(&'t Transaction, &'t CallScope) -> BoxFuture<'t, Result<()>>
            + Send
            + Sync
            + 'static,
        R: for<'t> Fn(&'t Transaction, &'t CallScope) -> BoxFuture<'t, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.insert(Migration::new(name, apply, revert))
    }

    /// Register a migration made of SQL scripts.
    pub fn add_sql(
        &mut self,
        name: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: Option<String>,
    ) -> Result<()> {
        self.insert(Migration::from_sql(name, up_sql, down_sql))
    }

    /// Register a built migration. Names must be unique.
    pub fn insert(&mut self, migration: Migration) -> Result<()> {
        match self
            .migrations
            .binary_search_by(|m| m.name.as_str().cmp(migration.name()))
        {
            Ok(_) => Err(ShiftError::DuplicateMigration(migration.name)),
            Err(idx) => {
                tracing::debug!(migration = %migration.name, "Registered migration");
                self.migrations.insert(idx, migration);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Migration> {
        self.migrations
            .binary_search_by(|m| m.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.migrations[idx])
    }

    /// Registered names, ascending.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.migrations.iter().map(|m| m.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl TryFrom<Vec<SqlMigration>> for MigrationRegistry {
    type Error = ShiftError;

    fn try_from(migrations: Vec<SqlMigration>) -> Result<Self> {
        let mut registry = Self::new();
        for migration in migrations {
            registry.insert(migration.into())?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop<'t>(_txn: &'t Transaction, _scope: &'t CallScope) -> BoxFuture<'t, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn test_registry_sorted_by_name() {
        let mut registry = MigrationRegistry::new();
        registry.add("003_c", noop, noop).unwrap();
        registry.add("001_a", noop, noop).unwrap();
        registry.add_sql("002_b", "SELECT 1", None).unwrap();

        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, ["001_a", "002_b", "003_c"]);
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = MigrationRegistry::new();
        registry.add("001_a", noop, noop).unwrap();

        let result = registry.add_sql("001_a", "SELECT 1", Some("SELECT 2".into()));
        assert!(matches!(result, Err(ShiftError::DuplicateMigration(ref n)) if n == "001_a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get() {
        let mut registry = MigrationRegistry::new();
        registry.add("001_a", noop, noop).unwrap();

        assert_eq!(registry.get("001_a").map(|m| m.name()), Some("001_a"));
        assert!(registry.get("002_b").is_none());
    }

    #[test]
    fn test_from_sql_migrations() {
        let registry = MigrationRegistry::try_from(vec![
            SqlMigration::parse("0002_posts", "CREATE TABLE posts (id INT);"),
            SqlMigration::parse("0001_users", "CREATE TABLE users (id INT);"),
        ])
        .unwrap();

        let names: Vec<_> = registry.iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, ["0001_users", "0002_posts"]);
    }

    #[test]
    fn test_from_sql_duplicate_fails() {
        let result = MigrationRegistry::try_from(vec![
            SqlMigration::parse("0001_users", "SELECT 1;"),
            SqlMigration::parse("0001_users", "SELECT 2;"),
        ]);
        assert!(matches!(result, Err(ShiftError::DuplicateMigration(_))));
    }

    #[test]
    fn test_debug_lists_names() {
        let mut registry = MigrationRegistry::new();
        registry.add("001_a", noop, noop).unwrap();
        assert_eq!(format!("{:?}", registry), r#"["001_a"]"#);
    }
}
