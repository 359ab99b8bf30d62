mod common;

use std::time::{Duration, Instant};

use common::TestDb;
use futures::future::BoxFuture;
use shift_core::testing::error_contains;
use shift_core::{
    assert_err_variant, CallScope, Direction, MigrationState, Result, ShiftError,
};
use shift_runtime::{
    Database, EngineState, MigrationRegistry, Migrator, Queryer, RunMode, Transaction,
};

const LOG_TABLE: &str = "schema_migration_log";

fn fail<'t>(_txn: &'t Transaction, _scope: &'t CallScope) -> BoxFuture<'t, Result<()>> {
    Box::pin(async { Err(ShiftError::InvalidState("boom".into())) })
}

/// `001_init` creates a table, `002_add_col` adds a column to it.
fn registry(fail_second: bool) -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry
        .add(
            "001_init",
            |txn, scope| {
                Box::pin(async move {
                    txn.exec(scope, "CREATE TABLE widgets (id BIGINT PRIMARY KEY)", vec![])
                        .await
                        .map(|_| ())
                })
            },
            |txn, scope| {
                Box::pin(async move {
                    txn.exec(scope, "DROP TABLE widgets", vec![])
                        .await
                        .map(|_| ())
                })
            },
        )
        .unwrap();

    if fail_second {
        registry.add("002_add_col", fail, fail).unwrap();
    } else {
        registry
            .add_sql(
                "002_add_col",
                "ALTER TABLE widgets ADD COLUMN label TEXT",
                Some("ALTER TABLE widgets DROP COLUMN label".into()),
            )
            .unwrap();
    }

    registry
}

fn states(statuses: &[shift_core::MigrationStatus]) -> Vec<(&str, MigrationState)> {
    statuses.iter().map(|s| (s.name.as_str(), s.state)).collect()
}

async fn log_rows(db: &Database) -> Vec<(String, String)> {
    db.get_many(
        &CallScope::new(),
        &format!("SELECT name, direction FROM {} ORDER BY created_at, id", LOG_TABLE),
        vec![],
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_up_one_then_status() {
    let Some(test) = TestDb::setup("up_one_then_status").await else {
        return;
    };
    let scope = CallScope::new();
    let migrator = Migrator::new(test.db.clone(), registry(false));

    let ran = migrator.up(&scope, Some(1), RunMode::Commit).await.unwrap();
    assert_eq!(ran, ["001_init"]);
    assert_eq!(migrator.state().await, EngineState::Committed);

    let statuses = migrator.status(&scope).await.unwrap();
    assert_eq!(
        states(&statuses),
        [
            ("001_init", MigrationState::Applied),
            ("002_add_col", MigrationState::Pending),
        ]
    );
    assert!(statuses[0].applied_at.is_some());
    assert!(statuses[1].applied_at.is_none());

    // A fresh engine reads the same state back from the log
    let reloaded = Migrator::new(test.db.clone(), registry(false));
    let statuses = reloaded.status(&scope).await.unwrap();
    assert_eq!(
        states(&statuses),
        [
            ("001_init", MigrationState::Applied),
            ("002_add_col", MigrationState::Pending),
        ]
    );
    reloaded.release().await.unwrap();

    test.teardown().await;
}

#[tokio::test]
async fn test_failed_step_rolls_back_whole_run() {
    let Some(test) = TestDb::setup("failed_step").await else {
        return;
    };
    let scope = CallScope::new();

    // Commit an empty run so the log table exists
    let setup = Migrator::new(test.db.clone(), registry(true));
    assert!(setup.up(&scope, Some(0), RunMode::Commit).await.unwrap().is_empty());

    let migrator = Migrator::new(test.db.clone(), registry(true));
    let err = migrator.up(&scope, None, RunMode::Commit).await.unwrap_err();
    assert!(error_contains(&err, "002_add_col"));
    assert!(error_contains(&err, "boom"));
    match err {
        ShiftError::Migration {
            name, direction, ..
        } => {
            assert_eq!(name, "002_add_col");
            assert_eq!(direction, Direction::Up);
        }
        other => panic!("expected migration error, got {:?}", other),
    }
    assert_eq!(migrator.state().await, EngineState::RolledBack);
    assert_eq!(test.count(LOG_TABLE).await, 0);

    let statuses = migrator.status(&scope).await.unwrap();
    assert!(statuses.iter().all(|s| s.state == MigrationState::Pending));

    let widgets: Vec<(String,)> = test
        .db
        .get_many(
            &scope,
            "SELECT table_name::TEXT FROM information_schema.tables WHERE table_name = 'widgets'",
            vec![],
        )
        .await
        .unwrap();
    assert!(widgets.is_empty());

    test.teardown().await;
}

#[tokio::test]
async fn test_dry_run_leaves_log_unchanged() {
    let Some(test) = TestDb::setup("dry_run").await else {
        return;
    };
    let scope = CallScope::new();
    let migrator = Migrator::new(test.db.clone(), registry(false));

    migrator.up(&scope, Some(1), RunMode::Commit).await.unwrap();
    assert_eq!(test.count(LOG_TABLE).await, 1);

    let ran = migrator.up(&scope, None, RunMode::DryRun).await.unwrap();
    assert_eq!(ran, ["002_add_col"]);
    assert_eq!(migrator.state().await, EngineState::RolledBack);
    assert_eq!(test.count(LOG_TABLE).await, 1);

    let ran = migrator.down(&scope, None, RunMode::DryRun).await.unwrap();
    assert_eq!(ran, ["001_init"]);
    assert_eq!(test.count(LOG_TABLE).await, 1);

    // The plan is untouched by dry runs
    let ran = migrator.up(&scope, None, RunMode::Commit).await.unwrap();
    assert_eq!(ran, ["002_add_col"]);
    assert_eq!(test.count(LOG_TABLE).await, 2);

    test.teardown().await;
}

#[tokio::test]
async fn test_down_then_up_alternates_log() {
    let Some(test) = TestDb::setup("down_then_up").await else {
        return;
    };
    let scope = CallScope::new();
    let migrator = Migrator::new(test.db.clone(), registry(false));

    assert_eq!(
        migrator.up(&scope, None, RunMode::Commit).await.unwrap(),
        ["001_init", "002_add_col"]
    );
    assert_eq!(
        migrator.down(&scope, None, RunMode::Commit).await.unwrap(),
        ["002_add_col"]
    );
    assert_eq!(
        migrator.up(&scope, None, RunMode::Commit).await.unwrap(),
        ["002_add_col"]
    );

    let statuses = migrator.status(&scope).await.unwrap();
    assert!(statuses.iter().all(|s| s.is_applied()));

    let expected = [
        ("001_init", "up"),
        ("002_add_col", "up"),
        ("002_add_col", "down"),
        ("002_add_col", "up"),
    ];
    let rows = log_rows(&test.db).await;
    let rows: Vec<(&str, &str)> = rows.iter().map(|(n, d)| (n.as_str(), d.as_str())).collect();
    assert_eq!(rows, expected);

    // Reverting more than is applied stops at the first migration
    let ran = migrator.down(&scope, Some(10), RunMode::Commit).await.unwrap();
    assert_eq!(ran, ["002_add_col", "001_init"]);
    assert!(migrator
        .status(&scope)
        .await
        .unwrap()
        .iter()
        .all(|s| !s.is_applied()));

    test.teardown().await;
}

#[tokio::test]
async fn test_irreversible_sql_migration() {
    let Some(test) = TestDb::setup("irreversible").await else {
        return;
    };
    let scope = CallScope::new();

    let mut registry = MigrationRegistry::new();
    registry
        .add_sql("001_init", "CREATE TABLE things (id INT); CREATE INDEX things_id ON things (id);", None)
        .unwrap();
    let migrator = Migrator::new(test.db.clone(), registry);

    migrator.up(&scope, None, RunMode::Commit).await.unwrap();
    let result = migrator.down(&scope, None, RunMode::Commit).await;
    assert_err_variant!(result, ShiftError::Irreversible(_));
    assert_eq!(test.count(LOG_TABLE).await, 1);

    test.teardown().await;
}

#[tokio::test]
async fn test_custom_table_and_view() {
    let Some(test) = TestDb::setup("custom_table").await else {
        return;
    };
    let scope = CallScope::new();
    let migrator = Migrator::new(test.db.clone(), registry(false))
        .with_table("shift_log")
        .unwrap();

    migrator.up(&scope, None, RunMode::Commit).await.unwrap();
    migrator.down(&scope, Some(1), RunMode::Commit).await.unwrap();

    let applied: Vec<(String,)> = test
        .db
        .get_many(&scope, "SELECT name FROM shift_log_applied ORDER BY name", vec![])
        .await
        .unwrap();
    assert_eq!(applied, [("001_init".to_string(),)]);
    assert_eq!(test.count("shift_log").await, 3);

    test.teardown().await;
}

#[tokio::test]
async fn test_deadline_during_step_returns_promptly() {
    let Some(test) = TestDb::setup("deadline_during_step").await else {
        return;
    };

    let mut registry = MigrationRegistry::new();
    registry
        .add_sql("001_slow", "SELECT pg_sleep(5)", Some("SELECT 1".into()))
        .unwrap();
    let migrator = Migrator::new(test.db.clone(), registry);
    migrator.init(&CallScope::new()).await.unwrap();

    let scope = CallScope::new().with_timeout(Duration::from_millis(250));
    let started = Instant::now();
    let result = migrator.up(&scope, None, RunMode::Commit).await;
    let elapsed = started.elapsed();

    assert_err_variant!(result, ShiftError::DeadlineExceeded);
    assert!(elapsed < Duration::from_secs(2), "up blocked for {:?}", elapsed);
    assert_eq!(migrator.state().await, EngineState::RolledBack);

    let statuses = migrator.status(&CallScope::new()).await.unwrap();
    assert_eq!(states(&statuses), [("001_slow", MigrationState::Pending)]);

    test.teardown().await;
}
