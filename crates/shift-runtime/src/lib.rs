//! Database access and the migration engine.
//!
//! [`db`] runs queries against a pool or a transaction, racing each call
//! against its [`CallScope`](shift_core::CallScope). [`migrations`] builds on
//! it to apply and revert registered migrations.

pub mod db;
pub mod migrations;

pub use db::{Database, QueryExecutor, Queryer, Transaction};
pub use migrations::{
    load_migrations_from_dir, EngineState, Migration, MigrationRegistry, Migrator, RunMode,
    SqlMigration,
};
