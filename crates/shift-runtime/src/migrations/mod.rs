//! Migration registry, SQL-file loading and the migration engine.

mod engine;
mod loader;
mod registry;

pub use engine::{EngineState, Migrator, RunMode};
pub use loader::{load_migrations_from_dir, split_sql_statements, SqlMigration};
pub use registry::{run_script, Migration, MigrationFn, MigrationRegistry};
