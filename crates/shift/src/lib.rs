//! shift: schema migrations for PostgreSQL.
//!
//! Register migrations in code and hand the registry to [`run`] to get the
//! `--status` / `--up` / `--down` command line:
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = shift::MigrationRegistry::new();
//!     registry.add_sql("001_users", "CREATE TABLE users (id BIGINT)", Some("DROP TABLE users".into()))?;
//!     shift::run(registry).await
//! }
//! ```

mod cli;

use std::ffi::OsString;

use clap::{CommandFactory, Parser};

pub use cli::{init_logging, MigrateAction, MigrateCommand, DEFAULT_CONFIG_FILE};

#[doc(hidden)]
pub use shift_core;
#[doc(hidden)]
pub use shift_runtime;

pub use shift_core::{
    sql_args, CallScope, DatabaseConfig, EventRecorder, MigrationState, MigrationStatus, Result,
    ShiftConfig, ShiftError, SqlArg,
};
pub use shift_runtime::{
    Database, EngineState, Migration, MigrationRegistry, Migrator, Queryer, RunMode, Transaction,
};

#[cfg(feature = "testing")]
pub use shift_core::{assert_err, assert_err_variant, assert_ok};

/// Apply and revert schema migrations.
#[derive(Parser, Debug)]
#[command(name = "shift", author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    command: MigrateCommand,
}

/// Run the migration command line over `registry`, reading the process
/// arguments.
pub async fn run(registry: MigrationRegistry) -> anyhow::Result<()> {
    run_from(registry, std::env::args_os()).await
}

/// Like [`run`], with explicit arguments (the first one is the program name).
pub async fn run_from<I, T>(registry: MigrationRegistry, args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    let Some(action) = cli.command.action() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    init_logging(cli.command.verbose);
    let config = cli.command.load_config()?;
    cli.command.execute(action, &config, registry).await
}
