use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use shift::MigrateCommand;
use shift_runtime::{load_migrations_from_dir, MigrationRegistry};

/// Apply and revert schema migrations stored as SQL files.
#[derive(Parser, Debug)]
#[command(name = "shift", author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    command: MigrateCommand,

    /// Directory of `NNNN_name.sql` migrations [default: from config, or `migrations`].
    #[arg(short, long, value_name = "DIR")]
    migrations_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(action) = cli.command.action() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    shift::init_logging(cli.command.verbose);
    let config = cli.command.load_config()?;

    let dir = cli
        .migrations_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.migrations.dir));
    let migrations = load_migrations_from_dir(&dir)
        .with_context(|| format!("Failed to load migrations from {}", dir.display()))?;
    let registry = MigrationRegistry::try_from(migrations)?;

    cli.command.execute(action, &config, registry).await
}
