mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use tracing_subscriber::EnvFilter;

use shift_core::{CallScope, ShiftConfig, ShiftError};
use shift_runtime::{Database, MigrationRegistry, Migrator, RunMode};

/// Configuration file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "shift.toml";

/// Flags shared by the `shift` binary and [`crate::run`].
#[derive(Args, Debug, Clone, Default)]
#[command(group(ArgGroup::new("action").args(["status", "up", "down"])))]
pub struct MigrateCommand {
    /// Show which migrations have run.
    #[arg(long)]
    pub status: bool,

    /// Apply N pending migrations, or all of them.
    #[arg(long, value_name = "N")]
    pub up: Option<Option<usize>>,

    /// Revert N applied migrations, or the latest one.
    #[arg(long, value_name = "N")]
    pub down: Option<Option<usize>>,

    /// Run the migrations, then roll everything back.
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Migration log table, optionally schema-qualified.
    #[arg(long, value_name = "NAME")]
    pub table: Option<String>,
}

/// What a command line asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateAction {
    Status,
    Up(Option<usize>),
    Down(Option<usize>),
}

impl MigrateCommand {
    /// The requested action; `None` when no action flag was given.
    pub fn action(&self) -> Option<MigrateAction> {
        if self.status {
            Some(MigrateAction::Status)
        } else if let Some(count) = self.up {
            Some(MigrateAction::Up(count))
        } else {
            self.down.map(MigrateAction::Down)
        }
    }

    pub fn run_mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Commit
        }
    }

    /// Load `.env`, then the configuration file, then apply flag overrides.
    ///
    /// Without `--config`, `shift.toml` is used when present and the
    /// environment otherwise.
    pub fn load_config(&self) -> Result<ShiftConfig> {
        dotenvy::dotenv().ok();

        let mut config = match &self.config {
            Some(path) => ShiftConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                ShiftConfig::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => ShiftConfig::from_env(),
        };

        if let Some(table) = &self.table {
            config.migrations.table = table.clone();
        }
        config.migrations.validate()?;

        Ok(config)
    }

    /// Run `action` against the configured database.
    pub async fn execute(
        &self,
        action: MigrateAction,
        config: &ShiftConfig,
        registry: MigrationRegistry,
    ) -> Result<()> {
        let db = Database::new(&config.database)?;
        let migrator = Migrator::from_config(db.clone(), registry, &config.migrations)?;
        let scope = interruptible_scope();

        tracing::debug!(
            database = %config.database.display_target(),
            table = %migrator.table(),
            registered = migrator.registry().len(),
            "Starting migration command"
        );

        output::print_header(action, self.dry_run);
        let result = self.dispatch(&migrator, &scope, action).await;

        if let Err(e) = migrator.release().await {
            tracing::warn!(error = %e, "Failed to release migration transaction");
        }

        // Closing waits for every connection, including one still running an
        // abandoned statement
        if result.as_ref().is_err_and(is_cancellation) {
            tracing::debug!("Skipping pool close after cancellation");
        } else {
            db.close().await;
        }

        result
    }

    async fn dispatch(
        &self,
        migrator: &Migrator,
        scope: &CallScope,
        action: MigrateAction,
    ) -> Result<()> {
        match action {
            MigrateAction::Status => {
                let statuses = migrator.status(scope).await?;
                output::print_status(&statuses);
            }
            MigrateAction::Up(count) => {
                let ran = migrator.up(scope, count, self.run_mode()).await?;
                output::print_steps("Applied", &ran, self.dry_run);
            }
            MigrateAction::Down(count) => {
                let ran = migrator.down(scope, count, self.run_mode()).await?;
                output::print_steps("Reverted", &ran, self.dry_run);
            }
        }
        Ok(())
    }
}

/// Install the fmt subscriber. `RUST_LOG` wins unless `--verbose` is set.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A host application may already have installed one
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Whether `err` came from the scope being cancelled, during a run or while
/// the engine was starting up.
fn is_cancellation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ShiftError>().is_some_and(|e| match e {
        ShiftError::Initialization(cause) => cause.is_cancellation(),
        e => e.is_cancellation(),
    })
}

/// A scope cancelled by Ctrl-C.
fn interruptible_scope() -> CallScope {
    let scope = CallScope::new();
    let token = scope.cancellation_token().clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight queries");
            token.cancel();
        }
    });

    scope
}
