use std::sync::Arc;

use thiserror::Error;

use crate::migration::Direction;

/// Core error type for shift operations.
#[derive(Error, Debug)]
pub enum ShiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Opening the pool, acquiring a connection or beginning a transaction failed.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Query deadline exceeded")]
    DeadlineExceeded,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration '{name}' failed while running {direction}: {source}")]
    Migration {
        name: String,
        direction: Direction,
        #[source]
        source: Box<ShiftError>,
    },

    #[error("Duplicate migration name: {0}")]
    DuplicateMigration(String),

    #[error("Migration '{0}' has no down section and cannot be reverted")]
    Irreversible(String),

    #[error("Migration engine failed to initialize: {0}")]
    Initialization(#[source] Arc<ShiftError>),

    #[error("Transaction already committed or rolled back")]
    TransactionClosed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShiftError {
    /// True for errors produced by the call scope rather than the database.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ShiftError::Cancelled | ShiftError::DeadlineExceeded)
    }

    /// Wrap a migration body failure with the migration it came from.
    pub fn migration(name: impl Into<String>, direction: Direction, source: ShiftError) -> Self {
        ShiftError::Migration {
            name: name.into(),
            direction,
            source: Box::new(source),
        }
    }
}

/// Result type alias using ShiftError.
pub type Result<T> = std::result::Result<T, ShiftError>;
