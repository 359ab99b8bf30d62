mod plan;
mod types;

pub use plan::{AppliedMigration, MigrationPlan};
pub use types::{
    Direction, LogEntry, MigrationState, MigrationStatus, ParseDirectionError,
};
