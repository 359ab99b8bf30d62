pub mod config;
pub mod error;
pub mod migration;
pub mod query;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{DatabaseConfig, MigrationsConfig, ShiftConfig};
pub use error::{Result, ShiftError};
pub use migration::{Direction, LogEntry, MigrationPlan, MigrationState, MigrationStatus};
pub use query::{CallScope, EventRecorder, QueryEvent, SqlArg};
