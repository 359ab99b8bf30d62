mod executor;
mod pool;
mod race;
mod transaction;

pub use executor::{QueryExecutor, Queryer};
pub use pool::Database;
pub use race::race;
pub use transaction::Transaction;
