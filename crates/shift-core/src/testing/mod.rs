//! Testing utilities for shift.
//!
//! Following sqlx's testing philosophy, engine behavior is tested against a
//! real PostgreSQL server rather than mocks. Pure logic (reconciliation,
//! registry ordering, call scopes) is tested without a database.

pub mod assertions;
pub mod db;

pub use assertions::*;
pub use db::{IsolatedTestDb, TestDatabase, TEST_DATABASE_URL};
