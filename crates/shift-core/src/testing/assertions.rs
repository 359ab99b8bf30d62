//! Test assertion macros and helpers.

use crate::error::ShiftError;
use crate::query::QueryEvent;

/// Assert that a result is Ok.
///
/// # Example
///
/// ```ignore
/// assert_ok!(migrator.up(&scope, Some(1), RunMode::Commit).await);
/// ```
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: {}: expected Ok, got Err({:?})", format_args!($($arg)+), e),
        }
    };
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: expected Err, got Ok({:?})", v),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: {}: expected Err, got Ok({:?})", format_args!($($arg)+), v),
        }
    };
}

/// Assert that an error matches a specific variant.
///
/// # Example
///
/// ```ignore
/// assert_err_variant!(result, ShiftError::DeadlineExceeded);
/// ```
#[macro_export]
macro_rules! assert_err_variant {
    ($expr:expr, $variant:pat) => {
        match &$expr {
            Err($variant) => (),
            Err(e) => panic!(
                "assertion failed: expected {}, got {:?}",
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "assertion failed: expected Err({}), got Ok({:?})",
                stringify!($variant),
                v
            ),
        }
    };
}

/// Check if an error message contains a substring.
pub fn error_contains(error: &ShiftError, substring: &str) -> bool {
    error.to_string().contains(substring)
}

/// Query texts of recorded events, in call order.
pub fn event_queries(events: &[QueryEvent]) -> Vec<&str> {
    events.iter().map(|e| e.query.as_str()).collect()
}
