use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;
use uuid::Uuid;

use crate::error::{Result, ShiftError};

/// An owned positional query parameter.
///
/// Arguments are owned so they can travel into the task that runs the
/// driver call and still be recorded verbatim in the query trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlArg {
    /// SQL NULL, sent as a `text` parameter.
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl SqlArg {
    fn add_to(&self, out: &mut PgArguments) -> Result<()> {
        let added = match self {
            SqlArg::Null => out.add(None::<String>),
            SqlArg::Bool(v) => out.add(*v),
            SqlArg::Int(v) => out.add(*v),
            SqlArg::BigInt(v) => out.add(*v),
            SqlArg::Float(v) => out.add(*v),
            SqlArg::Text(v) => out.add(v.clone()),
            SqlArg::Bytes(v) => out.add(v.clone()),
            SqlArg::Uuid(v) => out.add(*v),
            SqlArg::Timestamp(v) => out.add(*v),
            SqlArg::Json(v) => out.add(v.clone()),
        };

        added.map_err(|e| ShiftError::InvalidArgument(format!("Failed to bind {:?}: {}", self, e)))
    }
}

/// Encode positional arguments for a single statement.
pub fn to_arguments(args: &[SqlArg]) -> Result<PgArguments> {
    let mut out = PgArguments::default();
    for arg in args {
        arg.add_to(&mut out)?;
    }
    Ok(out)
}

impl From<bool> for SqlArg {
    fn from(v: bool) -> Self {
        SqlArg::Bool(v)
    }
}

impl From<i32> for SqlArg {
    fn from(v: i32) -> Self {
        SqlArg::Int(v)
    }
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        SqlArg::BigInt(v)
    }
}

impl From<f64> for SqlArg {
    fn from(v: f64) -> Self {
        SqlArg::Float(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        SqlArg::Text(v.to_string())
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        SqlArg::Text(v)
    }
}

impl From<&String> for SqlArg {
    fn from(v: &String) -> Self {
        SqlArg::Text(v.clone())
    }
}

impl From<Vec<u8>> for SqlArg {
    fn from(v: Vec<u8>) -> Self {
        SqlArg::Bytes(v)
    }
}

impl From<Uuid> for SqlArg {
    fn from(v: Uuid) -> Self {
        SqlArg::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlArg {
    fn from(v: DateTime<Utc>) -> Self {
        SqlArg::Timestamp(v)
    }
}

impl From<serde_json::Value> for SqlArg {
    fn from(v: serde_json::Value) -> Self {
        SqlArg::Json(v)
    }
}

impl<T: Into<SqlArg>> From<Option<T>> for SqlArg {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlArg::Null)
    }
}

/// Build a `Vec<SqlArg>` from heterogeneous values.
///
/// ```ignore
/// let args = sql_args!["001_init", "up", 3_i64];
/// ```
#[macro_export]
macro_rules! sql_args {
    () => {
        ::std::vec::Vec::<$crate::query::SqlArg>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::query::SqlArg::from($value)),+]
    };
}
